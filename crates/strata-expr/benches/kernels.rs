use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use strata_expr::agg::{self, new_pattern};
use strata_expr::{arith, compare, ArithOp, CompareOp};
use strata_vector::{BitVec, Type, TypeContext, Value, Vector};

const ROWS: usize = 65_536;

fn ints(rng: &mut StdRng, null_every: usize) -> Vector {
    let values: Vec<i64> = (0..ROWS).map(|_| rng.gen_range(-1_000_000..1_000_000)).collect();
    let nulls = if null_every == 0 {
        BitVec::zero()
    } else {
        BitVec::from_bools((0..ROWS).map(|i| i % null_every == 0))
    };
    Vector::int(Type::Int64, values, nulls)
}

fn bench_arith(c: &mut Criterion) {
    let ctx = TypeContext::new();
    let mut rng = StdRng::seed_from_u64(7);
    let lhs = ints(&mut rng, 0);
    let rhs = ints(&mut rng, 16);
    let konst = Vector::constant(Value::int64(3), ROWS as u32, BitVec::zero());
    let floats = Vector::float(
        Type::Float64,
        (0..ROWS).map(|_| rng.gen::<f64>()).collect(),
        BitVec::zero(),
    );

    let mut group = c.benchmark_group("arith");
    group.throughput(Throughput::Elements(ROWS as u64));
    group.bench_function(BenchmarkId::new("add", "flat_flat"), |b| {
        b.iter(|| arith(&ctx, ArithOp::Add, black_box(&lhs), black_box(&rhs)))
    });
    group.bench_function(BenchmarkId::new("mul", "flat_const"), |b| {
        b.iter(|| arith(&ctx, ArithOp::Mul, black_box(&lhs), black_box(&konst)))
    });
    group.bench_function(BenchmarkId::new("add", "int_float"), |b| {
        b.iter(|| arith(&ctx, ArithOp::Add, black_box(&lhs), black_box(&floats)))
    });
    group.bench_function(BenchmarkId::new("div", "by_nullable"), |b| {
        b.iter(|| arith(&ctx, ArithOp::Div, black_box(&lhs), black_box(&rhs)))
    });
    group.finish();
}

fn bench_compare(c: &mut Criterion) {
    let ctx = TypeContext::new();
    let mut rng = StdRng::seed_from_u64(11);
    let lhs = ints(&mut rng, 0);
    let rhs = ints(&mut rng, 0);
    let mut group = c.benchmark_group("compare");
    group.throughput(Throughput::Elements(ROWS as u64));
    group.bench_function("lt_flat_flat", |b| {
        b.iter(|| compare(&ctx, CompareOp::Lt, black_box(&lhs), black_box(&rhs)))
    });
    group.finish();
}

fn bench_aggregate(c: &mut Criterion) {
    let ctx = TypeContext::new();
    let mut rng = StdRng::seed_from_u64(13);
    let input = ints(&mut rng, 8);
    let mut group = c.benchmark_group("aggregate");
    group.throughput(Throughput::Elements(ROWS as u64));
    for op in ["sum", "avg", "count", "dcount"] {
        let pattern = new_pattern(op, true).expect("known aggregate");
        group.bench_function(op, |b| {
            b.iter(|| {
                let mut f = pattern();
                agg::consume(f.as_mut(), black_box(&input));
                f.result(&ctx)
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_arith, bench_compare, bench_aggregate);
criterion_main!(benches);
