use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::sync::Arc;
use strata_expr::order::SortKey;
use strata_expr::{dotted_path, Aggregator, CompareExpr, CompareOp, Expr, Literal, This};
use strata_runtime::op::{Filter, Head, Sort, SortExpr, Unnest};
use strata_runtime::{
    pull_all, Aggregate, HashJoin, JoinStyle, Puller, QueryContext, VectorSource,
};
use strata_vector::sup::parse_values;
use strata_vector::{TypeContext, Value, Vector};

fn query() -> QueryContext {
    QueryContext::new(Arc::new(TypeContext::new()))
}

fn source(ctx: &QueryContext, batches: &[&str]) -> Box<dyn Puller> {
    let vecs = batches
        .iter()
        .map(|text| Vector::from_values(&parse_values(&ctx.types, text).unwrap()));
    Box::new(VectorSource::new(vecs))
}

fn field(ctx: &QueryContext, name: &str) -> Expr {
    dotted_path(&ctx.types, &[name])
}

fn rows(p: &mut dyn Puller) -> Vec<String> {
    pull_all(p)
        .unwrap()
        .iter()
        .flat_map(|v| v.values().iter().map(ToString::to_string).collect::<Vec<_>>())
        .collect()
}

fn sorted(mut v: Vec<String>) -> Vec<String> {
    v.sort();
    v
}

fn sum_by_k(ctx: &QueryContext, input: Box<dyn Puller>) -> Aggregate<Box<dyn Puller>> {
    let sum = Aggregator::new("sum", false, Some(field(ctx, "v")), None).unwrap();
    Aggregate::new(
        ctx,
        input,
        vec![(vec!["k".to_string()], field(ctx, "k"))],
        vec![(vec!["sum".to_string()], Arc::new(sum))],
        false,
        false,
    )
    .unwrap()
}

#[test]
fn group_by_over_a_dynamic_key() {
    let ctx = query();
    let input = source(&ctx, &["{k:\"a\",v:1} {k:\"a\",v:2} {k:1,v:3} {k:1,v:4}"]);
    let mut agg = sum_by_k(&ctx, input);
    assert_eq!(sorted(rows(&mut agg)), ["{k:\"a\",sum:3}", "{k:1,sum:7}"]);
}

#[test]
fn unnest_of_a_two_field_record() {
    let ctx = query();
    let input = source(&ctx, &["{g:\"x\",xs:[1,2,3]} {g:\"y\",xs:[]}"]);
    let mut unnest = Unnest::new(ctx.types.clone(), input, Arc::new(This));
    assert_eq!(rows(&mut unnest), ["{g:\"x\",xs:1}", "{g:\"x\",xs:2}", "{g:\"x\",xs:3}"]);
}

#[test]
fn hash_left_join() {
    let ctx = query();
    let mut join = HashJoin::new(
        &ctx,
        JoinStyle::Left,
        source(&ctx, &["{k:1,a:\"p\"} {k:2,a:\"q\"}"]),
        source(&ctx, &["{k:2,b:\"r\"} {k:3,b:\"s\"}"]),
        field(&ctx, "k"),
        field(&ctx, "k"),
        "l",
        "r",
    )
    .unwrap();
    assert_eq!(sorted(rows(&mut join)), [
        "{l:{k:1,a:\"p\"},r:null}",
        "{l:{k:2,a:\"q\"},r:{k:2,b:\"r\"}}",
    ]);
}

#[test]
fn filter_sort_head_pipeline() {
    let ctx = query();
    let input = source(&ctx, &["{x:5} {x:\"s\"} {x:1}", "{x:9} {x:3} {y:2}"]);
    let two: Expr = Arc::new(Literal::new(Value::int64(2)));
    let gt = Arc::new(CompareExpr::new(ctx.types.clone(), CompareOp::Gt, field(&ctx, "x"), two));
    let filter = Filter::new(input, gt);
    let sort = Sort::new(&ctx, filter, vec![SortExpr::new(field(&ctx, "x"), SortKey::desc())]);
    let mut head = Head::new(sort, 2);
    assert_eq!(rows(&mut head), ["{x:9}", "{x:5}"]);
    // The source emits once, so the next stream is empty.
    assert!(head.pull(false).unwrap().is_none());
}

#[test]
fn empty_inputs_end_without_batches() {
    let ctx = query();
    let mut agg = sum_by_k(&ctx, source(&ctx, &[]));
    assert!(agg.pull(false).unwrap().is_none());
    let mut unnest = Unnest::new(ctx.types.clone(), source(&ctx, &[]), Arc::new(This));
    assert!(unnest.pull(false).unwrap().is_none());
}

fn render(rows: &[(u8, i64)]) -> Vec<String> {
    rows.iter().map(|(k, v)| format!("{{k:{k},v:{v}}}")).collect()
}

proptest! {
    #[test]
    fn aggregation_ignores_row_order(
        data in prop::collection::vec((0u8..4, -100i64..100), 1..40),
        seed in any::<u64>(),
        split in 1usize..8,
    ) {
        let ctx = query();
        let mut shuffled = data.clone();
        // Deterministic permutation from the seed.
        let mut state = seed | 1;
        for i in (1..shuffled.len()).rev() {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            shuffled.swap(i, (state % (i as u64 + 1)) as usize);
        }
        let batches = |rows: &[(u8, i64)]| -> Vec<String> {
            rendered_batches(&render(rows), split)
        };
        let a = batches(&data);
        let b = batches(&shuffled);
        let a: Vec<&str> = a.iter().map(String::as_str).collect();
        let b: Vec<&str> = b.iter().map(String::as_str).collect();
        let left = sorted(rows(&mut sum_by_k(&ctx, source(&ctx, &a))));
        let right = sorted(rows(&mut sum_by_k(&ctx, source(&ctx, &b))));
        prop_assert_eq!(left, right);
    }
}

/// Groups rendered rows into batches of `split` rows.
fn rendered_batches(rows: &[String], split: usize) -> Vec<String> {
    rows.chunks(split).map(|c| c.join(" ")).collect()
}
