use pretty_assertions::assert_eq;
use proptest::prelude::*;
use strata_vector::sup::parse_values;
use strata_vector::{
    add_nulls, apply, copy_and_set_nulls, nulls_of, pick, reverse_pick, BitVec, Type, TypeContext,
    Value, Vector,
};

fn sample(ctx: &TypeContext) -> Vec<Value> {
    parse_values(
        ctx,
        r#"1 "a" 2.5 null {x:1} [1,2] 3 "b" {x:"y"} 10.0.0.1 error("boom") true |[3,1]|"#,
    )
    .unwrap()
}

fn encode_all(v: &Vector) -> Vec<Value> {
    v.values()
}

proptest! {
    #[test]
    fn pick_selects_rows(idx in proptest::collection::vec(0u32..13, 0..40)) {
        let ctx = TypeContext::new();
        let values = sample(&ctx);
        let vec = Vector::from_values(&values);
        let picked = pick(&vec, &idx);
        prop_assert_eq!(picked.len() as usize, idx.len());
        for (k, &i) in idx.iter().enumerate() {
            prop_assert_eq!(picked.value_at(k as u32), values[i as usize].clone());
        }
    }

    #[test]
    fn pick_preserves_nulls(bits in proptest::collection::vec(any::<bool>(), 1..60), seed in any::<u64>()) {
        let n = bits.len() as u32;
        let vals: Vec<i64> = (0..n as i64).collect();
        let nulls = BitVec::from_bools(bits.iter().copied());
        let vec = Vector::int(strata_vector::Type::Int64, vals, nulls.clone());
        let idx: Vec<u32> = (0..n).map(|i| ((seed >> (i % 64)) as u32 ^ i) % n).collect();
        let picked = nulls_of(&pick(&vec, &idx));
        for (k, &i) in idx.iter().enumerate() {
            prop_assert_eq!(picked.value(k as u32), nulls.value(i));
        }
    }

    #[test]
    fn set_nulls_then_nulls_of(mask in proptest::collection::vec(any::<bool>(), 13)) {
        let ctx = TypeContext::new();
        let vec = Vector::from_values(&sample(&ctx));
        let mask = BitVec::from_bools(mask);
        let out = copy_and_set_nulls(&vec, &mask);
        let got = nulls_of(&out);
        // Const nulls in the input stay null.
        let expect: Vec<u32> = (0..13).filter(|&i| mask.value(i) || i == 3).collect();
        prop_assert_eq!(got.positions(), expect);
    }

    #[test]
    fn builder_round_trips(picks in proptest::collection::vec(0usize..13, 0..30)) {
        let ctx = TypeContext::new();
        let pool = sample(&ctx);
        let values: Vec<Value> = picks.iter().map(|&i| pool[i].clone()).collect();
        let vec = Vector::from_values(&values);
        prop_assert_eq!(encode_all(&vec), values);
    }

    #[test]
    fn dict_flattens_to_indexed_rows(
        inner in proptest::collection::vec(any::<i64>(), 1..20),
        rows in proptest::collection::vec((any::<u8>(), any::<bool>()), 0..60),
    ) {
        let n = inner.len();
        let index: Vec<u8> = rows.iter().map(|&(k, _)| (usize::from(k) % n) as u8).collect();
        let nulls = BitVec::from_bools(rows.iter().map(|&(_, null)| null));
        let mut counts = vec![0u32; n];
        for &k in &index {
            counts[usize::from(k)] += 1;
        }
        let dict = Vector::dict(
            Vector::int64s(inner.clone()),
            index.clone(),
            counts,
            nulls.clone(),
        );
        let gathered: Vec<i64> = index.iter().map(|&k| inner[usize::from(k)]).collect();
        let flat = Vector::int(Type::Int64, gathered, nulls.clone());

        prop_assert_eq!(encode_all(&dict), encode_all(&flat));
        prop_assert_eq!(nulls_of(&dict).positions(), nulls.positions());
        let idx: Vec<u32> = index.iter().map(|&k| u32::from(k)).collect();
        let flattened = add_nulls(&pick(&Vector::int64s(inner), &idx), &nulls);
        prop_assert_eq!(encode_all(&flattened), encode_all(&flat));
    }
}

#[test]
fn apply_equals_row_at_a_time() {
    let ctx = TypeContext::new();
    let values = sample(&ctx);
    let vec = Vector::from_values(&values);
    let mut types = |args: &[Vector]| -> Vector {
        let ty = args[0].ty();
        Vector::constant(Value::type_value(&ty), args[0].len(), BitVec::zero())
    };
    let out = apply(false, &mut types, &[vec]);
    for (i, v) in values.iter().enumerate() {
        assert_eq!(out.value_at(i as u32), Value::type_value(v.ty()));
    }
}

#[test]
fn reverse_pick_is_the_complement() {
    let vec = Vector::int64s(vec![0, 1, 2, 3, 4]);
    let rest = reverse_pick(&vec, &[0, 2]);
    assert_eq!(
        rest.values(),
        vec![Value::int64(1), Value::int64(3), Value::int64(4)]
    );
}
