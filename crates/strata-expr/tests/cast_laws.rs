use proptest::prelude::*;
use strata_expr::cast_to;
use strata_vector::sup::parse_values;
use strata_vector::{BitVec, Type, TypeContext, Vector};

/// Casts `vec` to `via` and back to its own type. Every slot that survived the first cast
/// must come back unchanged.
fn assert_round_trips(ctx: &TypeContext, vec: &Vector, via: &Type) -> Result<(), TestCaseError> {
    let there = cast_to(ctx, vec, via);
    let back = cast_to(ctx, &there, &vec.ty());
    prop_assert_eq!(back.len(), vec.len());
    for i in 0..vec.len() {
        if there.value_at(i).is_error() {
            continue;
        }
        prop_assert_eq!(back.value_at(i), vec.value_at(i), "slot {} via {}", i, via);
    }
    Ok(())
}

proptest! {
    #[test]
    fn ints_round_trip(values in prop::collection::vec(-(1i64 << 53)..(1i64 << 53), 1..50)) {
        let ctx = TypeContext::new();
        let vec = Vector::int64s(values);
        for via in [Type::Int32, Type::Uint64, Type::Float64, Type::String] {
            assert_round_trips(&ctx, &vec, &via)?;
        }
    }

    #[test]
    fn small_ints_survive_narrow_types(values in prop::collection::vec(-100i64..100, 1..50)) {
        let ctx = TypeContext::new();
        let vec = Vector::int64s(values);
        for via in [Type::Int8, Type::Int16, Type::Float32] {
            assert_round_trips(&ctx, &vec, &via)?;
        }
    }

    #[test]
    fn quarter_floats_round_trip(quarters in prop::collection::vec(-1_000_000i64..1_000_000, 1..50)) {
        let ctx = TypeContext::new();
        let values = quarters.iter().map(|&q| q as f64 / 4.0).collect();
        let vec = Vector::float(Type::Float64, values, BitVec::zero());
        assert_round_trips(&ctx, &vec, &Type::String)?;
    }

    #[test]
    fn bools_and_ips_round_trip_through_strings(
        bits in prop::collection::vec(any::<bool>(), 1..30),
        octets in prop::collection::vec(any::<[u8; 4]>(), 1..30),
    ) {
        let ctx = TypeContext::new();
        let bools = Vector::bool(BitVec::from_bools(bits), BitVec::zero());
        assert_round_trips(&ctx, &bools, &Type::String)?;
        let text: Vec<String> = octets
            .iter()
            .map(|[a, b, c, d]| format!("{a}.{b}.{c}.{d}"))
            .collect();
        let ips = Vector::from_values(&parse_values(&ctx, &text.join(" ")).unwrap());
        assert_round_trips(&ctx, &ips, &Type::String)?;
    }
}
