use crate::cast::cast_to;
use strata_vector::types::{is_float, is_numeric, is_signed};
use strata_vector::{BitVec, Type, TypeContext, Value, Vector};

pub(crate) const INCOMPATIBLE: &str = "incompatible types";

/// Brings two homogeneous operands to a common type.
///
/// Equal types pass through; a null-typed side becomes a null constant of the other type;
/// numerics promote (float wins, then the wider of the same signedness, and mixed signedness
/// goes to `int64`). Anything else is an `incompatible types` error column.
pub(crate) fn coerce_vals(
    ctx: &TypeContext,
    lhs: &Vector,
    rhs: &Vector,
) -> Result<(Vector, Vector), Vector> {
    let lid = lhs.ty().under().id();
    let rid = rhs.ty().under().id();
    if lid == rid {
        return Ok((lhs.clone(), rhs.clone()));
    }
    if lhs.ty().is_null() {
        let null = Vector::constant(Value::null(rhs.ty()), lhs.len(), BitVec::zero());
        return Ok((null, rhs.clone()));
    }
    if rhs.ty().is_null() {
        let null = Vector::constant(Value::null(lhs.ty()), rhs.len(), BitVec::zero());
        return Ok((lhs.clone(), null));
    }
    let (Some(lid), Some(rid)) = (numeric_id(&lhs.ty()), numeric_id(&rhs.ty())) else {
        return Err(Vector::string_error(ctx, INCOMPATIBLE, lhs.len()));
    };
    let target = promote(lid, rid);
    let cast = |v: &Vector, id: u32| match Type::primitive_from_id(target) {
        Some(ty) if id != target => cast_to(ctx, v, &ty),
        _ => v.clone(),
    };
    Ok((cast(lhs, lid), cast(rhs, rid)))
}

/// Numeric type id of `ty`; enums count as `uint64`.
pub(crate) fn numeric_id(ty: &Type) -> Option<u32> {
    match ty.under() {
        Type::Enum(_) => Some(Type::Uint64.id()),
        ty if is_numeric(ty.id()) => Some(ty.id()),
        _ => None,
    }
}

/// The id two numeric ids promote to.
pub(crate) fn promote(a: u32, b: u32) -> u32 {
    match (is_float(a), is_float(b)) {
        (true, true) => a.max(b),
        (true, false) | (false, true) => Type::Float64.id(),
        _ if is_signed(a) == is_signed(b) => a.max(b),
        _ => Type::Int64.id().max(if is_signed(a) { a } else { b }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn promotion_rules() {
        let (u8_, u64_, i16_, i64_) = (
            Type::Uint8.id(),
            Type::Uint64.id(),
            Type::Int16.id(),
            Type::Int64.id(),
        );
        assert_eq!(promote(u8_, u64_), u64_);
        assert_eq!(promote(i16_, i64_), i64_);
        assert_eq!(promote(u8_, i16_), i64_);
        assert_eq!(promote(i16_, Type::Float32.id()), Type::Float64.id());
        assert_eq!(promote(Type::Duration.id(), Type::Time.id()), Type::Time.id());
    }

    #[test]
    fn null_side_takes_the_other_type() {
        let ctx = TypeContext::new();
        let (l, r) = coerce_vals(&ctx, &Vector::const_null(2), &Vector::int64s(vec![1, 2])).unwrap();
        assert_eq!(l.ty(), Type::Int64);
        assert_eq!(r.ty(), Type::Int64);
    }

    #[test]
    fn strings_and_numbers_are_incompatible() {
        let ctx = TypeContext::new();
        let err = coerce_vals(&ctx, &Vector::strings(["a"]), &Vector::int64s(vec![1])).unwrap_err();
        assert_eq!(err.value_at(0), Value::error(&ctx, INCOMPATIBLE));
    }
}
