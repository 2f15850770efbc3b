use super::{BytesOut, CallContext, FunctionSpec, VAR_ARGS};
use crate::access::byte_slots;
use crate::logic::not;
use strata_vector::{apply, combine, nulls_of, pick, BitVec, Type, Value, Vector};

inventory::submit! {
    FunctionSpec { name: "missing", min_args: 1, max_args: VAR_ARGS, rip_unions: true, implementation: missing_fn }
}

inventory::submit! {
    FunctionSpec { name: "has", min_args: 1, max_args: VAR_ARGS, rip_unions: true, implementation: has_fn }
}

inventory::submit! {
    FunctionSpec { name: "quiet", min_args: 1, max_args: 1, rip_unions: true, implementation: quiet_fn }
}

inventory::submit! {
    FunctionSpec { name: "is_error", min_args: 1, max_args: 1, rip_unions: true, implementation: is_error_fn }
}

inventory::submit! {
    FunctionSpec { name: "error", min_args: 1, max_args: 1, rip_unions: true, implementation: error_fn }
}

/// Rows of a string error column whose message is `missing` or `quiet`.
fn missing_or_quiet(err: &Vector) -> Vec<u32> {
    let Vector::Error(e) = err.under() else {
        return Vec::new();
    };
    if !matches!(e.inner.ty().under(), Type::String) {
        return Vec::new();
    }
    let Some(msgs) = byte_slots(&e.inner) else {
        return Vec::new();
    };
    (0..err.len())
        .filter(|&i| matches!(msgs.get(i as usize), b"missing" | b"quiet"))
        .collect()
}

/// True where any argument is missing; the first error argument that is not `missing` or
/// `quiet` is passed through instead.
fn missing_fn(_cx: &CallContext<'_>, args: &[Vector]) -> Vector {
    let n = args[0].len();
    let mut nulls = BitVec::zero();
    for v in args {
        nulls = BitVec::or(&nulls, &nulls_of(v));
        if !matches!(v.under(), Vector::Error(_)) {
            continue;
        }
        let hits = missing_or_quiet(v);
        if hits.is_empty() {
            return v.clone();
        }
        if hits.len() as u32 == n {
            return Vector::constant(Value::bool(true), n, nulls.compact());
        }
        let hit_nulls = if nulls.is_zero() {
            BitVec::zero()
        } else {
            nulls.expand(n as usize).pick(&hits).compact()
        };
        let trues = Vector::constant(Value::bool(true), hits.len() as u32, hit_nulls);
        let mut is_hit = BitVec::from_positions(n as usize, &hits);
        is_hit.not_inplace();
        let others = is_hit.positions();
        return combine(&trues, &others, &pick(v, &others));
    }
    Vector::constant(Value::bool(false), n, nulls.compact())
}

fn has_fn(cx: &CallContext<'_>, args: &[Vector]) -> Vector {
    apply(false, &mut |vecs: &[Vector]| not(&vecs[0]), &[missing_fn(cx, args)])
}

/// Turns `error("missing")` into `error("quiet")`.
fn quiet_fn(_cx: &CallContext<'_>, args: &[Vector]) -> Vector {
    let v = &args[0];
    let Vector::Error(e) = v.under() else {
        return v.clone();
    };
    if !matches!(e.inner.ty().under(), Type::String) {
        return v.clone();
    }
    if let Vector::Const(c) = e.inner.under() {
        if c.value.bytes() == Some(b"missing") {
            let inner = Vector::constant(Value::string("quiet"), c.len, c.nulls.clone());
            return Vector::error(e.ty.clone(), inner, e.nulls.clone());
        }
        return v.clone();
    }
    let Some(msgs) = byte_slots(&e.inner) else {
        return v.clone();
    };
    let inner_nulls = nulls_of(&e.inner);
    let mut out = BytesOut::with_capacity(v.len() as usize);
    for i in 0..v.len() {
        if inner_nulls.value(i) {
            out.push_null();
            continue;
        }
        match msgs.get(i as usize) {
            b"missing" => out.push(b"quiet"),
            msg => out.push(msg),
        }
    }
    Vector::error(e.ty.clone(), out.strings(), e.nulls.clone())
}

fn is_error_fn(cx: &CallContext<'_>, args: &[Vector]) -> Vector {
    Vector::constant(Value::bool(args[0].ty().is_error()), cx.len, BitVec::zero())
}

fn error_fn(cx: &CallContext<'_>, args: &[Vector]) -> Vector {
    let v = &args[0];
    Vector::error(cx.types.lookup_error(&v.ty()), v.clone(), BitVec::zero())
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{col, run, show};
    use super::*;
    use crate::{dotted_path, Evaluator};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use strata_vector::TypeContext;

    #[test]
    fn missing_and_has_follow_field_presence() {
        let ctx = Arc::new(TypeContext::new());
        let input = col(&ctx, "{a:1} {b:2} {a:null}");
        let has = super::super::call(ctx.clone(), "has", vec![dotted_path(&ctx, &["a"])]).unwrap();
        assert_eq!(show(&has.eval(&input)), ["true", "false", "null"]);
        let missing =
            super::super::call(ctx.clone(), "missing", vec![dotted_path(&ctx, &["a"])]).unwrap();
        assert_eq!(show(&missing.eval(&input)), ["false", "true", "null"]);
    }

    #[test]
    fn other_errors_pass_through_missing() {
        let ctx = Arc::new(TypeContext::new());
        let input = Vector::string_error(&ctx, "boom", 2);
        assert_eq!(run(&ctx, "missing", &input, &[]), ["error(\"boom\")", "error(\"boom\")"]);
    }

    #[test]
    fn quiet_and_error_constructors() {
        let ctx = Arc::new(TypeContext::new());
        assert_eq!(run(&ctx, "quiet", &Vector::missing(&ctx, 1), &[]), ["error(\"quiet\")"]);
        assert_eq!(run(&ctx, "error", &col(&ctx, "\"x\""), &[]), ["error(\"x\")"]);
        assert_eq!(run(&ctx, "is_error", &Vector::missing(&ctx, 1), &[]), ["true"]);
        assert_eq!(run(&ctx, "is_error", &col(&ctx, "1"), &[]), ["false"]);
    }
}
