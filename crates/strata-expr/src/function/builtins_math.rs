use super::{with_errors, CallContext, FunctionSpec};
use crate::access::{floats, is_error};
use crate::cast::cast_to;
use strata_vector::types::{is_float, is_numeric, is_signed, is_unsigned};
use strata_vector::{nulls_of, pick, BitVec, Type, Value, Vector};

inventory::submit! {
    FunctionSpec { name: "abs", min_args: 1, max_args: 1, rip_unions: true, implementation: abs_fn }
}

inventory::submit! {
    FunctionSpec { name: "ceil", min_args: 1, max_args: 1, rip_unions: true, implementation: ceil_fn }
}

inventory::submit! {
    FunctionSpec { name: "floor", min_args: 1, max_args: 1, rip_unions: true, implementation: floor_fn }
}

inventory::submit! {
    FunctionSpec { name: "round", min_args: 1, max_args: 1, rip_unions: true, implementation: round_fn }
}

inventory::submit! {
    FunctionSpec { name: "sqrt", min_args: 1, max_args: 1, rip_unions: true, implementation: sqrt_fn }
}

inventory::submit! {
    FunctionSpec { name: "log", min_args: 1, max_args: 1, rip_unions: true, implementation: log_fn }
}

inventory::submit! {
    FunctionSpec { name: "pow", min_args: 2, max_args: 2, rip_unions: true, implementation: pow_fn }
}

/// Rewrites the values of an int or float column in place of its form.
fn map_numbers(v: &Vector, fi: fn(i64) -> i64, ff: fn(f64) -> f64) -> Vector {
    match v.under() {
        Vector::Const(c) => {
            let ty = c.value.ty().clone();
            let value = if c.value.is_null() {
                c.value.clone()
            } else if is_float(ty.under().id()) {
                Value::float(ty, ff(c.value.as_float().unwrap_or_default()))
            } else {
                Value::int(ty, fi(c.value.as_int().unwrap_or_default()))
            };
            Vector::constant(value, c.len, c.nulls.clone())
        }
        Vector::View(view) => pick(&map_numbers(&view.inner, fi, ff), &view.index),
        Vector::Dict(d) => Vector::dict(
            map_numbers(&d.inner, fi, ff),
            d.index.clone(),
            d.counts.clone(),
            d.nulls.clone(),
        ),
        Vector::Int(x) => {
            Vector::int(x.ty.clone(), x.values.iter().map(|&k| fi(k)).collect(), x.nulls.clone())
        }
        Vector::Float(x) => {
            Vector::float(x.ty.clone(), x.values.iter().map(|&k| ff(k)).collect(), x.nulls.clone())
        }
        v => v.clone(),
    }
}

fn not_a_number(cx: &CallContext<'_>, name: &str, v: &Vector) -> Vector {
    Vector::wrapped_error(cx.types, &format!("{name}: not a number"), v)
}

fn passes_through(v: &Vector) -> bool {
    v.ty().is_null() || is_error(v)
}

fn abs_fn(cx: &CallContext<'_>, args: &[Vector]) -> Vector {
    let v = &args[0];
    let id = v.ty().under().id();
    if passes_through(v) || is_unsigned(id) {
        return v.clone();
    }
    if is_signed(id) || is_float(id) {
        return map_numbers(v, i64::wrapping_abs, f64::abs);
    }
    not_a_number(cx, "abs", v)
}

fn rounding(cx: &CallContext<'_>, name: &str, v: &Vector, f: fn(f64) -> f64) -> Vector {
    let id = v.ty().under().id();
    if passes_through(v) || (is_numeric(id) && !is_float(id)) {
        return v.clone();
    }
    if is_float(id) {
        return map_numbers(v, |k| k, f);
    }
    not_a_number(cx, name, v)
}

fn ceil_fn(cx: &CallContext<'_>, args: &[Vector]) -> Vector {
    rounding(cx, "ceil", &args[0], f64::ceil)
}

fn floor_fn(cx: &CallContext<'_>, args: &[Vector]) -> Vector {
    rounding(cx, "floor", &args[0], f64::floor)
}

fn round_fn(cx: &CallContext<'_>, args: &[Vector]) -> Vector {
    rounding(cx, "round", &args[0], f64::round)
}

/// The argument as a `float64` column, or `None` when it is not numeric.
fn as_float64(cx: &CallContext<'_>, v: &Vector) -> Option<Vector> {
    is_numeric(v.ty().under().id()).then(|| cast_to(cx.types, v, &Type::Float64))
}

fn sqrt_fn(cx: &CallContext<'_>, args: &[Vector]) -> Vector {
    let v = &args[0];
    if passes_through(v) {
        return v.clone();
    }
    let Some(f) = as_float64(cx, v) else {
        return Vector::wrapped_error(cx.types, "sqrt: number argument required", v);
    };
    let nulls = nulls_of(&f);
    let Some(src) = floats(&f) else {
        return Vector::missing(cx.types, v.len());
    };
    let values = (0..f.len() as usize).map(|i| src.get(i).sqrt()).collect();
    Vector::float(Type::Float64, values, nulls)
}

fn log_fn(cx: &CallContext<'_>, args: &[Vector]) -> Vector {
    let v = &args[0];
    if passes_through(v) {
        return v.clone();
    }
    let Some(f) = as_float64(cx, v) else {
        return not_a_number(cx, "log", v);
    };
    let nulls = nulls_of(&f);
    let Some(src) = floats(&f) else {
        return Vector::missing(cx.types, v.len());
    };
    let mut values = Vec::with_capacity(f.len() as usize);
    let mut out_nulls = Vec::with_capacity(f.len() as usize);
    let mut errs = Vec::new();
    for i in 0..f.len() {
        if nulls.value(i) {
            values.push(0.0);
            out_nulls.push(true);
            continue;
        }
        let x = src.get(i as usize);
        if x <= 0.0 {
            errs.push(i);
            continue;
        }
        values.push(x.ln());
        out_nulls.push(false);
    }
    let out = Vector::float(Type::Float64, values, BitVec::from_bools(out_nulls).compact());
    with_errors(out, &errs, |_| {
        Vector::wrapped_error(cx.types, "log: illegal argument", &pick(v, &errs))
    })
}

fn pow_fn(cx: &CallContext<'_>, args: &[Vector]) -> Vector {
    let (a, b) = (&args[0], &args[1]);
    for v in [a, b] {
        if is_error(v) {
            return v.clone();
        }
    }
    let Some(x) = as_float64(cx, a) else {
        return not_a_number(cx, "pow", a);
    };
    let Some(y) = as_float64(cx, b) else {
        return not_a_number(cx, "pow", b);
    };
    let nulls = BitVec::or(&nulls_of(&x), &nulls_of(&y));
    let (Some(xs), Some(ys)) = (floats(&x), floats(&y)) else {
        return Vector::missing(cx.types, a.len());
    };
    let values = (0..a.len())
        .map(|i| {
            if nulls.value(i) {
                0.0
            } else {
                xs.get(i as usize).powf(ys.get(i as usize))
            }
        })
        .collect();
    Vector::float(Type::Float64, values, nulls)
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{col, run};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use strata_vector::{TypeContext, Value};

    #[test]
    fn abs_keeps_type_and_form() {
        let ctx = Arc::new(TypeContext::new());
        assert_eq!(run(&ctx, "abs", &col(&ctx, "-3 4 null"), &[]), ["3", "4", "null"]);
        assert_eq!(run(&ctx, "abs", &col(&ctx, "-1.5"), &[]), ["1.5"]);
        let out = run(&ctx, "abs", &col(&ctx, "\"x\""), &[]);
        assert!(out[0].contains("abs: not a number"));
    }

    #[test]
    fn rounding_floats_only() {
        let ctx = Arc::new(TypeContext::new());
        assert_eq!(run(&ctx, "ceil", &col(&ctx, "1.2 -1.2"), &[]), ["2.0", "-1.0"]);
        assert_eq!(run(&ctx, "floor", &col(&ctx, "1.8"), &[]), ["1.0"]);
        assert_eq!(run(&ctx, "round", &col(&ctx, "2.5 7"), &[]), ["3.0", "7"]);
    }

    #[test]
    fn log_and_sqrt_and_pow() {
        let ctx = Arc::new(TypeContext::new());
        assert_eq!(run(&ctx, "sqrt", &col(&ctx, "9 2.25"), &[]), ["3.0", "1.5"]);
        let out = run(&ctx, "log", &col(&ctx, "1 0"), &[]);
        assert_eq!(out[0], "0.0");
        assert!(out[1].contains("log: illegal argument"));
        assert_eq!(run(&ctx, "pow", &col(&ctx, "2 3"), &[Value::int64(2)]), ["4.0", "9.0"]);
    }
}
