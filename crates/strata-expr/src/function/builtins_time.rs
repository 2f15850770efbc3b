use super::{strings, with_errors, BytesOut, CallContext, FunctionSpec};
use crate::access::{ints, is_error};
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Utc};
use strata_vector::{nulls_of, BitVec, Type, Value, Vector};

inventory::submit! {
    FunctionSpec { name: "now", min_args: 0, max_args: 0, rip_unions: true, implementation: now_fn }
}

inventory::submit! {
    FunctionSpec { name: "strftime", min_args: 2, max_args: 2, rip_unions: true, implementation: strftime_fn }
}

const NANOS_PER_SEC: i64 = 1_000_000_000;

fn now_fn(cx: &CallContext<'_>, _args: &[Vector]) -> Vector {
    let ns = Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX);
    Vector::constant(Value::time(ns), cx.len, BitVec::zero())
}

fn to_datetime(ns: i64) -> Option<DateTime<Utc>> {
    let secs = ns.div_euclid(NANOS_PER_SEC);
    let nanos = ns.rem_euclid(NANOS_PER_SEC) as u32;
    DateTime::from_timestamp(secs, nanos)
}

/// Parsed format items, or `None` when the format has an unknown specifier.
fn parse_format(format: &str) -> Option<Vec<Item<'_>>> {
    let items: Vec<Item<'_>> = StrftimeItems::new(format).collect();
    (!items.iter().any(|i| matches!(i, Item::Error))).then_some(items)
}

fn strftime_fn(cx: &CallContext<'_>, args: &[Vector]) -> Vector {
    let (format, time) = (&args[0], &args[1]);
    for v in [format, time] {
        if is_error(v) {
            return v.clone();
        }
    }
    let Some(formats) = strings(format) else {
        return Vector::wrapped_error(
            cx.types,
            "strftime: string value required for format arg",
            format,
        );
    };
    if !matches!(time.ty().under(), Type::Time) {
        return Vector::wrapped_error(cx.types, "strftime: time value required for time arg", time);
    }
    let Some(times) = ints(time) else {
        return Vector::missing(cx.types, time.len());
    };
    let nulls = BitVec::or(&nulls_of(format), &nulls_of(time));
    let mut out = BytesOut::with_capacity(time.len() as usize);
    let mut errs = Vec::new();
    let mut cached: Option<(&str, Option<Vec<Item<'_>>>)> = None;
    for i in 0..time.len() {
        if nulls.value(i) {
            out.push_null();
            continue;
        }
        let text = formats.str(i as usize);
        if cached.as_ref().map_or(true, |(f, _)| *f != text) {
            cached = Some((text, parse_format(text)));
        }
        let items = cached.as_ref().and_then(|(_, items)| items.as_ref());
        match (items, to_datetime(times.get(i as usize))) {
            (Some(items), Some(dt)) => {
                out.push(dt.format_with_items(items.iter()).to_string().as_bytes())
            }
            _ => errs.push(i),
        }
    }
    with_errors(out.strings(), &errs, |n| {
        Vector::string_error(cx.types, "strftime: invalid format", n)
    })
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{col, run};
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use strata_vector::TypeContext;

    #[test]
    fn formats_times() {
        let ctx = Arc::new(TypeContext::new());
        let input = col(&ctx, "\"%Y-%m-%d %H:%M\" \"%j\"");
        let t = Value::time(1_700_000_000 * NANOS_PER_SEC);
        let out = super::super::call(
            ctx.clone(),
            "strftime",
            vec![
                Arc::new(crate::This),
                Arc::new(crate::Literal::new(t)),
            ],
        )
        .map(|call| super::super::test_support::show(&crate::Evaluator::eval(&call, &input)))
        .unwrap();
        assert_eq!(out, ["\"2023-11-14 22:13\"", "\"318\""]);
        let out = run(&ctx, "strftime", &input, &[Value::int64(1)]);
        assert!(out[0].contains("strftime: time value required for time arg"));
    }

    #[test]
    fn negative_times_round_down() {
        let dt = to_datetime(-1).unwrap();
        assert_eq!(dt.to_rfc3339(), "1969-12-31T23:59:59.999999999+00:00");
        assert!(parse_format("%Q").is_none());
    }

    #[test]
    fn now_is_a_constant_time() {
        let ctx = Arc::new(TypeContext::new());
        let call = super::super::call(ctx, "now", vec![]).unwrap();
        let out = crate::Evaluator::eval(&call, &Vector::const_null(3));
        assert_eq!(out.len(), 3);
        assert!(matches!(out.ty(), Type::Time));
    }
}
