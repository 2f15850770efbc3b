use super::{strings, BytesOut, CallContext, FunctionSpec};
use crate::access::{is_error, list_parts, ByteSlots};
use strata_vector::{nulls_of, BitVec, Type, Vector};

inventory::submit! {
    FunctionSpec { name: "lower", min_args: 1, max_args: 1, rip_unions: true, implementation: lower_fn }
}

inventory::submit! {
    FunctionSpec { name: "upper", min_args: 1, max_args: 1, rip_unions: true, implementation: upper_fn }
}

inventory::submit! {
    FunctionSpec { name: "trim", min_args: 1, max_args: 1, rip_unions: true, implementation: trim_fn }
}

inventory::submit! {
    FunctionSpec { name: "rune_len", min_args: 1, max_args: 1, rip_unions: true, implementation: rune_len_fn }
}

inventory::submit! {
    FunctionSpec { name: "replace", min_args: 3, max_args: 3, rip_unions: true, implementation: replace_fn }
}

inventory::submit! {
    FunctionSpec { name: "split", min_args: 2, max_args: 2, rip_unions: true, implementation: split_fn }
}

inventory::submit! {
    FunctionSpec { name: "join", min_args: 1, max_args: 2, rip_unions: true, implementation: join_fn }
}

inventory::submit! {
    FunctionSpec { name: "position", min_args: 2, max_args: 2, rip_unions: true, implementation: position_fn }
}

/// Maps every non-null string through `f`, keeping nulls.
fn map_strings(cx: &CallContext<'_>, name: &str, v: &Vector, f: fn(&str) -> String) -> Vector {
    if is_error(v) || v.ty().is_null() {
        return v.clone();
    }
    let Some(src) = strings(v) else {
        return Vector::wrapped_error(cx.types, &format!("{name}: string arg required"), v);
    };
    let nulls = nulls_of(v);
    let mut out = BytesOut::with_capacity(v.len() as usize);
    for i in 0..v.len() {
        if nulls.value(i) {
            out.push_null();
        } else {
            out.push(f(src.str(i as usize)).as_bytes());
        }
    }
    out.strings()
}

fn lower_fn(cx: &CallContext<'_>, args: &[Vector]) -> Vector {
    map_strings(cx, "lower", &args[0], str::to_lowercase)
}

fn upper_fn(cx: &CallContext<'_>, args: &[Vector]) -> Vector {
    map_strings(cx, "upper", &args[0], str::to_uppercase)
}

fn trim_fn(cx: &CallContext<'_>, args: &[Vector]) -> Vector {
    map_strings(cx, "trim", &args[0], |s| s.trim().to_string())
}

fn rune_len_fn(cx: &CallContext<'_>, args: &[Vector]) -> Vector {
    let v = &args[0];
    if is_error(v) || v.ty().is_null() {
        return v.clone();
    }
    let Some(src) = strings(v) else {
        return Vector::wrapped_error(cx.types, "rune_len: string arg required", v);
    };
    let values = (0..v.len() as usize).map(|i| src.str(i).chars().count() as i64).collect();
    Vector::int(Type::Int64, values, nulls_of(v))
}

/// All arguments as strings, or the wrapped error for the first one that is not.
fn all_strings<'a>(
    cx: &CallContext<'_>,
    name: &str,
    args: &'a [Vector],
) -> Result<Vec<ByteSlots<'a>>, Vector> {
    args.iter()
        .map(|a| {
            if is_error(a) {
                return Err(a.clone());
            }
            strings(a).ok_or_else(|| {
                Vector::wrapped_error(cx.types, &format!("{name}: string arg required"), a)
            })
        })
        .collect()
}

fn replace_fn(cx: &CallContext<'_>, args: &[Vector]) -> Vector {
    let slots = match all_strings(cx, "replace", args) {
        Ok(s) => s,
        Err(err) => return err,
    };
    let nulls: Vec<BitVec> = args.iter().map(nulls_of).collect();
    let n = args[0].len();
    let mut out = BytesOut::with_capacity(n as usize);
    let mut errs = Vec::new();
    for i in 0..n {
        if nulls[1].value(i) || nulls[2].value(i) {
            errs.push(i);
            continue;
        }
        if nulls[0].value(i) {
            out.push_null();
            continue;
        }
        let k = i as usize;
        let s = slots[0].str(k).replace(slots[1].str(k), slots[2].str(k));
        out.push(s.as_bytes());
    }
    super::with_errors(out.strings(), &errs, |n| {
        Vector::string_error(cx.types, "replace: an input arg is null", n)
    })
}

fn split_fn(cx: &CallContext<'_>, args: &[Vector]) -> Vector {
    let slots = match all_strings(cx, "split", args) {
        Ok(s) => s,
        Err(err) => return err,
    };
    let nulls = BitVec::or(&nulls_of(&args[0]), &nulls_of(&args[1]));
    let n = args[0].len();
    let mut offsets = Vec::with_capacity(n as usize + 1);
    offsets.push(0u32);
    let mut pieces = BytesOut::with_capacity(n as usize);
    let mut count = 0u32;
    for i in 0..n {
        if !nulls.value(i) {
            let k = i as usize;
            for piece in slots[0].str(k).split(slots[1].str(k)) {
                pieces.push(piece.as_bytes());
                count += 1;
            }
        }
        offsets.push(count);
    }
    let ty = cx.types.lookup_array(&Type::String);
    Vector::array(ty, offsets, pieces.strings(), nulls.compact())
}

fn join_fn(cx: &CallContext<'_>, args: &[Vector]) -> Vector {
    let list = &args[0];
    if is_error(list) {
        return list.clone();
    }
    let elem_ok = list.ty().inner_elem().is_some_and(|t| matches!(t.under(), Type::String))
        && matches!(list.ty().kind(), strata_vector::Kind::Array);
    let parts = list_parts(list).filter(|_| elem_ok);
    let Some((arr, rows)) = parts else {
        return Vector::wrapped_error(cx.types, "join: array of string arg required", list);
    };
    let sep = match args.get(1) {
        Some(sep) => match strings(sep) {
            Some(s) => Some((s, nulls_of(sep))),
            None => {
                return Vector::wrapped_error(cx.types, "join: separator must be string", sep)
            }
        },
        None => None,
    };
    let Some(elems) = strings(&arr.values) else {
        return Vector::wrapped_error(cx.types, "join: array of string arg required", list);
    };
    let outer = nulls_of(list);
    let mut out = BytesOut::with_capacity(list.len() as usize);
    let mut buf = String::new();
    for i in 0..list.len() {
        let row = rows.map_or(i, |r| r[i as usize]);
        if outer.value(i) || arr.nulls.value(row) {
            out.push_null();
            continue;
        }
        let sep = match &sep {
            Some((s, nulls)) if !nulls.value(i) => s.str(i as usize),
            _ => "",
        };
        buf.clear();
        let (start, end) = arr.range(row);
        for (k, e) in (start..end).enumerate() {
            if k > 0 {
                buf.push_str(sep);
            }
            buf.push_str(elems.str(e as usize));
        }
        out.push(buf.as_bytes());
    }
    out.strings()
}

/// 1-based byte position of the second argument in the first, `0` when absent.
fn position_fn(cx: &CallContext<'_>, args: &[Vector]) -> Vector {
    for a in args {
        if is_error(a) {
            return a.clone();
        }
        if strings(a).is_none() {
            return Vector::wrapped_error(cx.types, "position: string arguments required", a);
        }
    }
    let (Some(s), Some(sub)) = (strings(&args[0]), strings(&args[1])) else {
        return Vector::missing(cx.types, cx.len);
    };
    let nulls = BitVec::or(&nulls_of(&args[0]), &nulls_of(&args[1]));
    let values = (0..cx.len as usize)
        .map(|i| s.str(i).find(sub.str(i)).map_or(0, |k| k as i64 + 1))
        .collect();
    Vector::int(Type::Int64, values, nulls)
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{col, run};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use strata_vector::{TypeContext, Value};

    #[test]
    fn case_and_trim() {
        let ctx = Arc::new(TypeContext::new());
        let input = col(&ctx, "\" Ab \" null");
        assert_eq!(run(&ctx, "lower", &input, &[]), ["\" ab \"", "null"]);
        assert_eq!(run(&ctx, "upper", &input, &[]), ["\" AB \"", "null"]);
        assert_eq!(run(&ctx, "trim", &input, &[]), ["\"Ab\"", "null"]);
        let out = run(&ctx, "lower", &col(&ctx, "1"), &[]);
        assert!(out[0].contains("lower: string arg required"));
    }

    #[test]
    fn split_and_join() {
        let ctx = Arc::new(TypeContext::new());
        let out = run(&ctx, "split", &col(&ctx, "\"a,b\" \"c\""), &[Value::string(",")]);
        assert_eq!(out, ["[\"a\",\"b\"]", "[\"c\"]"]);
        let out = run(&ctx, "join", &col(&ctx, "[\"a\",\"b\"]"), &[Value::string("-")]);
        assert_eq!(out, ["\"a-b\""]);
        let out = run(&ctx, "join", &col(&ctx, "[1]"), &[]);
        assert!(out[0].contains("join: array of string arg required"));
    }

    #[test]
    fn replace_position_and_rune_len() {
        let ctx = Arc::new(TypeContext::new());
        let input = col(&ctx, "\"foo\" \"héé\"");
        let out = run(&ctx, "replace", &input, &[Value::string("o"), Value::string("0")]);
        assert_eq!(out, ["\"f00\"", "\"héé\""]);
        let null = Value::null(strata_vector::Type::String);
        let out = run(&ctx, "replace", &input, &[null, Value::string("0")]);
        assert!(out[0].contains("replace: an input arg is null"));
        assert_eq!(run(&ctx, "position", &input, &[Value::string("o")]), ["2", "0"]);
        assert_eq!(run(&ctx, "rune_len", &input, &[]), ["3", "3"]);
    }
}
