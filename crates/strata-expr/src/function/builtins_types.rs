use super::{strings, with_errors, BytesOut, CallContext, FunctionSpec, VAR_ARGS};
use crate::access::{byte_slots, flatten_bool, is_error, list_parts, map_parts};
use crate::compare::{compare, CompareOp};
use std::net::IpAddr;
use strata_vector::vector::BytesTable;
use strata_vector::{
    copy_and_set_nulls, deunion, nulls_of, pick, BitVec, Kind, Type, TypeContext, Value, Vector,
};

inventory::submit! {
    FunctionSpec { name: "typeof", min_args: 1, max_args: 1, rip_unions: false, implementation: typeof_fn }
}

inventory::submit! {
    FunctionSpec { name: "typename", min_args: 1, max_args: 1, rip_unions: true, implementation: typename_fn }
}

inventory::submit! {
    FunctionSpec { name: "nameof", min_args: 1, max_args: 1, rip_unions: true, implementation: nameof_fn }
}

inventory::submit! {
    FunctionSpec { name: "kind", min_args: 1, max_args: 1, rip_unions: false, implementation: kind_fn }
}

inventory::submit! {
    FunctionSpec { name: "under", min_args: 1, max_args: 1, rip_unions: false, implementation: under_fn }
}

inventory::submit! {
    FunctionSpec { name: "len", min_args: 1, max_args: 1, rip_unions: true, implementation: len_fn }
}

inventory::submit! {
    FunctionSpec { name: "length", min_args: 1, max_args: 1, rip_unions: true, implementation: len_fn }
}

inventory::submit! {
    FunctionSpec { name: "fields", min_args: 1, max_args: 1, rip_unions: true, implementation: fields_fn }
}

inventory::submit! {
    FunctionSpec { name: "coalesce", min_args: 1, max_args: VAR_ARGS, rip_unions: false, implementation: coalesce_fn }
}

inventory::submit! {
    FunctionSpec { name: "nullif", min_args: 2, max_args: 2, rip_unions: true, implementation: nullif_fn }
}

/// Decodes each row of a type-value column; null rows and undecodable values are `None`.
fn types_of(ctx: &TypeContext, v: &Vector) -> Vec<Option<Type>> {
    let nulls = nulls_of(v);
    let Some(slots) = byte_slots(v) else {
        return vec![None; v.len() as usize];
    };
    (0..v.len())
        .map(|i| {
            if nulls.value(i) {
                return None;
            }
            ctx.lookup_by_value(slots.get(i as usize)).ok()
        })
        .collect()
}

fn is_type_value(v: &Vector) -> bool {
    matches!(v.ty().under(), Type::TypeValue)
}

fn typeof_fn(cx: &CallContext<'_>, args: &[Vector]) -> Vector {
    Vector::constant(Value::type_value(&args[0].ty()), cx.len, BitVec::zero())
}

/// Looks up a type by name; unknown names are missing.
fn typename_fn(cx: &CallContext<'_>, args: &[Vector]) -> Vector {
    let v = &args[0];
    let Some(names) = strings(v) else {
        return Vector::wrapped_error(cx.types, "typename: argument must be a string", v);
    };
    let nulls = nulls_of(v);
    let mut out = BytesOut::with_capacity(v.len() as usize);
    let mut errs = Vec::new();
    for i in 0..v.len() {
        if nulls.value(i) {
            out.push_null();
            continue;
        }
        match cx.types.lookup_by_name(names.str(i as usize)) {
            Some(ty) => out.push(&ty.encoded()),
            None => errs.push(i),
        }
    }
    with_errors(out.type_values(), &errs, |n| Vector::missing(cx.types, n))
}

fn nameof_fn(cx: &CallContext<'_>, args: &[Vector]) -> Vector {
    let v = &args[0];
    if let Type::Named(named) = v.ty() {
        return Vector::constant(Value::string(named.name()), cx.len, BitVec::zero());
    }
    if !is_type_value(v) {
        return Vector::missing(cx.types, cx.len);
    }
    let nulls = nulls_of(v);
    let mut out = BytesOut::with_capacity(v.len() as usize);
    let mut errs = Vec::new();
    for (i, ty) in types_of(cx.types, v).into_iter().enumerate() {
        match ty {
            _ if nulls.value(i as u32) => out.push_null(),
            Some(Type::Named(named)) => out.push(named.name().as_bytes()),
            _ => errs.push(i as u32),
        }
    }
    with_errors(out.strings(), &errs, |n| Vector::missing(cx.types, n))
}

fn kind_fn(cx: &CallContext<'_>, args: &[Vector]) -> Vector {
    let v = &args[0];
    if !is_type_value(v) {
        let kind = v.ty().kind().as_str();
        return Vector::constant(Value::string(kind), cx.len, BitVec::zero());
    }
    let mut out = BytesOut::with_capacity(v.len() as usize);
    for ty in types_of(cx.types, v) {
        out.push(ty.map_or("", |t| t.kind().as_str()).as_bytes());
    }
    out.strings()
}

/// Strips one layer of naming, error wrapping or union.
fn under_fn(cx: &CallContext<'_>, args: &[Vector]) -> Vector {
    let v = &args[0];
    let (inner, index) = match v {
        Vector::View(view) => (&view.inner, Some(&view.index)),
        v => (v, None),
    };
    let out = match inner {
        Vector::Named(named) => named.inner.clone(),
        Vector::Error(err) => err.inner.clone(),
        Vector::Union(_) => deunion(inner),
        Vector::TypeValue(_) => {
            let nulls = nulls_of(inner);
            let mut table = BytesTable::with_capacity(inner.len() as usize);
            for ty in types_of(cx.types, inner) {
                match ty {
                    Some(ty) => table.push(&ty.under().encoded()),
                    None => table.push(&[]),
                }
            }
            Vector::type_values(table, nulls)
        }
        _ => return v.clone(),
    };
    match index {
        Some(index) => pick(&out, index),
        None => out,
    }
}

/// Number of fields, members or symbols in a type.
fn type_length(ty: &Type) -> i64 {
    match ty.under() {
        Type::Record(r) => r.fields().len() as i64,
        Type::Union(u) => u.types().len() as i64,
        Type::Array(a) | Type::Set(a) => type_length(a.elem()),
        Type::Enum(e) => e.symbols().len() as i64,
        Type::Map(m) => type_length(m.val()),
        Type::Error(e) => type_length(e.inner()),
        _ => 1,
    }
}

fn len_fn(cx: &CallContext<'_>, args: &[Vector]) -> Vector {
    let v = &args[0];
    let n = v.len();
    let ty = v.ty();
    let counts: Vec<i64> = match ty.kind() {
        Kind::Error => return Vector::wrapped_error(cx.types, "len()", v),
        Kind::Record => {
            let len = ty.as_record().map_or(0, |r| r.fields().len() as i64);
            return Vector::constant(Value::int64(len), n, BitVec::zero());
        }
        Kind::Array | Kind::Set => match list_parts(v) {
            Some((list, rows)) => (0..n)
                .map(|i| {
                    let (start, end) = list.range(rows.map_or(i, |r| r[i as usize]));
                    i64::from(end - start)
                })
                .collect(),
            None => vec![0; n as usize],
        },
        Kind::Map => match map_parts(v) {
            Some((map, rows)) => (0..n)
                .map(|i| {
                    let (start, end) = map.range(rows.map_or(i, |r| r[i as usize]));
                    i64::from(end - start)
                })
                .collect(),
            None => vec![0; n as usize],
        },
        _ => match ty.under() {
            Type::Null => return Vector::constant(Value::int64(0), n, BitVec::zero()),
            Type::String | Type::Bytes => match byte_slots(v) {
                Some(b) => (0..n as usize).map(|i| b.get(i).len() as i64).collect(),
                None => vec![0; n as usize],
            },
            Type::Ip | Type::Net => (0..n)
                .map(|i| {
                    let value = v.value_at(i);
                    match (value.as_ip(), value.as_net()) {
                        (Some(IpAddr::V4(_)), _) => 4,
                        (Some(IpAddr::V6(_)), _) => 16,
                        (_, Some(net)) if net.addr().is_ipv4() => 8,
                        (_, Some(_)) => 32,
                        _ => 0,
                    }
                })
                .collect(),
            Type::TypeValue => types_of(cx.types, v)
                .iter()
                .map(|t| t.as_ref().map_or(0, type_length))
                .collect(),
            _ => return Vector::wrapped_error(cx.types, "len: bad type", v),
        },
    };
    Vector::int(Type::Int64, counts, BitVec::zero())
}

/// Leaf field paths of a record type, depth first.
fn field_paths(ty: &Type, prefix: &mut Vec<String>, out: &mut Vec<Vec<String>>) {
    let Some(rec) = ty.under().as_record() else {
        return;
    };
    for f in rec.fields() {
        prefix.push(f.name.clone());
        if f.ty.under().as_record().is_some() {
            field_paths(&f.ty, prefix, out);
        } else {
            out.push(prefix.clone());
        }
        prefix.pop();
    }
}

/// The leaf paths of a record (or record type value) as an array of string arrays.
fn fields_fn(cx: &CallContext<'_>, args: &[Vector]) -> Vector {
    let v = &args[0];
    let row_types: Vec<Option<Type>> = match v.ty().kind() {
        Kind::Record => vec![Some(v.ty()); v.len() as usize],
        _ if is_type_value(v) => types_of(cx.types, v)
            .into_iter()
            .map(|t| t.filter(|t| t.under().as_record().is_some()))
            .collect(),
        _ => return Vector::missing(cx.types, v.len()),
    };
    let mut names = BytesOut::with_capacity(v.len() as usize);
    let (mut inner_offs, mut outer_offs) = (vec![0u32], vec![0u32]);
    let mut errs = Vec::new();
    for (i, ty) in row_types.iter().enumerate() {
        let Some(ty) = ty else {
            errs.push(i as u32);
            continue;
        };
        let mut paths = Vec::new();
        field_paths(ty, &mut Vec::new(), &mut paths);
        for path in &paths {
            for name in path {
                names.push(name.as_bytes());
            }
            let last = inner_offs[inner_offs.len() - 1];
            inner_offs.push(last + path.len() as u32);
        }
        let last = outer_offs[outer_offs.len() - 1];
        outer_offs.push(last + paths.len() as u32);
    }
    let inner_ty = cx.types.lookup_array(&Type::String);
    let outer_ty = cx.types.lookup_array(&inner_ty);
    let inner = Vector::array(inner_ty, inner_offs, names.strings(), BitVec::zero());
    let out = Vector::array(outer_ty, outer_offs, inner, BitVec::zero());
    with_errors(out, &errs, |n| Vector::missing(cx.types, n))
}

/// The first argument that is neither null nor an error, per row.
fn coalesce_fn(_cx: &CallContext<'_>, args: &[Vector]) -> Vector {
    let n = args[0].len() as usize;
    let mut tags = vec![0u32; n];
    let mut set = vec![false; n];
    let mut picks: Vec<Vec<u32>> = Vec::new();
    let mut remaining = n;
    for (tag, arg) in args.iter().enumerate() {
        if remaining == 0 {
            break;
        }
        let mut index = Vec::new();
        let usable = !is_error(arg) && !matches!(arg.under(), Vector::Const(c) if c.value.is_null());
        if usable {
            let nulls = nulls_of(arg);
            for slot in 0..n {
                if !set[slot] && !nulls.value(slot as u32) {
                    set[slot] = true;
                    tags[slot] = tag as u32;
                    index.push(slot as u32);
                    remaining -= 1;
                }
            }
        }
        picks.push(index);
    }
    let mut values: Vec<Vector> =
        picks.iter().zip(args).map(|(index, arg)| pick(arg, index)).collect();
    if remaining > 0 {
        let null_tag = values.len() as u32;
        for slot in (0..n).filter(|&s| !set[s]) {
            tags[slot] = null_tag;
        }
        values.push(Vector::const_null(remaining as u32));
    }
    Vector::dynamic(tags, values)
}

/// Null where the two arguments are equal, else the first argument.
fn nullif_fn(cx: &CallContext<'_>, args: &[Vector]) -> Vector {
    let (a, b) = (&args[0], &args[1]);
    if is_error(a) {
        return a.clone();
    }
    if is_error(b) {
        return b.clone();
    }
    let eq = compare(cx.types, CompareOp::Eq, a, b);
    let Some((bits, _)) = flatten_bool(&eq) else {
        return a.clone();
    };
    let nulls = BitVec::or(&nulls_of(a), &bits);
    copy_and_set_nulls(a, &nulls)
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{col, run, show};
    use crate::{dotted_path, Evaluator};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use strata_vector::{TypeContext, Value, Vector};

    #[test]
    fn type_introspection() {
        let ctx = Arc::new(TypeContext::new());
        let input = col(&ctx, "{a:1} \"s\"");
        assert_eq!(run(&ctx, "typeof", &input, &[]), ["<{a:int64}>", "<string>"]);
        assert_eq!(run(&ctx, "kind", &input, &[]), ["\"record\"", "\"primitive\""]);
        let names = col(&ctx, "\"int64\" \"nope\"");
        let out = run(&ctx, "typename", &names, &[]);
        assert_eq!(out, ["<int64>", "error(\"missing\")"]);
    }

    #[test]
    fn lengths_by_kind() {
        let ctx = Arc::new(TypeContext::new());
        let input = col(&ctx, "[1,2,3] \"héllo\" {a:1,b:2} null");
        assert_eq!(run(&ctx, "len", &input, &[]), ["3", "6", "2", "0"]);
        let out = run(&ctx, "len", &Vector::missing(&ctx, 1), &[]);
        assert!(out[0].contains("len()"));
    }

    #[test]
    fn fields_lists_leaf_paths() {
        let ctx = Arc::new(TypeContext::new());
        let input = col(&ctx, "{a:1,b:{c:2,d:3}}");
        assert_eq!(run(&ctx, "fields", &input, &[]), ["[[\"a\"],[\"b\",\"c\"],[\"b\",\"d\"]]"]);
    }

    #[test]
    fn coalesce_skips_nulls_and_errors() {
        let ctx = Arc::new(TypeContext::new());
        let input = col(&ctx, "{a:null,b:2} {a:1,b:3} {c:4}");
        let args = vec![dotted_path(&ctx, &["a"]), dotted_path(&ctx, &["b"])];
        let call = super::super::call(ctx.clone(), "coalesce", args).unwrap();
        assert_eq!(show(&call.eval(&input)), ["2", "1", "null"]);
    }

    #[test]
    fn nullif_nulls_equal_rows() {
        let ctx = Arc::new(TypeContext::new());
        let out = run(&ctx, "nullif", &col(&ctx, "1 2 3"), &[Value::int64(2)]);
        assert_eq!(out, ["1", "null", "3"]);
    }
}
