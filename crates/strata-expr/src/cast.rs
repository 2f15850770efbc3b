//! Casts between primitive types and to named types.
//!
//! Columns are cast in their physical form: a const casts its single value, a dict casts only
//! its entries (slots referencing a failed entry are dropped from the rebuilt dict and turn
//! into errors), and a view casts the inner rows it selects. Numeric-to-numeric casts run over
//! the raw storage; everything else converts slot by slot through [`cast_value`].

use crate::access::is_error;
use crate::{Evaluator, Expr, ExprError, ExprResult};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use std::net::IpAddr;
use std::sync::Arc;
use strata_vector::format::format_duration;
use strata_vector::sup::{parse_duration, parse_type};
use strata_vector::types::{
    is_float, is_signed, is_unsigned, ID_DURATION, ID_FLOAT16, ID_FLOAT32, ID_INT16, ID_INT32,
    ID_INT8, ID_TIME, ID_UINT16, ID_UINT32, ID_UINT8,
};
use strata_vector::{
    apply, combine, nulls_of, pick, BitVec, Builder, Net, Type, TypeContext, Value, Vector,
};

/// `cast(expr, <type>)` or `cast(expr, "name")`.
#[derive(Debug)]
pub struct Cast {
    ctx: Arc<TypeContext>,
    expr: Expr,
    target: Target,
}

#[derive(Debug)]
enum Target {
    Primitive(Type),
    Named(String),
}

impl Cast {
    /// Builds a cast from a literal target: a type value (primitive only) or a string naming a
    /// named type.
    pub fn new(ctx: Arc<TypeContext>, expr: Expr, target: &Value) -> ExprResult<Self> {
        let target = match target.ty().under() {
            Type::TypeValue => {
                let ty = target.as_type(&ctx).ok_or_else(|| {
                    ExprError::Cast(format!("cast type argument is not a type: {target}"))
                })?;
                if !ty.is_primitive() {
                    return Err(ExprError::Cast(format!(
                        "cast: casting to type {ty} not currently supported in vector runtime"
                    )));
                }
                Target::Primitive(ty)
            }
            Type::String => {
                let name = target.as_str().unwrap_or_default().to_string();
                TypeContext::new().lookup_named(&name, &Type::Null)?;
                Target::Named(name)
            }
            _ => {
                return Err(ExprError::Cast(format!(
                    "cast type argument is not a type: {target}"
                )))
            }
        };
        Ok(Self { ctx, expr, target })
    }

    /// A cast to a primitive type.
    pub fn to_type(ctx: Arc<TypeContext>, expr: Expr, ty: &Type) -> ExprResult<Self> {
        Self::new(ctx, expr, &Value::type_value(ty))
    }

    fn eval_one(&self, vec: &Vector) -> Vector {
        match &self.target {
            Target::Primitive(ty) => cast_to(&self.ctx, vec, ty),
            Target::Named(name) => {
                let vec = vec.under();
                if is_error(vec) {
                    return vec.clone();
                }
                match self.ctx.lookup_named(name, &vec.ty()) {
                    Ok(named) => Vector::named(named, vec.clone()),
                    Err(err) => Vector::string_error(&self.ctx, &err.to_string(), vec.len()),
                }
            }
        }
    }
}

impl Evaluator for Cast {
    fn eval(&self, this: &Vector) -> Vector {
        let vec = self.expr.eval(this);
        apply(true, &mut |vecs: &[Vector]| self.eval_one(&vecs[0]), &[vec])
    }
}

/// Casts a homogeneous column to the primitive type `ty`.
///
/// Slots that cannot be converted become `cannot cast to <ty>` errors wrapping the original
/// value; error slots pass through unchanged.
pub fn cast_to(ctx: &TypeContext, vec: &Vector, ty: &Type) -> Vector {
    let vec = vec.under();
    if is_error(vec) {
        return vec.clone();
    }
    if vec.ty().under() == ty.under() && !matches!(vec, Vector::Const(_)) {
        return vec.clone();
    }
    let (out, errs) = match vec {
        Vector::Const(c) => return cast_const(ctx, &c.value, c.len, &c.nulls, ty),
        Vector::View(view) => cast_rows(ctx, &view.inner, Some(&view.index), ty),
        Vector::Dict(d) => {
            let (out, errs) = cast_rows(ctx, &d.inner, None, ty);
            if errs.is_empty() {
                (Vector::dict(out, d.index.clone(), d.counts.clone(), d.nulls.clone()), errs)
            } else {
                let (index, counts, nulls, dropped) = d.rebuild_drop_tags(&errs);
                (Vector::dict(out, index, counts, nulls), dropped)
            }
        }
        vec => cast_rows(ctx, vec, None, ty),
    };
    if errs.is_empty() {
        return out;
    }
    combine(&out, &errs, &cast_failed(ctx, &pick(vec, &errs), ty))
}

fn cast_failed(ctx: &TypeContext, on: &Vector, ty: &Type) -> Vector {
    Vector::wrapped_error(ctx, &format!("cannot cast to {ty}"), on)
}

fn cast_const(ctx: &TypeContext, value: &Value, len: u32, nulls: &BitVec, ty: &Type) -> Vector {
    if value.is_null() {
        return Vector::constant(Value::null(ty.clone()), len, BitVec::zero());
    }
    if let Some(out) = cast_value(ctx, value, ty) {
        return Vector::constant(out, len, nulls.clone());
    }
    if nulls.is_zero() {
        let on = Vector::constant(value.clone(), len, BitVec::zero());
        return cast_failed(ctx, &on, ty);
    }
    // Null slots of a failing const stay typed nulls.
    let null_count = nulls.true_count();
    let tags: Vec<u32> = (0..len).map(|i| u32::from(nulls.value(i))).collect();
    let on = Vector::constant(value.clone(), len - null_count, BitVec::zero());
    let null = Vector::constant(Value::null(ty.clone()), null_count, BitVec::zero());
    Vector::dynamic(tags, vec![cast_failed(ctx, &on, ty), null])
}

/// Casts the rows of a flat column (optionally through `index`), returning the converted rows
/// and the ascending positions that failed (omitted from the output).
fn cast_rows(
    ctx: &TypeContext,
    src: &Vector,
    index: Option<&[u32]>,
    ty: &Type,
) -> (Vector, Vec<u32>) {
    let n = index.map_or(src.len(), |ix| ix.len() as u32);
    let at = |i: u32| index.map_or(i, |ix| ix[i as usize]);
    if let Some(out) = cast_numbers(src, index, ty) {
        return out;
    }
    let mut builder = Builder::new(ty);
    let mut errs = Vec::new();
    for i in 0..n {
        let value = src.value_at(at(i));
        if value.is_null() {
            builder.write(None);
            continue;
        }
        match cast_value(ctx, &value, ty) {
            Some(out) => builder.write(out.bytes()),
            None => errs.push(i),
        }
    }
    (builder.build(), errs)
}

#[derive(Clone, Copy)]
enum Num {
    I(i64),
    U(u64),
    F(f64),
}

fn cast_numbers(src: &Vector, index: Option<&[u32]>, ty: &Type) -> Option<(Vector, Vec<u32>)> {
    let id = ty.under().id();
    if !(is_signed(id) || is_unsigned(id) || is_float(id)) {
        return None;
    }
    let read: Box<dyn Fn(u32) -> Num + '_> = match src.under() {
        Vector::Int(x) => Box::new(move |k| Num::I(x.values[k as usize])),
        Vector::Uint(x) => Box::new(move |k| Num::U(x.values[k as usize])),
        Vector::Enum(x) => Box::new(move |k| Num::U(x.values[k as usize])),
        Vector::Float(x) => Box::new(move |k| Num::F(x.values[k as usize])),
        _ => return None,
    };
    let n = index.map_or(src.len(), |ix| ix.len() as u32);
    let at = |i: u32| index.map_or(i, |ix| ix[i as usize]);
    let mut nulls = nulls_of(src);
    if let Some(ix) = index {
        nulls = nulls.pick(ix);
    }
    let mut errs = Vec::new();
    let ty = ty.clone();
    let out = if is_float(id) {
        let mut vals = Vec::with_capacity(n as usize);
        for i in 0..n {
            match to_float(read(at(i)), id) {
                Some(v) => vals.push(v),
                None => errs.push(i),
            }
        }
        Vector::float(ty, vals, survivors(nulls, &errs, n))
    } else if is_unsigned(id) {
        let mut vals = Vec::with_capacity(n as usize);
        for i in 0..n {
            match to_uint(read(at(i)), id) {
                Some(v) => vals.push(v),
                None => errs.push(i),
            }
        }
        Vector::uint(ty, vals, survivors(nulls, &errs, n))
    } else {
        let mut vals = Vec::with_capacity(n as usize);
        for i in 0..n {
            match to_int(read(at(i)), id) {
                Some(v) => vals.push(v),
                None => errs.push(i),
            }
        }
        Vector::int(ty, vals, survivors(nulls, &errs, n))
    };
    Some((out, errs))
}

fn survivors(nulls: BitVec, errs: &[u32], n: u32) -> BitVec {
    if nulls.is_zero() || errs.is_empty() {
        return nulls;
    }
    let keep = strata_vector::reverse_index(errs, n);
    nulls.pick(&keep).compact()
}

fn signed_range(id: u32) -> (i64, i64) {
    match id {
        ID_INT8 => (i64::from(i8::MIN), i64::from(i8::MAX)),
        ID_INT16 => (i64::from(i16::MIN), i64::from(i16::MAX)),
        ID_INT32 => (i64::from(i32::MIN), i64::from(i32::MAX)),
        _ => (i64::MIN, i64::MAX),
    }
}

fn unsigned_max(id: u32) -> u64 {
    match id {
        ID_UINT8 => u64::from(u8::MAX),
        ID_UINT16 => u64::from(u16::MAX),
        ID_UINT32 => u64::from(u32::MAX),
        _ => u64::MAX,
    }
}

fn to_int(v: Num, id: u32) -> Option<i64> {
    let (min, max) = signed_range(id);
    match v {
        Num::I(i) => (min..=max).contains(&i).then_some(i),
        Num::U(u) => i64::try_from(u).ok().filter(|&i| i <= max),
        Num::F(f) => (f.is_finite() && f >= min as f64 && f < max as f64 + 1.0).then(|| f as i64),
    }
}

fn to_uint(v: Num, id: u32) -> Option<u64> {
    let max = unsigned_max(id);
    match v {
        Num::I(i) => u64::try_from(i).ok().filter(|&u| u <= max),
        Num::U(u) => (u <= max).then_some(u),
        Num::F(f) => (f.is_finite() && f >= 0.0 && f < max as f64 + 1.0).then(|| f as u64),
    }
}

fn to_float(v: Num, id: u32) -> Option<f64> {
    let f = match v {
        Num::I(i) => i as f64,
        Num::U(u) => u as f64,
        Num::F(f) => f,
    };
    let limit = match id {
        ID_FLOAT16 => 65504.0,
        ID_FLOAT32 => f64::from(f32::MAX),
        _ => f64::MAX,
    };
    (!f.is_finite() || f.abs() <= limit).then_some(f)
}

fn num_of(v: &Value) -> Option<Num> {
    if let Some(i) = v.as_int() {
        return Some(Num::I(i));
    }
    if let Some(u) = v.as_uint() {
        return Some(Num::U(u));
    }
    v.as_float().map(Num::F)
}

/// Casts one non-null value to the primitive type `ty`; `None` when the value does not convert.
pub(crate) fn cast_value(ctx: &TypeContext, v: &Value, ty: &Type) -> Option<Value> {
    if v.is_null() {
        return Some(Value::null(ty.clone()));
    }
    let target = ty.under();
    let id = target.id();
    if is_signed(id) || is_unsigned(id) || is_float(id) {
        let num = match num_of(v) {
            Some(num) => num,
            None => parse_number(v.as_str()?.trim(), id)?,
        };
        return if is_float(id) {
            to_float(num, id).map(|f| Value::float(target.clone(), f))
        } else if is_unsigned(id) {
            to_uint(num, id).map(|u| Value::uint(target.clone(), u))
        } else {
            to_int(num, id).map(|i| Value::int(target.clone(), i))
        };
    }
    match target {
        Type::Bool => {
            if let Some(b) = v.as_bool() {
                return Some(Value::bool(b));
            }
            if let Some(f) = v.as_number() {
                return Some(Value::bool(f != 0.0));
            }
            parse_bool(v.as_str()?.trim()).map(Value::bool)
        }
        Type::String => format_as_string(ctx, v).map(|s| Value::string(&s)),
        Type::Bytes => v.bytes().map(Value::bytes_value),
        Type::Ip => match v.ty().under() {
            Type::Ip => Some(v.clone()),
            _ => v.as_str()?.trim().parse::<IpAddr>().ok().map(Value::ip),
        },
        Type::Net => match v.ty().under() {
            Type::Net => Some(v.clone()),
            _ => v.as_str()?.trim().parse::<Net>().ok().map(Value::net),
        },
        Type::TypeValue => match v.ty().under() {
            Type::TypeValue => Some(v.clone()),
            _ => parse_type(ctx, v.as_str()?.trim())
                .ok()
                .map(|ty| Value::type_value(&ty)),
        },
        _ => None,
    }
}

fn parse_number(s: &str, id: u32) -> Option<Num> {
    match id {
        ID_DURATION => parse_duration(s)
            .map(Num::I)
            .or_else(|| s.parse::<f64>().ok().map(Num::F)),
        ID_TIME => parse_time(s)
            .map(Num::I)
            .or_else(|| s.parse::<f64>().ok().map(Num::F)),
        id if is_float(id) => s.parse::<f64>().ok().map(Num::F),
        id if is_unsigned(id) => s.parse::<u64>().ok().map(Num::U),
        _ => s.parse::<i64>().ok().map(Num::I),
    }
}

/// Parses RFC 3339 timestamps, `YYYY-MM-DD HH:MM:SS` and bare dates into nanoseconds.
pub(crate) fn parse_time(s: &str) -> Option<i64> {
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return t.timestamp_nanos_opt();
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(t) = NaiveDateTime::parse_from_str(s, fmt) {
            return t.and_utc().timestamp_nanos_opt();
        }
    }
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()?;
    date.and_hms_opt(0, 0, 0)?.and_utc().timestamp_nanos_opt()
}

fn parse_bool(s: &str) -> Option<bool> {
    match s {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

/// Text of a value as produced by a string cast: strings and bytes are taken raw, enums
/// give their symbol, type values their type syntax, everything else the value text format.
pub(crate) fn format_as_string(ctx: &TypeContext, v: &Value) -> Option<String> {
    match v.ty().under() {
        Type::String => v.as_str().map(str::to_string),
        Type::Bytes => v.bytes().and_then(|b| String::from_utf8(b.to_vec()).ok()),
        Type::Enum(e) => {
            let k = v.as_uint()?;
            e.symbols().get(k as usize).cloned()
        }
        Type::TypeValue => v.as_type(ctx).map(|ty| ty.to_string()),
        Type::Duration => {
            let mut out = String::new();
            format_duration(v.as_int()?, &mut out);
            Some(out)
        }
        _ => Some(v.to_string()),
    }
}
