//! Aggregate functions.
//!
//! An [`AggFunc`] accumulates columns batch by batch and produces one value. Functions that
//! can be split across workers also exchange *partials*: `result_as_partial` on one worker
//! feeds `consume_as_partial` on another, and the merged `result` is the same as if every
//! batch had gone through a single accumulator.
//!
//! Accumulators only ever see homogeneous columns; [`consume`] and [`consume_partial`] split
//! dynamics before calling in.

mod count;
mod distinct;
mod fuse;
mod hll;
mod list;
mod logical;
mod math;

use crate::{ExprError, ExprResult};
use std::fmt;
use strata_vector::encoding::{append_container, append_uvarint};
use strata_vector::{deunion, Type, TypeContext, Value, Vector};

pub use distinct::Distinct;

/// An aggregate accumulator.
pub trait AggFunc: Send + fmt::Debug {
    /// Adds the non-null values of a homogeneous column.
    fn consume(&mut self, v: &Vector);

    /// Merges partial results produced by [`AggFunc::result_as_partial`].
    fn consume_as_partial(&mut self, partial: &Vector) -> ExprResult<()>;

    fn result(&mut self, ctx: &TypeContext) -> Value;

    fn result_as_partial(&mut self, ctx: &TypeContext) -> Value;
}

/// Creates a fresh accumulator.
pub type Pattern = fn() -> Box<dyn AggFunc>;

fn count() -> Box<dyn AggFunc> {
    Box::<count::Count>::default()
}
fn any() -> Box<dyn AggFunc> {
    Box::<logical::AnyValue>::default()
}
fn avg() -> Box<dyn AggFunc> {
    Box::<math::Avg>::default()
}
fn sum() -> Box<dyn AggFunc> {
    Box::new(math::MathReducer::new(math::MathOp::Sum))
}
fn min() -> Box<dyn AggFunc> {
    Box::new(math::MathReducer::new(math::MathOp::Min))
}
fn max() -> Box<dyn AggFunc> {
    Box::new(math::MathReducer::new(math::MathOp::Max))
}
fn dcount() -> Box<dyn AggFunc> {
    Box::<hll::DCount>::default()
}
fn collect() -> Box<dyn AggFunc> {
    Box::new(list::Collect::new(false))
}
fn union() -> Box<dyn AggFunc> {
    Box::new(list::Collect::new(true))
}
fn fuse() -> Box<dyn AggFunc> {
    Box::<fuse::Fuse>::default()
}
fn and() -> Box<dyn AggFunc> {
    Box::new(logical::Logical::and())
}
fn or() -> Box<dyn AggFunc> {
    Box::new(logical::Logical::or())
}

/// Looks up the accumulator factory for `op`. Only `count` may be called without an argument.
pub fn new_pattern(op: &str, has_arg: bool) -> ExprResult<Pattern> {
    let pattern: Pattern = match op {
        "count" => return Ok(count as Pattern),
        "any" => any,
        "avg" => avg,
        "sum" => sum,
        "min" => min,
        "max" => max,
        "dcount" => dcount,
        "collect" => collect,
        "union" => union,
        "fuse" => fuse,
        "and" => and,
        "or" => or,
        _ => return Err(ExprError::UnknownAggregate(op.to_string())),
    };
    if !has_arg {
        return Err(ExprError::ArgumentRequired(op.to_string()));
    }
    Ok(pattern)
}

/// Feeds `v` to `f` one homogeneous piece at a time.
pub fn consume(f: &mut dyn AggFunc, v: &Vector) {
    match v {
        Vector::Dynamic(d) => d.values.iter().for_each(|child| consume(f, child)),
        Vector::Union(_) => consume(f, &deunion(v)),
        v => f.consume(v),
    }
}

/// Feeds partials to `f` one homogeneous piece at a time.
pub fn consume_partial(f: &mut dyn AggFunc, partial: &Vector) -> ExprResult<()> {
    match partial {
        Vector::Dynamic(d) => d.values.iter().try_for_each(|child| consume_partial(f, child)),
        v => f.consume_as_partial(v),
    }
}

pub(crate) fn invalid_partial(name: &str) -> ExprError {
    ExprError::InvalidPartial(name.to_string())
}

/// Builds an array or set value over `values`, typed by their common type or a union of the
/// types present. Empty input gives a null of the array or set of null.
pub(crate) fn list_value(ctx: &TypeContext, values: &[Value], set: bool) -> Value {
    let mut types: Vec<Type> = Vec::new();
    for v in values {
        if !types.contains(v.ty()) {
            types.push(v.ty().clone());
        }
    }
    let elem = match types.as_slice() {
        [] => Type::Null,
        [ty] => ty.clone(),
        _ => ctx.lookup_union(&types),
    };
    let ty = if set {
        ctx.lookup_set(&elem)
    } else {
        ctx.lookup_array(&elem)
    };
    if values.is_empty() {
        return Value::null(ty);
    }
    let mut body = Vec::new();
    for v in values {
        match &elem {
            Type::Union(u) => {
                let mut member = Vec::new();
                append_uvarint(&mut member, u.tag_of(v.ty()).unwrap_or_default() as u64);
                append_container(&mut member, v.bytes());
                append_container(&mut body, Some(&member));
            }
            _ => append_container(&mut body, v.bytes()),
        }
    }
    Value::new(ty, Some(body))
}


#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn patterns_check_names_and_arguments() {
        assert!(new_pattern("count", false).is_ok());
        assert!(new_pattern("sum", true).is_ok());
        assert_eq!(
            new_pattern("sum", false).unwrap_err(),
            ExprError::ArgumentRequired("sum".into())
        );
        assert_eq!(
            new_pattern("median", true).unwrap_err(),
            ExprError::UnknownAggregate("median".into())
        );
    }

    #[test]
    fn list_values_union_mixed_types() {
        let ctx = TypeContext::new();
        let v = list_value(&ctx, &[Value::int64(1), Value::string("a")], false);
        let elems: Vec<String> = v.elements().iter().map(ToString::to_string).collect();
        assert_eq!(elems, ["1", "\"a\""]);
        assert!(list_value(&ctx, &[], true).is_null());
    }
}
