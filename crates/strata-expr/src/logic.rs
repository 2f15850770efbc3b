//! Three-valued boolean logic and bool masks.
//!
//! - `null AND false` is false, `null AND true` is null.
//! - `null OR true` is true, `null OR false` is null.
//! - An error operand is absorbed where the other side decides the result
//!   (`error AND false = false`, `error OR true = true`) and kept otherwise.

use crate::access::{flatten_bool, is_error};
use crate::{Evaluator, Expr};
use std::sync::Arc;
use strata_vector::{apply, combine, pick, reverse_pick, BitVec, Type, TypeContext, Value, Vector};

#[derive(Debug)]
pub struct Not {
    ctx: Arc<TypeContext>,
    expr: Expr,
}

impl Not {
    pub fn new(ctx: Arc<TypeContext>, expr: Expr) -> Self {
        Self { ctx, expr }
    }
}

impl Evaluator for Not {
    fn eval(&self, this: &Vector) -> Vector {
        eval_bool(&self.ctx, &[self.expr.eval(this)], |vecs| not(&vecs[0]))
    }
}

pub(crate) fn not(v: &Vector) -> Vector {
    match v {
        Vector::Error(_) => v.clone(),
        Vector::Const(c) => match c.value.as_bool() {
            Some(b) => Vector::constant(Value::bool(!b), c.len, c.nulls.clone()),
            None => v.clone(),
        },
        v => match flatten_bool(v) {
            Some((bits, nulls)) => Vector::bool(BitVec::not(&bits), nulls),
            None => v.clone(),
        },
    }
}

#[derive(Debug)]
pub struct And {
    ctx: Arc<TypeContext>,
    lhs: Expr,
    rhs: Expr,
}

impl And {
    pub fn new(ctx: Arc<TypeContext>, lhs: Expr, rhs: Expr) -> Self {
        Self { ctx, lhs, rhs }
    }
}

impl Evaluator for And {
    fn eval(&self, this: &Vector) -> Vector {
        let args = [self.lhs.eval(this), self.rhs.eval(this)];
        eval_bool(&self.ctx, &args, |vecs| and(&vecs[0], &vecs[1]))
    }
}

#[derive(Debug)]
pub struct Or {
    ctx: Arc<TypeContext>,
    lhs: Expr,
    rhs: Expr,
}

impl Or {
    pub fn new(ctx: Arc<TypeContext>, lhs: Expr, rhs: Expr) -> Self {
        Self { ctx, lhs, rhs }
    }
}

impl Evaluator for Or {
    fn eval(&self, this: &Vector) -> Vector {
        let args = [self.lhs.eval(this), self.rhs.eval(this)];
        eval_bool(&self.ctx, &args, |vecs| or(&vecs[0], &vecs[1]))
    }
}

/// Splits the operands with [`apply`], turning any non-bool, non-error piece into a
/// `not type bool` error before calling `f`.
fn eval_bool(ctx: &TypeContext, args: &[Vector], f: impl Fn(&[Vector]) -> Vector) -> Vector {
    apply(
        false,
        &mut |vecs: &[Vector]| {
            let checked: Vec<Vector> = vecs
                .iter()
                .map(|v| {
                    let u = v.under();
                    if matches!(u.ty().under(), Type::Bool) || is_error(u) {
                        u.clone()
                    } else {
                        Vector::wrapped_error(ctx, "not type bool", v)
                    }
                })
                .collect();
            f(&checked)
        },
        args,
    )
}

fn and(lhs: &Vector, rhs: &Vector) -> Vector {
    if lhs.is_empty() {
        return lhs.clone();
    }
    if is_error(lhs) {
        return absorb(lhs, rhs, false);
    }
    if is_error(rhs) {
        return absorb(rhs, lhs, false);
    }
    let (Some((lb, ln)), Some((rb, rn))) = (flatten_bool(lhs), flatten_bool(rhs)) else {
        return lhs.clone();
    };
    let bits = BitVec::and(&lb, &rb);
    if ln.is_zero() && rn.is_zero() {
        return Vector::bool(bits, BitVec::zero());
    }
    let not_false = BitVec::and(&BitVec::or(&lb, &ln), &BitVec::or(&rb, &rn));
    let nulls = BitVec::and(&not_false, &BitVec::or(&ln, &rn));
    Vector::bool(bits, nulls.compact())
}

fn or(lhs: &Vector, rhs: &Vector) -> Vector {
    if lhs.is_empty() {
        return lhs.clone();
    }
    if is_error(lhs) {
        return absorb(lhs, rhs, true);
    }
    if is_error(rhs) {
        return absorb(rhs, lhs, true);
    }
    let (Some((lb, ln)), Some((rb, rn))) = (flatten_bool(lhs), flatten_bool(rhs)) else {
        return lhs.clone();
    };
    let bits = BitVec::or(&lb, &rb);
    if ln.is_zero() && rn.is_zero() {
        return Vector::bool(bits, BitVec::zero());
    }
    let nulls = BitVec::and(&BitVec::not(&bits), &BitVec::or(&ln, &rn));
    Vector::bool(bits, nulls.compact())
}

/// Combines an error column with a bool column: slots where `vec` alone decides the outcome
/// (`decider`) keep `vec`; every other slot takes the error.
fn absorb(err: &Vector, vec: &Vector, decider: bool) -> Vector {
    if is_error(vec) {
        return err.clone();
    }
    let Some((bits, nulls)) = flatten_bool(vec) else {
        return err.clone();
    };
    let n = vec.len();
    let index: Vec<u32> = (0..n)
        .filter(|&i| nulls.value(i) || bits.get(i as usize) != decider)
        .collect();
    if index.is_empty() {
        return vec.clone();
    }
    combine(&reverse_pick(vec, &index), &index, &pick(err, &index))
}

/// Positions of a predicate column split into true slots and slots that are not bool at all
/// (errors and other types). False and null bool slots are in neither set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BoolMask {
    pub trues: BitVec,
    pub others: BitVec,
}

impl BoolMask {
    /// Slots that are neither true nor non-bool.
    pub fn falses(&self) -> Vec<u32> {
        let n = self.trues.len() as u32;
        (0..n)
            .filter(|&i| !self.trues.value(i) && !self.others.value(i))
            .collect()
    }
}

pub fn bool_mask(mask: &Vector) -> BoolMask {
    let n = mask.len() as usize;
    let mut out = BoolMask {
        trues: BitVec::with_len_all_false(n),
        others: BitVec::with_len_all_false(n),
    };
    match mask {
        Vector::Dynamic(d) => {
            let map = d.tag_map();
            for (child, parents) in d.values.iter().zip(&map.reverse) {
                mask_into(child, |k| parents[k] as usize, &mut out);
            }
        }
        v => mask_into(v, |k| k, &mut out),
    }
    out
}

fn mask_into(v: &Vector, slot: impl Fn(usize) -> usize, out: &mut BoolMask) {
    let n = v.len() as usize;
    let bools = if matches!(v.ty().under(), Type::Bool) {
        flatten_bool(v)
    } else {
        None
    };
    match bools {
        Some((bits, nulls)) => {
            for k in 0..n {
                if bits.get(k) && !nulls.value(k as u32) {
                    out.trues.set(slot(k), true);
                }
            }
        }
        None => {
            for k in 0..n {
                out.others.set(slot(k), true);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Literal, This};
    use pretty_assertions::assert_eq;
    use strata_vector::sup::parse_values;

    fn col(ctx: &TypeContext, text: &str) -> Vector {
        Vector::from_values(&parse_values(ctx, text).unwrap())
    }

    fn nullable(bits: &[Option<bool>]) -> Vector {
        Vector::bool(
            BitVec::from_bools(bits.iter().map(|b| b.unwrap_or(false))),
            BitVec::from_bools(bits.iter().map(Option::is_none)),
        )
    }

    fn show(v: &Vector) -> Vec<String> {
        v.values().iter().map(ToString::to_string).collect()
    }

    #[test]
    fn three_valued_truth_tables() {
        let l = nullable(&[None, None, None, Some(true), Some(false)]);
        let r = nullable(&[Some(false), Some(true), None, Some(true), Some(true)]);
        assert_eq!(show(&and(&l, &r)), ["false", "null", "null", "true", "false"]);
        assert_eq!(show(&or(&l, &r)), ["null", "true", "null", "true", "true"]);
    }

    #[test]
    fn errors_are_absorbed_by_the_deciding_side() {
        let ctx = Arc::new(TypeContext::new());
        let lhs: Expr = Arc::new(Literal::new(Value::error(&ctx, "boom")));
        let and = And::new(ctx.clone(), lhs.clone(), Arc::new(This));
        let out = and.eval(&col(&ctx, "false true"));
        assert_eq!(show(&out), ["false", "error(\"boom\")"]);
        let or = Or::new(ctx.clone(), lhs, Arc::new(This));
        let out = or.eval(&col(&ctx, "false true"));
        assert_eq!(show(&out), ["error(\"boom\")", "true"]);
    }

    #[test]
    fn constant_errors_pass_through_on_either_side() {
        let ctx = Arc::new(TypeContext::new());
        let boom: Expr = Arc::new(Literal::new(Value::error(&ctx, "boom")));
        let out = And::new(ctx.clone(), Arc::new(This), boom.clone()).eval(&col(&ctx, "false true"));
        assert_eq!(show(&out), ["false", "error(\"boom\")"]);
        let out = Or::new(ctx.clone(), Arc::new(This), boom.clone()).eval(&col(&ctx, "false true"));
        assert_eq!(show(&out), ["error(\"boom\")", "true"]);
        let out = And::new(ctx.clone(), boom.clone(), boom).eval(&col(&ctx, "true"));
        assert_eq!(show(&out), ["error(\"boom\")"]);
    }

    #[test]
    fn non_bool_operands_are_errors() {
        let ctx = Arc::new(TypeContext::new());
        let out = Not::new(ctx.clone(), Arc::new(This)).eval(&col(&ctx, "true 1"));
        assert_eq!(out.value_at(0), Value::bool(false));
        assert!(out.value_at(1).to_string().contains("not type bool"));
    }

    #[test]
    fn mask_separates_trues_and_non_bools() {
        let ctx = TypeContext::new();
        let m = bool_mask(&col(&ctx, "true false 1 true \"x\""));
        assert_eq!(m.trues.positions(), vec![0, 3]);
        assert_eq!(m.others.positions(), vec![2, 4]);
        assert_eq!(m.falses(), vec![1]);
    }
}
