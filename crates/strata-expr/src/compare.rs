//! Comparison operators and the null test.

use crate::access::{bools_from, byte_slots, flatten_bool, floats, ints, is_error, normalize, uints};
use crate::coerce::{coerce_vals, numeric_id};
use crate::{Evaluator, Expr};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;
use strata_vector::types::is_float;
use strata_vector::{apply, nulls_of, BitVec, Type, TypeContext, Value, Vector};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    pub fn parse(op: &str) -> Option<Self> {
        Some(match op {
            "==" => CompareOp::Eq,
            "!=" => CompareOp::Ne,
            "<" => CompareOp::Lt,
            "<=" => CompareOp::Le,
            ">" => CompareOp::Gt,
            ">=" => CompareOp::Ge,
            _ => return None,
        })
    }

    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }

    /// Whether an ordering satisfies the operator. `None` (unordered floats) only satisfies `!=`.
    pub fn holds(self, ord: Option<Ordering>) -> bool {
        match ord {
            None => self == CompareOp::Ne,
            Some(ord) => match self {
                CompareOp::Eq => ord == Ordering::Equal,
                CompareOp::Ne => ord != Ordering::Equal,
                CompareOp::Lt => ord == Ordering::Less,
                CompareOp::Le => ord != Ordering::Greater,
                CompareOp::Gt => ord == Ordering::Greater,
                CompareOp::Ge => ord != Ordering::Less,
            },
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Debug)]
pub struct CompareExpr {
    ctx: Arc<TypeContext>,
    op: CompareOp,
    lhs: Expr,
    rhs: Expr,
}

impl CompareExpr {
    pub fn new(ctx: Arc<TypeContext>, op: CompareOp, lhs: Expr, rhs: Expr) -> Self {
        Self { ctx, op, lhs, rhs }
    }
}

impl Evaluator for CompareExpr {
    fn eval(&self, this: &Vector) -> Vector {
        let args = [self.lhs.eval(this), self.rhs.eval(this)];
        apply(true, &mut |vecs: &[Vector]| compare(&self.ctx, self.op, &vecs[0], &vecs[1]), &args)
    }
}

/// Compares two homogeneous columns.
///
/// Null slots compare false (and stay null). Incompatible types yield constant `false`.
pub fn compare(ctx: &TypeContext, op: CompareOp, lhs: &Vector, rhs: &Vector) -> Vector {
    if is_error(lhs) {
        return lhs.clone();
    }
    if is_error(rhs) {
        return rhs.clone();
    }
    let n = lhs.len();
    let nulls = BitVec::or(&nulls_of(lhs), &nulls_of(rhs));
    let (l, r) = (normalize(lhs), normalize(rhs));
    let (lty, rty) = (l.ty().under().clone(), r.ty().under().clone());
    if lty.is_null() || rty.is_null() {
        return Vector::constant(Value::bool(false), n, nulls);
    }
    if let (Some(a), Some(b)) = (numeric_id(&lty), numeric_id(&rty)) {
        return compare_numbers(op, &l, &r, is_float(a) || is_float(b), nulls);
    }
    let (l, r) = match coerce_vals(ctx, &l, &r) {
        Ok(pair) => pair,
        Err(_) => return Vector::constant(Value::bool(false), n, nulls),
    };
    let ty = l.ty().under().clone();
    match ty {
        Type::String | Type::Bytes => {
            let (Some(a), Some(b)) = (byte_slots(&l), byte_slots(&r)) else {
                return Vector::constant(Value::bool(false), n, nulls);
            };
            bools_from(n, nulls, |i| op.holds(Some(a.get(i).cmp(b.get(i)))))
        }
        Type::Bool => {
            let (Some((a, _)), Some((b, _))) = (flatten_bool(&l), flatten_bool(&r)) else {
                return Vector::constant(Value::bool(false), n, nulls);
            };
            bools_from(n, nulls, |i| op.holds(Some(a.get(i).cmp(&b.get(i)))))
        }
        Type::Ip => {
            let (a, b) = (l.values(), r.values());
            bools_from(n, nulls, |i| match (a[i].as_ip(), b[i].as_ip()) {
                (Some(x), Some(y)) => op.holds(Some(x.cmp(&y))),
                _ => false,
            })
        }
        Type::Net => {
            if !matches!(op, CompareOp::Eq | CompareOp::Ne) {
                let msg = format!("type net incompatible with '{op}' operator");
                return Vector::string_error(ctx, &msg, n);
            }
            let (a, b) = (l.values(), r.values());
            bools_from(n, nulls, |i| op.holds(Some(a[i].as_net().cmp(&b[i].as_net()))))
        }
        Type::TypeValue => {
            if matches!(op, CompareOp::Lt | CompareOp::Gt) {
                return Vector::constant(Value::bool(false), n, BitVec::zero());
            }
            let (Some(a), Some(b)) = (byte_slots(&l), byte_slots(&r)) else {
                return Vector::constant(Value::bool(false), n, BitVec::zero());
            };
            let eq = op != CompareOp::Ne;
            bools_from(n, BitVec::zero(), |i| (a.get(i) == b.get(i)) == eq)
        }
        _ if matches!(op, CompareOp::Eq | CompareOp::Ne) && !ty.is_primitive() => {
            // Complex values of one type compare by their canonical encoding.
            let eq = op == CompareOp::Eq;
            let (mut a, mut b) = (Vec::new(), Vec::new());
            bools_from(n, nulls, |i| {
                a.clear();
                b.clear();
                l.append_slot(i as u32, &mut a);
                r.append_slot(i as u32, &mut b);
                (a == b) == eq
            })
        }
        _ => Vector::constant(Value::bool(false), n, nulls),
    }
}

/// Numeric comparison in the wider domain: floats as `f64`, integers of any signedness as
/// `i128` so that large `uint64` values order correctly against signed ones.
fn compare_numbers(op: CompareOp, l: &Vector, r: &Vector, float: bool, nulls: BitVec) -> Vector {
    let n = l.len();
    if float {
        let (Some(a), Some(b)) = (as_f64(l), as_f64(r)) else {
            return Vector::constant(Value::bool(false), n, nulls);
        };
        return bools_from(n, nulls, |i| op.holds(a(i).partial_cmp(&b(i))));
    }
    let (Some(a), Some(b)) = (as_i128(l), as_i128(r)) else {
        return Vector::constant(Value::bool(false), n, nulls);
    };
    bools_from(n, nulls, |i| op.holds(Some(a(i).cmp(&b(i)))))
}

type Reader<'a, T> = Box<dyn Fn(usize) -> T + 'a>;

fn as_f64(v: &Vector) -> Option<Reader<'_, f64>> {
    if let Some(s) = floats(v) {
        return Some(Box::new(move |i| s.get(i)));
    }
    if let Some(s) = ints(v) {
        return Some(Box::new(move |i| s.get(i) as f64));
    }
    uints(v).map(|s| Box::new(move |i| s.get(i) as f64) as Reader<'_, f64>)
}

fn as_i128(v: &Vector) -> Option<Reader<'_, i128>> {
    if let Some(s) = ints(v) {
        return Some(Box::new(move |i| i128::from(s.get(i))));
    }
    uints(v).map(|s| Box::new(move |i| i128::from(s.get(i))) as Reader<'_, i128>)
}

/// `expr IS NULL`.
#[derive(Debug)]
pub struct IsNull {
    expr: Expr,
}

impl IsNull {
    pub fn new(expr: Expr) -> Self {
        Self { expr }
    }
}

impl Evaluator for IsNull {
    fn eval(&self, this: &Vector) -> Vector {
        apply(false, &mut |vecs: &[Vector]| is_null(&vecs[0]), &[self.expr.eval(this)])
    }
}

fn is_null(vec: &Vector) -> Vector {
    let v = vec.under();
    if is_error(v) {
        return v.clone();
    }
    if let Vector::Const(c) = v {
        if c.value.is_null() {
            return Vector::constant(Value::bool(true), v.len(), BitVec::zero());
        }
    }
    let nulls = nulls_of(v);
    if nulls.any() {
        return Vector::bool(nulls.expand(v.len() as usize), BitVec::zero());
    }
    Vector::constant(Value::bool(false), v.len(), BitVec::zero())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::This;
    use pretty_assertions::assert_eq;
    use strata_vector::sup::parse_values;

    fn col(ctx: &TypeContext, text: &str) -> Vector {
        Vector::from_values(&parse_values(ctx, text).unwrap())
    }

    fn bools(v: &Vector) -> Vec<String> {
        v.values().iter().map(ToString::to_string).collect()
    }

    #[test]
    fn numbers_compare_across_signedness() {
        let ctx = TypeContext::new();
        let big = col(&ctx, "18446744073709551615::uint64 1::uint64");
        let out = compare(&ctx, CompareOp::Gt, &big, &col(&ctx, "-1 1"));
        assert_eq!(bools(&out), ["true", "false"]);
        let out = compare(&ctx, CompareOp::Le, &col(&ctx, "1 2"), &col(&ctx, "1.5 1.5"));
        assert_eq!(bools(&out), ["true", "false"]);
    }

    #[test]
    fn nulls_compare_false_and_stay_null() {
        let ctx = TypeContext::new();
        let lhs = Vector::int(Type::Int64, vec![1, 0], BitVec::from_bools([false, true]));
        let out = compare(&ctx, CompareOp::Eq, &lhs, &col(&ctx, "1 1"));
        assert_eq!(bools(&out), ["true", "null"]);
        let Vector::Bool(b) = &out else { panic!("bool") };
        assert!(!b.bits.get(1));
    }

    #[test]
    fn incompatible_types_are_false() {
        let ctx = TypeContext::new();
        let out = compare(&ctx, CompareOp::Eq, &col(&ctx, "\"a\""), &col(&ctx, "1"));
        assert_eq!(bools(&out), ["false"]);
    }

    #[test]
    fn nets_and_type_values() {
        let ctx = TypeContext::new();
        let nets = col(&ctx, "10.0.0.0/8 192.168.0.0/16");
        let out = compare(&ctx, CompareOp::Eq, &nets, &col(&ctx, "10.0.0.0/8 10.0.0.0/8"));
        assert_eq!(bools(&out), ["true", "false"]);
        assert!(compare(&ctx, CompareOp::Lt, &nets, &nets).value_at(0).is_error());
        let types = col(&ctx, "<int64> <string>");
        let out = compare(&ctx, CompareOp::Eq, &types, &col(&ctx, "<int64> <int64>"));
        assert_eq!(bools(&out), ["true", "false"]);
        let out = compare(&ctx, CompareOp::Lt, &types, &types);
        assert_eq!(bools(&out), ["false", "false"]);
    }

    #[test]
    fn strings_and_ips_order() {
        let ctx = TypeContext::new();
        let out = compare(&ctx, CompareOp::Lt, &col(&ctx, "\"a\" \"b\""), &col(&ctx, "\"b\" \"a\""));
        assert_eq!(bools(&out), ["true", "false"]);
        let out = compare(&ctx, CompareOp::Lt, &col(&ctx, "10.0.0.1"), &col(&ctx, "10.0.0.2"));
        assert_eq!(bools(&out), ["true"]);
    }

    #[test]
    fn is_null_over_mixed_column() {
        let ctx = TypeContext::new();
        let out = IsNull::new(Arc::new(This)).eval(&col(&ctx, "1 null \"a\" null"));
        assert_eq!(bools(&out), ["false", "true", "false", "true"]);
    }
}
