//! Binary arithmetic and unary minus.
//!
//! Operands are split by [`apply`], coerced to a common numeric type, and handed to kernels
//! generated per `(op, kind)` whose loops specialize on the operand forms. Dictionary and
//! constant operands keep their encoding where the result allows it.

use crate::access::{byte_slots, floats, ints, is_error, normalize, uints, Slots};
use crate::cast::cast_to;
use crate::coerce::coerce_vals;
use crate::{Evaluator, Expr};
use std::fmt;
use std::sync::Arc;
use strata_vector::types::{is_float, is_signed, is_unsigned};
use strata_vector::vector::BytesTable;
use strata_vector::{
    apply, combine, nulls_of, pick, reverse_pick, BitVec, Type, TypeContext, Value, Vector,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl ArithOp {
    pub fn parse(op: &str) -> Option<Self> {
        Some(match op {
            "+" => ArithOp::Add,
            "-" => ArithOp::Sub,
            "*" => ArithOp::Mul,
            "/" => ArithOp::Div,
            "%" => ArithOp::Mod,
            _ => return None,
        })
    }

    pub fn symbol(self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
            ArithOp::Mod => "%",
        }
    }
}

impl fmt::Display for ArithOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Runs `$body` over two `Slots` operands, with dedicated loops for the flat/flat and
/// flat/const pairs and a generic indexed loop for every other form pair.
macro_rules! binary_kernel {
    ($l:expr, $r:expr, $n:expr, |$a:ident, $b:ident| $body:expr) => {{
        let n: usize = $n;
        match ($l, $r) {
            (Slots::Flat(l), Slots::Flat(r)) => l
                .iter()
                .zip(r.iter())
                .map(|(&$a, &$b)| $body)
                .collect::<Vec<_>>(),
            (Slots::Flat(l), Slots::Const($b)) => l.iter().map(|&$a| $body).collect::<Vec<_>>(),
            (Slots::Const($a), Slots::Flat(r)) => r.iter().map(|&$b| $body).collect::<Vec<_>>(),
            (l, r) => (0..n)
                .map(|i| {
                    let $a = l.get(i);
                    let $b = r.get(i);
                    $body
                })
                .collect::<Vec<_>>(),
        }
    }};
}

macro_rules! integer_kernel {
    ($name:ident, $t:ty) => {
        fn $name(op: ArithOp, l: Slots<'_, $t>, r: Slots<'_, $t>, n: usize) -> Vec<$t> {
            match op {
                ArithOp::Add => binary_kernel!(l, r, n, |a, b| a.wrapping_add(b)),
                ArithOp::Sub => binary_kernel!(l, r, n, |a, b| a.wrapping_sub(b)),
                ArithOp::Mul => binary_kernel!(l, r, n, |a, b| a.wrapping_mul(b)),
                // Zero divisors only remain at null slots here.
                ArithOp::Div => {
                    binary_kernel!(l, r, n, |a, b| if b == 0 { 0 } else { a.wrapping_div(b) })
                }
                ArithOp::Mod => {
                    binary_kernel!(l, r, n, |a, b| if b == 0 { 0 } else { a.wrapping_rem(b) })
                }
            }
        }
    };
}

integer_kernel!(int_kernel, i64);
integer_kernel!(uint_kernel, u64);

fn float_kernel(op: ArithOp, l: Slots<'_, f64>, r: Slots<'_, f64>, n: usize) -> Vec<f64> {
    match op {
        ArithOp::Add => binary_kernel!(l, r, n, |a, b| a + b),
        ArithOp::Sub => binary_kernel!(l, r, n, |a, b| a - b),
        ArithOp::Mul => binary_kernel!(l, r, n, |a, b| a * b),
        ArithOp::Div => binary_kernel!(l, r, n, |a, b| a / b),
        ArithOp::Mod => binary_kernel!(l, r, n, |a, b| a % b),
    }
}

#[derive(Debug)]
pub struct ArithExpr {
    ctx: Arc<TypeContext>,
    op: ArithOp,
    lhs: Expr,
    rhs: Expr,
}

impl ArithExpr {
    pub fn new(ctx: Arc<TypeContext>, op: ArithOp, lhs: Expr, rhs: Expr) -> Self {
        Self { ctx, op, lhs, rhs }
    }
}

impl Evaluator for ArithExpr {
    fn eval(&self, this: &Vector) -> Vector {
        let args = [self.lhs.eval(this), self.rhs.eval(this)];
        apply(true, &mut |vecs: &[Vector]| arith(&self.ctx, self.op, &vecs[0], &vecs[1]), &args)
    }
}

/// Evaluates `lhs op rhs` over two homogeneous columns.
pub fn arith(ctx: &TypeContext, op: ArithOp, lhs: &Vector, rhs: &Vector) -> Vector {
    if is_error(lhs) {
        return lhs.clone();
    }
    if is_error(rhs) {
        return rhs.clone();
    }
    let nulls = BitVec::or(&nulls_of(lhs), &nulls_of(rhs));
    let (l, r) = match coerce_vals(ctx, &normalize(lhs), &normalize(rhs)) {
        Ok(pair) => pair,
        Err(err) => return err,
    };
    if l.is_dynamic() || r.is_dynamic() {
        // Promotion overflowed on some rows; those rows are errors now.
        return apply(true, &mut |vecs: &[Vector]| arith(ctx, op, &vecs[0], &vecs[1]), &[l, r]);
    }
    let (l, r) = (normalize(&l), normalize(&r));
    let ty = l.ty().under().clone();
    let n = l.len();
    if matches!(ty, Type::String) && op == ArithOp::Add {
        return concat(&l, &r, nulls);
    }
    let id = ty.id();
    if is_float(id) && op == ArithOp::Mod {
        return Vector::string_error(
            ctx,
            &format!("type {} incompatible with '%' operator", Type::Float64),
            n,
        );
    }
    if !(is_float(id) || is_signed(id) || is_unsigned(id)) {
        if ty.is_null() {
            return Vector::const_null(n);
        }
        return Vector::string_error(
            ctx,
            &format!("type {ty} incompatible with '{op}' operator"),
            n,
        );
    }
    if matches!(op, ArithOp::Div | ArithOp::Mod) {
        let zeros = zero_divisors(&r, &nulls);
        if !zeros.is_empty() {
            let out = kernel(op, &ty, &l, &r, &nulls);
            let err = Vector::string_error(ctx, "divide by zero", zeros.len() as u32);
            return combine(&reverse_pick(&out, &zeros), &zeros, &err);
        }
    }
    kernel(op, &ty, &l, &r, &nulls)
}

fn kernel(op: ArithOp, ty: &Type, l: &Vector, r: &Vector, nulls: &BitVec) -> Vector {
    let n = l.len() as usize;
    let id = ty.id();
    // A constant operand against a dictionary computes once per dictionary entry.
    if let (Vector::Dict(d), Vector::Const(c)) = (l, r) {
        if c.nulls.is_zero() && !c.value.is_null() {
            let c = Vector::constant(c.value.clone(), d.inner.len(), BitVec::zero());
            let inner = kernel(op, ty, &d.inner, &c, &BitVec::zero());
            return Vector::dict(inner, d.index.clone(), d.counts.clone(), d.nulls.clone());
        }
    }
    if let (Vector::Const(a), Vector::Const(b)) = (l, r) {
        if nulls.is_zero() && !a.value.is_null() && !b.value.is_null() {
            let a = Vector::from_values(&[a.value.clone()]);
            let b = Vector::from_values(&[b.value.clone()]);
            let one = kernel(op, ty, &a, &b, &BitVec::zero());
            return Vector::constant(one.value_at(0), n as u32, BitVec::zero());
        }
    }
    if is_float(id) {
        if let (Some(a), Some(b)) = (floats(l), floats(r)) {
            return Vector::float(ty.clone(), float_kernel(op, a, b, n), nulls.clone());
        }
    } else if is_signed(id) {
        if let (Some(a), Some(b)) = (ints(l), ints(r)) {
            return Vector::int(ty.clone(), int_kernel(op, a, b, n), nulls.clone());
        }
    } else if let (Some(a), Some(b)) = (uints(l), uints(r)) {
        return Vector::uint(ty.clone(), uint_kernel(op, a, b, n), nulls.clone());
    }
    Vector::const_null(n as u32)
}

fn zero_divisors(r: &Vector, nulls: &BitVec) -> Vec<u32> {
    let n = r.len() as usize;
    let zero_at = |i: usize| -> bool {
        if let Some(s) = ints(r) {
            s.get(i) == 0
        } else if let Some(s) = uints(r) {
            s.get(i) == 0
        } else if let Some(s) = floats(r) {
            s.get(i) == 0.0
        } else {
            false
        }
    };
    (0..n)
        .filter(|&i| !nulls.value(i as u32) && zero_at(i))
        .map(|i| i as u32)
        .collect()
}

fn concat(l: &Vector, r: &Vector, nulls: BitVec) -> Vector {
    let (Some(a), Some(b)) = (byte_slots(l), byte_slots(r)) else {
        return Vector::const_null(l.len());
    };
    let n = l.len() as usize;
    let mut table = BytesTable::with_capacity(n);
    let mut buf = Vec::new();
    for i in 0..n {
        buf.clear();
        if !nulls.value(i as u32) {
            buf.extend_from_slice(a.get(i));
            buf.extend_from_slice(b.get(i));
        }
        table.push(&buf);
    }
    Vector::string(table, nulls)
}

/// Unary minus.
#[derive(Debug)]
pub struct Negate {
    ctx: Arc<TypeContext>,
    expr: Expr,
}

impl Negate {
    pub fn new(ctx: Arc<TypeContext>, expr: Expr) -> Self {
        Self { ctx, expr }
    }

    fn negate(&self, vec: &Vector) -> Vector {
        let v = vec.under();
        if v.is_empty() || is_error(v) {
            return v.clone();
        }
        let ty = v.ty().under().clone();
        let id = ty.id();
        if !(is_float(id) || is_signed(id) || is_unsigned(id)) {
            return Vector::wrapped_error(&self.ctx, "type incompatible with unary '-' operator", vec);
        }
        if is_unsigned(id) {
            let signed = match ty {
                Type::Uint8 => Type::Int8,
                Type::Uint16 => Type::Int16,
                Type::Uint32 => Type::Int32,
                _ => Type::Int64,
            };
            let cast = cast_to(&self.ctx, v, &signed);
            return apply(true, &mut |vecs: &[Vector]| self.negate(&vecs[0]), &[cast]);
        }
        let v = normalize(v);
        let n = v.len() as usize;
        let nulls = nulls_of(&v);
        if let Vector::Const(c) = &v {
            if let Some(x) = c.value.as_float() {
                return Vector::constant(Value::float(ty, -x), c.len, c.nulls.clone());
            }
        }
        if let Some(s) = floats(&v) {
            let out = (0..n).map(|i| -s.get(i)).collect();
            return Vector::float(ty, out, nulls);
        }
        let Some(s) = ints(&v) else {
            return Vector::wrapped_error(&self.ctx, "type incompatible with unary '-' operator", vec);
        };
        let min = min_int(&ty);
        let mut out = Vec::with_capacity(n);
        let mut errs = Vec::new();
        for i in 0..n {
            let x = s.get(i);
            if x == min && !nulls.value(i as u32) {
                errs.push(i as u32);
            } else {
                out.push(x.wrapping_neg());
            }
        }
        if errs.is_empty() {
            return Vector::int(ty, out, nulls);
        }
        let keep = strata_vector::reverse_index(&errs, n as u32);
        let good = Vector::int(ty, out, nulls.pick(&keep).compact());
        let err = Vector::wrapped_error(&self.ctx, "unary '-' underflow", &pick(&v, &errs));
        combine(&good, &errs, &err)
    }
}

impl Evaluator for Negate {
    fn eval(&self, this: &Vector) -> Vector {
        apply(true, &mut |vecs: &[Vector]| self.negate(&vecs[0]), &[self.expr.eval(this)])
    }
}

fn min_int(ty: &Type) -> i64 {
    match ty {
        Type::Int8 => i64::from(i8::MIN),
        Type::Int16 => i64::from(i16::MIN),
        Type::Int32 => i64::from(i32::MIN),
        _ => i64::MIN,
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

    fn show(v: &Vector) -> Vec<String> {
        v.values().iter().map(ToString::to_string).collect()
    }

    #[test]
    fn adds_across_forms() {
        let ctx = TypeContext::new();
        let flat = Vector::int64s(vec![1, 2, 3]);
        let c = Vector::constant(Value::int64(10), 3, BitVec::zero());
        let inner = Vector::int64s(vec![5, 7]);
        let dict = Vector::dict(inner, vec![1, 0, 1], vec![1, 2], BitVec::zero());
        let view = Vector::view(Vector::int64s(vec![9, 8, 7, 6]), vec![3, 2, 1]);
        assert_eq!(show(&arith(&ctx, ArithOp::Add, &flat, &c)), ["11", "12", "13"]);
        assert_eq!(show(&arith(&ctx, ArithOp::Add, &dict, &c)), ["17", "15", "17"]);
        assert_eq!(show(&arith(&ctx, ArithOp::Sub, &view, &flat)), ["5", "5", "5"]);
        assert!(matches!(arith(&ctx, ArithOp::Mul, &dict, &c), Vector::Dict(_)));
    }

    #[test]
    fn promotes_mixed_numerics() {
        let ctx = TypeContext::new();
        let out = arith(&ctx, ArithOp::Add, &col(&ctx, "1 2"), &col(&ctx, "0.5 0.25"));
        assert_eq!(show(&out), ["1.5", "2.25"]);
        let out = arith(&ctx, ArithOp::Add, &col(&ctx, "1::uint8 2::uint8"), &col(&ctx, "3 4"));
        assert_eq!(out.ty(), Type::Int64);
    }

    #[test]
    fn divide_by_zero_yields_error_slots() {
        let ctx = TypeContext::new();
        let out = arith(&ctx, ArithOp::Div, &col(&ctx, "6 4 2"), &col(&ctx, "3 0 1"));
        assert_eq!(show(&out), ["2", "error(\"divide by zero\")", "2"]);
    }

    #[test]
    fn float_modulo_is_rejected() {
        let ctx = TypeContext::new();
        let out = arith(&ctx, ArithOp::Mod, &col(&ctx, "1.5"), &col(&ctx, "1.0"));
        assert_eq!(
            out.value_at(0),
            Value::error(&ctx, "type float64 incompatible with '%' operator")
        );
    }

    #[test]
    fn nulls_propagate_and_strings_concatenate() {
        let ctx = TypeContext::new();
        let lhs = Vector::int(Type::Int64, vec![1, 0, 3], BitVec::from_bools([false, true, false]));
        let rhs = Vector::int(Type::Int64, vec![1, 1, 0], BitVec::from_bools([false, false, true]));
        let out = arith(&ctx, ArithOp::Add, &lhs, &rhs);
        assert_eq!(show(&out), ["2", "null", "null"]);
        let out = arith(&ctx, ArithOp::Add, &col(&ctx, "\"a\" \"b\""), &col(&ctx, "\"x\" \"y\""));
        assert_eq!(show(&out), ["\"ax\"", "\"by\""]);
    }

    #[test]
    fn all_null_operand_gives_null_column() {
        let ctx = TypeContext::new();
        let out = arith(&ctx, ArithOp::Add, &Vector::const_null(2), &col(&ctx, "1 2"));
        assert_eq!(show(&out), ["null", "null"]);
    }

    #[test]
    fn negate_checks_underflow() {
        let ctx = Arc::new(TypeContext::new());
        let expr = Negate::new(ctx.clone(), Arc::new(This));
        let out = expr.eval(&col(&ctx, "1 -9223372036854775808 null"));
        let got = show(&out);
        assert_eq!(got[0], "-1");
        assert!(got[1].contains("unary '-' underflow"), "{got:?}");
        // A bare null has no numeric type.
        assert!(got[2].contains("type incompatible with unary '-' operator"), "{got:?}");
        let lit = Arc::new(Literal::new(Value::string("x")));
        let out = Negate::new(ctx.clone(), lit).eval(&Vector::const_null(1));
        assert!(out.value_at(0).is_error());
    }
}
