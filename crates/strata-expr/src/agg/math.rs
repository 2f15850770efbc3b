//! `sum`, `min`, `max` and `avg`.

use super::{invalid_partial, AggFunc};
use crate::access::{all_null, floats, ints, normalize, uints};
use crate::coerce::{numeric_id, promote};
use crate::ExprResult;
use strata_vector::encoding::{append_container, encode_float, encode_uint};
use strata_vector::types::{is_float, is_unsigned, ID_DURATION, ID_FLOAT64, ID_TIME};
use strata_vector::{nulls_of, Field, Type, TypeContext, Value, Vector};

#[derive(Clone, Copy, Debug)]
enum Number {
    Int(i64),
    Uint(u64),
    Float(f64),
}

impl Number {
    fn as_i64(self) -> i64 {
        match self {
            Number::Int(v) => v,
            Number::Uint(v) => v as i64,
            Number::Float(v) => v as i64,
        }
    }

    fn as_u64(self) -> u64 {
        match self {
            Number::Int(v) => v as u64,
            Number::Uint(v) => v,
            Number::Float(v) => v as u64,
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Number::Int(v) => v as f64,
            Number::Uint(v) => v as f64,
            Number::Float(v) => v,
        }
    }
}

/// Calls `visit` with every non-null number in `v`.
fn for_each_number(v: &Vector, mut visit: impl FnMut(Number)) {
    let v = normalize(v);
    let nulls = nulls_of(&v);
    let live = (0..v.len()).filter(|&i| !nulls.value(i)).map(|i| i as usize);
    if let Some(s) = ints(&v) {
        live.for_each(|i| visit(Number::Int(s.get(i))));
    } else if let Some(s) = uints(&v) {
        live.for_each(|i| visit(Number::Uint(s.get(i))));
    } else if let Some(s) = floats(&v) {
        live.for_each(|i| visit(Number::Float(s.get(i))));
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum MathOp {
    Sum,
    Min,
    Max,
}

#[derive(Clone, Debug)]
struct State {
    /// `int64`, `duration`, `time`, `uint64` or `float64`.
    ty: Type,
    acc: Number,
}

impl State {
    fn init(op: MathOp, ty: Type) -> Self {
        let id = ty.id();
        let acc = match (op, id) {
            (MathOp::Sum, _) if is_float(id) => Number::Float(0.0),
            (MathOp::Min, _) if is_float(id) => Number::Float(f64::INFINITY),
            (MathOp::Max, _) if is_float(id) => Number::Float(f64::NEG_INFINITY),
            (MathOp::Sum, _) if is_unsigned(id) => Number::Uint(0),
            (MathOp::Min, _) if is_unsigned(id) => Number::Uint(u64::MAX),
            (MathOp::Max, _) if is_unsigned(id) => Number::Uint(0),
            (MathOp::Sum, _) => Number::Int(0),
            (MathOp::Min, _) => Number::Int(i64::MAX),
            (MathOp::Max, _) => Number::Int(i64::MIN),
        };
        Self { ty, acc }
    }

    /// Re-types the accumulator, keeping its value.
    fn convert(&self, ty: Type) -> Self {
        let id = ty.id();
        let acc = if is_float(id) {
            Number::Float(self.acc.as_f64())
        } else if is_unsigned(id) {
            Number::Uint(self.acc.as_u64())
        } else {
            Number::Int(self.acc.as_i64())
        };
        Self { ty, acc }
    }

    fn fold(&mut self, op: MathOp, x: Number) {
        self.acc = match (self.acc, op) {
            (Number::Float(a), MathOp::Sum) => Number::Float(a + x.as_f64()),
            (Number::Float(a), MathOp::Min) => Number::Float(a.min(x.as_f64())),
            (Number::Float(a), MathOp::Max) => Number::Float(a.max(x.as_f64())),
            (Number::Uint(a), MathOp::Sum) => Number::Uint(a.wrapping_add(x.as_u64())),
            (Number::Uint(a), MathOp::Min) => Number::Uint(a.min(x.as_u64())),
            (Number::Uint(a), MathOp::Max) => Number::Uint(a.max(x.as_u64())),
            (Number::Int(a), MathOp::Sum) => Number::Int(a.wrapping_add(x.as_i64())),
            (Number::Int(a), MathOp::Min) => Number::Int(a.min(x.as_i64())),
            (Number::Int(a), MathOp::Max) => Number::Int(a.max(x.as_i64())),
        };
    }

    fn value(&self) -> Value {
        match self.acc {
            Number::Int(v) => Value::int(self.ty.clone(), v),
            Number::Uint(v) => Value::uint64(v),
            Number::Float(v) => Value::float64(v),
        }
    }
}

/// The accumulator type for values of numeric type `id`.
fn accumulator_type(id: u32) -> Type {
    match id {
        ID_DURATION => Type::Duration,
        ID_TIME => Type::Time,
        _ if is_float(id) => Type::Float64,
        _ if is_unsigned(id) => Type::Uint64,
        _ => Type::Int64,
    }
}

/// `sum`, `min` and `max` over numbers. The accumulator widens as batches of new numeric types
/// arrive, the way binary arithmetic promotes its operands; values of other types are skipped.
#[derive(Debug)]
pub(crate) struct MathReducer {
    op: MathOp,
    state: Option<State>,
    has_value: bool,
}

impl MathReducer {
    pub(crate) fn new(op: MathOp) -> Self {
        Self {
            op,
            state: None,
            has_value: false,
        }
    }
}

impl AggFunc for MathReducer {
    fn consume(&mut self, v: &Vector) {
        let Some(id) = numeric_id(&v.ty()) else {
            return;
        };
        let id = match &self.state {
            Some(state) => promote(state.ty.id(), id),
            None => id,
        };
        let ty = accumulator_type(id);
        self.state = match self.state.take() {
            Some(state) if state.ty == ty => Some(state),
            Some(state) if self.has_value => Some(state.convert(ty)),
            _ => Some(State::init(self.op, ty)),
        };
        if all_null(v) {
            return;
        }
        if let Some(state) = self.state.as_mut() {
            let op = self.op;
            let mut seen = false;
            for_each_number(v, |x| {
                seen = true;
                state.fold(op, x);
            });
            self.has_value |= seen;
        }
    }

    fn consume_as_partial(&mut self, partial: &Vector) -> ExprResult<()> {
        self.consume(partial);
        Ok(())
    }

    fn result(&mut self, _: &TypeContext) -> Value {
        match &self.state {
            Some(state) if self.has_value => state.value(),
            Some(state) => Value::null(state.ty.clone()),
            None => Value::null_value(),
        }
    }

    fn result_as_partial(&mut self, ctx: &TypeContext) -> Value {
        self.result(ctx)
    }
}

/// Mean as `float64`. Partials are `{sum:float64,count:uint64}` records.
#[derive(Debug, Default)]
pub(crate) struct Avg {
    sum: f64,
    count: u64,
}

impl AggFunc for Avg {
    fn consume(&mut self, v: &Vector) {
        if numeric_id(&v.ty()).is_none() {
            return;
        }
        for_each_number(v, |x| {
            self.sum += x.as_f64();
            self.count += 1;
        });
    }

    fn consume_as_partial(&mut self, partial: &Vector) -> ExprResult<()> {
        for row in partial.values() {
            if row.is_null() {
                continue;
            }
            let sum = row.field("sum").and_then(|v| v.as_float());
            let count = row.field("count").and_then(|v| v.as_uint());
            let (Some(sum), Some(count)) = (sum, count) else {
                return Err(invalid_partial("avg"));
            };
            self.sum += sum;
            self.count += count;
        }
        Ok(())
    }

    fn result(&mut self, _: &TypeContext) -> Value {
        if self.count == 0 {
            return Value::null(Type::Float64);
        }
        Value::float64(self.sum / self.count as f64)
    }

    fn result_as_partial(&mut self, ctx: &TypeContext) -> Value {
        let fields = vec![Field::new("sum", Type::Float64), Field::new("count", Type::Uint64)];
        let Ok(ty) = ctx.lookup_record(fields) else {
            return Value::null_value();
        };
        let mut body = Vec::new();
        append_container(&mut body, Some(&encode_float(ID_FLOAT64, self.sum)));
        append_container(&mut body, Some(&encode_uint(self.count)));
        Value::new(ty, Some(body))
    }
}

#[cfg(test)]
mod tests {
    use crate::agg::test_support::{aggregate, aggregate_split};
    use pretty_assertions::assert_eq;
    use strata_vector::TypeContext;

    #[test]
    fn sums_promote_across_batches() {
        let ctx = TypeContext::new();
        assert_eq!(aggregate(&ctx, "sum", &["1 2 null", "3"]), "6");
        assert_eq!(aggregate(&ctx, "sum", &["1 2", "0.5"]), "3.5");
        assert_eq!(aggregate(&ctx, "sum", &["1 \"x\" 2"]), "3");
        assert_eq!(aggregate(&ctx, "sum", &["null"]), "null");
    }

    #[test]
    fn min_and_max() {
        let ctx = TypeContext::new();
        assert_eq!(aggregate(&ctx, "min", &["5 3", "4"]), "3");
        assert_eq!(aggregate(&ctx, "max", &["5 3", "4.5 9.0"]), "9.0");
        assert_eq!(aggregate_split(&ctx, "max", &["1", "7", "2"]), "7");
    }

    #[test]
    fn avg_merges_partials() {
        let ctx = TypeContext::new();
        assert_eq!(aggregate(&ctx, "avg", &["1 2", "3 null"]), "2.0");
        assert_eq!(aggregate_split(&ctx, "avg", &["1 2", "6", "3"]), "3.0");
        assert_eq!(aggregate(&ctx, "avg", &["\"a\""]), "null");
    }
}
