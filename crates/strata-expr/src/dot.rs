//! Input references, literals and field access.

use crate::access::byte_slots;
use crate::{Evaluator, Expr};
use std::sync::Arc;
use strata_vector::vector::BytesTable;
use strata_vector::{apply, combine, pick, BitVec, Type, TypeContext, Value, Vector};

/// The input column itself.
#[derive(Clone, Copy, Debug, Default)]
pub struct This;

impl Evaluator for This {
    fn eval(&self, this: &Vector) -> Vector {
        this.clone()
    }
}

/// A constant, repeated to the length of the input.
#[derive(Clone, Debug)]
pub struct Literal {
    value: Value,
}

impl Literal {
    pub fn new(value: Value) -> Self {
        Self { value }
    }

    pub fn value(&self) -> &Value {
        &self.value
    }
}

impl Evaluator for Literal {
    fn eval(&self, this: &Vector) -> Vector {
        Vector::constant(self.value.clone(), this.len(), BitVec::zero())
    }
}

/// `record.field`.
#[derive(Debug)]
pub struct DotExpr {
    ctx: Arc<TypeContext>,
    record: Expr,
    field: String,
}

impl DotExpr {
    pub fn new(ctx: Arc<TypeContext>, record: Expr, field: impl Into<String>) -> Self {
        Self {
            ctx,
            record,
            field: field.into(),
        }
    }

    fn eval_one(&self, vec: &Vector) -> Vector {
        match vec.under() {
            Vector::Record(rec) => match rec.field(&self.field) {
                Some(field) => field.clone(),
                None => Vector::missing(&self.ctx, vec.len()),
            },
            Vector::TypeValue(tv) => self.field_types(tv.len(), |i| tv.value(i), &tv.nulls),
            Vector::Map(_) => self.map_lookup(vec),
            Vector::View(view) => pick(&self.eval_one(&view.inner), &view.index),
            Vector::Const(c) if c.value.is_null() => vec.clone(),
            v => Vector::missing(&self.ctx, v.len()),
        }
    }

    /// Field types of type values that denote records.
    fn field_types<'a>(&self, n: u32, get: impl Fn(u32) -> &'a [u8], nulls: &BitVec) -> Vector {
        let mut out = BytesTable::with_capacity(n as usize);
        let mut out_nulls = Vec::with_capacity(n as usize);
        let mut errs = Vec::new();
        for i in 0..n {
            if nulls.value(i) {
                out.push(&[]);
                out_nulls.push(true);
                continue;
            }
            let field = self
                .ctx
                .lookup_by_value(get(i))
                .ok()
                .and_then(|ty| ty.as_record().and_then(|r| r.field_type(&self.field).cloned()));
            match field {
                Some(ty) => {
                    out.push(&ty.encoded());
                    out_nulls.push(false);
                }
                None => errs.push(i),
            }
        }
        let vals = Vector::type_values(out, BitVec::from_bools(out_nulls).compact());
        if errs.is_empty() {
            return vals;
        }
        combine(&vals, &errs, &Vector::missing(&self.ctx, errs.len() as u32))
    }

    /// Looks up the field name as a string key of a map column.
    fn map_lookup(&self, vec: &Vector) -> Vector {
        let Vector::Map(m) = vec.under() else {
            return Vector::missing(&self.ctx, vec.len());
        };
        if !matches!(m.ty.under(), Type::Map(mt) if matches!(mt.key().under(), Type::String)) {
            return Vector::missing(&self.ctx, vec.len());
        }
        let mut index = Vec::new();
        let mut errs = Vec::new();
        for slot in 0..m.len() {
            let hit = if m.nulls.value(slot) {
                None
            } else {
                let (start, end) = m.range(slot);
                let keys = byte_slots(&m.keys);
                (start..end).rev().find(|&k| {
                    keys.is_some_and(|keys| keys.get(k as usize) == self.field.as_bytes())
                })
            };
            match hit {
                Some(k) => index.push(k),
                None => errs.push(slot),
            }
        }
        let vals = pick(&m.values, &index);
        if errs.is_empty() {
            return vals;
        }
        combine(&vals, &errs, &Vector::missing(&self.ctx, errs.len() as u32))
    }
}

impl Evaluator for DotExpr {
    fn eval(&self, this: &Vector) -> Vector {
        let rec = self.record.eval(this);
        apply(true, &mut |vecs: &[Vector]| self.eval_one(&vecs[0]), &[rec])
    }
}

/// `this.a.b.c` as a chain of [`DotExpr`]s.
pub fn dotted_path(ctx: &Arc<TypeContext>, path: &[&str]) -> Expr {
    let mut expr: Expr = Arc::new(This);
    for name in path {
        expr = Arc::new(DotExpr::new(ctx.clone(), expr, *name));
    }
    expr
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use strata_vector::sup::parse_values;

    fn col(ctx: &TypeContext, text: &str) -> Vector {
        Vector::from_values(&parse_values(ctx, text).unwrap())
    }

    fn show(v: &Vector) -> Vec<String> {
        v.values().iter().map(ToString::to_string).collect()
    }

    #[test]
    fn record_fields_and_missing() {
        let ctx = Arc::new(TypeContext::new());
        let input = col(&ctx, "{a:1,b:\"x\"} {a:2,b:\"y\"} {c:3}");
        let out = dotted_path(&ctx, &["a"]).eval(&input);
        assert_eq!(show(&out), ["1", "2", "error(\"missing\")"]);
        let out = dotted_path(&ctx, &["a", "b"]).eval(&input);
        assert!(out.values().iter().all(Value::is_missing));
    }

    #[test]
    fn nested_paths() {
        let ctx = Arc::new(TypeContext::new());
        let input = col(&ctx, "{x:{y:{z:7}}}");
        assert_eq!(show(&dotted_path(&ctx, &["x", "y", "z"]).eval(&input)), ["7"]);
    }

    #[test]
    fn type_values_of_records_expose_field_types() {
        let ctx = Arc::new(TypeContext::new());
        let input = col(&ctx, "<{a:int64,b:string}> <int64>");
        let out = dotted_path(&ctx, &["b"]).eval(&input);
        assert_eq!(show(&out), ["<string>", "error(\"missing\")"]);
    }

    #[test]
    fn map_with_string_keys() {
        let ctx = Arc::new(TypeContext::new());
        let input = col(&ctx, "|{\"a\":1,\"b\":2}| |{\"b\":3}|");
        let out = dotted_path(&ctx, &["a"]).eval(&input);
        assert_eq!(show(&out), ["1", "error(\"missing\")"]);
    }

    #[test]
    fn views_pick_through() {
        let ctx = Arc::new(TypeContext::new());
        let input = col(&ctx, "{a:1} {a:2} {a:3}");
        let out = dotted_path(&ctx, &["a"]).eval(&Vector::view(input, vec![2, 0]));
        assert_eq!(show(&out), ["3", "1"]);
    }

    #[test]
    fn literal_repeats() {
        let out = Literal::new(Value::int64(4)).eval(&Vector::const_null(3));
        assert_eq!(show(&out), ["4", "4", "4"]);
    }
}
