//! `error("quiet")` handling.
//!
//! A quiet value means "produce nothing here". Operators drop quiet rows with [`quiet_mask`]
//! and [`Dequiet`] removes quiet fields from records.

use crate::access::byte_slots;
use crate::{Evaluator, Expr};
use std::sync::Arc;
use strata_vector::{
    apply, combine, nulls_of, reverse_pick, BitVec, Field, Type, TypeContext, Vector,
};

/// Rows of `v` that are not `error("quiet")`, or `None` when `v` cannot hold a quiet value.
pub fn quiet_mask(v: &Vector) -> Option<BitVec> {
    let err = match v.under() {
        Vector::Error(err) => err,
        Vector::Const(c) if c.value.is_error() => {
            let n = v.len() as usize;
            return Some(if c.value.is_quiet() {
                c.nulls.expand(n)
            } else {
                BitVec::with_len_all_true(n)
            });
        }
        _ => return None,
    };
    if !matches!(err.inner.ty().under(), Type::String) {
        return None;
    }
    let msgs = byte_slots(&err.inner)?;
    let nulls = nulls_of(v);
    Some(BitVec::from_bools(
        (0..v.len()).map(|i| nulls.value(i) || msgs.get(i as usize) != b"quiet"),
    ))
}

/// Removes fields whose value is quiet from every record produced by `expr`.
#[derive(Debug)]
pub struct Dequiet {
    ctx: Arc<TypeContext>,
    expr: Expr,
    marker: Type,
}

impl Dequiet {
    pub fn new(ctx: Arc<TypeContext>, expr: Expr) -> Self {
        let empty = ctx
            .lookup_record(Vec::new())
            .map(|rec| ctx.lookup_error(&rec))
            .unwrap_or(Type::Null);
        Self {
            ctx,
            expr,
            marker: empty,
        }
    }

    fn record(&self, vec: &Vector) -> Vector {
        let (rec, index) = match vec.under() {
            Vector::Record(rec) => (rec, None),
            Vector::View(view) => match view.inner.under() {
                Vector::Record(rec) => (rec, Some(&view.index)),
                _ => return vec.clone(),
            },
            _ => return vec.clone(),
        };
        let Some(rec_ty) = rec.ty.as_record() else {
            return vec.clone();
        };
        if rec.fields.is_empty() {
            return vec.clone();
        }
        let mut args: Vec<Vector> = rec
            .fields
            .iter()
            .map(|f| match index {
                Some(index) => self.dequiet(&strata_vector::pick(f, index)),
                None => self.dequiet(f),
            })
            .collect();
        let nulls = match index {
            Some(index) => rec.nulls.pick(index),
            None => rec.nulls.clone(),
        };
        let has_nulls = nulls.any();
        if has_nulls {
            let n = vec.len() as usize;
            args.push(Vector::bool(nulls.expand(n), BitVec::zero()));
        }
        apply(
            true,
            &mut |vecs: &[Vector]| {
                let (vecs, nulls) = match vecs.split_last() {
                    Some((Vector::Bool(b), rest)) if has_nulls => (rest, b.bits.clone()),
                    _ => (vecs, BitVec::zero()),
                };
                let len = vecs.first().map_or(0, Vector::len);
                let mut fields = Vec::with_capacity(vecs.len());
                let mut values = Vec::with_capacity(vecs.len());
                for (field, v) in rec_ty.fields().iter().zip(vecs) {
                    if v.ty() == self.marker {
                        continue;
                    }
                    fields.push(Field::new(field.name.clone(), v.ty()));
                    values.push(v.clone());
                }
                match self.ctx.lookup_record(fields) {
                    Ok(ty) => Vector::record(ty, values, len, nulls.compact()),
                    Err(_) => Vector::missing(&self.ctx, len),
                }
            },
            &args,
        )
    }

    fn dequiet(&self, vec: &Vector) -> Vector {
        if matches!(vec.ty().kind(), strata_vector::Kind::Record) {
            return self.record(vec);
        }
        let Some(keep) = quiet_mask(vec) else {
            return vec.clone();
        };
        let quiet: Vec<u32> = (0..vec.len()).filter(|&i| !keep.value(i)).collect();
        if quiet.is_empty() {
            return vec.clone();
        }
        let marker = Vector::error(
            self.marker.clone(),
            Vector::const_null(quiet.len() as u32),
            BitVec::zero(),
        );
        if quiet.len() as u32 == vec.len() {
            return marker;
        }
        combine(&reverse_pick(vec, &quiet), &quiet, &marker)
    }
}

impl Evaluator for Dequiet {
    fn eval(&self, this: &Vector) -> Vector {
        let out = self.expr.eval(this);
        apply(true, &mut |vecs: &[Vector]| self.record(&vecs[0]), &[out])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Literal, RecordElem, RecordExpr, This};
    use pretty_assertions::assert_eq;
    use strata_vector::Value;

    fn show(v: &Vector) -> Vec<String> {
        v.values().iter().map(ToString::to_string).collect()
    }

    #[test]
    fn mask_marks_quiet_rows() {
        let ctx = TypeContext::new();
        let v = Vector::dynamic(
            vec![0, 1, 0],
            vec![Vector::quiet(&ctx, 2), Vector::int64s(vec![1])],
        );
        // Only error columns are masked; the dynamic is split by the caller.
        assert!(quiet_mask(&v).is_none());
        let mask = quiet_mask(&Vector::quiet(&ctx, 2)).unwrap();
        assert_eq!(mask.true_count(), 0);
        assert!(quiet_mask(&Vector::missing(&ctx, 2)).unwrap().all_true());
        assert!(quiet_mask(&Vector::int64s(vec![1])).is_none());
    }

    #[test]
    fn quiet_fields_are_dropped() {
        let ctx = Arc::new(TypeContext::new());
        let quiet = Value::error(&ctx, "quiet");
        let rec = RecordExpr::new(
            ctx.clone(),
            vec![
                RecordElem::Field("a".into(), Arc::new(Literal::new(Value::int64(1)))),
                RecordElem::Field("b".into(), Arc::new(Literal::new(quiet))),
            ],
        );
        let out = Dequiet::new(ctx.clone(), Arc::new(rec)).eval(&Vector::const_null(2));
        assert_eq!(show(&out), ["{a:1}", "{a:1}"]);
        let out = Dequiet::new(ctx.clone(), Arc::new(This)).eval(&Vector::int64s(vec![3]));
        assert_eq!(show(&out), ["3"]);
    }
}
