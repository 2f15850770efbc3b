//! `container[from:to]` over arrays, sets, strings and bytes.
//!
//! Negative bounds count from the end. Strings slice by character, bytes by byte. A bound
//! outside the value yields `slice out of bounds`.

use crate::access::{byte_slots, expand_const, ints, is_error, list_parts};
use crate::{Evaluator, Expr};
use std::sync::Arc;
use strata_vector::types::is_signed;
use strata_vector::vector::BytesTable;
use strata_vector::{apply, combine, nulls_of, BitVec, Kind, Type, TypeContext, Vector};

#[derive(Debug)]
pub struct SliceExpr {
    ctx: Arc<TypeContext>,
    container: Expr,
    from: Option<Expr>,
    to: Option<Expr>,
}

impl SliceExpr {
    pub fn new(
        ctx: Arc<TypeContext>,
        container: Expr,
        from: Option<Expr>,
        to: Option<Expr>,
    ) -> Self {
        Self {
            ctx,
            container,
            from,
            to,
        }
    }

    fn eval_one(&self, vecs: &[Vector]) -> Vector {
        let container = expand_const(&vecs[0]);
        let mut rest = &vecs[1..];
        let mut bound = |present: bool, which: &str| -> Result<Option<Vector>, Vector> {
            if !present {
                return Ok(None);
            }
            let v = rest[0].clone();
            rest = &rest[1..];
            if !is_signed(v.ty().under().id()) {
                let msg = format!("slice: {which} value is not an integer");
                return Err(Vector::wrapped_error(&self.ctx, &msg, &v));
            }
            Ok(Some(v))
        };
        let from = match bound(self.from.is_some(), "from") {
            Ok(v) => v,
            Err(err) => return err,
        };
        let to = match bound(self.to.is_some(), "to") {
            Ok(v) => v,
            Err(err) => return err,
        };
        if is_error(&container) {
            return container;
        }
        match container.ty().kind() {
            Kind::Array | Kind::Set => self.slice_list(&container, from.as_ref(), to.as_ref()),
            _ => match container.ty().under() {
                Type::String | Type::Bytes => {
                    self.slice_bytes(&container, from.as_ref(), to.as_ref())
                }
                _ => Vector::wrapped_error(
                    &self.ctx,
                    "sliced value is not array, set, bytes, or string",
                    &container,
                ),
            },
        }
    }

    fn slice_list(
        &self,
        container: &Vector,
        from: Option<&Vector>,
        to: Option<&Vector>,
    ) -> Vector {
        let Some((list, rows)) = list_parts(container) else {
            return Vector::missing(&self.ctx, container.len());
        };
        let (from, to) = (from.and_then(ints), to.and_then(ints));
        let outer = nulls_of(container);
        let mut offsets = vec![0u32];
        let mut elems = Vec::new();
        let mut nulls = Vec::with_capacity(container.len() as usize);
        let mut errs = Vec::new();
        for i in 0..container.len() {
            let row = rows.map_or(i, |r| r[i as usize]);
            if outer.value(i) || list.nulls.value(row) {
                offsets.push(elems.len() as u32);
                nulls.push(true);
                continue;
            }
            let (start, end) = list.range(row);
            let size = i64::from(end - start);
            let lo = from.map_or(0, |f| bound_of(f.get(i as usize), size));
            let hi = to.map_or(size, |t| bound_of(t.get(i as usize), size));
            if lo < 0 || lo > hi || hi > size {
                errs.push(i);
                continue;
            }
            elems.extend((start + lo as u32)..(start + hi as u32));
            offsets.push(elems.len() as u32);
            nulls.push(false);
        }
        let values = Vector::view(list.values.clone(), elems);
        let nulls = BitVec::from_bools(nulls).compact();
        let out = Vector::list(list.ty.clone(), offsets, values, nulls);
        self.with_errors(out, &errs)
    }

    fn slice_bytes(
        &self,
        container: &Vector,
        from: Option<&Vector>,
        to: Option<&Vector>,
    ) -> Vector {
        let Some(src) = byte_slots(container) else {
            return Vector::missing(&self.ctx, container.len());
        };
        let is_string = matches!(container.ty().under(), Type::String);
        let (from, to) = (from.and_then(ints), to.and_then(ints));
        let in_nulls = nulls_of(container);
        let mut table = BytesTable::with_capacity(container.len() as usize);
        let mut nulls = Vec::with_capacity(container.len() as usize);
        let mut errs = Vec::new();
        for i in 0..container.len() {
            if in_nulls.value(i) {
                table.push(&[]);
                nulls.push(true);
                continue;
            }
            let bytes = src.get(i as usize);
            // Character boundaries for strings, every byte for bytes.
            let bounds: Vec<usize> = if is_string {
                let s = src.str(i as usize);
                s.char_indices().map(|(k, _)| k).chain([s.len()]).collect()
            } else {
                (0..=bytes.len()).collect()
            };
            let size = bounds.len() as i64 - 1;
            let lo = from.map_or(0, |f| bound_of(f.get(i as usize), size));
            let hi = to.map_or(size, |t| bound_of(t.get(i as usize), size));
            if lo < 0 || lo > hi || hi > size {
                errs.push(i);
                continue;
            }
            table.push(&bytes[bounds[lo as usize]..bounds[hi as usize]]);
            nulls.push(false);
        }
        let nulls = BitVec::from_bools(nulls).compact();
        let out = if is_string {
            Vector::string(table, nulls)
        } else {
            Vector::bytes(table, nulls)
        };
        self.with_errors(out, &errs)
    }

    fn with_errors(&self, out: Vector, errs: &[u32]) -> Vector {
        if errs.is_empty() {
            return out;
        }
        let err = Vector::string_error(&self.ctx, "slice out of bounds", errs.len() as u32);
        combine(&out, errs, &err)
    }
}

fn bound_of(idx: i64, size: i64) -> i64 {
    if idx < 0 {
        idx + size
    } else {
        idx
    }
}

impl Evaluator for SliceExpr {
    fn eval(&self, this: &Vector) -> Vector {
        let mut args = vec![self.container.eval(this)];
        args.extend(self.from.iter().map(|e| e.eval(this)));
        args.extend(self.to.iter().map(|e| e.eval(this)));
        apply(true, &mut |vecs: &[Vector]| self.eval_one(vecs), &args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Literal, This};
    use pretty_assertions::assert_eq;
    use strata_vector::sup::parse_values;
    use strata_vector::Value;

    fn col(ctx: &TypeContext, text: &str) -> Vector {
        Vector::from_values(&parse_values(ctx, text).unwrap())
    }

    fn show(v: &Vector) -> Vec<String> {
        v.values().iter().map(ToString::to_string).collect()
    }

    fn lit(v: i64) -> Option<Expr> {
        Some(Arc::new(Literal::new(Value::int64(v))))
    }

    #[test]
    fn arrays_slice_with_negative_bounds() {
        let ctx = Arc::new(TypeContext::new());
        let input = col(&ctx, "[1,2,3,4] [5,6]");
        let out = SliceExpr::new(ctx.clone(), Arc::new(This), lit(1), lit(-1)).eval(&input);
        assert_eq!(show(&out), ["[2,3]", "[]"]);
        let out = SliceExpr::new(ctx.clone(), Arc::new(This), lit(3), None).eval(&input);
        assert_eq!(show(&out), ["[4]", "error(\"slice out of bounds\")"]);
    }

    #[test]
    fn strings_slice_by_character() {
        let ctx = Arc::new(TypeContext::new());
        let input = Vector::strings(["héllo", "ab"]);
        let out = SliceExpr::new(ctx.clone(), Arc::new(This), lit(1), lit(3)).eval(&input);
        assert_eq!(show(&out), ["\"él\"", "error(\"slice out of bounds\")"]);
    }

    #[test]
    fn unsliceable_values_and_bad_bounds() {
        let ctx = Arc::new(TypeContext::new());
        let out = SliceExpr::new(ctx.clone(), Arc::new(This), lit(0), None)
            .eval(&Vector::int64s(vec![1]));
        let msg = "sliced value is not array, set, bytes, or string";
        assert!(out.value_at(0).to_string().contains(msg));
        let from: Option<Expr> = Some(Arc::new(Literal::new(Value::string("x"))));
        let out = SliceExpr::new(ctx.clone(), Arc::new(This), from, None).eval(&col(&ctx, "[1]"));
        assert!(out.value_at(0).to_string().contains("slice: from value is not an integer"));
    }
}
