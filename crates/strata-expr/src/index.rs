//! `container[index]` over arrays, sets, records and maps.

use crate::access::{byte_slots, expand_const, ints, is_error, list_parts, map_parts, record_parts};
use crate::cast::cast_to;
use crate::{Evaluator, Expr};
use std::sync::Arc;
use strata_vector::types::{is_signed, is_unsigned};
use strata_vector::{apply, combine, deunion, nulls_of, pick, Kind, Type, TypeContext, Vector};

#[derive(Debug)]
pub struct IndexExpr {
    ctx: Arc<TypeContext>,
    container: Expr,
    index: Expr,
    base1: bool,
}

impl IndexExpr {
    /// With `base1`, positive array indexes count from one and `0` is out of range.
    pub fn new(ctx: Arc<TypeContext>, container: Expr, index: Expr, base1: bool) -> Self {
        Self {
            ctx,
            container,
            index,
            base1,
        }
    }

    fn eval_one(&self, container: &Vector, index: &Vector) -> Vector {
        let container = expand_const(container);
        match container.ty().kind() {
            Kind::Array | Kind::Set => self.index_list(&container, index),
            Kind::Record => self.index_record(&container, index),
            Kind::Map => self.index_map(&container, index),
            _ => Vector::missing(&self.ctx, container.len()),
        }
    }

    /// Reapplies after casting an unsigned index to `int64`.
    fn with_signed_index(&self, container: &Vector, index: &Vector) -> Vector {
        let index = cast_to(&self.ctx, index, &Type::Int64);
        apply(
            true,
            &mut |vecs: &[Vector]| self.eval_one(&vecs[0], &vecs[1]),
            &[container.clone(), index],
        )
    }

    fn index_list(&self, container: &Vector, index: &Vector) -> Vector {
        if is_error(index) {
            return index.clone();
        }
        let id = index.ty().under().id();
        if index.ty().is_null() {
            return Vector::missing(&self.ctx, container.len());
        }
        if is_unsigned(id) {
            return self.with_signed_index(container, index);
        }
        if !is_signed(id) {
            return Vector::wrapped_error(&self.ctx, "index is not an integer", index);
        }
        let (Some((list, rows)), Some(idx)) = (list_parts(container), ints(index)) else {
            return Vector::missing(&self.ctx, container.len());
        };
        let outer = nulls_of(container);
        let idx_nulls = nulls_of(index);
        let mut elems = Vec::new();
        let mut errs = Vec::new();
        for i in 0..container.len() {
            let row = rows.map_or(i, |r| r[i as usize]);
            if outer.value(i) || list.nulls.value(row) || idx_nulls.value(i) {
                errs.push(i);
                continue;
            }
            let (start, end) = list.range(row);
            let len = i64::from(end - start);
            let mut k = idx.get(i as usize);
            if k < 0 {
                k += len;
            } else if self.base1 {
                k -= 1;
            }
            if (0..len).contains(&k) {
                elems.push(start + k as u32);
            } else {
                errs.push(i);
            }
        }
        let out = deunion(&pick(&list.values, &elems));
        if errs.is_empty() {
            return out;
        }
        combine(&out, &errs, &Vector::missing(&self.ctx, errs.len() as u32))
    }

    fn index_record(&self, container: &Vector, index: &Vector) -> Vector {
        let ty = index.ty();
        let id = ty.under().id();
        let by_position = if is_unsigned(id) {
            return self.with_signed_index(container, index);
        } else if is_signed(id) {
            true
        } else if matches!(ty.under(), Type::String) {
            false
        } else if ty.is_error() {
            return index.clone();
        } else {
            return Vector::wrapped_error(&self.ctx, "invalid value for record index", index);
        };
        let Some((rec, rows)) = record_parts(container) else {
            return Vector::missing(&self.ctx, container.len());
        };
        let Some(rec_ty) = rec.ty.as_record() else {
            return Vector::missing(&self.ctx, container.len());
        };
        let nfields = rec.fields.len();
        let positions = ints(index);
        let names = byte_slots(index);
        let idx_nulls = nulls_of(index);
        let outer = nulls_of(container);
        let mut tags = Vec::with_capacity(container.len() as usize);
        let mut per_field: Vec<Vec<u32>> = vec![Vec::new(); nfields];
        let mut missing = 0u32;
        for i in 0..container.len() {
            let row = rows.map_or(i, |r| r[i as usize]);
            let k = if outer.value(i) || rec.nulls.value(row) || idx_nulls.value(i) {
                None
            } else if by_position {
                positions.and_then(|p| {
                    let k = p.get(i as usize);
                    let k = if k < 0 {
                        k + nfields as i64
                    } else if self.base1 {
                        k - 1
                    } else {
                        k
                    };
                    usize::try_from(k).ok().filter(|&k| k < nfields)
                })
            } else {
                names.and_then(|n| rec_ty.index_of(n.str(i as usize)))
            };
            match k {
                Some(k) => {
                    tags.push(k as u32);
                    per_field[k].push(row);
                }
                None => {
                    tags.push(nfields as u32);
                    missing += 1;
                }
            }
        }
        let mut values: Vec<Vector> = rec
            .fields
            .iter()
            .zip(&per_field)
            .map(|(field, rows)| pick(field, rows))
            .collect();
        values.push(Vector::missing(&self.ctx, missing));
        Vector::dynamic(tags, values)
    }

    /// Looks up each index value among the keys of its map row; the last matching entry wins.
    fn index_map(&self, container: &Vector, index: &Vector) -> Vector {
        if is_error(index) {
            return index.clone();
        }
        let Some((map, rows)) = map_parts(container) else {
            return Vector::missing(&self.ctx, container.len());
        };
        let key_ty = match map.ty.under() {
            Type::Map(m) => m.key().clone(),
            _ => return Vector::missing(&self.ctx, container.len()),
        };
        let index = if key_ty.under() != index.ty().under()
            && key_ty.is_primitive()
            && index.ty().is_primitive()
        {
            cast_to(&self.ctx, index, &key_ty)
        } else {
            index.clone()
        };
        let outer = nulls_of(container);
        let mut elems = Vec::new();
        let mut errs = Vec::new();
        let (mut want, mut have) = (Vec::new(), Vec::new());
        for i in 0..container.len() {
            let row = rows.map_or(i, |r| r[i as usize]);
            want.clear();
            let hit = if outer.value(i)
                || map.nulls.value(row)
                || index.type_at(i).under() != key_ty.under()
                || !index.append_slot(i, &mut want)
            {
                None
            } else {
                let (start, end) = map.range(row);
                (start..end).rev().find(|&k| {
                    have.clear();
                    map.keys.append_slot(k, &mut have) && have == want
                })
            };
            match hit {
                Some(k) => elems.push(k),
                None => errs.push(i),
            }
        }
        let out = deunion(&pick(&map.values, &elems));
        if errs.is_empty() {
            return out;
        }
        combine(&out, &errs, &Vector::missing(&self.ctx, errs.len() as u32))
    }
}

impl Evaluator for IndexExpr {
    fn eval(&self, this: &Vector) -> Vector {
        let args = [self.container.eval(this), self.index.eval(this)];
        apply(true, &mut |vecs: &[Vector]| self.eval_one(&vecs[0], &vecs[1]), &args)
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

    fn index(ctx: &Arc<TypeContext>, idx: Value, base1: bool) -> IndexExpr {
        IndexExpr::new(ctx.clone(), Arc::new(This), Arc::new(Literal::new(idx)), base1)
    }

    #[test]
    fn arrays_by_position() {
        let ctx = Arc::new(TypeContext::new());
        let input = col(&ctx, "[1,2,3] [4] []");
        let out = index(&ctx, Value::int64(1), false).eval(&input);
        assert_eq!(show(&out), ["2", "error(\"missing\")", "error(\"missing\")"]);
        let out = index(&ctx, Value::int64(-1), false).eval(&input);
        assert_eq!(show(&out), ["3", "4", "error(\"missing\")"]);
        let out = index(&ctx, Value::uint64(0), false).eval(&input);
        assert_eq!(show(&out), ["1", "4", "error(\"missing\")"]);
    }

    #[test]
    fn one_based_indexes() {
        let ctx = Arc::new(TypeContext::new());
        let input = col(&ctx, "[1,2,3]");
        assert_eq!(show(&index(&ctx, Value::int64(1), true).eval(&input)), ["1"]);
        assert!(index(&ctx, Value::int64(0), true).eval(&input).value_at(0).is_missing());
    }

    #[test]
    fn non_integer_array_index_is_an_error() {
        let ctx = Arc::new(TypeContext::new());
        let out = index(&ctx, Value::string("a"), false).eval(&col(&ctx, "[1]"));
        assert!(out.value_at(0).to_string().contains("index is not an integer"));
    }

    #[test]
    fn records_by_name_and_position() {
        let ctx = Arc::new(TypeContext::new());
        let input = col(&ctx, "{a:1,b:\"x\"} {a:2,b:\"y\"}");
        let out = index(&ctx, Value::string("b"), false).eval(&input);
        assert_eq!(show(&out), ["\"x\"", "\"y\""]);
        let out = index(&ctx, Value::int64(0), false).eval(&input);
        assert_eq!(show(&out), ["1", "2"]);
        let out = index(&ctx, Value::string("c"), false).eval(&input);
        assert!(out.values().iter().all(Value::is_missing));
        let out = index(&ctx, Value::bool(true), false).eval(&input);
        assert!(out.value_at(0).to_string().contains("invalid value for record index"));
    }

    #[test]
    fn per_row_record_keys() {
        let ctx = Arc::new(TypeContext::new());
        let input = col(&ctx, "{a:1,b:\"x\",k:\"b\"} {a:2,b:\"y\",k:\"a\"}");
        let key = crate::dotted_path(&ctx, &["k"]);
        let out = IndexExpr::new(ctx.clone(), Arc::new(This), key, false).eval(&input);
        assert_eq!(show(&out), ["\"x\"", "2"]);
    }

    #[test]
    fn maps_by_key() {
        let ctx = Arc::new(TypeContext::new());
        let input = col(&ctx, "|{\"a\":1,\"b\":2}| |{\"c\":3}|");
        let out = index(&ctx, Value::string("b"), false).eval(&input);
        assert_eq!(show(&out), ["2", "error(\"missing\")"]);
        let input = col(&ctx, "|{1:\"one\",2:\"two\"}|");
        let out = index(&ctx, Value::uint64(2), false).eval(&input);
        assert_eq!(show(&out), ["\"two\""]);
    }
}
