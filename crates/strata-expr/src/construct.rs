//! Record, array, set and map literals built from expressions.

use crate::access::{list_parts, record_parts};
use crate::order::compare_values;
use crate::{Evaluator, Expr};
use std::collections::HashMap;
use std::sync::Arc;
use strata_vector::value::resolve_union_elem;
use strata_vector::{apply, pick, BitVec, DynamicBuilder, Type, TypeContext, Value, Vector};

/// Turns a dynamic element column into a union over its child types; other columns pass.
fn to_union(ctx: &TypeContext, v: Vector) -> Vector {
    let Vector::Dynamic(d) = &v else {
        return v;
    };
    let types: Vec<Type> = d.values.iter().map(Vector::ty).collect();
    let ty = ctx.lookup_union(&types);
    let Type::Union(u) = &ty else {
        return v;
    };
    let member: Vec<u32> = types
        .iter()
        .map(|t| u.tag_of(t).unwrap_or_default() as u32)
        .collect();
    let mut values = vec![Vector::const_null(0); u.types().len()];
    for (child, &m) in d.values.iter().zip(&member) {
        values[m as usize] = child.clone();
    }
    let tags = d.tags.iter().map(|&t| member[t as usize]).collect();
    Vector::union(ty, tags, values, BitVec::zero())
}

/// The value at `slot`, with union wrappers resolved to the member value.
fn elem_at(v: &Vector, slot: u32) -> Value {
    let value = v.value_at(slot);
    if matches!(value.ty().under(), Type::Union(_)) {
        return resolve_union_elem(value.ty(), value.bytes());
    }
    value
}

#[derive(Debug)]
pub enum RecordElem {
    Field(String, Expr),
    /// `...expr`: every field of a record value; non-records contribute nothing.
    Spread(Expr),
}

/// `{a:x, ...r}`. Later fields replace earlier fields of the same name in place.
#[derive(Debug)]
pub struct RecordExpr {
    ctx: Arc<TypeContext>,
    elems: Vec<RecordElem>,
}

impl RecordExpr {
    pub fn new(ctx: Arc<TypeContext>, elems: Vec<RecordElem>) -> Self {
        Self { ctx, elems }
    }

    fn build(&self, len: u32, vecs: &[Vector]) -> Vector {
        let mut names: Vec<String> = Vec::new();
        let mut fields: Vec<Vector> = Vec::new();
        let mut position: HashMap<String, usize> = HashMap::new();
        let mut put = |name: &str, v: Vector| match position.get(name) {
            Some(&k) => fields[k] = v,
            None => {
                position.insert(name.to_string(), names.len());
                names.push(name.to_string());
                fields.push(v);
            }
        };
        for (elem, v) in self.elems.iter().zip(vecs) {
            match elem {
                RecordElem::Field(name, _) => put(name, v.clone()),
                RecordElem::Spread(_) => {
                    let Some((rec, index)) = record_parts(v) else {
                        continue;
                    };
                    let Some(rt) = rec.ty.as_record() else {
                        continue;
                    };
                    for (f, col) in rt.fields().iter().zip(&rec.fields) {
                        let col = match index {
                            Some(index) => pick(col, index),
                            None => col.clone(),
                        };
                        put(&f.name, col);
                    }
                }
            }
        }
        let names: Vec<&str> = names.iter().map(String::as_str).collect();
        match Vector::record_of(&self.ctx, &names, fields, len) {
            Ok(v) => v,
            Err(err) => Vector::string_error(&self.ctx, &err.to_string(), len),
        }
    }
}

impl Evaluator for RecordExpr {
    fn eval(&self, this: &Vector) -> Vector {
        if self.elems.is_empty() {
            return self.build(this.len(), &[]);
        }
        let vecs: Vec<Vector> = self
            .elems
            .iter()
            .map(|e| match e {
                RecordElem::Field(_, e) | RecordElem::Spread(e) => e.eval(this),
            })
            .collect();
        apply(false, &mut |vecs: &[Vector]| self.build(vecs[0].len(), vecs), &vecs)
    }
}

/// An element of an array or set literal.
#[derive(Debug)]
pub enum ListElem {
    Value(Expr),
    /// `...expr`: the elements of an array or set; other values are dropped.
    Spread(Expr),
}

impl ListElem {
    fn expr(&self) -> &Expr {
        match self {
            ListElem::Value(e) | ListElem::Spread(e) => e,
        }
    }
}

/// Element column and offsets for one homogeneous batch of list elements.
fn build_list(ctx: &TypeContext, elems: &[ListElem], vecs: &[Vector]) -> (Vec<u32>, Vector) {
    let n = vecs.first().map_or(0, Vector::len);
    let mut b = DynamicBuilder::new();
    let mut offsets = Vec::with_capacity(n as usize + 1);
    offsets.push(0u32);
    let mut count = 0u32;
    for row in 0..n {
        for (elem, v) in elems.iter().zip(vecs) {
            match elem {
                ListElem::Value(_) => {
                    b.write(&elem_at(v, row));
                    count += 1;
                }
                ListElem::Spread(_) => {
                    let Some((list, index)) = list_parts(v) else {
                        continue;
                    };
                    let (start, end) = list.range(index.map_or(row, |ix| ix[row as usize]));
                    for e in start..end {
                        b.write(&elem_at(&list.values, e));
                        count += 1;
                    }
                }
            }
        }
        offsets.push(count);
    }
    (offsets, to_union(ctx, b.build()))
}

fn empty_list(ty: Type, len: u32) -> Vector {
    Vector::list(ty, vec![0; len as usize + 1], Vector::const_null(0), BitVec::zero())
}

/// `[a, ...b]`
#[derive(Debug)]
pub struct ArrayExpr {
    ctx: Arc<TypeContext>,
    elems: Vec<ListElem>,
}

impl ArrayExpr {
    pub fn new(ctx: Arc<TypeContext>, elems: Vec<ListElem>) -> Self {
        Self { ctx, elems }
    }
}

impl Evaluator for ArrayExpr {
    fn eval(&self, this: &Vector) -> Vector {
        if self.elems.is_empty() {
            return empty_list(self.ctx.lookup_array(&Type::Null), this.len());
        }
        let vecs: Vec<Vector> = self.elems.iter().map(|e| e.expr().eval(this)).collect();
        apply(
            false,
            &mut |vecs: &[Vector]| {
                let (offsets, inner) = build_list(&self.ctx, &self.elems, vecs);
                let ty = self.ctx.lookup_array(&inner.ty());
                Vector::array(ty, offsets, inner, BitVec::zero())
            },
            &vecs,
        )
    }
}

/// `|[a, ...b]|`: elements are sorted and deduplicated per row.
#[derive(Debug)]
pub struct SetExpr {
    ctx: Arc<TypeContext>,
    elems: Vec<ListElem>,
}

impl SetExpr {
    pub fn new(ctx: Arc<TypeContext>, elems: Vec<ListElem>) -> Self {
        Self { ctx, elems }
    }

    fn build(&self, vecs: &[Vector]) -> Vector {
        let (offsets, inner) = build_list(&self.ctx, &self.elems, vecs);
        let mut rows = Vec::with_capacity(offsets.len());
        let mut index = Vec::with_capacity(inner.len() as usize);
        rows.push(0u32);
        for w in offsets.windows(2) {
            let mut elems: Vec<(Value, u32)> = (w[0]..w[1]).map(|e| (elem_at(&inner, e), e)).collect();
            elems.sort_by(|a, b| compare_values(&a.0, &b.0));
            elems.dedup_by(|a, b| a.0 == b.0);
            index.extend(elems.iter().map(|(_, e)| *e));
            rows.push(index.len() as u32);
        }
        let ty = self.ctx.lookup_set(&inner.ty());
        Vector::set(ty, rows, pick(&inner, &index), BitVec::zero())
    }
}

impl Evaluator for SetExpr {
    fn eval(&self, this: &Vector) -> Vector {
        if self.elems.is_empty() {
            return empty_list(self.ctx.lookup_set(&Type::Null), this.len());
        }
        let vecs: Vec<Vector> = self.elems.iter().map(|e| e.expr().eval(this)).collect();
        apply(false, &mut |vecs: &[Vector]| self.build(vecs), &vecs)
    }
}

#[derive(Debug)]
pub struct MapEntry {
    pub key: Expr,
    pub value: Expr,
}

/// `|{k:v, ...}|` with one entry per literal entry in every row.
#[derive(Debug)]
pub struct MapExpr {
    ctx: Arc<TypeContext>,
    entries: Vec<MapEntry>,
}

impl MapExpr {
    pub fn new(ctx: Arc<TypeContext>, entries: Vec<MapEntry>) -> Self {
        Self { ctx, entries }
    }

    /// Interleaves one column per entry into a row-major element column.
    fn column(&self, vecs: &[Vector]) -> Vector {
        let mut b = DynamicBuilder::new();
        for row in 0..vecs[0].len() {
            for v in vecs {
                b.write(&elem_at(v, row));
            }
        }
        to_union(&self.ctx, b.build())
    }

    fn build(&self, vecs: &[Vector]) -> Vector {
        let (keys, vals) = vecs.split_at(self.entries.len());
        let keys = self.column(keys);
        let vals = self.column(vals);
        let width = self.entries.len() as u32;
        let offsets = (0..=vecs[0].len()).map(|i| i * width).collect();
        let ty = self.ctx.lookup_map(&keys.ty(), &vals.ty());
        Vector::map(ty, offsets, keys, vals, BitVec::zero())
    }
}

impl Evaluator for MapExpr {
    fn eval(&self, this: &Vector) -> Vector {
        if self.entries.is_empty() {
            let ty = self.ctx.lookup_map(&Type::Null, &Type::Null);
            let none = Vector::const_null(0);
            let offsets = vec![0; this.len() as usize + 1];
            return Vector::map(ty, offsets, none.clone(), none, BitVec::zero());
        }
        let mut vecs: Vec<Vector> = self.entries.iter().map(|e| e.key.eval(this)).collect();
        vecs.extend(self.entries.iter().map(|e| e.value.eval(this)));
        apply(false, &mut |vecs: &[Vector]| self.build(vecs), &vecs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::test_support::{col, show};
    use crate::{dotted_path, Literal, This};
    use pretty_assertions::assert_eq;

    fn lit(v: Value) -> Expr {
        Arc::new(Literal::new(v))
    }

    #[test]
    fn record_fields_and_spreads() {
        let ctx = Arc::new(TypeContext::new());
        let e = RecordExpr::new(
            ctx.clone(),
            vec![
                RecordElem::Field("x".into(), lit(Value::int64(1))),
                RecordElem::Spread(Arc::new(This)),
                RecordElem::Field("a".into(), lit(Value::string("new"))),
            ],
        );
        let out = show(&e.eval(&col(&ctx, "{a:1,b:2} {a:3,b:4}")));
        assert_eq!(out, ["{x:1,a:\"new\",b:2}", "{x:1,a:\"new\",b:4}"]);
    }

    #[test]
    fn arrays_mix_types_into_unions() {
        let ctx = Arc::new(TypeContext::new());
        let e = ArrayExpr::new(
            ctx.clone(),
            vec![
                ListElem::Value(dotted_path(&ctx, &["a"])),
                ListElem::Spread(dotted_path(&ctx, &["b"])),
            ],
        );
        let input = col(&ctx, "{a:1,b:[2,3]} {a:\"s\",b:[4]}");
        let out = e.eval(&input);
        assert_eq!(show(&out), ["[1,2,3]", "[\"s\",4]"]);
    }

    #[test]
    fn sets_sort_and_dedupe() {
        let ctx = Arc::new(TypeContext::new());
        let e = SetExpr::new(
            ctx.clone(),
            vec![
                ListElem::Value(lit(Value::int64(3))),
                ListElem::Spread(Arc::new(This)),
            ],
        );
        let out = show(&e.eval(&col(&ctx, "[1,3,1] []")));
        assert_eq!(out, ["|[1,3]|", "|[3]|"]);
    }

    #[test]
    fn maps_order_entries_by_key() {
        let ctx = Arc::new(TypeContext::new());
        let e = MapExpr::new(
            ctx.clone(),
            vec![
                MapEntry { key: lit(Value::string("k")), value: Arc::new(This) },
                MapEntry { key: lit(Value::string("j")), value: lit(Value::int64(0)) },
            ],
        );
        let out = show(&e.eval(&col(&ctx, "1 2")));
        assert_eq!(out, ["|{\"j\":0,\"k\":1}|", "|{\"j\":0,\"k\":2}|"]);
        let empty = MapExpr::new(ctx.clone(), Vec::new());
        assert_eq!(empty.eval(&col(&ctx, "1")).len(), 1);
    }
}
