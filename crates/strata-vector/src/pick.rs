//! Index-driven selection of rows.

use crate::vector::{
    ArrayVector, BoolVector, BytesTable, BytesVector, DictVector, DynamicVector, MapVector,
    Vector,
};
use std::sync::Arc;

/// Returns the rows of `v` at `index`, in order.
///
/// Flat primitive columns are gathered, dictionaries are re-indexed, views compose, unions and
/// dynamics regroup per child, and other containers become views.
pub fn pick(v: &Vector, index: &[u32]) -> Vector {
    match v {
        Vector::Int(v) => Vector::int(
            v.ty.clone(),
            gather(&v.values, index),
            v.nulls.pick(index),
        ),
        Vector::Uint(v) => Vector::uint(
            v.ty.clone(),
            gather(&v.values, index),
            v.nulls.pick(index),
        ),
        Vector::Float(v) => Vector::float(
            v.ty.clone(),
            gather(&v.values, index),
            v.nulls.pick(index),
        ),
        Vector::Bool(v) => Vector::Bool(Arc::new(BoolVector::new(
            v.bits.pick(index).expand(index.len()),
            v.nulls.pick(index),
        ))),
        Vector::String(v) => Vector::String(Arc::new(pick_bytes(v, index))),
        Vector::Bytes(v) => Vector::Bytes(Arc::new(pick_bytes(v, index))),
        Vector::TypeValue(v) => Vector::TypeValue(Arc::new(pick_bytes(v, index))),
        Vector::Ip(v) => Vector::ip(gather(&v.values, index), v.nulls.pick(index)),
        Vector::Net(v) => Vector::net(gather(&v.values, index), v.nulls.pick(index)),
        Vector::Enum(v) => Vector::enumeration(
            v.ty.clone(),
            gather(&v.values, index),
            v.nulls.pick(index),
        ),
        Vector::Record(r) => Vector::record(
            r.ty.clone(),
            r.fields.iter().map(|f| pick(f, index)).collect(),
            index.len() as u32,
            r.nulls.pick(index),
        ),
        Vector::Union(u) => {
            let (tags, values) = pick_dynamic(&u.dynamic, index);
            Vector::union(u.ty.clone(), tags, values, u.nulls.pick(index))
        }
        Vector::Dynamic(d) => {
            let (tags, values) = pick_dynamic(d, index);
            Vector::dynamic(tags, values)
        }
        Vector::Named(n) => Vector::named(n.ty.clone(), pick(&n.inner, index)),
        Vector::Error(e) => {
            Vector::error(e.ty.clone(), pick(&e.inner, index), e.nulls.pick(index))
        }
        Vector::Const(c) => {
            Vector::constant(c.value.clone(), index.len() as u32, c.nulls.pick(index))
        }
        Vector::Dict(d) => pick_dict(d, index),
        Vector::View(_) => Vector::view(v.clone(), index.to_vec()),
        Vector::Array(_) | Vector::Set(_) | Vector::Map(_) => {
            Vector::view(v.clone(), index.to_vec())
        }
    }
}

/// Picks the rows of `v` not listed in `index` (which must be ascending).
pub fn reverse_pick(v: &Vector, index: &[u32]) -> Vector {
    pick(v, &reverse_index(index, v.len()))
}

/// The ascending complement of `index` within `0..len`.
pub fn reverse_index(index: &[u32], len: u32) -> Vec<u32> {
    let mut out = Vec::with_capacity((len as usize).saturating_sub(index.len()));
    let mut it = index.iter().copied().peekable();
    for slot in 0..len {
        if it.peek() == Some(&slot) {
            it.next();
            while it.peek() == Some(&slot) {
                it.next();
            }
        } else {
            out.push(slot);
        }
    }
    out
}

/// Materializes rows without producing a view at the top level.
///
/// Array, set and map columns are rebuilt with fresh offsets; everything else defers to
/// [`pick`].
pub fn gather_rows(v: &Vector, index: &[u32]) -> Vector {
    match v {
        Vector::Array(a) => {
            let (offsets, elems) = regroup_offsets(&a.offsets, index);
            Vector::array(a.ty.clone(), offsets, pick(&a.values, &elems), a.nulls.pick(index))
        }
        Vector::Set(a) => {
            let (offsets, elems) = regroup_offsets(&a.offsets, index);
            Vector::set(a.ty.clone(), offsets, pick(&a.values, &elems), a.nulls.pick(index))
        }
        Vector::Map(m) => {
            let (offsets, elems) = regroup_offsets(&m.offsets, index);
            Vector::map(
                m.ty.clone(),
                offsets,
                pick(&m.keys, &elems),
                pick(&m.values, &elems),
                m.nulls.pick(index),
            )
        }
        Vector::View(view) => {
            let composed: Vec<u32> = index.iter().map(|&i| view.index[i as usize]).collect();
            gather_rows(&view.inner, &composed)
        }
        v => pick(v, index),
    }
}

/// Replaces a view by its gathered rows; other vectors are returned as is.
pub fn materialize(v: &Vector) -> Vector {
    match v {
        Vector::View(view) => gather_rows(&view.inner, &view.index),
        v => v.clone(),
    }
}

fn gather<T: Clone>(values: &[T], index: &[u32]) -> Vec<T> {
    index.iter().map(|&i| values[i as usize].clone()).collect()
}

fn pick_bytes(v: &BytesVector, index: &[u32]) -> BytesVector {
    let mut table = BytesTable::with_capacity(index.len());
    for &i in index {
        table.push(v.value(i));
    }
    BytesVector::new(table, v.nulls.pick(index))
}

fn pick_dict(d: &DictVector, index: &[u32]) -> Vector {
    let nulls = d.nulls.pick(index);
    let mut counts = vec![0u32; d.inner.len() as usize];
    let mut out = Vec::with_capacity(index.len());
    for (k, &i) in index.iter().enumerate() {
        let tag = d.index[i as usize];
        out.push(tag);
        if !nulls.value(k as u32) {
            counts[tag as usize] += 1;
        }
    }
    Vector::dict(d.inner.clone(), out, counts, nulls)
}

/// Regroups a tag array by child: picks each child at its share of `index` and renumbers tags.
pub(crate) fn pick_dynamic(d: &DynamicVector, index: &[u32]) -> (Vec<u32>, Vec<Vector>) {
    let map = d.tag_map();
    let mut child_index: Vec<Vec<u32>> = vec![Vec::new(); d.values.len()];
    let mut tags = Vec::with_capacity(index.len());
    for &slot in index {
        let tag = d.tags[slot as usize];
        tags.push(tag);
        child_index[tag as usize].push(map.forward[slot as usize]);
    }
    let values = d
        .values
        .iter()
        .zip(&child_index)
        .map(|(child, idx)| pick(child, idx))
        .collect();
    (tags, values)
}

/// Offsets and element positions for the rows at `index` of an offsets array.
pub(crate) fn regroup_offsets(offsets: &[u32], index: &[u32]) -> (Vec<u32>, Vec<u32>) {
    let mut out = Vec::with_capacity(index.len() + 1);
    let mut elems = Vec::new();
    out.push(0);
    for &i in index {
        let (start, end) = (offsets[i as usize], offsets[i as usize + 1]);
        elems.extend(start..end);
        out.push(elems.len() as u32);
    }
    (out, elems)
}

/// Convenience for `ArrayVector` consumers that want the element rows of one slot.
pub fn elements_of(a: &ArrayVector, slot: u32) -> Vector {
    let (start, end) = a.range(slot);
    let idx: Vec<u32> = (start..end).collect();
    pick(&a.values, &idx)
}

/// The key and value rows of one map slot.
pub fn entries_of(m: &MapVector, slot: u32) -> (Vector, Vector) {
    let (start, end) = m.range(slot);
    let idx: Vec<u32> = (start..end).collect();
    (pick(&m.keys, &idx), pick(&m.values, &idx))
}
