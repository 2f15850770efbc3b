//! Elementwise dispatch over heterogeneous inputs.
//!
//! [`apply`] splits every `Dynamic` argument into its homogeneous children, calls the kernel
//! once per child with the other arguments picked to match, and [`stitch`]es the results back
//! into input order.

use crate::bitmap::BitVec;
use crate::pick::pick;
use crate::types::Type;
use crate::value::Value;
use crate::vector::{TagMap, Vector};
use std::sync::Arc;

/// Calls `eval` on homogeneous slices of `vecs` and reassembles the results.
///
/// With `rip_unions`, union arguments are first converted to dynamics so that `eval` only sees
/// their member columns.
pub fn apply<F>(rip_unions: bool, eval: &mut F, vecs: &[Vector]) -> Vector
where
    F: FnMut(&[Vector]) -> Vector,
{
    let prepared: Vec<Vector>;
    let vecs = if vecs.iter().any(|v| needs_prep(v, rip_unions)) {
        prepared = vecs.iter().map(|v| prep(v, rip_unions)).collect();
        &prepared[..]
    } else {
        vecs
    };

    let Some(pos) = vecs.iter().position(Vector::is_dynamic) else {
        return eval(vecs);
    };
    let Vector::Dynamic(d) = &vecs[pos] else {
        unreachable!("position matched a dynamic");
    };

    let map = d.tag_map();
    let mut results = Vec::with_capacity(d.values.len());
    for (tag, child) in d.values.iter().enumerate() {
        let index = &map.reverse[tag];
        if index.is_empty() {
            results.push(Vector::const_null(0));
            continue;
        }
        let args: Vec<Vector> = vecs
            .iter()
            .enumerate()
            .map(|(k, v)| if k == pos { child.clone() } else { pick(v, index) })
            .collect();
        results.push(apply(rip_unions, eval, &args));
    }
    stitch(&d.tags, results)
}

fn needs_prep(v: &Vector, rip_unions: bool) -> bool {
    match v {
        Vector::View(view) => {
            matches!(view.inner.under(), Vector::Dynamic(_) | Vector::Union(_))
        }
        v => rip_unions && matches!(v.under(), Vector::Union(_)),
    }
}

// Views over heterogeneous columns are regrouped so the dynamic is visible to `apply`.
fn prep(v: &Vector, rip_unions: bool) -> Vector {
    match v {
        Vector::View(view)
            if matches!(view.inner.under(), Vector::Dynamic(_) | Vector::Union(_)) =>
        {
            prep(&pick(view.inner.under(), &view.index), rip_unions)
        }
        v if rip_unions => match v.under() {
            Vector::Union(u) => Vector::Dynamic(Arc::clone(&u.dynamic)),
            _ => v.clone(),
        },
        v => v.clone(),
    }
}

/// Reassembles per-tag results into one dynamic, flattening dynamic results.
pub fn stitch(tags: &[u32], results: Vec<Vector>) -> Vector {
    if !results.iter().any(Vector::is_dynamic) {
        return Vector::dynamic(tags.to_vec(), results);
    }
    let map = TagMap::new(tags, results.len());
    let mut offsets = Vec::with_capacity(results.len());
    let mut values = Vec::new();
    for r in &results {
        offsets.push(values.len() as u32);
        match r {
            Vector::Dynamic(d) => values.extend(d.values.iter().cloned()),
            r => values.push(r.clone()),
        }
    }
    let new_tags = tags
        .iter()
        .zip(&map.forward)
        .map(|(&tag, &k)| match &results[tag as usize] {
            Vector::Dynamic(d) => offsets[tag as usize] + d.tags[k as usize],
            _ => offsets[tag as usize],
        })
        .collect();
    Vector::dynamic(new_tags, values)
}

/// The dynamic underlying a union column, including its null child.
pub fn deunion(v: &Vector) -> Vector {
    match v.under() {
        Vector::Union(u) => Vector::Dynamic(Arc::clone(&u.dynamic)),
        v => v.clone(),
    }
}

/// Expands dense union tags (one per non-null slot) to full length, pointing null slots at a
/// trailing const-null child of the union type.
pub fn flatten_union_nulls(
    ty: &Type,
    tags: &[u32],
    mut values: Vec<Vector>,
    nulls: &BitVec,
) -> (Vec<u32>, Vec<Vector>) {
    if !nulls.any() {
        return (tags.to_vec(), values);
    }
    let null_tag = values.len() as u32;
    let n = tags.len() + nulls.count_ones();
    let mut out = Vec::with_capacity(n);
    let mut dense = tags.iter();
    let mut nnull = 0u32;
    for slot in 0..n as u32 {
        if nulls.value(slot) {
            out.push(null_tag);
            nnull += 1;
        } else if let Some(&tag) = dense.next() {
            out.push(tag);
        }
    }
    values.push(Vector::constant(Value::null(ty.clone()), nnull, BitVec::zero()));
    (out, values)
}

/// A union column from dense tags and a null mask.
pub fn union_with_nulls(ty: Type, tags: &[u32], values: Vec<Vector>, nulls: BitVec) -> Vector {
    let (tags, values) = flatten_union_nulls(&ty, tags, values, &nulls);
    let nulls = nulls.compact();
    Vector::union(ty, tags, values, nulls)
}

/// A column of `base.len() + index.len()` rows: slots listed in `index` (ascending) come from
/// `other` in order, the rest from `base` in order.
pub fn combine(base: &Vector, index: &[u32], other: &Vector) -> Vector {
    if index.is_empty() {
        return base.clone();
    }
    if base.is_empty() {
        return other.clone();
    }
    let n = base.len() as usize + index.len();
    let mut tags = vec![0u32; n];
    for &slot in index {
        tags[slot as usize] = 1;
    }
    stitch(&tags, vec![base.clone(), other.clone()])
}

/// Strips `Named` wrappers.
pub fn under(v: &Vector) -> &Vector {
    v.under()
}
