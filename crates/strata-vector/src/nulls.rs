use crate::bitmap::BitVec;
use crate::pick::{gather_rows, pick};
use crate::vector::Vector;
use std::sync::Arc;

/// The null mask of `v` at its logical length (possibly the zero mask).
pub fn nulls_of(v: &Vector) -> BitVec {
    match v {
        Vector::Int(v) => v.nulls.clone(),
        Vector::Uint(v) => v.nulls.clone(),
        Vector::Float(v) => v.nulls.clone(),
        Vector::Bool(v) => v.nulls.clone(),
        Vector::String(v) | Vector::Bytes(v) | Vector::TypeValue(v) => v.nulls.clone(),
        Vector::Ip(v) => v.nulls.clone(),
        Vector::Net(v) => v.nulls.clone(),
        Vector::Enum(v) => v.nulls.clone(),
        Vector::Array(v) | Vector::Set(v) => v.nulls.clone(),
        Vector::Map(v) => v.nulls.clone(),
        Vector::Record(v) => v.nulls.clone(),
        Vector::Union(v) => v.nulls.clone(),
        Vector::Named(v) => nulls_of(&v.inner),
        Vector::Error(v) => BitVec::or(&v.nulls, &nulls_of(&v.inner)),
        Vector::Const(v) => {
            if v.value.is_null() {
                BitVec::with_len_all_true(v.len as usize)
            } else {
                v.nulls.clone()
            }
        }
        Vector::Dict(v) => v.nulls.clone(),
        Vector::View(v) => nulls_of(&v.inner).pick(&v.index),
        Vector::Dynamic(d) => {
            let child_nulls: Vec<BitVec> = d.values.iter().map(nulls_of).collect();
            if child_nulls.iter().all(BitVec::is_zero) {
                return BitVec::zero();
            }
            let map = d.tag_map();
            BitVec::from_bools(
                d.tags
                    .iter()
                    .zip(&map.forward)
                    .map(|(&tag, &k)| child_nulls[tag as usize].value(k)),
            )
            .compact()
        }
    }
}

/// Returns a copy of `v` whose null mask is `nulls`.
///
/// Storage at newly null slots is zeroed by the vector constructors. A const null stays null.
pub fn copy_and_set_nulls(v: &Vector, nulls: &BitVec) -> Vector {
    match v {
        Vector::Int(v) => Vector::int(v.ty.clone(), v.values.clone(), nulls.clone()),
        Vector::Uint(v) => Vector::uint(v.ty.clone(), v.values.clone(), nulls.clone()),
        Vector::Float(v) => Vector::float(v.ty.clone(), v.values.clone(), nulls.clone()),
        Vector::Bool(v) => Vector::bool(v.bits.clone(), nulls.clone()),
        Vector::String(v) => Vector::string(v.table.clone(), nulls.clone()),
        Vector::Bytes(v) => Vector::bytes(v.table.clone(), nulls.clone()),
        Vector::TypeValue(v) => Vector::type_values(v.table.clone(), nulls.clone()),
        Vector::Ip(v) => Vector::ip(v.values.clone(), nulls.clone()),
        Vector::Net(v) => Vector::net(v.values.clone(), nulls.clone()),
        Vector::Enum(v) => Vector::enumeration(v.ty.clone(), v.values.clone(), nulls.clone()),
        Vector::Array(a) => Vector::array(
            a.ty.clone(),
            a.offsets.clone(),
            a.values.clone(),
            nulls.clone(),
        ),
        Vector::Set(a) => Vector::set(
            a.ty.clone(),
            a.offsets.clone(),
            a.values.clone(),
            nulls.clone(),
        ),
        Vector::Map(m) => Vector::map(
            m.ty.clone(),
            m.offsets.clone(),
            m.keys.clone(),
            m.values.clone(),
            nulls.clone(),
        ),
        Vector::Record(r) => {
            Vector::record(r.ty.clone(), r.fields.clone(), r.len, nulls.clone())
        }
        Vector::Union(u) => copy_and_set_nulls(&Vector::Dynamic(Arc::clone(&u.dynamic)), nulls),
        Vector::Named(n) => Vector::named(n.ty.clone(), copy_and_set_nulls(&n.inner, nulls)),
        Vector::Error(e) => Vector::error(
            e.ty.clone(),
            copy_and_set_nulls(&e.inner, nulls),
            nulls.clone(),
        ),
        Vector::Const(c) => {
            if c.value.is_null() {
                return v.clone();
            }
            Vector::constant(c.value.clone(), c.len, nulls.clone())
        }
        Vector::Dict(d) => {
            let mut counts = vec![0u32; d.inner.len() as usize];
            for (i, &tag) in d.index.iter().enumerate() {
                if !nulls.value(i as u32) {
                    counts[tag as usize] += 1;
                }
            }
            Vector::dict(d.inner.clone(), d.index.clone(), counts, nulls.clone())
        }
        Vector::View(view) => copy_and_set_nulls(&gather_rows(&view.inner, &view.index), nulls),
        Vector::Dynamic(d) => {
            let map = d.tag_map();
            let values = d
                .values
                .iter()
                .zip(&map.reverse)
                .map(|(child, parents)| copy_and_set_nulls(child, &nulls.pick(parents)))
                .collect();
            Vector::dynamic(d.tags.clone(), values)
        }
    }
}

/// Sets `nulls` on top of the existing nulls of `v`.
pub fn add_nulls(v: &Vector, nulls: &BitVec) -> Vector {
    if !nulls.any() {
        return v.clone();
    }
    copy_and_set_nulls(v, &BitVec::or(&nulls_of(v), nulls))
}

/// Rows of `v` that are not null.
pub fn pick_non_null(v: &Vector) -> Vector {
    let nulls = nulls_of(v);
    if !nulls.any() {
        return v.clone();
    }
    let keep: Vec<u32> = (0..v.len()).filter(|&i| !nulls.value(i)).collect();
    pick(v, &keep)
}
