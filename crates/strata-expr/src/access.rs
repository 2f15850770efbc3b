//! Form-aware readers over primitive columns.
//!
//! Kernels read operands through [`Slots`], which keeps the physical form (flat, const, dict,
//! view) visible so the kernel macros can specialize their loops per form pair.

use strata_vector::vector::{ArrayVector, BytesTable, MapVector, RecordVector};
use strata_vector::{
    add_nulls, gather_rows, nulls_of, pick, BitVec, Builder, Type, Value, Vector,
};

#[derive(Clone, Copy, Debug)]
pub(crate) enum Slots<'a, T> {
    Flat(&'a [T]),
    Const(T),
    Dict(&'a [T], &'a [u8]),
    View(&'a [T], &'a [u32]),
}

impl<T: Copy> Slots<'_, T> {
    #[inline]
    pub(crate) fn get(&self, i: usize) -> T {
        match self {
            Slots::Flat(v) => v[i],
            Slots::Const(c) => *c,
            Slots::Dict(v, index) => v[index[i] as usize],
            Slots::View(v, index) => v[index[i] as usize],
        }
    }
}

/// Bytes of a string, bytes or type-value column in any form.
#[derive(Clone, Copy, Debug)]
pub(crate) enum ByteSlots<'a> {
    Flat(&'a BytesTable),
    Const(&'a [u8]),
    Dict(&'a BytesTable, &'a [u8]),
    View(&'a BytesTable, &'a [u32]),
}

impl<'a> ByteSlots<'a> {
    #[inline]
    pub(crate) fn get(&self, i: usize) -> &'a [u8] {
        match self {
            ByteSlots::Flat(t) => t.value(i as u32),
            ByteSlots::Const(b) => b,
            ByteSlots::Dict(t, index) => t.value(u32::from(index[i])),
            ByteSlots::View(t, index) => t.value(index[i]),
        }
    }

    pub(crate) fn str(&self, i: usize) -> &'a str {
        std::str::from_utf8(self.get(i)).unwrap_or("")
    }
}

macro_rules! slots_reader {
    ($name:ident, $t:ty, $variant:ident, $decode:ident) => {
        pub(crate) fn $name(v: &Vector) -> Option<Slots<'_, $t>> {
            match v.under() {
                Vector::$variant(x) => Some(Slots::Flat(&x.values)),
                Vector::Const(c) => Some(Slots::Const(c.value.$decode().unwrap_or_default())),
                Vector::Dict(d) => match d.inner.under() {
                    Vector::$variant(x) => Some(Slots::Dict(&x.values, &d.index)),
                    _ => None,
                },
                Vector::View(view) => match view.inner.under() {
                    Vector::$variant(x) => Some(Slots::View(&x.values, &view.index)),
                    _ => None,
                },
                _ => None,
            }
        }
    };
}

slots_reader!(ints, i64, Int, as_int);
slots_reader!(uints, u64, Uint, as_uint);
slots_reader!(floats, f64, Float, as_float);

pub(crate) fn byte_slots(v: &Vector) -> Option<ByteSlots<'_>> {
    fn table(v: &Vector) -> Option<&BytesTable> {
        match v.under() {
            Vector::String(b) | Vector::Bytes(b) | Vector::TypeValue(b) => Some(&b.table),
            _ => None,
        }
    }
    match v.under() {
        Vector::Const(c) => Some(ByteSlots::Const(c.value.bytes().unwrap_or_default())),
        Vector::Dict(d) => table(&d.inner).map(|t| ByteSlots::Dict(t, &d.index)),
        Vector::View(view) => table(&view.inner).map(|t| ByteSlots::View(t, &view.index)),
        v => table(v).map(ByteSlots::Flat),
    }
}

/// Rewrites `v` so that the `Slots` readers accept it: nested encodings are gathered and
/// enums become their `uint64` index.
pub(crate) fn normalize(v: &Vector) -> Vector {
    match v.under() {
        Vector::Enum(e) => Vector::uint(Type::Uint64, e.values.clone(), e.nulls.clone()),
        Vector::View(view) => match view.inner.under() {
            Vector::Int(_)
            | Vector::Uint(_)
            | Vector::Float(_)
            | Vector::String(_)
            | Vector::Bytes(_)
            | Vector::TypeValue(_) => v.under().clone(),
            inner => normalize(&gather_rows(inner, &view.index)),
        },
        Vector::Dict(d) => match d.inner.under() {
            Vector::Int(_)
            | Vector::Uint(_)
            | Vector::Float(_)
            | Vector::String(_)
            | Vector::Bytes(_)
            | Vector::TypeValue(_) => v.under().clone(),
            inner => {
                let index: Vec<u32> = d.index.iter().map(|&k| u32::from(k)).collect();
                normalize(&add_nulls(&pick(inner, &index), &d.nulls))
            }
        },
        Vector::Const(c) => match c.value.ty().under() {
            Type::Enum(_) => {
                let value = c
                    .value
                    .bytes()
                    .map(|_| Value::uint64(c.value.as_uint().unwrap_or_default()))
                    .unwrap_or_else(|| Value::null(Type::Uint64));
                Vector::constant(value, c.len, c.nulls.clone())
            }
            _ => v.under().clone(),
        },
        v => v.clone(),
    }
}

/// Bits and nulls of a bool column (flat, const, dict or view), each at full length.
pub(crate) fn flatten_bool(v: &Vector) -> Option<(BitVec, BitVec)> {
    let n = v.len() as usize;
    match v.under() {
        Vector::Bool(b) => Some((b.bits.expand(n), b.nulls.clone())),
        Vector::Const(c) => {
            if c.value.is_null() {
                return Some((BitVec::with_len_all_false(n), BitVec::with_len_all_true(n)));
            }
            let truth = c.value.as_bool()?;
            let bits = if truth {
                BitVec::with_len_all_true(n)
            } else {
                BitVec::with_len_all_false(n)
            };
            let nulls = c.nulls.clone();
            Some((BitVec::and_not(&bits, &nulls).expand(n), nulls))
        }
        Vector::Dict(_) | Vector::View(_) => {
            let flat = normalize_bool(v)?;
            flatten_bool(&flat)
        }
        _ => None,
    }
}

fn normalize_bool(v: &Vector) -> Option<Vector> {
    match v.under() {
        Vector::View(view) => Some(gather_rows(&view.inner, &view.index)),
        Vector::Dict(d) => {
            let index: Vec<u32> = d.index.iter().map(|&k| u32::from(k)).collect();
            Some(add_nulls(&pick(&d.inner, &index), &d.nulls))
        }
        _ => None,
    }
}

/// Replaces a const of a container type by a view of a one-row column so that container
/// kernels only deal with flat storage and views.
pub(crate) fn expand_const(v: &Vector) -> Vector {
    match v.under() {
        Vector::Const(c) if !c.value.is_null() && !c.value.ty().is_primitive() => {
            let mut b = Builder::new(c.value.ty());
            b.write(c.value.bytes());
            let row = Vector::view(b.build(), vec![0; c.len as usize]);
            add_nulls(&row, &c.nulls)
        }
        v => v.clone(),
    }
}

/// An array or set column and the rows a view selects from it.
pub(crate) fn list_parts(v: &Vector) -> Option<(&ArrayVector, Option<&[u32]>)> {
    match v.under() {
        Vector::Array(a) | Vector::Set(a) => Some((a, None)),
        Vector::View(view) => match view.inner.under() {
            Vector::Array(a) | Vector::Set(a) => Some((a, Some(&view.index))),
            _ => None,
        },
        _ => None,
    }
}

pub(crate) fn record_parts(v: &Vector) -> Option<(&RecordVector, Option<&[u32]>)> {
    match v.under() {
        Vector::Record(r) => Some((r, None)),
        Vector::View(view) => match view.inner.under() {
            Vector::Record(r) => Some((r, Some(&view.index))),
            _ => None,
        },
        _ => None,
    }
}

pub(crate) fn map_parts(v: &Vector) -> Option<(&MapVector, Option<&[u32]>)> {
    match v.under() {
        Vector::Map(m) => Some((m, None)),
        Vector::View(view) => match view.inner.under() {
            Vector::Map(m) => Some((m, Some(&view.index))),
            _ => None,
        },
        _ => None,
    }
}

/// True when every slot of `v` is null.
pub(crate) fn all_null(v: &Vector) -> bool {
    if let Vector::Const(c) = v.under() {
        if c.value.is_null() {
            return true;
        }
    }
    let nulls = nulls_of(v);
    !nulls.is_zero() && nulls.true_count() == v.len()
}

/// True when `v` is error-typed in any form: flat, constant, dictionary or view.
pub(crate) fn is_error(v: &Vector) -> bool {
    v.ty().is_error()
}

/// A bool column from a predicate over slot numbers.
pub(crate) fn bools_from(n: u32, nulls: BitVec, mut f: impl FnMut(usize) -> bool) -> Vector {
    let bits = BitVec::from_bools((0..n as usize).map(&mut f));
    Vector::bool(bits, nulls)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn readers_see_through_forms() {
        let flat = Vector::int64s(vec![5, 6, 7]);
        let view = Vector::view(flat.clone(), vec![2, 0]);
        let dict = Vector::dict(flat.clone(), vec![1, 1, 0], vec![1, 2, 0], BitVec::zero());
        let c = Vector::constant(Value::int64(9), 4, BitVec::zero());
        assert_eq!(ints(&view).map(|s| s.get(0)), Some(7));
        assert_eq!(ints(&dict).map(|s| s.get(1)), Some(6));
        assert_eq!(ints(&c).map(|s| s.get(3)), Some(9));
        assert!(uints(&flat).is_none());
    }

    #[test]
    fn enum_normalizes_to_index() {
        let ctx = strata_vector::TypeContext::new();
        let ty = ctx.lookup_enum(vec!["a".into(), "b".into()]);
        let v = Vector::enumeration(ty, vec![1, 0], BitVec::zero());
        let n = normalize(&v);
        assert_eq!(n.values(), vec![Value::uint64(1), Value::uint64(0)]);
    }
}
