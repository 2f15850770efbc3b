//! Column containers.
//!
//! A [`Vector`] is an immutable, cheaply clonable handle to one column. Every variant wraps an
//! `Arc` so that dictionaries, views, unions and dynamics can share their inner columns.
//!
//! - Flat variants (`Int`, `String`, `Record`, ...) carry storage plus an optional null mask.
//! - `Const`, `Dict` and `View` are encodings over another value or column.
//! - `Dynamic` mixes columns of different types under a tag array.

mod container;
mod dynamic;
mod encoded;
mod primitive;

pub use container::{ArrayVector, ErrorVector, MapVector, NamedVector, RecordVector, UnionVector};
pub use dynamic::{DynamicVector, TagMap};
pub use encoded::{ConstVector, DictVector, ViewVector};
pub use primitive::{
    BoolVector, BytesTable, BytesVector, EnumVector, FloatVector, IntVector, IpVector, NetVector,
    UintVector,
};
pub(crate) use primitive::{zero_net, UNSPECIFIED_IP};

use crate::bitmap::BitVec;
use crate::context::TypeContext;
use crate::encoding::{self, append_container};
use crate::error::TypeResult;
use crate::types::{Field, Type};
use crate::value::{Net, Value};
use std::net::IpAddr;
use std::sync::Arc;

#[derive(Clone, Debug)]
pub enum Vector {
    Int(Arc<IntVector>),
    Uint(Arc<UintVector>),
    Float(Arc<FloatVector>),
    Bool(Arc<BoolVector>),
    String(Arc<BytesVector>),
    Bytes(Arc<BytesVector>),
    TypeValue(Arc<BytesVector>),
    Ip(Arc<IpVector>),
    Net(Arc<NetVector>),
    Enum(Arc<EnumVector>),
    Array(Arc<ArrayVector>),
    Set(Arc<ArrayVector>),
    Map(Arc<MapVector>),
    Record(Arc<RecordVector>),
    Union(Arc<UnionVector>),
    Named(Arc<NamedVector>),
    Error(Arc<ErrorVector>),
    Const(Arc<ConstVector>),
    Dict(Arc<DictVector>),
    View(Arc<ViewVector>),
    Dynamic(Arc<DynamicVector>),
}

/// Physical encoding class, used to select arithmetic and comparison kernels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Form {
    Flat,
    Dict,
    View,
    Const,
}

impl Vector {
    pub fn int(ty: Type, values: Vec<i64>, nulls: BitVec) -> Vector {
        Vector::Int(Arc::new(IntVector::new(ty, values, nulls)))
    }

    pub fn int64s(values: Vec<i64>) -> Vector {
        Vector::int(Type::Int64, values, BitVec::zero())
    }

    pub fn uint(ty: Type, values: Vec<u64>, nulls: BitVec) -> Vector {
        Vector::Uint(Arc::new(UintVector::new(ty, values, nulls)))
    }

    pub fn float(ty: Type, values: Vec<f64>, nulls: BitVec) -> Vector {
        Vector::Float(Arc::new(FloatVector::new(ty, values, nulls)))
    }

    pub fn bool(bits: BitVec, nulls: BitVec) -> Vector {
        Vector::Bool(Arc::new(BoolVector::new(bits, nulls)))
    }

    pub fn string(table: BytesTable, nulls: BitVec) -> Vector {
        Vector::String(Arc::new(BytesVector::new(table, nulls)))
    }

    pub fn strings<'a>(values: impl IntoIterator<Item = &'a str>) -> Vector {
        let table = BytesTable::from_strs(values.into_iter().map(str::as_bytes));
        Vector::string(table, BitVec::zero())
    }

    pub fn bytes(table: BytesTable, nulls: BitVec) -> Vector {
        Vector::Bytes(Arc::new(BytesVector::new(table, nulls)))
    }

    pub fn type_values(table: BytesTable, nulls: BitVec) -> Vector {
        Vector::TypeValue(Arc::new(BytesVector::new(table, nulls)))
    }

    pub fn ip(values: Vec<IpAddr>, nulls: BitVec) -> Vector {
        Vector::Ip(Arc::new(IpVector::new(values, nulls)))
    }

    pub fn net(values: Vec<Net>, nulls: BitVec) -> Vector {
        Vector::Net(Arc::new(NetVector::new(values, nulls)))
    }

    pub fn enumeration(ty: Type, values: Vec<u64>, nulls: BitVec) -> Vector {
        Vector::Enum(Arc::new(EnumVector::new(ty, values, nulls)))
    }

    pub fn array(ty: Type, offsets: Vec<u32>, values: Vector, nulls: BitVec) -> Vector {
        Vector::Array(Arc::new(ArrayVector::new(ty, offsets, values, nulls)))
    }

    pub fn set(ty: Type, offsets: Vec<u32>, values: Vector, nulls: BitVec) -> Vector {
        Vector::Set(Arc::new(ArrayVector::new(ty, offsets, values, nulls)))
    }

    /// An array or set column, chosen by `ty`.
    pub fn list(ty: Type, offsets: Vec<u32>, values: Vector, nulls: BitVec) -> Vector {
        match ty.under() {
            Type::Set(_) => Vector::set(ty, offsets, values, nulls),
            _ => Vector::array(ty, offsets, values, nulls),
        }
    }

    pub fn map(ty: Type, offsets: Vec<u32>, keys: Vector, values: Vector, nulls: BitVec) -> Vector {
        Vector::Map(Arc::new(MapVector::new(ty, offsets, keys, values, nulls)))
    }

    pub fn record(ty: Type, fields: Vec<Vector>, len: u32, nulls: BitVec) -> Vector {
        Vector::Record(Arc::new(RecordVector::new(ty, fields, len, nulls)))
    }

    /// Builds a record column, interning the record type from the field names and column types.
    ///
    /// Every column must be homogeneous; use [`crate::RecordBuilder`] for dynamic columns.
    pub fn record_of(
        ctx: &TypeContext,
        names: &[&str],
        fields: Vec<Vector>,
        len: u32,
    ) -> TypeResult<Vector> {
        let typed = names
            .iter()
            .zip(&fields)
            .map(|(name, v)| Field::new(*name, v.ty()))
            .collect();
        let ty = ctx.lookup_record(typed)?;
        Ok(Vector::record(ty, fields, len, BitVec::zero()))
    }

    /// A union column with full-length `tags`; null slots must already point at the trailing
    /// null child (see [`crate::flatten_union_nulls`]).
    pub fn union(ty: Type, tags: Vec<u32>, values: Vec<Vector>, nulls: BitVec) -> Vector {
        Vector::Union(Arc::new(UnionVector::new(ty, tags, values, nulls)))
    }

    pub fn named(ty: Type, inner: Vector) -> Vector {
        Vector::Named(Arc::new(NamedVector { ty, inner }))
    }

    pub fn error(ty: Type, inner: Vector, nulls: BitVec) -> Vector {
        Vector::Error(Arc::new(ErrorVector { ty, inner, nulls }))
    }

    pub fn constant(value: Value, len: u32, nulls: BitVec) -> Vector {
        Vector::Const(Arc::new(ConstVector::new(value, len, nulls)))
    }

    pub fn const_null(len: u32) -> Vector {
        Vector::constant(Value::null_value(), len, BitVec::zero())
    }

    pub fn dict(inner: Vector, index: Vec<u8>, counts: Vec<u32>, nulls: BitVec) -> Vector {
        Vector::Dict(Arc::new(DictVector::new(inner, index, counts, nulls)))
    }

    /// A view of `inner` at `index`. Views over views compose their indexes.
    pub fn view(inner: Vector, index: Vec<u32>) -> Vector {
        match inner {
            Vector::View(v) => {
                let index = index.iter().map(|&i| v.index[i as usize]).collect();
                Vector::View(Arc::new(ViewVector {
                    inner: v.inner.clone(),
                    index,
                }))
            }
            inner => Vector::View(Arc::new(ViewVector { inner, index })),
        }
    }

    pub fn dynamic(tags: Vec<u32>, values: Vec<Vector>) -> Vector {
        Vector::Dynamic(Arc::new(DynamicVector::new(tags, values)))
    }

    /// An error column whose payload is `msg` at every slot.
    pub fn string_error(ctx: &TypeContext, msg: &str, len: u32) -> Vector {
        let inner = Vector::constant(Value::string(msg), len, BitVec::zero());
        Vector::error(ctx.string_error_type(), inner, BitVec::zero())
    }

    pub fn missing(ctx: &TypeContext, len: u32) -> Vector {
        Vector::string_error(ctx, "missing", len)
    }

    pub fn quiet(ctx: &TypeContext, len: u32) -> Vector {
        Vector::string_error(ctx, "quiet", len)
    }

    /// An error column of `{message:string,on:T}` records describing a failure on `on`.
    pub fn wrapped_error(ctx: &TypeContext, msg: &str, on: &Vector) -> Vector {
        let len = on.len();
        let message = Vector::constant(Value::string(msg), len, BitVec::zero());
        let fields = vec![message, on.clone()];
        let rec = match on {
            Vector::Dynamic(_) => None,
            _ => Vector::record_of(ctx, &["message", "on"], fields, len).ok(),
        };
        match rec {
            Some(rec) => {
                let ty = ctx.lookup_error(&rec.ty());
                Vector::error(ty, rec, BitVec::zero())
            }
            None => Vector::string_error(ctx, msg, len),
        }
    }

    /// Builds a column from a sequence of values (see [`crate::DynamicBuilder`]).
    pub fn from_values(values: &[Value]) -> Vector {
        let mut b = crate::builder::DynamicBuilder::new();
        for v in values {
            b.write(v);
        }
        b.build()
    }

    pub fn len(&self) -> u32 {
        match self {
            Vector::Int(v) => v.values.len() as u32,
            Vector::Uint(v) => v.values.len() as u32,
            Vector::Float(v) => v.values.len() as u32,
            Vector::Bool(v) => v.bits.len() as u32,
            Vector::String(v) | Vector::Bytes(v) | Vector::TypeValue(v) => v.len(),
            Vector::Ip(v) => v.values.len() as u32,
            Vector::Net(v) => v.values.len() as u32,
            Vector::Enum(v) => v.values.len() as u32,
            Vector::Array(v) | Vector::Set(v) => v.len(),
            Vector::Map(v) => v.len(),
            Vector::Record(v) => v.len,
            Vector::Union(v) => v.dynamic.len(),
            Vector::Named(v) => v.inner.len(),
            Vector::Error(v) => v.inner.len(),
            Vector::Const(v) => v.len,
            Vector::Dict(v) => v.index.len() as u32,
            Vector::View(v) => v.index.len() as u32,
            Vector::Dynamic(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The static type of the column. A `Dynamic` has none and reports `null`.
    pub fn ty(&self) -> Type {
        match self {
            Vector::Int(v) => v.ty.clone(),
            Vector::Uint(v) => v.ty.clone(),
            Vector::Float(v) => v.ty.clone(),
            Vector::Bool(_) => Type::Bool,
            Vector::String(_) => Type::String,
            Vector::Bytes(_) => Type::Bytes,
            Vector::TypeValue(_) => Type::TypeValue,
            Vector::Ip(_) => Type::Ip,
            Vector::Net(_) => Type::Net,
            Vector::Enum(v) => v.ty.clone(),
            Vector::Array(v) | Vector::Set(v) => v.ty.clone(),
            Vector::Map(v) => v.ty.clone(),
            Vector::Record(v) => v.ty.clone(),
            Vector::Union(v) => v.ty.clone(),
            Vector::Named(v) => v.ty.clone(),
            Vector::Error(v) => v.ty.clone(),
            Vector::Const(v) => v.value.ty().clone(),
            Vector::Dict(v) => v.inner.ty(),
            Vector::View(v) => v.inner.ty(),
            Vector::Dynamic(_) => Type::Null,
        }
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self, Vector::Dynamic(_))
    }

    /// Type of the value at `slot`; differs from [`Vector::ty`] only for dynamics.
    pub fn type_at(&self, slot: u32) -> Type {
        match self {
            Vector::Dynamic(d) => {
                let (child, k) = d.locate(slot);
                child.type_at(k)
            }
            Vector::View(v) => v.inner.type_at(v.index[slot as usize]),
            v => v.ty(),
        }
    }

    pub fn form(&self) -> Form {
        match self {
            Vector::Const(_) => Form::Const,
            Vector::Dict(_) => Form::Dict,
            Vector::View(_) => Form::View,
            _ => Form::Flat,
        }
    }

    /// Strips `Named` wrappers.
    pub fn under(&self) -> &Vector {
        let mut v = self;
        while let Vector::Named(n) = v {
            v = &n.inner;
        }
        v
    }

    pub fn value_at(&self, slot: u32) -> Value {
        let ty = self.type_at(slot);
        let mut buf = Vec::new();
        if self.append_slot(slot, &mut buf) {
            Value::new(ty, Some(buf))
        } else {
            Value::null(ty)
        }
    }

    /// Materializes every row.
    pub fn values(&self) -> Vec<Value> {
        (0..self.len()).map(|slot| self.value_at(slot)).collect()
    }

    /// Appends the canonical encoding of `slot` to `out`; returns `false` (appending nothing)
    /// when the slot is null.
    pub fn append_slot(&self, slot: u32, out: &mut Vec<u8>) -> bool {
        let i = slot as usize;
        match self {
            Vector::Int(v) => {
                if v.nulls.value(slot) {
                    return false;
                }
                out.extend_from_slice(&v.values[i].to_le_bytes());
            }
            Vector::Uint(v) => {
                if v.nulls.value(slot) {
                    return false;
                }
                out.extend_from_slice(&v.values[i].to_le_bytes());
            }
            Vector::Float(v) => {
                if v.nulls.value(slot) {
                    return false;
                }
                out.extend_from_slice(&encoding::encode_float(v.ty.id(), v.values[i]));
            }
            Vector::Bool(v) => {
                if v.nulls.value(slot) {
                    return false;
                }
                out.push(u8::from(v.bits.get(i)));
            }
            Vector::String(v) | Vector::Bytes(v) | Vector::TypeValue(v) => {
                if v.nulls.value(slot) {
                    return false;
                }
                out.extend_from_slice(v.value(slot));
            }
            Vector::Ip(v) => {
                if v.nulls.value(slot) {
                    return false;
                }
                out.extend_from_slice(&encoding::encode_ip(v.values[i]));
            }
            Vector::Net(v) => {
                if v.nulls.value(slot) {
                    return false;
                }
                out.extend_from_slice(&encoding::encode_net(v.values[i]));
            }
            Vector::Enum(v) => {
                if v.nulls.value(slot) {
                    return false;
                }
                out.extend_from_slice(&v.values[i].to_le_bytes());
            }
            Vector::Array(v) => {
                if v.nulls.value(slot) {
                    return false;
                }
                let (start, end) = v.range(slot);
                for k in start..end {
                    append_elem(&v.values, k, out);
                }
            }
            Vector::Set(v) => {
                if v.nulls.value(slot) {
                    return false;
                }
                let (start, end) = v.range(slot);
                let mut elems: Vec<Vec<u8>> = (start..end)
                    .map(|k| {
                        let mut e = Vec::new();
                        append_elem(&v.values, k, &mut e);
                        e
                    })
                    .collect();
                elems.sort();
                elems.dedup();
                for e in elems {
                    out.extend_from_slice(&e);
                }
            }
            Vector::Map(v) => {
                if v.nulls.value(slot) {
                    return false;
                }
                let (start, end) = v.range(slot);
                let mut entries: Vec<(Vec<u8>, Vec<u8>)> = (start..end)
                    .map(|k| {
                        let mut key = Vec::new();
                        append_elem(&v.keys, k, &mut key);
                        let mut val = Vec::new();
                        append_elem(&v.values, k, &mut val);
                        (key, val)
                    })
                    .collect();
                entries.sort_by(|a, b| a.0.cmp(&b.0));
                entries.dedup_by(|a, b| a.0 == b.0);
                for (key, val) in entries {
                    out.extend_from_slice(&key);
                    out.extend_from_slice(&val);
                }
            }
            Vector::Record(v) => {
                if v.nulls.value(slot) {
                    return false;
                }
                for field in &v.fields {
                    append_elem(field, slot, out);
                }
            }
            Vector::Union(v) => {
                if v.nulls.value(slot) {
                    return false;
                }
                let tag = v.tags()[i];
                if tag as usize >= v.member_count() {
                    return false;
                }
                let (child, k) = v.dynamic.locate(slot);
                encoding::append_uvarint(out, u64::from(tag));
                append_elem(child, k, out);
            }
            Vector::Named(v) => return v.inner.append_slot(slot, out),
            Vector::Error(v) => {
                if v.nulls.value(slot) {
                    return false;
                }
                return v.inner.append_slot(slot, out);
            }
            Vector::Const(v) => {
                if v.nulls.value(slot) {
                    return false;
                }
                match v.value.bytes() {
                    Some(b) => out.extend_from_slice(b),
                    None => return false,
                }
            }
            Vector::Dict(v) => {
                if v.nulls.value(slot) {
                    return false;
                }
                return v.inner.append_slot(u32::from(v.index[i]), out);
            }
            Vector::View(v) => return v.inner.append_slot(v.index[i], out),
            Vector::Dynamic(v) => {
                let (child, k) = v.locate(slot);
                return child.append_slot(k, out);
            }
        }
        true
    }

    /// Appends a hashable key for `slot`: the type ID, a null marker and the encoding.
    ///
    /// Equal keys imply equal type and value, so keys from heterogeneous columns never collide.
    pub fn append_key(&self, slot: u32, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.type_at(slot).id().to_le_bytes());
        let mark = out.len();
        out.push(1);
        if !self.append_slot(slot, out) {
            out[mark] = 0;
        }
    }
}

/// Appends one container element (length-prefixed, or the null marker).
pub fn append_elem(v: &Vector, slot: u32, out: &mut Vec<u8>) {
    let mut tmp = Vec::new();
    if v.append_slot(slot, &mut tmp) {
        append_container(out, Some(&tmp));
    } else {
        append_container(out, None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn null_slots_serialize_as_null() {
        let v = Vector::int(
            Type::Int64,
            vec![1, 99, 3],
            BitVec::from_positions(3, &[1]),
        );
        let Vector::Int(inner) = &v else {
            unreachable!()
        };
        assert_eq!(inner.values, vec![1, 0, 3]);
        assert_eq!(v.value_at(1), Value::null(Type::Int64));
        assert_eq!(v.value_at(2), Value::int64(3));
    }

    #[test]
    fn views_compose() {
        let base = Vector::int64s(vec![10, 20, 30, 40]);
        let v1 = Vector::view(base, vec![3, 2, 1]);
        let v2 = Vector::view(v1, vec![0, 2]);
        let Vector::View(view) = &v2 else {
            unreachable!()
        };
        assert!(matches!(view.inner, Vector::Int(_)));
        assert_eq!(view.index, vec![3, 1]);
        assert_eq!(v2.values(), vec![Value::int64(40), Value::int64(20)]);
    }

    #[test]
    fn dynamic_reads_through_the_tag_map() {
        let d = Vector::dynamic(
            vec![0, 1, 0],
            vec![Vector::int64s(vec![1, 2]), Vector::strings(["x"])],
        );
        assert_eq!(d.len(), 3);
        assert_eq!(d.ty(), Type::Null);
        assert_eq!(d.type_at(1), Type::String);
        assert_eq!(
            d.values(),
            vec![Value::int64(1), Value::string("x"), Value::int64(2)]
        );
    }

    #[test]
    fn keys_separate_types_and_nulls() {
        let ints = Vector::int(Type::Int64, vec![0, 0], BitVec::from_positions(2, &[1]));
        let uints = Vector::uint(Type::Uint64, vec![0], BitVec::zero());
        let (mut a, mut b, mut c) = (Vec::new(), Vec::new(), Vec::new());
        ints.append_key(0, &mut a);
        ints.append_key(1, &mut b);
        uints.append_key(0, &mut c);
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn sets_serialize_sorted_and_deduped() {
        let ctx = TypeContext::new();
        let ty = ctx.lookup_set(&Type::Int64);
        let set = Vector::set(ty, vec![0, 3], Vector::int64s(vec![3, 1, 3]), BitVec::zero());
        assert_eq!(set.value_at(0).to_string(), "|[1,3]|");
    }

    #[test]
    fn string_errors_format_as_errors() {
        let ctx = TypeContext::new();
        let e = Vector::string_error(&ctx, "divide by zero", 2);
        assert_eq!(e.value_at(1).to_string(), "error(\"divide by zero\")");
        assert!(Vector::missing(&ctx, 1).value_at(0).is_missing());
    }
}
