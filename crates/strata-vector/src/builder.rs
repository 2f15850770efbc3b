//! Builders that turn streams of encoded values into vectors.

use crate::apply::union_with_nulls;
use crate::bitmap::BitVec;
use crate::encoding;
use crate::types::{self, Type};
use crate::value::{Net, Value};
use crate::vector::{BytesTable, Vector};
use ahash::AHashMap;
use std::net::IpAddr;

/// Accumulates values of one static type. Created with [`Builder::new`], which selects the
/// specialized layout for the type's kind.
#[derive(Debug)]
pub enum Builder {
    Int {
        ty: Type,
        values: Vec<i64>,
        nulls: BitVec,
    },
    Uint {
        ty: Type,
        values: Vec<u64>,
        nulls: BitVec,
    },
    Float {
        ty: Type,
        values: Vec<f64>,
        nulls: BitVec,
    },
    Bool {
        bits: BitVec,
        nulls: BitVec,
    },
    Bytes {
        ty: Type,
        table: BytesTable,
        nulls: BitVec,
    },
    Ip {
        values: Vec<IpAddr>,
        nulls: BitVec,
    },
    Net {
        values: Vec<Net>,
        nulls: BitVec,
    },
    Enum {
        ty: Type,
        values: Vec<u64>,
        nulls: BitVec,
    },
    Record {
        ty: Type,
        fields: Vec<Builder>,
        nulls: BitVec,
    },
    List {
        ty: Type,
        offsets: Vec<u32>,
        values: Box<Builder>,
        nulls: BitVec,
    },
    Map {
        ty: Type,
        offsets: Vec<u32>,
        keys: Box<Builder>,
        values: Box<Builder>,
        nulls: BitVec,
    },
    Union {
        ty: Type,
        tags: Vec<u32>,
        values: Vec<Builder>,
        nulls: BitVec,
    },
    Error {
        ty: Type,
        inner: Box<Builder>,
        nulls: BitVec,
    },
    Named {
        ty: Type,
        inner: Box<Builder>,
    },
    Null {
        len: u32,
    },
}

impl Builder {
    pub fn new(ty: &Type) -> Builder {
        let nulls = BitVec::new();
        match ty {
            Type::Named(n) => Builder::Named {
                ty: ty.clone(),
                inner: Box::new(Builder::new(n.inner())),
            },
            Type::Error(e) => Builder::Error {
                ty: ty.clone(),
                inner: Box::new(Builder::new(e.inner())),
                nulls,
            },
            Type::Record(r) => Builder::Record {
                ty: ty.clone(),
                fields: r.fields().iter().map(|f| Builder::new(&f.ty)).collect(),
                nulls,
            },
            Type::Array(a) | Type::Set(a) => Builder::List {
                ty: ty.clone(),
                offsets: vec![0],
                values: Box::new(Builder::new(a.elem())),
                nulls,
            },
            Type::Map(m) => Builder::Map {
                ty: ty.clone(),
                offsets: vec![0],
                keys: Box::new(Builder::new(m.key())),
                values: Box::new(Builder::new(m.val())),
                nulls,
            },
            Type::Union(u) => Builder::Union {
                ty: ty.clone(),
                tags: Vec::new(),
                values: u.types().iter().map(Builder::new).collect(),
                nulls,
            },
            Type::Enum(_) => Builder::Enum {
                ty: ty.clone(),
                values: Vec::new(),
                nulls,
            },
            Type::Bool => Builder::Bool {
                bits: BitVec::new(),
                nulls,
            },
            Type::Bytes | Type::String | Type::TypeValue => Builder::Bytes {
                ty: ty.clone(),
                table: BytesTable::with_capacity(0),
                nulls,
            },
            Type::Ip => Builder::Ip {
                values: Vec::new(),
                nulls,
            },
            Type::Net => Builder::Net {
                values: Vec::new(),
                nulls,
            },
            Type::Null => Builder::Null { len: 0 },
            ty if types::is_float(ty.id()) => Builder::Float {
                ty: ty.clone(),
                values: Vec::new(),
                nulls,
            },
            ty if types::is_unsigned(ty.id()) => Builder::Uint {
                ty: ty.clone(),
                values: Vec::new(),
                nulls,
            },
            ty => Builder::Int {
                ty: ty.clone(),
                values: Vec::new(),
                nulls,
            },
        }
    }

    /// Appends one encoded value; `None` appends a null.
    pub fn write(&mut self, bytes: Option<&[u8]>) {
        match self {
            Builder::Int { values, nulls, .. } => {
                nulls.push(bytes.is_none());
                values.push(bytes.map(encoding::decode_int).unwrap_or(0));
            }
            Builder::Uint { values, nulls, .. } | Builder::Enum { values, nulls, .. } => {
                nulls.push(bytes.is_none());
                values.push(bytes.map(encoding::decode_uint).unwrap_or(0));
            }
            Builder::Float { values, nulls, .. } => {
                nulls.push(bytes.is_none());
                values.push(bytes.map(encoding::decode_float).unwrap_or(0.0));
            }
            Builder::Bool { bits, nulls } => {
                nulls.push(bytes.is_none());
                bits.push(bytes.is_some_and(encoding::decode_bool));
            }
            Builder::Bytes { table, nulls, .. } => {
                nulls.push(bytes.is_none());
                table.push(bytes.unwrap_or_default());
            }
            Builder::Ip { values, nulls } => {
                let ip = bytes.and_then(encoding::decode_ip);
                nulls.push(ip.is_none());
                values.push(ip.unwrap_or(crate::vector::UNSPECIFIED_IP));
            }
            Builder::Net { values, nulls } => {
                let net = bytes.and_then(encoding::decode_net);
                nulls.push(net.is_none());
                values.push(net.unwrap_or_else(crate::vector::zero_net));
            }
            Builder::Record { fields, nulls, .. } => {
                nulls.push(bytes.is_none());
                match bytes {
                    Some(body) => {
                        let mut elems = encoding::iter(body);
                        for field in fields.iter_mut() {
                            field.write(elems.next().flatten());
                        }
                    }
                    None => {
                        for field in fields.iter_mut() {
                            field.write(None);
                        }
                    }
                }
            }
            Builder::List {
                offsets,
                values,
                nulls,
                ..
            } => {
                nulls.push(bytes.is_none());
                let mut n = offsets.last().copied().unwrap_or(0);
                if let Some(body) = bytes {
                    for elem in encoding::iter(body) {
                        values.write(elem);
                        n += 1;
                    }
                }
                offsets.push(n);
            }
            Builder::Map {
                offsets,
                keys,
                values,
                nulls,
                ..
            } => {
                nulls.push(bytes.is_none());
                let mut n = offsets.last().copied().unwrap_or(0);
                if let Some(body) = bytes {
                    let mut elems = encoding::iter(body);
                    while let Some(key) = elems.next() {
                        keys.write(key);
                        values.write(elems.next().flatten());
                        n += 1;
                    }
                }
                offsets.push(n);
            }
            Builder::Union {
                tags, values, nulls, ..
            } => {
                let member = bytes.and_then(|body| {
                    let mut buf = body;
                    let tag = encoding::read_uvarint(&mut buf)? as usize;
                    (tag < values.len()).then(|| (tag, encoding::iter(buf).next().flatten()))
                });
                match member {
                    Some((tag, elem)) => {
                        nulls.push(false);
                        tags.push(tag as u32);
                        values[tag].write(elem);
                    }
                    None => nulls.push(true),
                }
            }
            Builder::Error { inner, nulls, .. } => {
                nulls.push(bytes.is_none());
                inner.write(bytes);
            }
            Builder::Named { inner, .. } => inner.write(bytes),
            Builder::Null { len } => *len += 1,
        }
    }

    pub fn write_value(&mut self, value: &Value) {
        self.write(value.bytes());
    }

    pub fn build(self) -> Vector {
        match self {
            Builder::Int { ty, values, nulls } => Vector::int(ty, values, nulls.compact()),
            Builder::Uint { ty, values, nulls } => Vector::uint(ty, values, nulls.compact()),
            Builder::Float { ty, values, nulls } => Vector::float(ty, values, nulls.compact()),
            Builder::Bool { bits, nulls } => Vector::bool(bits, nulls.compact()),
            Builder::Bytes { ty, table, nulls } => match ty {
                Type::String => Vector::string(table, nulls.compact()),
                Type::TypeValue => Vector::type_values(table, nulls.compact()),
                _ => Vector::bytes(table, nulls.compact()),
            },
            Builder::Ip { values, nulls } => Vector::ip(values, nulls.compact()),
            Builder::Net { values, nulls } => Vector::net(values, nulls.compact()),
            Builder::Enum { ty, values, nulls } => Vector::enumeration(ty, values, nulls.compact()),
            Builder::Record { ty, fields, nulls } => {
                let len = nulls.len() as u32;
                let fields = fields.into_iter().map(Builder::build).collect();
                Vector::record(ty, fields, len, nulls.compact())
            }
            Builder::List {
                ty,
                offsets,
                values,
                nulls,
            } => Vector::list(ty, offsets, values.build(), nulls.compact()),
            Builder::Map {
                ty,
                offsets,
                keys,
                values,
                nulls,
            } => Vector::map(ty, offsets, keys.build(), values.build(), nulls.compact()),
            Builder::Union {
                ty,
                tags,
                values,
                nulls,
            } => {
                let values = values.into_iter().map(Builder::build).collect();
                union_with_nulls(ty, &tags, values, nulls)
            }
            Builder::Error { ty, inner, nulls } => {
                Vector::error(ty, inner.build(), nulls.compact())
            }
            Builder::Named { ty, inner } => Vector::named(ty, inner.build()),
            Builder::Null { len } => Vector::const_null(len),
        }
    }
}

/// Builds a column from values of arbitrary types.
///
/// Values are grouped into one child per distinct type, with tags in arrival order. When every
/// value shares one type the single child is returned instead of a dynamic.
#[derive(Debug, Default)]
pub struct DynamicBuilder {
    tags: Vec<u32>,
    builders: Vec<Builder>,
    which: AHashMap<Type, u32>,
}

impl DynamicBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(&mut self, value: &Value) {
        let tag = match self.which.get(value.ty()) {
            Some(&tag) => tag,
            None => {
                let tag = self.builders.len() as u32;
                self.builders.push(Builder::new(value.ty()));
                self.which.insert(value.ty().clone(), tag);
                tag
            }
        };
        self.tags.push(tag);
        self.builders[tag as usize].write(value.bytes());
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn build(self) -> Vector {
        let mut values: Vec<Vector> = self.builders.into_iter().map(Builder::build).collect();
        match values.len() {
            0 => Vector::const_null(0),
            1 => values.pop().unwrap_or_else(|| Vector::const_null(0)),
            _ => Vector::dynamic(self.tags, values),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::TypeContext;
    use crate::sup::parse_values;
    use pretty_assertions::assert_eq;

    fn round_trip(text: &str) {
        let ctx = TypeContext::new();
        let values = parse_values(&ctx, text).unwrap();
        let vec = Vector::from_values(&values);
        assert_eq!(vec.values(), values, "{text}");
    }

    #[test]
    fn builds_each_kind() {
        round_trip("1 null 3");
        round_trip("1.5 2.0");
        round_trip("true null false");
        round_trip("\"a\" \"\" null");
        round_trip("10.0.0.1 ::1 null");
        round_trip("10.0.0.0/8 null");
        round_trip("0x0102 0x");
        round_trip("<int64> <{a:string}>");
        round_trip("{a:1,b:{c:\"x\"}} {a:null,b:null} null");
        round_trip("[1,2] [] null [null]");
        round_trip("|[1,2]| null");
        round_trip("|{\"a\":1}| null");
        round_trip("[1,\"a\"] [null,2]");
        round_trip("error(\"x\") error({m:1})");
        round_trip("1h 2s null");
        round_trip("1::uint8 200::uint8");
    }

    #[test]
    fn mixed_values_build_a_dynamic() {
        let ctx = TypeContext::new();
        let values = parse_values(&ctx, "1 \"a\" 2 null").unwrap();
        let vec = Vector::from_values(&values);
        let Vector::Dynamic(d) = &vec else {
            panic!("expected dynamic")
        };
        assert_eq!(d.tags, vec![0, 1, 0, 2]);
        assert_eq!(vec.values(), values);
    }
}
