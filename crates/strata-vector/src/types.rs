//! Type descriptors for the vector runtime.
//!
//! - Primitive types are plain enum variants with fixed IDs below [`FIRST_COMPLEX_ID`].
//! - Complex types are interned by a [`crate::TypeContext`]; two complex types are equal only when
//!   they are the same allocation in the same context.
//! - Numeric IDs are ordered by class then width so that promotion to the wider of two types of the
//!   same class is a comparison of IDs.

use crate::encoding::append_uvarint;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

pub const ID_UINT8: u32 = 0;
pub const ID_UINT16: u32 = 1;
pub const ID_UINT32: u32 = 2;
pub const ID_UINT64: u32 = 3;
pub const ID_INT8: u32 = 4;
pub const ID_INT16: u32 = 5;
pub const ID_INT32: u32 = 6;
pub const ID_INT64: u32 = 7;
pub const ID_DURATION: u32 = 8;
pub const ID_TIME: u32 = 9;
pub const ID_FLOAT16: u32 = 10;
pub const ID_FLOAT32: u32 = 11;
pub const ID_FLOAT64: u32 = 12;
pub const ID_BOOL: u32 = 13;
pub const ID_BYTES: u32 = 14;
pub const ID_STRING: u32 = 15;
pub const ID_IP: u32 = 16;
pub const ID_NET: u32 = 17;
pub const ID_TYPE: u32 = 18;
pub const ID_NULL: u32 = 19;

/// IDs at or above this value belong to context-interned complex types.
pub const FIRST_COMPLEX_ID: u32 = 32;

// Leading bytes of complex type encodings.
pub(crate) const TAG_RECORD: u8 = 32;
pub(crate) const TAG_ARRAY: u8 = 33;
pub(crate) const TAG_SET: u8 = 34;
pub(crate) const TAG_MAP: u8 = 35;
pub(crate) const TAG_UNION: u8 = 36;
pub(crate) const TAG_ENUM: u8 = 37;
pub(crate) const TAG_NAMED: u8 = 38;
pub(crate) const TAG_ERROR: u8 = 39;

pub fn is_unsigned(id: u32) -> bool {
    id <= ID_UINT64
}

pub fn is_signed(id: u32) -> bool {
    (ID_INT8..=ID_TIME).contains(&id)
}

pub fn is_integer(id: u32) -> bool {
    id <= ID_TIME
}

pub fn is_float(id: u32) -> bool {
    (ID_FLOAT16..=ID_FLOAT64).contains(&id)
}

pub fn is_numeric(id: u32) -> bool {
    id <= ID_FLOAT64
}

pub fn is_stringy(id: u32) -> bool {
    id == ID_STRING
}

#[derive(Clone, Debug)]
pub enum Type {
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Int8,
    Int16,
    Int32,
    Int64,
    Duration,
    Time,
    Float16,
    Float32,
    Float64,
    Bool,
    Bytes,
    String,
    Ip,
    Net,
    TypeValue,
    Null,
    Record(Arc<RecordType>),
    Array(Arc<ArrayType>),
    Set(Arc<ArrayType>),
    Map(Arc<MapType>),
    Union(Arc<UnionType>),
    Enum(Arc<EnumType>),
    Named(Arc<NamedType>),
    Error(Arc<ErrorType>),
}

/// Coarse classification of a type, looking through `Named`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Kind {
    Primitive,
    Record,
    Array,
    Set,
    Map,
    Union,
    Enum,
    Error,
}

impl Kind {
    pub fn as_str(self) -> &'static str {
        match self {
            Kind::Primitive => "primitive",
            Kind::Record => "record",
            Kind::Array => "array",
            Kind::Set => "set",
            Kind::Map => "map",
            Kind::Union => "union",
            Kind::Enum => "enum",
            Kind::Error => "error",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Field {
    pub name: String,
    pub ty: Type,
}

impl Field {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

#[derive(Debug)]
pub struct RecordType {
    pub(crate) id: u32,
    pub(crate) fields: Vec<Field>,
}

impl RecordType {
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn field_type(&self, name: &str) -> Option<&Type> {
        self.fields.iter().find(|f| f.name == name).map(|f| &f.ty)
    }
}

/// Element type shared by arrays and sets.
#[derive(Debug)]
pub struct ArrayType {
    pub(crate) id: u32,
    pub(crate) elem: Type,
}

impl ArrayType {
    pub fn elem(&self) -> &Type {
        &self.elem
    }
}

#[derive(Debug)]
pub struct MapType {
    pub(crate) id: u32,
    pub(crate) key: Type,
    pub(crate) val: Type,
}

impl MapType {
    pub fn key(&self) -> &Type {
        &self.key
    }

    pub fn val(&self) -> &Type {
        &self.val
    }
}

#[derive(Debug)]
pub struct UnionType {
    pub(crate) id: u32,
    pub(crate) types: Vec<Type>,
}

impl UnionType {
    /// Member types in canonical (ID) order; a member's tag is its position.
    pub fn types(&self) -> &[Type] {
        &self.types
    }

    pub fn tag_of(&self, ty: &Type) -> Option<usize> {
        self.types.iter().position(|t| t == ty)
    }
}

#[derive(Debug)]
pub struct EnumType {
    pub(crate) id: u32,
    pub(crate) symbols: Vec<String>,
}

impl EnumType {
    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn lookup(&self, symbol: &str) -> Option<usize> {
        self.symbols.iter().position(|s| s == symbol)
    }
}

#[derive(Debug)]
pub struct NamedType {
    pub(crate) id: u32,
    pub(crate) name: String,
    pub(crate) ty: Type,
}

impl NamedType {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn inner(&self) -> &Type {
        &self.ty
    }
}

#[derive(Debug)]
pub struct ErrorType {
    pub(crate) id: u32,
    pub(crate) ty: Type,
}

impl ErrorType {
    pub fn inner(&self) -> &Type {
        &self.ty
    }
}

impl Type {
    pub fn id(&self) -> u32 {
        match self {
            Type::Uint8 => ID_UINT8,
            Type::Uint16 => ID_UINT16,
            Type::Uint32 => ID_UINT32,
            Type::Uint64 => ID_UINT64,
            Type::Int8 => ID_INT8,
            Type::Int16 => ID_INT16,
            Type::Int32 => ID_INT32,
            Type::Int64 => ID_INT64,
            Type::Duration => ID_DURATION,
            Type::Time => ID_TIME,
            Type::Float16 => ID_FLOAT16,
            Type::Float32 => ID_FLOAT32,
            Type::Float64 => ID_FLOAT64,
            Type::Bool => ID_BOOL,
            Type::Bytes => ID_BYTES,
            Type::String => ID_STRING,
            Type::Ip => ID_IP,
            Type::Net => ID_NET,
            Type::TypeValue => ID_TYPE,
            Type::Null => ID_NULL,
            Type::Record(t) => t.id,
            Type::Array(t) | Type::Set(t) => t.id,
            Type::Map(t) => t.id,
            Type::Union(t) => t.id,
            Type::Enum(t) => t.id,
            Type::Named(t) => t.id,
            Type::Error(t) => t.id,
        }
    }

    pub fn primitive_from_id(id: u32) -> Option<Type> {
        let ty = match id {
            ID_UINT8 => Type::Uint8,
            ID_UINT16 => Type::Uint16,
            ID_UINT32 => Type::Uint32,
            ID_UINT64 => Type::Uint64,
            ID_INT8 => Type::Int8,
            ID_INT16 => Type::Int16,
            ID_INT32 => Type::Int32,
            ID_INT64 => Type::Int64,
            ID_DURATION => Type::Duration,
            ID_TIME => Type::Time,
            ID_FLOAT16 => Type::Float16,
            ID_FLOAT32 => Type::Float32,
            ID_FLOAT64 => Type::Float64,
            ID_BOOL => Type::Bool,
            ID_BYTES => Type::Bytes,
            ID_STRING => Type::String,
            ID_IP => Type::Ip,
            ID_NET => Type::Net,
            ID_TYPE => Type::TypeValue,
            ID_NULL => Type::Null,
            _ => return None,
        };
        Some(ty)
    }

    pub fn primitive_from_name(name: &str) -> Option<Type> {
        let ty = match name {
            "uint8" => Type::Uint8,
            "uint16" => Type::Uint16,
            "uint32" => Type::Uint32,
            "uint64" => Type::Uint64,
            "int8" => Type::Int8,
            "int16" => Type::Int16,
            "int32" => Type::Int32,
            "int64" => Type::Int64,
            "duration" => Type::Duration,
            "time" => Type::Time,
            "float16" => Type::Float16,
            "float32" => Type::Float32,
            "float64" => Type::Float64,
            "bool" => Type::Bool,
            "bytes" => Type::Bytes,
            "string" => Type::String,
            "ip" => Type::Ip,
            "net" => Type::Net,
            "type" => Type::TypeValue,
            "null" => Type::Null,
            _ => return None,
        };
        Some(ty)
    }

    pub fn primitive_name(&self) -> Option<&'static str> {
        let name = match self {
            Type::Uint8 => "uint8",
            Type::Uint16 => "uint16",
            Type::Uint32 => "uint32",
            Type::Uint64 => "uint64",
            Type::Int8 => "int8",
            Type::Int16 => "int16",
            Type::Int32 => "int32",
            Type::Int64 => "int64",
            Type::Duration => "duration",
            Type::Time => "time",
            Type::Float16 => "float16",
            Type::Float32 => "float32",
            Type::Float64 => "float64",
            Type::Bool => "bool",
            Type::Bytes => "bytes",
            Type::String => "string",
            Type::Ip => "ip",
            Type::Net => "net",
            Type::TypeValue => "type",
            Type::Null => "null",
            _ => return None,
        };
        Some(name)
    }

    pub fn is_primitive(&self) -> bool {
        self.id() < FIRST_COMPLEX_ID
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Type::Null)
    }

    pub fn is_error(&self) -> bool {
        matches!(self.under(), Type::Error(_))
    }

    /// Strips any `Named` wrappers.
    pub fn under(&self) -> &Type {
        let mut ty = self;
        while let Type::Named(named) = ty {
            ty = &named.ty;
        }
        ty
    }

    pub fn kind(&self) -> Kind {
        match self.under() {
            Type::Record(_) => Kind::Record,
            Type::Array(_) => Kind::Array,
            Type::Set(_) => Kind::Set,
            Type::Map(_) => Kind::Map,
            Type::Union(_) => Kind::Union,
            Type::Enum(_) => Kind::Enum,
            Type::Error(_) => Kind::Error,
            _ => Kind::Primitive,
        }
    }

    pub fn as_record(&self) -> Option<&Arc<RecordType>> {
        match self.under() {
            Type::Record(r) => Some(r),
            _ => None,
        }
    }

    /// Element type of an array or set.
    pub fn inner_elem(&self) -> Option<&Type> {
        match self.under() {
            Type::Array(a) | Type::Set(a) => Some(&a.elem),
            _ => None,
        }
    }

    /// Appends the canonical, context-independent encoding of this type.
    pub fn encode(&self, out: &mut Vec<u8>) {
        match self {
            Type::Record(r) => {
                out.push(TAG_RECORD);
                append_uvarint(out, r.fields.len() as u64);
                for f in &r.fields {
                    append_uvarint(out, f.name.len() as u64);
                    out.extend_from_slice(f.name.as_bytes());
                    f.ty.encode(out);
                }
            }
            Type::Array(a) => {
                out.push(TAG_ARRAY);
                a.elem.encode(out);
            }
            Type::Set(a) => {
                out.push(TAG_SET);
                a.elem.encode(out);
            }
            Type::Map(m) => {
                out.push(TAG_MAP);
                m.key.encode(out);
                m.val.encode(out);
            }
            Type::Union(u) => {
                out.push(TAG_UNION);
                append_uvarint(out, u.types.len() as u64);
                for t in &u.types {
                    t.encode(out);
                }
            }
            Type::Enum(e) => {
                out.push(TAG_ENUM);
                append_uvarint(out, e.symbols.len() as u64);
                for s in &e.symbols {
                    append_uvarint(out, s.len() as u64);
                    out.extend_from_slice(s.as_bytes());
                }
            }
            Type::Named(n) => {
                out.push(TAG_NAMED);
                append_uvarint(out, n.name.len() as u64);
                out.extend_from_slice(n.name.as_bytes());
                n.ty.encode(out);
            }
            Type::Error(e) => {
                out.push(TAG_ERROR);
                e.ty.encode(out);
            }
            primitive => out.push(primitive.id() as u8),
        }
    }

    pub fn encoded(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode(&mut out);
        out
    }
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Type::Record(a), Type::Record(b)) => Arc::ptr_eq(a, b),
            (Type::Array(a), Type::Array(b)) | (Type::Set(a), Type::Set(b)) => Arc::ptr_eq(a, b),
            (Type::Map(a), Type::Map(b)) => Arc::ptr_eq(a, b),
            (Type::Union(a), Type::Union(b)) => Arc::ptr_eq(a, b),
            (Type::Enum(a), Type::Enum(b)) => Arc::ptr_eq(a, b),
            (Type::Named(a), Type::Named(b)) => Arc::ptr_eq(a, b),
            (Type::Error(a), Type::Error(b)) => Arc::ptr_eq(a, b),
            (a, b) => a.is_primitive() && a.id() == b.id(),
        }
    }
}

impl Eq for Type {}

impl Hash for Type {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

pub(crate) fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

pub(crate) fn write_field_name(f: &mut fmt::Formatter<'_>, name: &str) -> fmt::Result {
    if is_identifier(name) {
        f.write_str(name)
    } else {
        write!(f, "{name:?}")
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = self.primitive_name() {
            return f.write_str(name);
        }
        match self {
            Type::Record(r) => {
                f.write_str("{")?;
                for (i, field) in r.fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write_field_name(f, &field.name)?;
                    write!(f, ":{}", field.ty)?;
                }
                f.write_str("}")
            }
            Type::Array(a) => write!(f, "[{}]", a.elem),
            Type::Set(a) => write!(f, "|[{}]|", a.elem),
            Type::Map(m) => write!(f, "|{{{}:{}}}|", m.key, m.val),
            Type::Union(u) => {
                f.write_str("(")?;
                for (i, t) in u.types.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{t}")?;
                }
                f.write_str(")")
            }
            Type::Enum(e) => write!(f, "enum({})", e.symbols.join(",")),
            Type::Named(n) => write!(f, "{}={}", n.name, n.ty),
            Type::Error(e) => write!(f, "error({})", e.ty),
            _ => unreachable!("primitive types are handled above"),
        }
    }
}
