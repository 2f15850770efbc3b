//! Type interning.
//!
//! A [`TypeContext`] hands out a single shared allocation per distinct complex type, so types from
//! the same context compare by pointer. Columnar objects keep a context of their own and the
//! query side calls [`TypeContext::translate`] to bring their types into the query context.

use crate::encoding::{append_uvarint, read_uvarint};
use crate::error::{TypeError, TypeResult};
use crate::types::{
    self, ArrayType, EnumType, ErrorType, Field, MapType, NamedType, RecordType, Type, UnionType,
    FIRST_COMPLEX_ID,
};
use crate::value::Value;
use ahash::AHashMap;
use std::sync::{Arc, RwLock};

#[derive(Debug, Default)]
struct Interner {
    by_key: AHashMap<Vec<u8>, Type>,
    by_id: Vec<Type>,
    by_name: AHashMap<String, Type>,
}

#[derive(Debug, Default)]
pub struct TypeContext {
    inner: RwLock<Interner>,
}

impl TypeContext {
    pub fn new() -> Self {
        Self::default()
    }

    fn intern(&self, key: Vec<u8>, make: impl FnOnce(u32) -> Type) -> Type {
        {
            let inner = self.inner.read().expect("type context lock poisoned");
            if let Some(ty) = inner.by_key.get(&key) {
                return ty.clone();
            }
        }
        let mut inner = self.inner.write().expect("type context lock poisoned");
        if let Some(ty) = inner.by_key.get(&key) {
            return ty.clone();
        }
        let id = FIRST_COMPLEX_ID + inner.by_id.len() as u32;
        let ty = make(id);
        inner.by_id.push(ty.clone());
        inner.by_key.insert(key, ty.clone());
        ty
    }

    pub fn lookup_record(&self, fields: Vec<Field>) -> TypeResult<Type> {
        for (i, f) in fields.iter().enumerate() {
            if fields[..i].iter().any(|g| g.name == f.name) {
                return Err(TypeError::DuplicateField(f.name.clone()));
            }
        }
        let mut key = vec![types::TAG_RECORD];
        append_uvarint(&mut key, fields.len() as u64);
        for f in &fields {
            append_uvarint(&mut key, f.name.len() as u64);
            key.extend_from_slice(f.name.as_bytes());
            f.ty.encode(&mut key);
        }
        Ok(self.intern(key, |id| Type::Record(Arc::new(RecordType { id, fields }))))
    }

    pub fn lookup_array(&self, elem: &Type) -> Type {
        let mut key = vec![types::TAG_ARRAY];
        elem.encode(&mut key);
        self.intern(key, |id| {
            Type::Array(Arc::new(ArrayType {
                id,
                elem: elem.clone(),
            }))
        })
    }

    pub fn lookup_set(&self, elem: &Type) -> Type {
        let mut key = vec![types::TAG_SET];
        elem.encode(&mut key);
        self.intern(key, |id| {
            Type::Set(Arc::new(ArrayType {
                id,
                elem: elem.clone(),
            }))
        })
    }

    pub fn lookup_map(&self, key_type: &Type, val_type: &Type) -> Type {
        let mut key = vec![types::TAG_MAP];
        key_type.encode(&mut key);
        val_type.encode(&mut key);
        self.intern(key, |id| {
            Type::Map(Arc::new(MapType {
                id,
                key: key_type.clone(),
                val: val_type.clone(),
            }))
        })
    }

    /// Interns a union over `members`, sorted by ID with duplicates removed.
    pub fn lookup_union(&self, members: &[Type]) -> Type {
        let mut sorted: Vec<Type> = members.to_vec();
        sorted.sort_by_key(|t| t.id());
        sorted.dedup();
        let mut key = vec![types::TAG_UNION];
        append_uvarint(&mut key, sorted.len() as u64);
        for t in &sorted {
            t.encode(&mut key);
        }
        self.intern(key, |id| Type::Union(Arc::new(UnionType { id, types: sorted })))
    }

    pub fn lookup_enum(&self, symbols: Vec<String>) -> Type {
        let mut key = vec![types::TAG_ENUM];
        append_uvarint(&mut key, symbols.len() as u64);
        for s in &symbols {
            append_uvarint(&mut key, s.len() as u64);
            key.extend_from_slice(s.as_bytes());
        }
        self.intern(key, |id| Type::Enum(Arc::new(EnumType { id, symbols })))
    }

    /// Interns `name=ty` and makes it the current binding of `name`.
    pub fn lookup_named(&self, name: &str, ty: &Type) -> TypeResult<Type> {
        if name.is_empty() || Type::primitive_from_name(name).is_some() || name.contains('=') {
            return Err(TypeError::BadName(name.to_string()));
        }
        let mut key = vec![types::TAG_NAMED];
        append_uvarint(&mut key, name.len() as u64);
        key.extend_from_slice(name.as_bytes());
        ty.encode(&mut key);
        let named = self.intern(key, |id| {
            Type::Named(Arc::new(NamedType {
                id,
                name: name.to_string(),
                ty: ty.clone(),
            }))
        });
        let mut inner = self.inner.write().expect("type context lock poisoned");
        inner.by_name.insert(name.to_string(), named.clone());
        Ok(named)
    }

    pub fn lookup_error(&self, ty: &Type) -> Type {
        let mut key = vec![types::TAG_ERROR];
        ty.encode(&mut key);
        self.intern(key, |id| {
            Type::Error(Arc::new(ErrorType { id, ty: ty.clone() }))
        })
    }

    /// Looks up the current binding of a named type.
    pub fn lookup_by_name(&self, name: &str) -> Option<Type> {
        if let Some(ty) = Type::primitive_from_name(name) {
            return Some(ty);
        }
        let inner = self.inner.read().expect("type context lock poisoned");
        inner.by_name.get(name).cloned()
    }

    pub fn lookup_by_id(&self, id: u32) -> TypeResult<Type> {
        if id < FIRST_COMPLEX_ID {
            return Type::primitive_from_id(id).ok_or(TypeError::UnknownId(id));
        }
        let inner = self.inner.read().expect("type context lock poisoned");
        inner
            .by_id
            .get((id - FIRST_COMPLEX_ID) as usize)
            .cloned()
            .ok_or(TypeError::UnknownId(id))
    }

    /// Decodes a canonical type encoding and interns the result.
    pub fn lookup_by_value(&self, bytes: &[u8]) -> TypeResult<Type> {
        let mut buf = bytes;
        let ty = self.decode_type(&mut buf)?;
        if !buf.is_empty() {
            return Err(TypeError::MalformedEncoding);
        }
        Ok(ty)
    }

    pub(crate) fn decode_type(&self, buf: &mut &[u8]) -> TypeResult<Type> {
        let (&tag, rest) = buf.split_first().ok_or(TypeError::MalformedEncoding)?;
        *buf = rest;
        match tag {
            types::TAG_RECORD => {
                let n = read_len(buf)?;
                let mut fields = Vec::with_capacity(n.min(1024));
                for _ in 0..n {
                    let name = read_str(buf)?;
                    let ty = self.decode_type(buf)?;
                    fields.push(Field::new(name, ty));
                }
                self.lookup_record(fields)
            }
            types::TAG_ARRAY => Ok(self.lookup_array(&self.decode_type(buf)?)),
            types::TAG_SET => Ok(self.lookup_set(&self.decode_type(buf)?)),
            types::TAG_MAP => {
                let key = self.decode_type(buf)?;
                let val = self.decode_type(buf)?;
                Ok(self.lookup_map(&key, &val))
            }
            types::TAG_UNION => {
                let n = read_len(buf)?;
                let mut members = Vec::with_capacity(n.min(1024));
                for _ in 0..n {
                    members.push(self.decode_type(buf)?);
                }
                Ok(self.lookup_union(&members))
            }
            types::TAG_ENUM => {
                let n = read_len(buf)?;
                let mut symbols = Vec::with_capacity(n.min(1024));
                for _ in 0..n {
                    symbols.push(read_str(buf)?);
                }
                Ok(self.lookup_enum(symbols))
            }
            types::TAG_NAMED => {
                let name = read_str(buf)?;
                let ty = self.decode_type(buf)?;
                self.lookup_named(&name, &ty)
            }
            types::TAG_ERROR => Ok(self.lookup_error(&self.decode_type(buf)?)),
            id => Type::primitive_from_id(u32::from(id)).ok_or(TypeError::MalformedEncoding),
        }
    }

    /// Re-interns a type that may belong to another context.
    pub fn translate(&self, ty: &Type) -> TypeResult<Type> {
        if ty.is_primitive() {
            return Ok(ty.clone());
        }
        self.lookup_by_value(&ty.encoded())
    }

    pub fn string_error_type(&self) -> Type {
        self.lookup_error(&Type::String)
    }

    pub fn missing(&self) -> Value {
        Value::error(self, "missing")
    }

    pub fn quiet(&self) -> Value {
        Value::error(self, "quiet")
    }

    pub fn len(&self) -> usize {
        self.inner.read().expect("type context lock poisoned").by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn read_len(buf: &mut &[u8]) -> TypeResult<usize> {
    read_uvarint(buf)
        .map(|n| n as usize)
        .ok_or(TypeError::MalformedEncoding)
}

fn read_str(buf: &mut &[u8]) -> TypeResult<String> {
    let n = read_len(buf)?;
    if n > buf.len() {
        return Err(TypeError::MalformedEncoding);
    }
    let (s, rest) = buf.split_at(n);
    *buf = rest;
    String::from_utf8(s.to_vec()).map_err(|_| TypeError::MalformedEncoding)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn rec(ctx: &TypeContext, fields: &[(&str, Type)]) -> Type {
        ctx.lookup_record(
            fields
                .iter()
                .map(|(n, t)| Field::new(*n, t.clone()))
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn equal_types_share_an_allocation() {
        let ctx = TypeContext::new();
        let a = rec(&ctx, &[("a", Type::Int64), ("b", Type::String)]);
        let b = rec(&ctx, &[("a", Type::Int64), ("b", Type::String)]);
        assert_eq!(a, b);
        assert_eq!(a.id(), FIRST_COMPLEX_ID);
        let c = rec(&ctx, &[("b", Type::String), ("a", Type::Int64)]);
        assert_ne!(a, c);
    }

    #[test]
    fn duplicate_fields_are_rejected() {
        let ctx = TypeContext::new();
        let err = ctx
            .lookup_record(vec![Field::new("x", Type::Int64), Field::new("x", Type::Bool)])
            .unwrap_err();
        assert_eq!(err, TypeError::DuplicateField("x".into()));
    }

    #[test]
    fn named_types_differ_by_inner_type() {
        let ctx = TypeContext::new();
        let a = ctx.lookup_named("port", &Type::Uint16).unwrap();
        let b = ctx.lookup_named("port", &Type::Int64).unwrap();
        assert_ne!(a, b);
        assert_eq!(ctx.lookup_by_name("port"), Some(b));
        assert!(ctx.lookup_named("int64", &Type::Int64).is_err());
    }

    #[test]
    fn union_members_are_canonical() {
        let ctx = TypeContext::new();
        let u1 = ctx.lookup_union(&[Type::String, Type::Int64, Type::String]);
        let u2 = ctx.lookup_union(&[Type::Int64, Type::String]);
        assert_eq!(u1, u2);
        let Type::Union(u) = &u1 else { panic!() };
        assert_eq!(u.types(), &[Type::Int64, Type::String]);
        assert_eq!(u.tag_of(&Type::String), Some(1));
    }

    #[test]
    fn translate_between_contexts() {
        let local = TypeContext::new();
        let query = TypeContext::new();
        // Shift IDs in the query context so the two disagree.
        query.lookup_array(&Type::Bool);
        let inner = rec(&local, &[("x", Type::Float64)]);
        let arr = local.lookup_array(&inner);
        let translated = query.translate(&arr).unwrap();
        assert_ne!(translated.id(), arr.id());
        assert_eq!(translated.to_string(), "[{x:float64}]");
        assert_eq!(query.translate(&arr).unwrap(), translated);
    }

    #[test]
    fn lookup_by_value_round_trips_every_kind() {
        let ctx = TypeContext::new();
        let tys = vec![
            Type::Int32,
            rec(&ctx, &[("a", Type::Ip)]),
            ctx.lookup_set(&Type::String),
            ctx.lookup_map(&Type::String, &Type::Int64),
            ctx.lookup_union(&[Type::Int64, Type::Bool]),
            ctx.lookup_enum(vec!["a".into(), "b".into()]),
            ctx.lookup_named("n", &Type::Net).unwrap(),
            ctx.string_error_type(),
        ];
        for ty in tys {
            assert_eq!(ctx.lookup_by_value(&ty.encoded()).unwrap(), ty);
        }
        assert_eq!(
            ctx.lookup_by_value(&[types::TAG_ARRAY]).unwrap_err(),
            TypeError::MalformedEncoding
        );
    }
}
