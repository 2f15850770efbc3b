use crate::context::TypeContext;
use crate::encoding;
use crate::format;
use crate::types::{self, Type};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// An IP network: a masked address plus prefix length.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Net {
    addr: IpAddr,
    prefix: u8,
}

impl Net {
    /// Builds a network, masking host bits. Returns `None` for an out-of-range prefix.
    pub fn new(addr: IpAddr, prefix: u8) -> Option<Self> {
        let addr = match addr {
            IpAddr::V4(v4) => {
                if prefix > 32 {
                    return None;
                }
                let mask = if prefix == 0 {
                    0
                } else {
                    u32::MAX << (32 - u32::from(prefix))
                };
                IpAddr::V4((u32::from(v4) & mask).into())
            }
            IpAddr::V6(v6) => {
                if prefix > 128 {
                    return None;
                }
                let mask = if prefix == 0 {
                    0
                } else {
                    u128::MAX << (128 - u32::from(prefix))
                };
                IpAddr::V6((u128::from(v6) & mask).into())
            }
        };
        Some(Self { addr, prefix })
    }

    pub fn addr(&self) -> IpAddr {
        self.addr
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    pub fn contains(&self, ip: IpAddr) -> bool {
        match Net::new(ip, self.prefix) {
            Some(masked) => masked.addr == self.addr,
            None => false,
        }
    }
}

impl fmt::Display for Net {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix)
    }
}

impl FromStr for Net {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, prefix) = s.split_once('/').ok_or(())?;
        let addr: IpAddr = addr.parse().map_err(|_| ())?;
        let prefix: u8 = prefix.parse().map_err(|_| ())?;
        Net::new(addr, prefix).ok_or(())
    }
}

/// A typed value in canonical encoding; `bytes == None` is null.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Value {
    ty: Type,
    bytes: Option<Vec<u8>>,
}

impl Value {
    pub fn new(ty: Type, bytes: Option<Vec<u8>>) -> Self {
        Self { ty, bytes }
    }

    pub fn null(ty: Type) -> Self {
        Self { ty, bytes: None }
    }

    pub fn null_value() -> Self {
        Self::null(Type::Null)
    }

    pub fn int64(v: i64) -> Self {
        Self::int(Type::Int64, v)
    }

    pub fn int(ty: Type, v: i64) -> Self {
        Self::new(ty, Some(encoding::encode_int(v)))
    }

    pub fn uint64(v: u64) -> Self {
        Self::uint(Type::Uint64, v)
    }

    pub fn uint(ty: Type, v: u64) -> Self {
        Self::new(ty, Some(encoding::encode_uint(v)))
    }

    pub fn float64(v: f64) -> Self {
        Self::float(Type::Float64, v)
    }

    pub fn float(ty: Type, v: f64) -> Self {
        let bytes = encoding::encode_float(ty.id(), v);
        Self::new(ty, Some(bytes))
    }

    pub fn bool(v: bool) -> Self {
        Self::new(Type::Bool, Some(encoding::encode_bool(v)))
    }

    pub fn string(s: &str) -> Self {
        Self::new(Type::String, Some(s.as_bytes().to_vec()))
    }

    pub fn bytes_value(b: &[u8]) -> Self {
        Self::new(Type::Bytes, Some(b.to_vec()))
    }

    pub fn ip(ip: IpAddr) -> Self {
        Self::new(Type::Ip, Some(encoding::encode_ip(ip)))
    }

    pub fn net(net: Net) -> Self {
        Self::new(Type::Net, Some(encoding::encode_net(net)))
    }

    pub fn duration(ns: i64) -> Self {
        Self::int(Type::Duration, ns)
    }

    pub fn time(ns: i64) -> Self {
        Self::int(Type::Time, ns)
    }

    pub fn type_value(ty: &Type) -> Self {
        Self::new(Type::TypeValue, Some(ty.encoded()))
    }

    /// A string-payload error value.
    pub fn error(ctx: &TypeContext, msg: &str) -> Self {
        Self::new(ctx.string_error_type(), Some(msg.as_bytes().to_vec()))
    }

    /// Wraps an arbitrary value as an error payload.
    pub fn wrap_error(ctx: &TypeContext, inner: &Value) -> Self {
        Self::new(ctx.lookup_error(&inner.ty), inner.bytes.clone())
    }

    pub fn ty(&self) -> &Type {
        &self.ty
    }

    pub fn bytes(&self) -> Option<&[u8]> {
        self.bytes.as_deref()
    }

    pub fn into_parts(self) -> (Type, Option<Vec<u8>>) {
        (self.ty, self.bytes)
    }

    pub fn is_null(&self) -> bool {
        self.bytes.is_none()
    }

    pub fn is_error(&self) -> bool {
        self.ty.is_error()
    }

    /// True for `error("missing")`.
    pub fn is_missing(&self) -> bool {
        self.is_string_error("missing")
    }

    pub fn is_quiet(&self) -> bool {
        self.is_string_error("quiet")
    }

    fn is_string_error(&self, msg: &str) -> bool {
        match self.ty.under() {
            Type::Error(e) => {
                matches!(e.inner().under(), Type::String) && self.bytes() == Some(msg.as_bytes())
            }
            _ => false,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        if types::is_signed(self.ty.under().id()) {
            return self.bytes().map(encoding::decode_int);
        }
        None
    }

    pub fn as_uint(&self) -> Option<u64> {
        let ty = self.ty.under();
        if types::is_unsigned(ty.id()) || matches!(ty, Type::Enum(_)) {
            return self.bytes().map(encoding::decode_uint);
        }
        None
    }

    pub fn as_float(&self) -> Option<f64> {
        if types::is_float(self.ty.under().id()) {
            return self.bytes().map(encoding::decode_float);
        }
        None
    }

    /// Numeric value widened to `f64`, for any numeric type.
    pub fn as_number(&self) -> Option<f64> {
        let id = self.ty.under().id();
        let bytes = self.bytes()?;
        if types::is_float(id) {
            Some(encoding::decode_float(bytes))
        } else if types::is_signed(id) {
            Some(encoding::decode_int(bytes) as f64)
        } else if types::is_unsigned(id) {
            Some(encoding::decode_uint(bytes) as f64)
        } else {
            None
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.ty.under() {
            Type::Bool => self.bytes().map(encoding::decode_bool),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self.ty.under() {
            Type::String => self.bytes().and_then(|b| std::str::from_utf8(b).ok()),
            _ => None,
        }
    }

    pub fn as_ip(&self) -> Option<IpAddr> {
        match self.ty.under() {
            Type::Ip => self.bytes().and_then(encoding::decode_ip),
            _ => None,
        }
    }

    pub fn as_net(&self) -> Option<Net> {
        match self.ty.under() {
            Type::Net => self.bytes().and_then(encoding::decode_net),
            _ => None,
        }
    }

    /// Decodes a type value against `ctx`.
    pub fn as_type(&self, ctx: &TypeContext) -> Option<Type> {
        match self.ty.under() {
            Type::TypeValue => self.bytes().and_then(|b| ctx.lookup_by_value(b).ok()),
            _ => None,
        }
    }

    /// Returns the named field of a record value.
    pub fn field(&self, name: &str) -> Option<Value> {
        let rec = self.ty.as_record()?;
        let k = rec.index_of(name)?;
        let body = self.bytes()?;
        let elem = encoding::iter(body).nth(k)?;
        Some(Value::new(rec.fields()[k].ty.clone(), elem.map(<[u8]>::to_vec)))
    }

    /// Elements of an array or set value.
    pub fn elements(&self) -> Vec<Value> {
        let Some(elem_ty) = self.ty.inner_elem() else {
            return Vec::new();
        };
        let Some(body) = self.bytes() else {
            return Vec::new();
        };
        encoding::iter(body)
            .map(|e| resolve_union_elem(elem_ty, e))
            .collect()
    }

    /// Visits this value and then every nested value depth first, stopping as soon as `visit`
    /// returns true. Named and union wrappers are seen through; the error itself and its
    /// payload are both visited.
    pub fn walk(&self, visit: &mut dyn FnMut(&Value) -> bool) -> bool {
        match self.ty.under() {
            Type::Named(_) | Type::Union(_) => {}
            _ if visit(self) => return true,
            _ => {}
        }
        let Some(body) = self.bytes() else {
            return false;
        };
        match &self.ty {
            Type::Named(n) => Value::new(n.inner().clone(), Some(body.to_vec())).walk(visit),
            Type::Error(e) => Value::new(e.inner().clone(), Some(body.to_vec())).walk(visit),
            Type::Union(_) => {
                let member = resolve_union_elem(&self.ty, Some(body));
                !matches!(member.ty, Type::Union(_)) && member.walk(visit)
            }
            Type::Record(r) => r
                .fields()
                .iter()
                .zip(encoding::iter(body))
                .any(|(f, e)| resolve_union_elem(&f.ty, e).walk(visit)),
            Type::Array(a) | Type::Set(a) => encoding::iter(body)
                .any(|e| resolve_union_elem(a.elem(), e).walk(visit)),
            Type::Map(m) => {
                let mut elems = encoding::iter(body);
                while let Some(key) = elems.next() {
                    let val = elems.next().flatten();
                    if resolve_union_elem(m.key(), key).walk(visit)
                        || resolve_union_elem(m.val(), val).walk(visit)
                    {
                        return true;
                    }
                }
                false
            }
            _ => false,
        }
    }

    /// Replaces the type, keeping the encoding.
    pub fn with_type(self, ty: Type) -> Self {
        Self { ty, bytes: self.bytes }
    }
}

/// Resolves a container element of static type `ty`, unwrapping union members.
pub fn resolve_union_elem(ty: &Type, elem: Option<&[u8]>) -> Value {
    if let (Type::Union(u), Some(body)) = (ty.under(), elem) {
        let mut buf = body;
        if let Some(tag) = encoding::read_uvarint(&mut buf) {
            if let Some(member) = u.types().get(tag as usize) {
                let inner = encoding::iter(buf).next().flatten();
                return resolve_union_elem(member, inner);
            }
        }
    }
    Value::new(ty.clone(), elem.map(<[u8]>::to_vec))
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        format::format_value(&self.ty, self.bytes(), &mut out);
        f.write_str(&out)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::int64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::float64(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::string(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walk_reaches_nested_values() {
        let ctx = TypeContext::new();
        let v = &crate::sup::parse_values(&ctx, "{a:[1,{b:10.0.0.1}],c:|{\"k\":2}|}").unwrap()[0];
        let mut seen = Vec::new();
        v.walk(&mut |x| {
            if x.ty().is_primitive() {
                seen.push(x.to_string());
            }
            false
        });
        assert_eq!(seen, ["1", "10.0.0.1", "\"k\"", "2"]);
        assert!(v.walk(&mut |x| x.as_ip().is_some()));
    }

    #[test]
    fn net_masks_host_bits_and_contains() {
        let net: Net = "10.1.2.3/8".parse().unwrap();
        assert_eq!(net.to_string(), "10.0.0.0/8");
        assert!(net.contains("10.200.0.1".parse().unwrap()));
        assert!(!net.contains("11.0.0.1".parse().unwrap()));
        assert!(!net.contains("::1".parse().unwrap()));
    }

    #[test]
    fn error_sentinels() {
        let ctx = TypeContext::new();
        assert!(ctx.missing().is_missing());
        assert!(ctx.quiet().is_quiet());
        assert!(!Value::error(&ctx, "boom").is_missing());
    }
}
