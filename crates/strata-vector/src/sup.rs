//! Parser for the value text syntax produced by [`Value`]'s `Display` impl.
//!
//! Supported forms:
//! - scalars: `null`, `true`, `false`, integers, floats (`1.5`, `NaN`, `+Inf`), `"strings"`,
//!   `0x` bytes, IPv4/IPv6 addresses, CIDR nets, RFC 3339 times, durations (`1h30m`, `250ms`)
//! - decorations: `200::uint8`, `null::string`
//! - containers: `{a:1}`, `[1,2]`, `|[1,2]|`, `|{"k":1}|`
//! - `error(value)` and type values `<{a:int64}>`
//!
//! Arrays, sets and maps with elements of several types get a union element type.

use crate::context::TypeContext;
use crate::encoding::{append_container, append_uvarint};
use crate::error::{TypeError, TypeResult};
use crate::types::{self, Field, Type};
use crate::value::{Net, Value};
use chrono::DateTime;
use std::net::IpAddr;

pub fn parse_value(ctx: &TypeContext, text: &str) -> TypeResult<Value> {
    let mut p = Parser::new(ctx, text);
    let v = p.value(false)?;
    p.skip_ws();
    if !p.at_end() {
        return Err(p.error("trailing input"));
    }
    Ok(v)
}

/// Parses a whitespace (or comma) separated sequence of values.
pub fn parse_values(ctx: &TypeContext, text: &str) -> TypeResult<Vec<Value>> {
    let mut p = Parser::new(ctx, text);
    let mut out = Vec::new();
    loop {
        p.skip_ws();
        if p.eat(',') {
            continue;
        }
        if p.at_end() {
            return Ok(out);
        }
        out.push(p.value(false)?);
    }
}

pub fn parse_type(ctx: &TypeContext, text: &str) -> TypeResult<Type> {
    let mut p = Parser::new(ctx, text);
    let ty = p.ty()?;
    p.skip_ws();
    if !p.at_end() {
        return Err(p.error("trailing input"));
    }
    Ok(ty)
}

struct Parser<'a> {
    ctx: &'a TypeContext,
    src: &'a str,
    pos: usize,
}

fn is_run_char(c: char, stop_colon: bool) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '/' | '+' | '-' | '_') || (c == ':' && !stop_colon)
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '$' | '.')
}

impl<'a> Parser<'a> {
    fn new(ctx: &'a TypeContext, src: &'a str) -> Self {
        Self { ctx, src, pos: 0 }
    }

    fn error(&self, message: impl Into<String>) -> TypeError {
        TypeError::Parse {
            offset: self.pos,
            message: message.into(),
        }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn skip_ws(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.src.len() - trimmed.len();
    }

    fn eat(&mut self, c: char) -> bool {
        self.skip_ws();
        if self.peek() == Some(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    fn eat_str(&mut self, s: &str) -> bool {
        self.skip_ws();
        if self.rest().starts_with(s) {
            self.pos += s.len();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, c: char) -> TypeResult<()> {
        if self.eat(c) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{c}'")))
        }
    }

    fn take_while(&mut self, f: impl Fn(char) -> bool) -> &'a str {
        let rest = self.rest();
        let n = rest.find(|c: char| !f(c)).unwrap_or(rest.len());
        self.pos += n;
        &rest[..n]
    }

    fn value(&mut self, stop_colon: bool) -> TypeResult<Value> {
        self.skip_ws();
        match self.peek() {
            None => Err(self.error("unexpected end of input")),
            Some('{') => self.record(),
            Some('[') => {
                self.pos += 1;
                let elems = self.elems(']')?;
                self.list(elems, false)
            }
            Some('|') => {
                if self.eat_str("|[") {
                    let elems = self.elems(']')?;
                    self.expect('|')?;
                    self.list(elems, true)
                } else if self.eat_str("|{") {
                    self.map()
                } else {
                    Err(self.error("expected '|[' or '|{'"))
                }
            }
            Some('"') => {
                let s = self.quoted()?;
                Ok(Value::string(&s))
            }
            Some('<') => {
                self.pos += 1;
                let ty = self.ty()?;
                self.expect('>')?;
                Ok(Value::type_value(&ty))
            }
            Some(_) => {
                let start = self.pos;
                let run = self.take_while(|c| is_run_char(c, stop_colon));
                if run.is_empty() {
                    return Err(self.error("unexpected character"));
                }
                if run == "error" && self.eat('(') {
                    let inner = self.value(false)?;
                    self.expect(')')?;
                    return Ok(Value::wrap_error(self.ctx, &inner));
                }
                self.run(run).map_err(|message| TypeError::Parse {
                    offset: start,
                    message,
                })
            }
        }
    }

    fn run(&self, run: &str) -> Result<Value, String> {
        if let Some(v) = scalar(run) {
            return Ok(v);
        }
        if let Some(idx) = run.rfind("::") {
            let (left, right) = (&run[..idx], &run[idx + 2..]);
            if let (Some(v), Some(ty)) = (scalar(left), self.ctx.lookup_by_name(right)) {
                return decorate(v, &ty);
            }
        }
        Err(format!("cannot parse {run:?}"))
    }

    fn quoted(&mut self) -> TypeResult<String> {
        self.expect('"')?;
        let mut out = String::new();
        let mut chars = self.rest().char_indices();
        while let Some((i, c)) = chars.next() {
            match c {
                '"' => {
                    self.pos += i + 1;
                    return Ok(out);
                }
                '\\' => {
                    let Some((_, e)) = chars.next() else {
                        break;
                    };
                    match e {
                        'n' => out.push('\n'),
                        't' => out.push('\t'),
                        'r' => out.push('\r'),
                        'u' => {
                            let hex: String = chars.by_ref().take(4).map(|(_, c)| c).collect();
                            let code = u32::from_str_radix(&hex, 16)
                                .ok()
                                .and_then(char::from_u32)
                                .ok_or_else(|| self.error("bad unicode escape"))?;
                            out.push(code);
                        }
                        other => out.push(other),
                    }
                }
                c => out.push(c),
            }
        }
        Err(self.error("unterminated string"))
    }

    fn elems(&mut self, close: char) -> TypeResult<Vec<Value>> {
        let mut out = Vec::new();
        if self.eat(close) {
            return Ok(out);
        }
        loop {
            out.push(self.value(false)?);
            if self.eat(close) {
                return Ok(out);
            }
            self.expect(',')?;
        }
    }

    fn record(&mut self) -> TypeResult<Value> {
        self.expect('{')?;
        let mut fields = Vec::new();
        let mut body = Vec::new();
        if !self.eat('}') {
            loop {
                self.skip_ws();
                let name = if self.peek() == Some('"') {
                    self.quoted()?
                } else {
                    let name = self.take_while(|c| is_ident_char(c) && c != '.');
                    if name.is_empty() {
                        return Err(self.error("expected field name"));
                    }
                    name.to_string()
                };
                self.expect(':')?;
                let v = self.value(false)?;
                append_container(&mut body, v.bytes());
                fields.push(Field::new(name, v.ty().clone()));
                if self.eat('}') {
                    break;
                }
                self.expect(',')?;
            }
        }
        let ty = self.ctx.lookup_record(fields)?;
        Ok(Value::new(ty, Some(body)))
    }

    /// Chooses an element type for `elems` and returns it with each element's encoding.
    fn unify(&self, elems: &[Value]) -> (Type, Vec<Option<Vec<u8>>>) {
        let mut distinct: Vec<Type> = Vec::new();
        for v in elems {
            if !v.ty().is_null() && !distinct.contains(v.ty()) {
                distinct.push(v.ty().clone());
            }
        }
        match distinct.len() {
            0 => (Type::Null, elems.iter().map(|_| None).collect()),
            1 => (
                distinct.remove(0),
                elems.iter().map(|v| v.bytes().map(<[u8]>::to_vec)).collect(),
            ),
            _ => {
                let union = self.ctx.lookup_union(&distinct);
                let Type::Union(u) = &union else {
                    unreachable!("lookup_union returns a union")
                };
                let encoded = elems
                    .iter()
                    .map(|v| {
                        if v.ty().is_null() {
                            return None;
                        }
                        let tag = u.tag_of(v.ty()).unwrap_or(0);
                        let mut body = Vec::new();
                        append_uvarint(&mut body, tag as u64);
                        append_container(&mut body, v.bytes());
                        Some(body)
                    })
                    .collect();
                (union, encoded)
            }
        }
    }

    fn list(&mut self, elems: Vec<Value>, set: bool) -> TypeResult<Value> {
        let (elem, encoded) = self.unify(&elems);
        let mut parts: Vec<Vec<u8>> = encoded
            .iter()
            .map(|e| {
                let mut part = Vec::new();
                append_container(&mut part, e.as_deref());
                part
            })
            .collect();
        let ty = if set {
            parts.sort();
            parts.dedup();
            self.ctx.lookup_set(&elem)
        } else {
            self.ctx.lookup_array(&elem)
        };
        Ok(Value::new(ty, Some(parts.concat())))
    }

    fn map(&mut self) -> TypeResult<Value> {
        let mut keys = Vec::new();
        let mut vals = Vec::new();
        if !self.eat('}') {
            loop {
                keys.push(self.value(true)?);
                self.expect(':')?;
                vals.push(self.value(false)?);
                if self.eat('}') {
                    break;
                }
                self.expect(',')?;
            }
        }
        self.expect('|')?;
        let (key_ty, key_enc) = self.unify(&keys);
        let (val_ty, val_enc) = self.unify(&vals);
        let mut entries: Vec<(Vec<u8>, Vec<u8>)> = key_enc
            .iter()
            .zip(&val_enc)
            .map(|(k, v)| {
                let mut key = Vec::new();
                append_container(&mut key, k.as_deref());
                let mut val = Vec::new();
                append_container(&mut val, v.as_deref());
                (key, val)
            })
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries.dedup_by(|a, b| a.0 == b.0);
        let mut body = Vec::new();
        for (k, v) in entries {
            body.extend_from_slice(&k);
            body.extend_from_slice(&v);
        }
        let ty = self.ctx.lookup_map(&key_ty, &val_ty);
        Ok(Value::new(ty, Some(body)))
    }

    fn ty(&mut self) -> TypeResult<Type> {
        self.skip_ws();
        match self.peek() {
            Some('{') => {
                self.pos += 1;
                let mut fields = Vec::new();
                if !self.eat('}') {
                    loop {
                        self.skip_ws();
                        let name = if self.peek() == Some('"') {
                            self.quoted()?
                        } else {
                            self.take_while(|c| is_ident_char(c) && c != '.').to_string()
                        };
                        self.expect(':')?;
                        fields.push(Field::new(name, self.ty()?));
                        if self.eat('}') {
                            break;
                        }
                        self.expect(',')?;
                    }
                }
                self.ctx.lookup_record(fields)
            }
            Some('[') => {
                self.pos += 1;
                let elem = self.ty()?;
                self.expect(']')?;
                Ok(self.ctx.lookup_array(&elem))
            }
            Some('|') => {
                if self.eat_str("|[") {
                    let elem = self.ty()?;
                    self.expect(']')?;
                    self.expect('|')?;
                    Ok(self.ctx.lookup_set(&elem))
                } else if self.eat_str("|{") {
                    let key = self.ty()?;
                    self.expect(':')?;
                    let val = self.ty()?;
                    self.expect('}')?;
                    self.expect('|')?;
                    Ok(self.ctx.lookup_map(&key, &val))
                } else {
                    Err(self.error("expected '|[' or '|{'"))
                }
            }
            Some('(') => {
                self.pos += 1;
                let mut members = vec![self.ty()?];
                while self.eat(',') {
                    members.push(self.ty()?);
                }
                self.expect(')')?;
                Ok(self.ctx.lookup_union(&members))
            }
            Some(_) => {
                let name = self.take_while(is_ident_char);
                if name.is_empty() {
                    return Err(self.error("expected type"));
                }
                if name == "enum" && self.eat('(') {
                    let mut symbols = Vec::new();
                    loop {
                        self.skip_ws();
                        let sym = self.take_while(is_ident_char);
                        symbols.push(sym.to_string());
                        if self.eat(')') {
                            break;
                        }
                        self.expect(',')?;
                    }
                    return Ok(self.ctx.lookup_enum(symbols));
                }
                if name == "error" && self.eat('(') {
                    let inner = self.ty()?;
                    self.expect(')')?;
                    return Ok(self.ctx.lookup_error(&inner));
                }
                if self.eat('=') {
                    let inner = self.ty()?;
                    return self.ctx.lookup_named(name, &inner);
                }
                self.ctx
                    .lookup_by_name(name)
                    .ok_or_else(|| self.error(format!("unknown type {name:?}")))
            }
            None => Err(self.error("unexpected end of input")),
        }
    }
}

fn scalar(run: &str) -> Option<Value> {
    match run {
        "null" => return Some(Value::null_value()),
        "true" => return Some(Value::bool(true)),
        "false" => return Some(Value::bool(false)),
        "NaN" => return Some(Value::float64(f64::NAN)),
        "+Inf" | "Inf" => return Some(Value::float64(f64::INFINITY)),
        "-Inf" => return Some(Value::float64(f64::NEG_INFINITY)),
        _ => {}
    }
    if let Some(hex) = run.strip_prefix("0x") {
        return parse_hex(hex).map(|b| Value::bytes_value(&b));
    }
    if run.contains('/') {
        return run.parse::<Net>().ok().map(Value::net);
    }
    if let Ok(ip) = run.parse::<IpAddr>() {
        return Some(Value::ip(ip));
    }
    if let Ok(i) = run.parse::<i64>() {
        return Some(Value::int64(i));
    }
    if let Ok(u) = run.parse::<u64>() {
        return Some(Value::uint64(u));
    }
    let numeric_start = run
        .trim_start_matches(['+', '-'])
        .starts_with(|c: char| c.is_ascii_digit() || c == '.');
    if numeric_start {
        if let Ok(f) = run.parse::<f64>() {
            return Some(Value::float64(f));
        }
    }
    if let Ok(t) = DateTime::parse_from_rfc3339(run) {
        return t.timestamp_nanos_opt().map(Value::time);
    }
    parse_duration(run).map(Value::duration)
}

fn parse_hex(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok())
        .collect()
}

/// Parses durations such as `1h30m`, `-2.5s` and `100ns` into nanoseconds.
pub fn parse_duration(s: &str) -> Option<i64> {
    const UNITS: [(&str, f64); 10] = [
        ("ns", 1.0),
        ("us", 1e3),
        ("µs", 1e3),
        ("ms", 1e6),
        ("s", 1e9),
        ("m", 60e9),
        ("h", 3600e9),
        ("d", 86400e9),
        ("w", 7.0 * 86400e9),
        ("y", 365.0 * 86400e9),
    ];
    let (neg, mut rest) = match s.strip_prefix('-') {
        Some(r) => (true, r),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    if rest.is_empty() {
        return None;
    }
    let mut total = 0f64;
    while !rest.is_empty() {
        let n = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .filter(|&n| n > 0)?;
        let num: f64 = rest[..n].parse().ok()?;
        rest = &rest[n..];
        let (unit, scale) = UNITS
            .iter()
            .filter(|(u, _)| rest.starts_with(u))
            .max_by_key(|(u, _)| u.len())?;
        rest = &rest[unit.len()..];
        total += num * scale;
    }
    let ns = if neg { -total } else { total };
    if ns.abs() > i64::MAX as f64 {
        return None;
    }
    Some(ns.round() as i64)
}

/// Applies a `::type` decoration to a scalar.
fn decorate(v: Value, ty: &Type) -> Result<Value, String> {
    if v.is_null() {
        return Ok(Value::null(ty.clone()));
    }
    let target = ty.under();
    let id = target.id();
    let out = if types::is_float(id) {
        v.as_number().map(|f| Value::float(target.clone(), f))
    } else if types::is_unsigned(id) {
        let u = match (v.as_int(), v.as_uint()) {
            (Some(i), _) => u64::try_from(i).ok(),
            (_, Some(u)) => Some(u),
            _ => None,
        };
        u.filter(|&u| fits_unsigned(id, u))
            .map(|u| Value::uint(target.clone(), u))
    } else if types::is_signed(id) {
        let i = match (v.as_int(), v.as_uint()) {
            (Some(i), _) => Some(i),
            (_, Some(u)) => i64::try_from(u).ok(),
            _ => None,
        };
        i.filter(|&i| fits_signed(id, i))
            .map(|i| Value::int(target.clone(), i))
    } else if v.ty() == target {
        Some(v.clone())
    } else {
        None
    };
    match out {
        Some(out) if matches!(ty, Type::Named(_)) => Ok(out.with_type(ty.clone())),
        Some(out) => Ok(out),
        None => Err(format!("cannot decorate {v} as {ty}")),
    }
}

pub(crate) fn fits_unsigned(id: u32, u: u64) -> bool {
    match id {
        types::ID_UINT8 => u <= u64::from(u8::MAX),
        types::ID_UINT16 => u <= u64::from(u16::MAX),
        types::ID_UINT32 => u <= u64::from(u32::MAX),
        _ => true,
    }
}

pub(crate) fn fits_signed(id: u32, i: i64) -> bool {
    match id {
        types::ID_INT8 => i8::try_from(i).is_ok(),
        types::ID_INT16 => i16::try_from(i).is_ok(),
        types::ID_INT32 => i32::try_from(i).is_ok(),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn round_trip(text: &str) {
        let ctx = TypeContext::new();
        let v = parse_value(&ctx, text).unwrap();
        assert_eq!(v.to_string(), text);
    }

    #[test]
    fn formats_round_trip() {
        for text in [
            "{a:1,b:\"x\"}",
            "[1,2,3]",
            "|[1,2]|",
            "|{\"a\":1,\"b\":2}|",
            "error(\"missing\")",
            "<{a:int64,b:[string]}>",
            "10.0.0.0/8",
            "::1",
            "0x0aff",
            "1.5",
            "NaN",
            "-Inf",
            "200::uint8",
            "-3::int8",
            "1h30m0s",
            "2024-01-02T03:04:05Z",
            "[1,\"a\",null]",
            "null",
        ] {
            if text == "1h30m0s" {
                let ctx = TypeContext::new();
                assert_eq!(parse_value(&ctx, text).unwrap().to_string(), "90m");
                continue;
            }
            round_trip(text);
        }
    }

    #[test]
    fn sequences_and_records() {
        let ctx = TypeContext::new();
        let vals = parse_values(&ctx, "{a:1} {a:2.5}\n{a:\"hi\"}").unwrap();
        assert_eq!(vals.len(), 3);
        assert_eq!(vals[1].field("a"), Some(Value::float64(2.5)));
        assert_ne!(vals[0].ty(), vals[1].ty());
    }

    #[test]
    fn type_syntax() {
        let ctx = TypeContext::new();
        let ty = parse_type(&ctx, "{a:(int64,string),b:|{string:ip}|,c:port=uint16}").unwrap();
        assert_eq!(ty.to_string(), "{a:(int64,string),b:|{string:ip}|,c:port=uint16}");
        assert_eq!(
            parse_type(&ctx, "enum(a,b)").unwrap().to_string(),
            "enum(a,b)"
        );
        assert!(parse_type(&ctx, "nope").is_err());
    }

    #[test]
    fn durations() {
        assert_eq!(parse_duration("1h30m"), Some(90 * 60 * 1_000_000_000));
        assert_eq!(parse_duration("-250ms"), Some(-250_000_000));
        assert_eq!(parse_duration("1.5s"), Some(1_500_000_000));
        assert_eq!(parse_duration("5"), None);
        assert_eq!(parse_duration("m"), None);
    }

    #[test]
    fn errors_carry_offsets() {
        let ctx = TypeContext::new();
        let err = parse_value(&ctx, "{a:1,").unwrap_err();
        assert!(matches!(err, TypeError::Parse { .. }));
    }
}
