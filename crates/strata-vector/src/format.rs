//! Text formatting of values in the value text syntax (`{a:1,b:"x"}`, `[1,2]`, `error("missing")`).

use crate::encoding;
use crate::types::{self, Type};
use chrono::{DateTime, SecondsFormat};
use std::fmt::Write;

pub fn format_value(ty: &Type, bytes: Option<&[u8]>, out: &mut String) {
    let Some(bytes) = bytes else {
        out.push_str("null");
        return;
    };
    match ty {
        Type::Named(n) => format_value(n.inner(), Some(bytes), out),
        Type::Error(e) => {
            out.push_str("error(");
            format_value(e.inner(), Some(bytes), out);
            out.push(')');
        }
        Type::Record(r) => {
            out.push('{');
            let mut elems = encoding::iter(bytes);
            for (i, field) in r.fields().iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                push_field_name(out, &field.name);
                out.push(':');
                format_value(&field.ty, elems.next().flatten(), out);
            }
            out.push('}');
        }
        Type::Array(a) => {
            out.push('[');
            format_elems(a.elem(), bytes, out);
            out.push(']');
        }
        Type::Set(a) => {
            out.push_str("|[");
            format_elems(a.elem(), bytes, out);
            out.push_str("]|");
        }
        Type::Map(m) => {
            out.push_str("|{");
            let mut elems = encoding::iter(bytes);
            let mut first = true;
            while let Some(key) = elems.next() {
                let val = elems.next().flatten();
                if !first {
                    out.push(',');
                }
                first = false;
                format_value(m.key(), key, out);
                out.push(':');
                format_value(m.val(), val, out);
            }
            out.push_str("}|");
        }
        Type::Union(u) => {
            let mut buf = bytes;
            let tag = encoding::read_uvarint(&mut buf).unwrap_or(0) as usize;
            match u.types().get(tag) {
                Some(member) => format_value(member, encoding::iter(buf).next().flatten(), out),
                None => out.push_str("null"),
            }
        }
        Type::Enum(e) => {
            let idx = encoding::decode_uint(bytes) as usize;
            match e.symbols().get(idx) {
                Some(sym) => out.push_str(sym),
                None => out.push_str("null"),
            }
        }
        primitive => format_primitive(primitive, bytes, out),
    }
}

fn format_elems(elem: &Type, bytes: &[u8], out: &mut String) {
    for (i, e) in encoding::iter(bytes).enumerate() {
        if i > 0 {
            out.push(',');
        }
        format_value(elem, e, out);
    }
}

fn push_field_name(out: &mut String, name: &str) {
    if types::is_identifier(name) {
        out.push_str(name);
    } else {
        push_quoted(out, name);
    }
}

pub fn push_quoted(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if c.is_control() => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

fn decorate(ty: &Type) -> bool {
    matches!(
        ty,
        Type::Uint8
            | Type::Uint16
            | Type::Uint32
            | Type::Uint64
            | Type::Int8
            | Type::Int16
            | Type::Int32
            | Type::Float16
            | Type::Float32
    )
}

pub fn format_float(v: f64, out: &mut String) {
    if v.is_nan() {
        out.push_str("NaN");
    } else if v.is_infinite() {
        out.push_str(if v > 0.0 { "+Inf" } else { "-Inf" });
    } else {
        let _ = write!(out, "{v:?}");
    }
}

pub fn format_duration(ns: i64, out: &mut String) {
    const UNITS: [(i64, &str); 6] = [
        (3_600_000_000_000, "h"),
        (60_000_000_000, "m"),
        (1_000_000_000, "s"),
        (1_000_000, "ms"),
        (1_000, "us"),
        (1, "ns"),
    ];
    if ns == 0 {
        out.push_str("0s");
        return;
    }
    for (scale, unit) in UNITS {
        if ns % scale == 0 {
            let _ = write!(out, "{}{unit}", ns / scale);
            return;
        }
    }
}

pub fn format_time(ns: i64, out: &mut String) {
    let dt = DateTime::from_timestamp_nanos(ns);
    out.push_str(&dt.to_rfc3339_opts(SecondsFormat::AutoSi, true));
}

fn format_primitive(ty: &Type, bytes: &[u8], out: &mut String) {
    match ty {
        Type::Uint8 | Type::Uint16 | Type::Uint32 | Type::Uint64 => {
            let _ = write!(out, "{}", encoding::decode_uint(bytes));
        }
        Type::Int8 | Type::Int16 | Type::Int32 | Type::Int64 => {
            let _ = write!(out, "{}", encoding::decode_int(bytes));
        }
        Type::Duration => format_duration(encoding::decode_int(bytes), out),
        Type::Time => format_time(encoding::decode_int(bytes), out),
        Type::Float16 | Type::Float32 | Type::Float64 => {
            format_float(encoding::decode_float(bytes), out)
        }
        Type::Bool => out.push_str(if encoding::decode_bool(bytes) {
            "true"
        } else {
            "false"
        }),
        Type::Bytes => {
            out.push_str("0x");
            for b in bytes {
                let _ = write!(out, "{b:02x}");
            }
        }
        Type::String => push_quoted(out, &String::from_utf8_lossy(bytes)),
        Type::Ip => match encoding::decode_ip(bytes) {
            Some(ip) => {
                let _ = write!(out, "{ip}");
            }
            None => out.push_str("null"),
        },
        Type::Net => match encoding::decode_net(bytes) {
            Some(net) => {
                let _ = write!(out, "{net}");
            }
            None => out.push_str("null"),
        },
        Type::TypeValue => {
            out.push('<');
            // Type values are decoded in a scratch context purely for display.
            let ctx = crate::TypeContext::new();
            match ctx.lookup_by_value(bytes) {
                Ok(t) => {
                    let _ = write!(out, "{t}");
                }
                Err(_) => out.push_str("?"),
            }
            out.push('>');
        }
        Type::Null => out.push_str("null"),
        _ => {}
    }
    if decorate(ty) {
        let _ = write!(out, "::{ty}");
    }
}
