use super::{with_errors, BytesOut, CallContext, FunctionSpec};
use crate::access::{byte_slots, is_error};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use std::fmt::Write as _;
use strata_vector::{nulls_of, pick, Type, Vector};

inventory::submit! {
    FunctionSpec { name: "base64", min_args: 1, max_args: 1, rip_unions: true, implementation: base64_fn }
}

inventory::submit! {
    FunctionSpec { name: "hex", min_args: 1, max_args: 1, rip_unions: true, implementation: hex_fn }
}

/// A reversible text encoding of bytes.
struct Codec {
    name: &'static str,
    label: &'static str,
    encode: fn(&[u8]) -> String,
    decode: fn(&str) -> Option<Vec<u8>>,
}

const BASE64: Codec = Codec {
    name: "base64",
    label: "base64",
    encode: base64_encode,
    decode: base64_decode,
};

fn base64_encode(b: &[u8]) -> String {
    STANDARD.encode(b)
}

fn base64_decode(s: &str) -> Option<Vec<u8>> {
    STANDARD.decode(s).ok()
}

const HEX: Codec = Codec {
    name: "hex",
    label: "hexidecimal",
    encode: hex_encode,
    decode: hex_decode,
};

fn hex_encode(b: &[u8]) -> String {
    let mut out = String::with_capacity(b.len() * 2);
    for byte in b {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

fn hex_decode(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| s.get(i..i + 2).and_then(|pair| u8::from_str_radix(pair, 16).ok()))
        .collect()
}

/// Bytes encode to strings and strings decode to bytes; any null row is an error.
fn transcode(cx: &CallContext<'_>, codec: &Codec, v: &Vector) -> Vector {
    if is_error(v) {
        return v.clone();
    }
    let encoding = match v.ty().under() {
        Type::Bytes => true,
        Type::String => false,
        Type::Null => {
            let msg = format!("{}: illegal null argument", codec.name);
            return Vector::wrapped_error(cx.types, &msg, v);
        }
        _ => {
            let msg = format!("{}: argument must a bytes or string type", codec.name);
            return Vector::wrapped_error(cx.types, &msg, v);
        }
    };
    let Some(src) = byte_slots(v) else {
        return Vector::missing(cx.types, v.len());
    };
    let nulls = nulls_of(v);
    let mut out = BytesOut::with_capacity(v.len() as usize);
    let (mut null_rows, mut bad_rows) = (Vec::new(), Vec::new());
    for i in 0..v.len() {
        if nulls.value(i) {
            null_rows.push(i);
        } else if encoding {
            out.push((codec.encode)(src.get(i as usize)).as_bytes());
        } else {
            match (codec.decode)(src.str(i as usize)) {
                Some(b) => out.push(&b),
                None => bad_rows.push(i),
            }
        }
    }
    let out = if encoding { out.strings() } else { out.bytes() };
    if null_rows.is_empty() && bad_rows.is_empty() {
        return out;
    }
    let mut rows: Vec<(u32, u32)> = null_rows.iter().map(|&r| (r, 0)).collect();
    rows.extend(bad_rows.iter().map(|&r| (r, 1)));
    rows.sort_unstable();
    let null_err = {
        let msg = format!("{}: illegal null argument", codec.name);
        Vector::string_error(cx.types, &msg, null_rows.len() as u32)
    };
    let bad_err = {
        let msg = format!("{}: string argument is not {}", codec.name, codec.label);
        Vector::wrapped_error(cx.types, &msg, &pick(v, &bad_rows))
    };
    let (index, tags): (Vec<u32>, Vec<u32>) = rows.into_iter().unzip();
    with_errors(out, &index, |_| Vector::dynamic(tags, vec![null_err, bad_err]))
}

fn base64_fn(cx: &CallContext<'_>, args: &[Vector]) -> Vector {
    transcode(cx, &BASE64, &args[0])
}

fn hex_fn(cx: &CallContext<'_>, args: &[Vector]) -> Vector {
    transcode(cx, &HEX, &args[0])
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{col, run};
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use strata_vector::TypeContext;

    #[test]
    fn hex_codec() {
        assert_eq!(hex_encode(b"\x01\xab"), "01ab");
        assert_eq!(hex_decode("01AB"), Some(vec![1, 0xab]));
        assert_eq!(hex_decode("abc"), None);
    }

    #[test]
    fn base64_both_directions() {
        let ctx = Arc::new(TypeContext::new());
        assert_eq!(run(&ctx, "base64", &col(&ctx, "\"aGk=\""), &[]), ["0x6869"]);
        assert_eq!(run(&ctx, "base64", &col(&ctx, "0x6869"), &[]), ["\"aGk=\""]);
        let out = run(&ctx, "base64", &col(&ctx, "\"!!\""), &[]);
        assert!(out[0].contains("base64: string argument is not base64"));
        let out = run(&ctx, "hex", &col(&ctx, "1"), &[]);
        assert!(out[0].contains("hex: argument must a bytes or string type"));
    }
}
