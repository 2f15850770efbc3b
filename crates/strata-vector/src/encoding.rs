//! Canonical byte encodings for values.
//!
//! Scalars use fixed-width little-endian layouts. Containers are sequences of
//! elements, each prefixed by a uvarint tag: `0` for null, otherwise `len + 1`.

use crate::types;
use crate::value::Net;
use half::f16;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

pub fn append_uvarint(out: &mut Vec<u8>, mut v: u64) {
    while v >= 0x80 {
        out.push((v as u8) | 0x80);
        v >>= 7;
    }
    out.push(v as u8);
}

/// Reads a uvarint from the front of `buf`, advancing it.
pub fn read_uvarint(buf: &mut &[u8]) -> Option<u64> {
    let mut v: u64 = 0;
    let mut shift = 0u32;
    let data = *buf;
    for (i, &b) in data.iter().enumerate() {
        if shift >= 64 {
            return None;
        }
        v |= u64::from(b & 0x7f) << shift;
        if b & 0x80 == 0 {
            *buf = &data[i + 1..];
            return Some(v);
        }
        shift += 7;
    }
    None
}

pub fn zigzag(v: i64) -> u64 {
    ((v << 1) ^ (v >> 63)) as u64
}

pub fn unzigzag(v: u64) -> i64 {
    ((v >> 1) as i64) ^ -((v & 1) as i64)
}

/// Appends one container element.
pub fn append_container(out: &mut Vec<u8>, elem: Option<&[u8]>) {
    match elem {
        None => append_uvarint(out, 0),
        Some(bytes) => {
            append_uvarint(out, bytes.len() as u64 + 1);
            out.extend_from_slice(bytes);
        }
    }
}

/// Iterates the elements of a container body.
#[derive(Clone, Debug)]
pub struct ContainerIter<'a> {
    buf: &'a [u8],
}

pub fn iter(body: &[u8]) -> ContainerIter<'_> {
    ContainerIter { buf: body }
}

impl<'a> ContainerIter<'a> {
    pub fn is_done(&self) -> bool {
        self.buf.is_empty()
    }
}

impl<'a> Iterator for ContainerIter<'a> {
    type Item = Option<&'a [u8]>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buf.is_empty() {
            return None;
        }
        let tag = read_uvarint(&mut self.buf)?;
        if tag == 0 {
            return Some(None);
        }
        let len = (tag - 1) as usize;
        if len > self.buf.len() {
            debug_assert!(false, "truncated container element");
            self.buf = &[];
            return None;
        }
        let (elem, rest) = self.buf.split_at(len);
        self.buf = rest;
        Some(Some(elem))
    }
}

pub fn encode_int(v: i64) -> Vec<u8> {
    v.to_le_bytes().to_vec()
}

pub fn decode_int(bytes: &[u8]) -> i64 {
    let mut buf = [0u8; 8];
    let n = bytes.len().min(8);
    buf[..n].copy_from_slice(&bytes[..n]);
    i64::from_le_bytes(buf)
}

pub fn encode_uint(v: u64) -> Vec<u8> {
    v.to_le_bytes().to_vec()
}

pub fn decode_uint(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    let n = bytes.len().min(8);
    buf[..n].copy_from_slice(&bytes[..n]);
    u64::from_le_bytes(buf)
}

/// Encodes a float at the width of the float type `id`.
pub fn encode_float(id: u32, v: f64) -> Vec<u8> {
    match id {
        types::ID_FLOAT16 => f16::from_f64(v).to_le_bytes().to_vec(),
        types::ID_FLOAT32 => (v as f32).to_le_bytes().to_vec(),
        _ => v.to_le_bytes().to_vec(),
    }
}

pub fn decode_float(bytes: &[u8]) -> f64 {
    match bytes.len() {
        2 => f16::from_le_bytes([bytes[0], bytes[1]]).to_f64(),
        4 => f64::from(f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
        8 => {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(bytes);
            f64::from_le_bytes(buf)
        }
        _ => 0.0,
    }
}

pub fn encode_bool(v: bool) -> Vec<u8> {
    vec![u8::from(v)]
}

pub fn decode_bool(bytes: &[u8]) -> bool {
    bytes.first().is_some_and(|b| *b != 0)
}

pub fn encode_ip(ip: IpAddr) -> Vec<u8> {
    match ip {
        IpAddr::V4(v4) => v4.octets().to_vec(),
        IpAddr::V6(v6) => v6.octets().to_vec(),
    }
}

pub fn decode_ip(bytes: &[u8]) -> Option<IpAddr> {
    match bytes.len() {
        4 => Some(IpAddr::V4(Ipv4Addr::new(
            bytes[0], bytes[1], bytes[2], bytes[3],
        ))),
        16 => {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(bytes);
            Some(IpAddr::V6(Ipv6Addr::from(octets)))
        }
        _ => None,
    }
}

pub fn encode_net(net: Net) -> Vec<u8> {
    let mut out = encode_ip(net.addr());
    out.push(net.prefix());
    out
}

pub fn decode_net(bytes: &[u8]) -> Option<Net> {
    let (prefix, addr) = bytes.split_last()?;
    Net::new(decode_ip(addr)?, *prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uvarint_round_trips_across_byte_boundaries() {
        for v in [0u64, 1, 127, 128, 300, u32::MAX as u64, u64::MAX] {
            let mut out = Vec::new();
            append_uvarint(&mut out, v);
            let mut buf = out.as_slice();
            assert_eq!(read_uvarint(&mut buf), Some(v));
            assert!(buf.is_empty());
        }
    }

    #[test]
    fn container_iter_distinguishes_null_and_empty() {
        let mut body = Vec::new();
        append_container(&mut body, None);
        append_container(&mut body, Some(b""));
        append_container(&mut body, Some(b"abc"));
        let elems: Vec<_> = iter(&body).collect();
        assert_eq!(elems, vec![None, Some(&b""[..]), Some(&b"abc"[..])]);
    }

    #[test]
    fn zigzag_handles_extremes() {
        for v in [0i64, -1, 1, i64::MIN, i64::MAX] {
            assert_eq!(unzigzag(zigzag(v)), v);
        }
    }
}
