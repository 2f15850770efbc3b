//! Segment codecs.
//!
//! Signed integers are zigzag uvarints, unsigned integers plain uvarints, floats `f64` LE,
//! `u32` arrays LE words and everything else a sequence of container elements.

use crate::error::{corrupt, CacheResult};
use strata_vector::encoding::{append_container, append_uvarint, read_uvarint, unzigzag, zigzag};
use strata_vector::BitVec;

pub(crate) fn encode_ints(values: impl IntoIterator<Item = i64>) -> Vec<u8> {
    let mut out = Vec::new();
    for v in values {
        append_uvarint(&mut out, zigzag(v));
    }
    out
}

pub(crate) fn decode_ints(bytes: &[u8], n: usize) -> CacheResult<Vec<i64>> {
    Ok(decode_uints(bytes, n)?.into_iter().map(unzigzag).collect())
}

pub(crate) fn encode_uints(values: impl IntoIterator<Item = u64>) -> Vec<u8> {
    let mut out = Vec::new();
    for v in values {
        append_uvarint(&mut out, v);
    }
    out
}

pub(crate) fn decode_uints(bytes: &[u8], n: usize) -> CacheResult<Vec<u64>> {
    let mut buf = bytes;
    let mut out = Vec::with_capacity(n);
    while !buf.is_empty() {
        out.push(read_uvarint(&mut buf).ok_or_else(|| corrupt("truncated uvarint"))?);
    }
    check_count("integer", out.len(), n)?;
    Ok(out)
}

pub(crate) fn encode_floats(values: impl IntoIterator<Item = f64>) -> Vec<u8> {
    values.into_iter().flat_map(f64::to_le_bytes).collect()
}

pub(crate) fn decode_floats(bytes: &[u8], n: usize) -> CacheResult<Vec<f64>> {
    check_count("float", bytes.len() / 8, n)?;
    if bytes.len() % 8 != 0 {
        return Err(corrupt("float segment is not a multiple of 8 bytes"));
    }
    Ok(bytes
        .chunks_exact(8)
        .map(|c| f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
        .collect())
}

pub(crate) fn encode_u32s(values: &[u32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

pub(crate) fn decode_u32s(bytes: &[u8]) -> CacheResult<Vec<u32>> {
    if bytes.len() % 4 != 0 {
        return Err(corrupt("u32 segment is not a multiple of 4 bytes"));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// Appends one primitive value body.
pub(crate) fn append_primitive(out: &mut Vec<u8>, body: &[u8]) {
    append_container(out, Some(body));
}

/// Splits a primitive segment into its value bodies.
pub(crate) fn decode_primitives(bytes: &[u8], n: usize) -> CacheResult<Vec<&[u8]>> {
    let mut buf = bytes;
    let mut out = Vec::with_capacity(n);
    while !buf.is_empty() {
        let tag = read_uvarint(&mut buf).ok_or_else(|| corrupt("truncated value tag"))?;
        let len = tag
            .checked_sub(1)
            .ok_or_else(|| corrupt("null inside a primitive segment"))? as usize;
        if len > buf.len() {
            return Err(corrupt("truncated value body"));
        }
        let (body, rest) = buf.split_at(len);
        out.push(body);
        buf = rest;
    }
    check_count("primitive", out.len(), n)?;
    Ok(out)
}

/// Run lengths of alternating non-null and null stretches, starting with non-null.
pub(crate) fn null_runs(bits: impl IntoIterator<Item = bool>) -> Vec<u32> {
    let mut runs = Vec::new();
    let mut current = false;
    let mut run = 0u32;
    for bit in bits {
        if bit != current {
            runs.push(run);
            current = bit;
            run = 0;
        }
        run += 1;
    }
    runs.push(run);
    runs
}

pub(crate) fn runs_to_bits(runs: &[u32]) -> BitVec {
    let mut bits = BitVec::new();
    let mut null = false;
    for &run in runs {
        for _ in 0..run {
            bits.push(null);
        }
        null = !null;
    }
    bits
}

/// Spreads dense values over `flat.len()` rows, putting `T::default()` at null positions.
pub(crate) fn extend_for_nulls<T: Clone + Default>(
    dense: Vec<T>,
    flat: &BitVec,
    n: usize,
) -> CacheResult<Vec<T>> {
    let nnull = if flat.is_zero() { 0 } else { flat.count_ones() };
    check_count("dense", dense.len(), n - nnull.min(n))?;
    if nnull == 0 {
        return Ok(dense);
    }
    let mut out = Vec::with_capacity(n);
    let mut it = dense.into_iter();
    for slot in 0..n as u32 {
        if flat.value(slot) {
            out.push(T::default());
        } else {
            out.push(it.next().unwrap_or_default());
        }
    }
    Ok(out)
}

fn check_count(what: &str, got: usize, want: usize) -> CacheResult<()> {
    if got != want {
        return Err(corrupt(format!("{what} segment holds {got} values, expected {want}")));
    }
    Ok(())
}
