use super::Vector;
use crate::bitmap::BitVec;
use crate::value::Value;

/// A single value repeated `len` times.
#[derive(Clone, Debug)]
pub struct ConstVector {
    pub value: Value,
    pub len: u32,
    pub nulls: BitVec,
}

impl ConstVector {
    pub fn new(value: Value, len: u32, nulls: BitVec) -> Self {
        Self { value, len, nulls }
    }
}

/// Dictionary encoding: `inner` holds the distinct values and `index[i]` selects one.
#[derive(Clone, Debug)]
pub struct DictVector {
    pub inner: Vector,
    pub index: Vec<u8>,
    pub counts: Vec<u32>,
    pub nulls: BitVec,
}

impl DictVector {
    pub fn new(inner: Vector, index: Vec<u8>, counts: Vec<u32>, nulls: BitVec) -> Self {
        debug_assert!(
            index
                .iter()
                .enumerate()
                .all(|(i, &k)| nulls.value(i as u32) || u32::from(k) < inner.len()),
            "dict index out of range"
        );
        Self {
            inner,
            index,
            counts,
            nulls,
        }
    }

    /// Rebuilds index, counts and nulls with the entries in `drop` removed from the dictionary.
    ///
    /// Returns the new index, counts, nulls and the slots that referenced a dropped entry (those
    /// slots are omitted from the new index).
    pub fn rebuild_drop_tags(&self, drop: &[u32]) -> (Vec<u8>, Vec<u32>, BitVec, Vec<u32>) {
        let n = self.inner.len() as usize;
        let mut remap: Vec<Option<u8>> = vec![None; n];
        let mut next = 0u8;
        for (k, slot) in remap.iter_mut().enumerate() {
            if !drop.contains(&(k as u32)) {
                *slot = Some(next);
                next = next.wrapping_add(1);
            }
        }
        let mut counts = vec![0u32; n - drop.len().min(n)];
        let mut index = Vec::with_capacity(self.index.len());
        let mut null_bits = Vec::new();
        let mut dropped = Vec::new();
        for (i, &tag) in self.index.iter().enumerate() {
            if self.nulls.value(i as u32) {
                null_bits.push(true);
                index.push(0);
                continue;
            }
            match remap[tag as usize] {
                Some(k) => {
                    null_bits.push(false);
                    index.push(k);
                    counts[k as usize] += 1;
                }
                None => dropped.push(i as u32),
            }
        }
        let nulls = if self.nulls.is_zero() {
            BitVec::zero()
        } else {
            BitVec::from_bools(null_bits)
        };
        (index, counts, nulls, dropped)
    }
}

/// A logical slice/permutation of `inner`.
#[derive(Clone, Debug)]
pub struct ViewVector {
    pub inner: Vector,
    pub index: Vec<u32>,
}
