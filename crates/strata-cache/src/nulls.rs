use crate::encode::{decode_u32s, runs_to_bits};
use crate::error::{corrupt, CacheResult};
use crate::meta::Segment;
use crate::object::Loader;
use std::sync::{Arc, Mutex};
use strata_vector::BitVec;

/// One level of a null mask split across nested `Nulls` nodes.
///
/// The runs of a level cover only the rows that are not null at the enclosing levels; the
/// flattened mask covers every row of the row space.
#[derive(Debug)]
pub(crate) struct NullsNode {
    runs: Segment,
    parent: Option<Arc<NullsNode>>,
    /// Rows of the row space.
    len: u32,
    flat: Mutex<Option<BitVec>>,
}

impl NullsNode {
    pub(crate) fn new(runs: Segment, parent: Option<Arc<NullsNode>>, len: u32) -> Self {
        Self {
            runs,
            parent,
            len,
            flat: Mutex::new(None),
        }
    }

    /// The mask over the whole row space, computed on first use.
    pub(crate) fn get(&self, loader: &Loader<'_>) -> CacheResult<BitVec> {
        let mut flat = self.flat.lock().expect("nulls node poisoned");
        if let Some(bits) = flat.as_ref() {
            return Ok(bits.clone());
        }
        let local = runs_to_bits(&decode_u32s(&loader.read(&self.runs)?)?);
        let bits = match &self.parent {
            Some(parent) => convolve(&parent.get(loader)?, &local)?,
            None => local,
        };
        if bits.len() != self.len as usize {
            return Err(corrupt(format!(
                "null runs cover {} rows, expected {}",
                bits.len(),
                self.len
            )));
        }
        *flat = Some(bits.clone());
        Ok(bits)
    }
}

/// Interleaves `child` (one bit per non-null row of `parent`) into `parent`.
pub(crate) fn convolve(parent: &BitVec, child: &BitVec) -> CacheResult<BitVec> {
    let dense = parent.len() - parent.count_ones();
    if child.len() != dense {
        return Err(corrupt(format!(
            "null runs cover {} rows, expected {dense}",
            child.len()
        )));
    }
    let mut out = BitVec::with_capacity_bits(parent.len());
    let mut k = 0;
    for i in 0..parent.len() {
        if parent.get(i) {
            out.push(true);
        } else {
            out.push(child.get(k));
            k += 1;
        }
    }
    Ok(out)
}

/// The flattened mask of an optional chain; the zero mask when there is none.
pub(crate) fn flat_nulls(chain: &Option<Arc<NullsNode>>, loader: &Loader<'_>) -> CacheResult<BitVec> {
    match chain {
        Some(node) => node.get(loader),
        None => Ok(BitVec::zero()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn convolve_fills_parent_gaps_in_order() {
        let parent = BitVec::from_bools([false, true, false, false, true]);
        let child = BitVec::from_bools([true, false, true]);
        let out = convolve(&parent, &child).unwrap();
        assert_eq!(out.positions(), vec![0, 1, 3, 4]);
        assert!(convolve(&parent, &BitVec::from_bools([true])).is_err());
    }
}
