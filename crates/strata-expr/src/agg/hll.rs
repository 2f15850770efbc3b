//! `dcount`: an approximate distinct count over a HyperLogLog sketch.

use super::{invalid_partial, AggFunc};
use crate::access::byte_slots;
use crate::ExprResult;
use ahash::RandomState;
use strata_vector::{nulls_of, Type, TypeContext, Value, Vector};

const PRECISION: u32 = 14;
const REGISTERS: usize = 1 << PRECISION;

/// Fixed seeds so that sketches built on different workers merge.
fn hasher() -> RandomState {
    RandomState::with_seeds(0x5d58_8b65, 0x8bad_f00d, 0x2545_f491, 0x9e37_79b9)
}

#[derive(Debug)]
pub(crate) struct DCount {
    hasher: RandomState,
    registers: Vec<u8>,
}

impl Default for DCount {
    fn default() -> Self {
        Self {
            hasher: hasher(),
            registers: vec![0; REGISTERS],
        }
    }
}

impl DCount {
    fn insert(&mut self, key: &[u8]) {
        let hash = self.hasher.hash_one(key);
        let index = (hash >> (64 - PRECISION)) as usize;
        let rank = ((hash << PRECISION).leading_zeros() + 1).min(64 - PRECISION + 1) as u8;
        if rank > self.registers[index] {
            self.registers[index] = rank;
        }
    }

    fn estimate(&self) -> u64 {
        let m = REGISTERS as f64;
        let alpha = 0.7213 / (1.0 + 1.079 / m);
        let sum: f64 = self.registers.iter().map(|&r| 2f64.powi(-i32::from(r))).sum();
        let raw = alpha * m * m / sum;
        let zeros = self.registers.iter().filter(|&&r| r == 0).count();
        let est = if raw <= 2.5 * m && zeros > 0 {
            m * (m / zeros as f64).ln()
        } else {
            raw
        };
        est.round() as u64
    }
}

impl AggFunc for DCount {
    fn consume(&mut self, v: &Vector) {
        let nulls = nulls_of(v);
        let mut key = Vec::new();
        for i in (0..v.len()).filter(|&i| !nulls.value(i)) {
            key.clear();
            // The type ID keeps equal bytes of different types apart.
            key.extend_from_slice(&v.type_at(i).id().to_le_bytes());
            if v.append_slot(i, &mut key) {
                self.insert(&key);
            }
        }
    }

    fn consume_as_partial(&mut self, partial: &Vector) -> ExprResult<()> {
        if !matches!(partial.ty().under(), Type::Bytes) {
            return Err(invalid_partial("dcount"));
        }
        let slots = byte_slots(partial).ok_or_else(|| invalid_partial("dcount"))?;
        let nulls = nulls_of(partial);
        for i in (0..partial.len()).filter(|&i| !nulls.value(i)) {
            let sketch = slots.get(i as usize);
            if sketch.len() != REGISTERS {
                return Err(invalid_partial("dcount"));
            }
            for (r, &s) in self.registers.iter_mut().zip(sketch) {
                *r = (*r).max(s);
            }
        }
        Ok(())
    }

    fn result(&mut self, _: &TypeContext) -> Value {
        Value::int64(self.estimate() as i64)
    }

    fn result_as_partial(&mut self, _: &TypeContext) -> Value {
        Value::bytes_value(&self.registers)
    }
}
