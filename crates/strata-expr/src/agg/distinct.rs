use super::{consume, invalid_partial, AggFunc};
use crate::access::byte_slots;
use crate::ExprResult;
use ahash::AHashSet;
use strata_vector::encoding::{append_uvarint, read_uvarint};
use strata_vector::{nulls_of, DynamicBuilder, Type, TypeContext, Value, Vector};

const BATCH: usize = 1024;

/// Wraps an aggregate so that it sees each distinct value once.
///
/// Values are keyed by type ID plus encoding and only reach the inner function when the
/// result is requested, so partials carry the seen keys rather than the inner partial.
#[derive(Debug)]
pub struct Distinct {
    inner: Box<dyn AggFunc>,
    seen: AHashSet<Vec<u8>>,
    /// Keys in first-seen order.
    keys: Vec<Vec<u8>>,
    /// Concatenated partial key lists, decoded when the result is requested.
    partials: Vec<Vec<u8>>,
}

impl Distinct {
    pub fn new(inner: Box<dyn AggFunc>) -> Self {
        Self {
            inner,
            seen: AHashSet::new(),
            keys: Vec::new(),
            partials: Vec::new(),
        }
    }

    fn insert(&mut self, key: Vec<u8>) {
        if self.seen.insert(key.clone()) {
            self.keys.push(key);
        }
    }

    fn merge_partials(&mut self) {
        for partial in std::mem::take(&mut self.partials) {
            let mut buf = partial.as_slice();
            while !buf.is_empty() {
                let Some(n) = read_uvarint(&mut buf) else {
                    log::warn!("distinct: truncated partial");
                    break;
                };
                let n = (n as usize).min(buf.len());
                let (key, rest) = buf.split_at(n);
                self.insert(key.to_vec());
                buf = rest;
            }
        }
    }
}

/// Decodes a key written by [`Vector::append_key`].
fn decode_key(ctx: &TypeContext, key: &[u8]) -> Option<Value> {
    let id = u32::from_le_bytes(key.get(..4)?.try_into().ok()?);
    let (&present, body) = key.get(4..)?.split_first()?;
    let ty = match ctx.lookup_by_id(id) {
        Ok(ty) => ty,
        Err(err) => {
            log::warn!("distinct: {err}");
            return None;
        }
    };
    Some(Value::new(ty, (present == 1).then(|| body.to_vec())))
}

impl AggFunc for Distinct {
    fn consume(&mut self, v: &Vector) {
        for i in 0..v.len() {
            let mut key = Vec::new();
            v.append_key(i, &mut key);
            self.insert(key);
        }
    }

    fn consume_as_partial(&mut self, partial: &Vector) -> ExprResult<()> {
        if !matches!(partial.ty().under(), Type::Bytes) {
            return Err(invalid_partial("distinct"));
        }
        let slots = byte_slots(partial).ok_or_else(|| invalid_partial("distinct"))?;
        let nulls = nulls_of(partial);
        for i in (0..partial.len()).filter(|&i| !nulls.value(i)) {
            self.partials.push(slots.get(i as usize).to_vec());
        }
        Ok(())
    }

    fn result(&mut self, ctx: &TypeContext) -> Value {
        self.merge_partials();
        for chunk in self.keys.chunks(BATCH) {
            let mut b = DynamicBuilder::new();
            for value in chunk.iter().filter_map(|key| decode_key(ctx, key)) {
                b.write(&value);
            }
            consume(self.inner.as_mut(), &b.build());
        }
        self.seen.clear();
        self.keys.clear();
        self.inner.result(ctx)
    }

    fn result_as_partial(&mut self, _: &TypeContext) -> Value {
        self.merge_partials();
        let mut buf = Vec::new();
        for key in &self.keys {
            append_uvarint(&mut buf, key.len() as u64);
            buf.extend_from_slice(key);
        }
        Value::bytes_value(&buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agg::new_pattern;
    use crate::function::test_support::col;
    use pretty_assertions::assert_eq;

    fn distinct(op: &str) -> Distinct {
        Distinct::new(new_pattern(op, true).unwrap()())
    }

    #[test]
    fn inner_function_sees_each_value_once() {
        let ctx = TypeContext::new();
        let mut sum = distinct("sum");
        consume(&mut sum, &col(&ctx, "1 2 2"));
        consume(&mut sum, &col(&ctx, "1 3"));
        assert_eq!(sum.result(&ctx).to_string(), "6");
        let mut count = distinct("count");
        consume(&mut count, &col(&ctx, "1 \"1\" 1 null"));
        assert_eq!(count.result(&ctx).to_string(), "2::uint64");
    }

    #[test]
    fn partials_carry_seen_keys() {
        let ctx = TypeContext::new();
        let (mut a, mut b) = (distinct("collect"), distinct("collect"));
        consume(&mut a, &col(&ctx, "1 2"));
        consume(&mut b, &col(&ctx, "2 3"));
        let mut merged = distinct("collect");
        for f in [&mut a, &mut b] {
            let partial = Vector::from_values(&[f.result_as_partial(&ctx)]);
            merged.consume_as_partial(&partial).unwrap();
        }
        assert_eq!(merged.result(&ctx).to_string(), "[1,2,3]");
    }
}
