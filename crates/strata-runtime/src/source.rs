use crate::error::RuntimeResult;
use crate::Puller;
use std::collections::VecDeque;
use strata_vector::Vector;

/// Emits a fixed list of batches once, skipping empty ones.
#[derive(Debug, Default)]
pub struct VectorSource {
    batches: VecDeque<Vector>,
}

impl VectorSource {
    pub fn new(batches: impl IntoIterator<Item = Vector>) -> Self {
        Self {
            batches: batches.into_iter().filter(|v| !v.is_empty()).collect(),
        }
    }

    pub fn one(batch: Vector) -> Self {
        Self::new([batch])
    }
}

impl Puller for VectorSource {
    fn pull(&mut self, done: bool) -> RuntimeResult<Option<Vector>> {
        if done {
            self.batches.clear();
            return Ok(None);
        }
        Ok(self.batches.pop_front())
    }
}

/// Pulls `puller` to end of stream.
pub fn pull_all(puller: &mut dyn Puller) -> RuntimeResult<Vec<Vector>> {
    let mut out = Vec::new();
    while let Some(batch) = puller.pull(false)? {
        out.push(batch);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_batches_never_surface() {
        let mut src = VectorSource::new([
            Vector::int64s(vec![1]),
            Vector::int64s(vec![]),
            Vector::int64s(vec![2, 3]),
        ]);
        let lens: Vec<u32> = pull_all(&mut src).unwrap().iter().map(Vector::len).collect();
        assert_eq!(lens, [1, 2]);
        assert!(src.pull(false).unwrap().is_none());
    }
}
