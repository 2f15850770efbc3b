use crate::error::RuntimeResult;
use crate::Puller;
use std::collections::VecDeque;
use strata_vector::{DynamicBuilder, Vector};

/// Rows `from..to` of `vec`, without a view when that is every row.
pub(crate) fn slice(vec: Vector, from: u32, to: u32) -> Vector {
    if from == 0 && to == vec.len() {
        return vec;
    }
    Vector::view(vec, (from..to).collect())
}

/// Drops the first `n` rows of each stream.
#[derive(Debug)]
pub struct Skip<P> {
    parent: P,
    n: u64,
    remaining: u64,
}

impl<P: Puller> Skip<P> {
    pub fn new(parent: P, n: u64) -> Self {
        Self {
            parent,
            n,
            remaining: n,
        }
    }
}

impl<P: Puller> Puller for Skip<P> {
    fn pull(&mut self, done: bool) -> RuntimeResult<Option<Vector>> {
        loop {
            let Some(vec) = self.parent.pull(done)? else {
                self.remaining = self.n;
                return Ok(None);
            };
            let len = u64::from(vec.len());
            if self.remaining >= len {
                self.remaining -= len;
                continue;
            }
            let from = self.remaining as u32;
            let to = vec.len();
            self.remaining = 0;
            return Ok(Some(slice(vec, from, to)));
        }
    }
}

/// Passes the first `n` rows of each stream, then tells upstream it is done.
#[derive(Debug)]
pub struct Head<P> {
    parent: P,
    n: u64,
    emitted: u64,
}

impl<P: Puller> Head<P> {
    pub fn new(parent: P, n: u64) -> Self {
        Self {
            parent,
            n,
            emitted: 0,
        }
    }
}

impl<P: Puller> Puller for Head<P> {
    fn pull(&mut self, done: bool) -> RuntimeResult<Option<Vector>> {
        if done || self.emitted >= self.n {
            self.emitted = 0;
            self.parent.pull(true)?;
            return Ok(None);
        }
        let Some(vec) = self.parent.pull(false)? else {
            self.emitted = 0;
            return Ok(None);
        };
        let want = self.n - self.emitted;
        let len = u64::from(vec.len());
        if len <= want {
            self.emitted += len;
            return Ok(Some(vec));
        }
        self.emitted = self.n;
        Ok(Some(slice(vec, 0, want as u32)))
    }
}

/// Buffers each stream and emits its last `n` rows.
#[derive(Debug)]
pub struct Tail<P> {
    parent: P,
    n: u64,
    batch_size: usize,
    pending: Option<VecDeque<Vector>>,
}

impl<P: Puller> Tail<P> {
    pub fn new(parent: P, n: u64, batch_size: usize) -> Self {
        Self {
            parent,
            n,
            batch_size: batch_size.max(1),
            pending: None,
        }
    }

    fn fill(&mut self) -> RuntimeResult<VecDeque<Vector>> {
        let mut kept: VecDeque<Vector> = VecDeque::new();
        let mut total = 0u64;
        while let Some(vec) = self.parent.pull(false)? {
            total += u64::from(vec.len());
            kept.push_back(vec);
            while let Some(front) = kept.front() {
                let without = total - u64::from(front.len());
                if without < self.n {
                    break;
                }
                total = without;
                kept.pop_front();
            }
        }
        let mut skip = total.saturating_sub(self.n);
        let mut out = VecDeque::new();
        let mut b = DynamicBuilder::new();
        for vec in kept {
            for slot in 0..vec.len() {
                if skip > 0 {
                    skip -= 1;
                    continue;
                }
                b.write(&vec.value_at(slot));
                if b.len() == self.batch_size {
                    out.push_back(std::mem::take(&mut b).build());
                }
            }
        }
        if !b.is_empty() {
            out.push_back(b.build());
        }
        Ok(out)
    }
}

impl<P: Puller> Puller for Tail<P> {
    fn pull(&mut self, done: bool) -> RuntimeResult<Option<Vector>> {
        if done {
            self.pending = None;
            return self.parent.pull(true);
        }
        if self.pending.is_none() {
            self.pending = Some(self.fill()?);
        }
        let next = self.pending.as_mut().and_then(VecDeque::pop_front);
        if next.is_none() {
            self.pending = None;
        }
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{query, rows, source};
    use pretty_assertions::assert_eq;

    #[test]
    fn skip_spans_batches() {
        let ctx = query();
        let mut skip = Skip::new(source(&ctx, &["1 2", "3 4 5", "6"]), 3);
        assert_eq!(rows(&mut skip), ["4", "5", "6"]);
        let mut all = Skip::new(source(&ctx, &["1 2"]), 5);
        assert!(all.pull(false).unwrap().is_none());
    }

    #[test]
    fn head_cuts_and_stops() {
        let ctx = query();
        let mut head = Head::new(source(&ctx, &["1 2", "3 4 5", "6"]), 3);
        assert_eq!(rows(&mut head), ["1", "2", "3"]);
    }

    #[test]
    fn tail_keeps_the_last_rows() {
        let ctx = query();
        let mut tail = Tail::new(source(&ctx, &["1 2", "3 \"x\" 5", "6"]), 3, 2);
        let batches = crate::source::pull_all(&mut tail).unwrap();
        assert_eq!(batches.len(), 2);
        assert_eq!(rows(&mut Tail::new(source(&ctx, &["1 2", "3 \"x\" 5", "6"]), 3, 2)), [
            "\"x\"", "5", "6"
        ]);
        assert!(rows(&mut Tail::new(source(&ctx, &[]), 3, 2)).is_empty());
    }
}
