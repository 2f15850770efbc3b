//! Joins of two inputs.
//!
//! Every join first races both inputs: each side is pulled on its own thread until one of them
//! reaches end of stream. That side is fully buffered and becomes the build side (the hash
//! table or the inner loop); the other side is replayed from what was buffered so far and then
//! pulled normally.
//!
//! Output rows are records with one field per side, named by the aliases. Rows without a
//! match on the other side (left, right and anti styles) carry a null in the opposite field.

mod hash;
mod nested;

pub use hash::HashJoin;
pub use nested::{CrossJoin, NestedLoopJoin};

use crate::context::CancelToken;
use crate::error::{RuntimeError, RuntimeResult};
use crate::Puller;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use strata_vector::{apply, BitVec, TypeContext, Vector};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum JoinStyle {
    Inner,
    Left,
    Right,
    Anti,
    Cross,
}

/// What one side produced while racing the other.
#[derive(Debug, Default)]
pub(crate) struct Buffered {
    vecs: VecDeque<Vector>,
    eos: bool,
}

impl Buffered {
    /// Replays buffered batches, then continues with `parent` unless it already ended.
    fn pull_from(&mut self, parent: &mut dyn Puller) -> RuntimeResult<Option<Vector>> {
        if let Some(vec) = self.vecs.pop_front() {
            return Ok(Some(vec));
        }
        if self.eos {
            return Ok(None);
        }
        parent.pull(false)
    }

    fn into_vecs(self) -> Vec<Vector> {
        self.vecs.into()
    }
}

fn fill(cancel: &CancelToken, done: &AtomicBool, parent: &mut dyn Puller) -> RuntimeResult<Buffered> {
    let mut buf = Buffered::default();
    while !done.load(Ordering::SeqCst) && !cancel.is_canceled() {
        match parent.pull(false) {
            Ok(Some(vec)) => buf.vecs.push_back(vec),
            Ok(None) => {
                done.store(true, Ordering::SeqCst);
                buf.eos = true;
                break;
            }
            Err(err) => {
                done.store(true, Ordering::SeqCst);
                return Err(err);
            }
        }
    }
    cancel.check()?;
    Ok(buf)
}

/// Pulls both sides concurrently until either reaches end of stream.
pub(crate) fn race(
    cancel: &CancelToken,
    left: &mut dyn Puller,
    right: &mut dyn Puller,
) -> RuntimeResult<(Buffered, Buffered)> {
    let done = AtomicBool::new(false);
    std::thread::scope(|s| {
        let handle = std::thread::Builder::new()
            .name("strata-join-race".to_string())
            .spawn_scoped(s, || fill(cancel, &done, right))?;
        let left = fill(cancel, &done, left);
        let right = handle
            .join()
            .map_err(|_| RuntimeError::Disconnected("join race"))?;
        let (left, right) = (left?, right?);
        log::trace!(
            "join race: left buffered {} (eos {}), right buffered {} (eos {})",
            left.vecs.len(),
            left.eos,
            right.vecs.len(),
            right.eos
        );
        Ok((left, right))
    })
}

/// Output aliases of a join.
#[derive(Clone, Debug)]
pub(crate) struct Aliases {
    pub(crate) left: String,
    pub(crate) right: String,
}

impl Aliases {
    pub(crate) fn new(left: &str, right: &str) -> RuntimeResult<Self> {
        if left == right {
            return Err(RuntimeError::InvalidOperator(format!(
                "join: left and right aliases are both {left:?}"
            )));
        }
        Ok(Self {
            left: left.to_string(),
            right: right.to_string(),
        })
    }

    /// Pairs equal-length left and right columns into records.
    pub(crate) fn records(&self, ctx: &TypeContext, left: &Vector, right: &Vector) -> Vector {
        let names = [self.left.as_str(), self.right.as_str()];
        apply(
            false,
            &mut |vecs: &[Vector]| {
                let len = vecs[0].len();
                Vector::record_of(ctx, &names, vecs.to_vec(), len)
                    .unwrap_or_else(|err| Vector::string_error(ctx, &err.to_string(), len))
            },
            &[left.clone(), right.clone()],
        )
    }

    /// Records for rows of one side that matched nothing: the other side is null.
    pub(crate) fn misses(&self, ctx: &TypeContext, vec: &Vector, on_left: bool) -> Vector {
        let null = Vector::const_null(vec.len());
        if on_left {
            self.records(ctx, vec, &null)
        } else {
            self.records(ctx, &null, vec)
        }
    }
}

/// Rows of `vec` whose bit in `hits` is clear, or `None` when every row hit.
pub(crate) fn unhit(vec: &Vector, hits: &BitVec) -> Option<Vector> {
    let misses: Vec<u32> = (0..vec.len()).filter(|&i| !hits.value(i)).collect();
    (!misses.is_empty()).then(|| strata_vector::pick(vec, &misses))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{col, query, show, source};
    use crossbeam_channel::{Receiver, Sender};
    use pretty_assertions::assert_eq;

    /// Ends its stream at once, opening the gate on the way out.
    #[derive(Debug)]
    struct Ends(Option<Sender<()>>);

    impl Puller for Ends {
        fn pull(&mut self, _done: bool) -> RuntimeResult<Option<Vector>> {
            self.0 = None;
            Ok(None)
        }
    }

    /// Waits for the gate to open before every pull.
    #[derive(Debug)]
    struct Gated {
        gate: Receiver<()>,
        inner: Box<dyn Puller>,
    }

    impl Puller for Gated {
        fn pull(&mut self, done: bool) -> RuntimeResult<Option<Vector>> {
            let _ = self.gate.recv();
            self.inner.pull(done)
        }
    }

    #[test]
    fn race_buffers_the_side_that_ends() {
        let ctx = query();
        let (tx, rx) = crossbeam_channel::bounded(0);
        let mut left = Gated { gate: rx, inner: source(&ctx, &["1", "2"]) };
        let mut right = Ends(Some(tx));
        let (mut l, r) = race(&ctx.cancel, &mut left, &mut right).unwrap();
        // The left side cannot produce anything before the right side has ended.
        assert!(r.eos);
        let mut replayed = Vec::new();
        while let Some(v) = l.pull_from(&mut left).unwrap() {
            replayed.extend(show(&v));
        }
        assert_eq!(replayed, ["1", "2"]);
    }

    #[test]
    fn misses_put_null_opposite() {
        let ctx = query();
        let aliases = Aliases::new("l", "r").unwrap();
        let v = col(&ctx, "1 \"a\"");
        assert_eq!(show(&aliases.misses(&ctx.types, &v, true)), ["{l:1,r:null}", "{l:\"a\",r:null}"]);
        assert_eq!(show(&aliases.misses(&ctx.types, &v, false)), ["{l:null,r:1}", "{l:null,r:\"a\"}"]);
        assert!(Aliases::new("x", "x").is_err());
    }
}
