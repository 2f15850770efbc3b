use super::{race, unhit, Aliases, Buffered, JoinStyle};
use crate::context::{CancelToken, QueryContext};
use crate::error::{RuntimeError, RuntimeResult};
use crate::Puller;
use std::collections::VecDeque;
use std::sync::Arc;
use strata_expr::{bool_mask, Expr};
use strata_vector::{deunion, pick, BitVec, TypeContext, Vector};

/// Position in the outer input: one outer batch, the current slot and inner batch.
#[derive(Debug)]
struct Cursor {
    vec: Vector,
    slot: u32,
    inner: usize,
    hits: BitVec,
}

#[derive(Debug)]
struct LoopState {
    outer: Buffered,
    inner: Vec<Vector>,
    inner_is_left: bool,
    inner_hits: Option<Vec<BitVec>>,
    track_outer: bool,
    cursor: Option<Cursor>,
    drain: Option<VecDeque<Vector>>,
}

/// Joins every pair of rows for which `cond` is true.
///
/// The side that ends first in the race is buffered as the inner loop. Each outer row is
/// repeated against every inner batch, so the condition is evaluated one vector at a time.
#[derive(Debug)]
pub struct NestedLoopJoin {
    types: Arc<TypeContext>,
    cancel: CancelToken,
    style: JoinStyle,
    left: Box<dyn Puller>,
    right: Box<dyn Puller>,
    aliases: Aliases,
    cond: Option<Expr>,
    state: Option<LoopState>,
}

impl NestedLoopJoin {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ctx: &QueryContext,
        style: JoinStyle,
        left: Box<dyn Puller>,
        right: Box<dyn Puller>,
        left_alias: &str,
        right_alias: &str,
        cond: Option<Expr>,
    ) -> RuntimeResult<Self> {
        if cond.is_none() && style != JoinStyle::Cross {
            return Err(RuntimeError::InvalidOperator(format!(
                "nested loop join: {style:?} join requires a condition"
            )));
        }
        Ok(Self {
            types: ctx.types.clone(),
            cancel: ctx.cancel.clone(),
            style,
            left,
            right,
            aliases: Aliases::new(left_alias, right_alias)?,
            cond: if style == JoinStyle::Cross { None } else { cond },
            state: None,
        })
    }

    fn init(&mut self) -> RuntimeResult<LoopState> {
        let (lbuf, rbuf) = race(&self.cancel, self.left.as_mut(), self.right.as_mut())?;
        let (outer, inner, inner_is_left) = if lbuf.eos {
            (rbuf, lbuf, true)
        } else {
            (lbuf, rbuf, false)
        };
        let inner = inner.into_vecs();
        let misses_on_left = matches!(self.style, JoinStyle::Left | JoinStyle::Anti);
        let misses_on_right = self.style == JoinStyle::Right;
        let track_inner =
            (inner_is_left && misses_on_left) || (!inner_is_left && misses_on_right);
        let track_outer =
            (!inner_is_left && misses_on_left) || (inner_is_left && misses_on_right);
        let inner_hits = track_inner.then(|| {
            inner
                .iter()
                .map(|v| BitVec::with_len_all_false(v.len() as usize))
                .collect()
        });
        log::trace!(
            "nested loop join: {} inner batches from the {} side",
            inner.len(),
            if inner_is_left { "left" } else { "right" }
        );
        Ok(LoopState {
            outer,
            inner,
            inner_is_left,
            inner_hits,
            track_outer,
            cursor: None,
            drain: None,
        })
    }

    /// The joined records for one outer slot against one inner batch, or `None` when no pair
    /// should be emitted.
    fn pair(&self, state: &mut LoopState, cursor: &mut Cursor) -> Option<Vector> {
        let inner = &state.inner[cursor.inner];
        let outer = pick(&cursor.vec, &vec![cursor.slot; inner.len() as usize]);
        let (l, r) = if state.inner_is_left {
            (inner, &outer)
        } else {
            (&outer, inner)
        };
        let joined = self.aliases.records(&self.types, &deunion(l), &deunion(r));
        let Some(cond) = &self.cond else {
            return Some(joined);
        };
        // False, null and error results are all misses.
        let hits = bool_mask(&cond.eval(&joined)).trues;
        if let Some(inner_hits) = state.inner_hits.as_mut() {
            inner_hits[cursor.inner].or_inplace(&hits);
        }
        if hits.any() {
            cursor.hits.set(cursor.slot as usize, true);
        }
        if self.style == JoinStyle::Anti || !hits.any() {
            return None;
        }
        if hits.true_count() < joined.len() {
            return Some(pick(&joined, &hits.positions()));
        }
        Some(joined)
    }

    fn step(&mut self, state: &mut LoopState) -> RuntimeResult<Option<Vector>> {
        loop {
            if let Some(drain) = state.drain.as_mut() {
                return Ok(drain.pop_front());
            }
            let Some(mut cursor) = state.cursor.take() else {
                self.cancel.check()?;
                let parent = if state.inner_is_left {
                    self.right.as_mut()
                } else {
                    self.left.as_mut()
                };
                match state.outer.pull_from(parent)? {
                    Some(vec) => {
                        let hits = BitVec::with_len_all_false(vec.len() as usize);
                        state.cursor = Some(Cursor {
                            vec,
                            slot: 0,
                            inner: 0,
                            hits,
                        });
                    }
                    None => state.drain = Some(self.inner_misses(state)),
                }
                continue;
            };
            if cursor.slot >= cursor.vec.len() || state.inner.is_empty() {
                if state.track_outer {
                    if state.inner.is_empty() {
                        cursor.hits = BitVec::with_len_all_false(cursor.vec.len() as usize);
                    }
                    if let Some(miss) = unhit(&cursor.vec, &cursor.hits) {
                        return Ok(Some(self.misses(state.inner_is_left, &miss, false)));
                    }
                }
                continue;
            }
            let out = self.pair(state, &mut cursor);
            cursor.inner += 1;
            if cursor.inner == state.inner.len() {
                cursor.inner = 0;
                cursor.slot += 1;
            }
            state.cursor = Some(cursor);
            if out.is_some() {
                return Ok(out);
            }
        }
    }

    /// Wraps unmatched rows; `from_inner` tells which input they came from.
    fn misses(&self, inner_is_left: bool, miss: &Vector, from_inner: bool) -> Vector {
        let on_left = from_inner == inner_is_left;
        self.aliases.misses(&self.types, &deunion(miss), on_left)
    }

    fn inner_misses(&self, state: &mut LoopState) -> VecDeque<Vector> {
        let Some(hits) = state.inner_hits.take() else {
            return VecDeque::new();
        };
        let inner_is_left = state.inner_is_left;
        state
            .inner
            .iter()
            .zip(&hits)
            .filter_map(|(vec, hits)| unhit(vec, hits))
            .map(|miss| self.misses(inner_is_left, &miss, true))
            .collect()
    }
}

impl Puller for NestedLoopJoin {
    fn pull(&mut self, done: bool) -> RuntimeResult<Option<Vector>> {
        if done {
            self.state = None;
            self.left.pull(true)?;
            self.right.pull(true)?;
            return Ok(None);
        }
        let mut state = match self.state.take() {
            Some(state) => state,
            None => self.init()?,
        };
        let out = self.step(&mut state)?;
        if out.is_some() {
            self.state = Some(state);
        }
        Ok(out)
    }
}

/// Every pairing of left and right rows.
#[derive(Debug)]
pub struct CrossJoin(NestedLoopJoin);

impl CrossJoin {
    pub fn new(
        ctx: &QueryContext,
        left: Box<dyn Puller>,
        right: Box<dyn Puller>,
        left_alias: &str,
        right_alias: &str,
    ) -> RuntimeResult<Self> {
        NestedLoopJoin::new(ctx, JoinStyle::Cross, left, right, left_alias, right_alias, None)
            .map(CrossJoin)
    }
}

impl Puller for CrossJoin {
    fn pull(&mut self, done: bool) -> RuntimeResult<Option<Vector>> {
        self.0.pull(done)
    }
}
