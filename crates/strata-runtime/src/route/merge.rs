use crate::context::{CancelToken, QueryContext};
use crate::error::{RuntimeError, RuntimeResult};
use crate::op::limit::slice;
use crate::op::SortExpr;
use crate::Puller;
use crossbeam_channel::{select, Receiver, Sender};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::Arc;
use strata_expr::order::{compare_keys, SortKey};
use strata_vector::{Value, Vector};

/// Pulls one parent on its own thread, one stream at a time.
fn feed(
    mut parent: Box<dyn Puller>,
    tx: Sender<RuntimeResult<Option<Vector>>>,
    done: Receiver<()>,
    cancel: CancelToken,
) {
    loop {
        let mut res = parent.pull(false);
        loop {
            select! {
                send(tx, res) -> sent => {
                    if sent.is_err() {
                        return;
                    }
                    break;
                }
                recv(done) -> msg => {
                    if msg.is_err() {
                        return;
                    }
                    match parent.pull(true) {
                        // Resume with a fresh pull for the next stream.
                        Ok(_) => break,
                        // Report the failure downstream instead.
                        Err(err) => res = Err(err),
                    }
                }
                recv(cancel.receiver()) -> _ => return,
            }
        }
    }
}

/// Merge-side state of one parent: its current batch and how far it was consumed.
#[derive(Debug)]
struct Source {
    tag: u32,
    rx: Receiver<RuntimeResult<Option<Vector>>>,
    done: Sender<()>,
    vec: Option<Vector>,
    keys: Vec<Vector>,
    off: u32,
    last_off: u32,
}

/// The current row of one source, ordered by its keys and then by source.
#[derive(Debug)]
struct Top {
    keys: Vec<Value>,
    order: Arc<[SortKey]>,
    tag: u32,
}

impl Ord for Top {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_keys(&self.keys, &other.keys, &self.order).then(self.tag.cmp(&other.tag))
    }
}

impl PartialOrd for Top {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Top {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Top {}

/// K-way merge of inputs that are each sorted by the same keys.
///
/// Each parent is pulled on its own thread. Runs of rows from one input come out as a view of
/// that input's batch; a block mixing inputs is a dynamic of those views. Without sort
/// expressions rows are compared by their whole value. Ties go to the earlier input.
#[derive(Debug)]
pub struct Merge {
    cancel: CancelToken,
    batch_size: usize,
    exprs: Vec<SortExpr>,
    order: Arc<[SortKey]>,
    pending: Option<Vec<Box<dyn Puller>>>,
    sources: Vec<Source>,
    heap: BinaryHeap<Reverse<Top>>,
    started: bool,
}

impl Merge {
    pub fn new(ctx: &QueryContext, parents: Vec<Box<dyn Puller>>, exprs: Vec<SortExpr>) -> Self {
        let order: Arc<[SortKey]> = if exprs.is_empty() {
            Arc::new([SortKey::asc()])
        } else {
            exprs.iter().map(|e| e.key).collect()
        };
        Self {
            cancel: ctx.cancel.clone(),
            batch_size: ctx.batch_size(),
            exprs,
            order,
            pending: Some(parents),
            sources: Vec::new(),
            heap: BinaryHeap::new(),
            started: false,
        }
    }

    fn launch(&mut self) -> RuntimeResult<()> {
        let Some(parents) = self.pending.take() else {
            return Ok(());
        };
        for (i, parent) in parents.into_iter().enumerate() {
            let (tx, rx) = crossbeam_channel::bounded(0);
            let (done_tx, done_rx) = crossbeam_channel::bounded(0);
            let cancel = self.cancel.clone();
            std::thread::Builder::new()
                .name(format!("strata-merge-{i}"))
                .spawn(move || feed(parent, tx, done_rx, cancel))?;
            self.sources.push(Source {
                tag: i as u32,
                rx,
                done: done_tx,
                vec: None,
                keys: Vec::new(),
                off: 0,
                last_off: 0,
            });
        }
        log::debug!("merge: started {} inputs", self.sources.len());
        Ok(())
    }

    /// Receives the next batch of source `i`. Returns false at its end of stream.
    fn replenish(&mut self, i: usize) -> RuntimeResult<bool> {
        let src = &mut self.sources[i];
        let res = select! {
            recv(src.rx) -> msg => msg.map_err(|_| RuntimeError::Disconnected("merge"))?,
            recv(self.cancel.receiver()) -> _ => return Err(RuntimeError::Canceled),
        };
        src.off = 0;
        src.last_off = 0;
        let Some(vec) = res? else {
            src.vec = None;
            src.keys.clear();
            return Ok(false);
        };
        src.keys = self.exprs.iter().map(|e| e.expr.eval(&vec)).collect();
        src.vec = Some(vec);
        Ok(true)
    }

    fn top(&self, i: usize) -> Option<Top> {
        let src = &self.sources[i];
        let vec = src.vec.as_ref()?;
        let keys = if self.exprs.is_empty() {
            vec![vec.value_at(src.off)]
        } else {
            src.keys.iter().map(|k| k.value_at(src.off)).collect()
        };
        Some(Top {
            keys,
            order: Arc::clone(&self.order),
            tag: src.tag,
        })
    }

    /// Rebuilds the heap from a fresh batch of every source.
    fn start(&mut self) -> RuntimeResult<()> {
        self.heap.clear();
        for i in 0..self.sources.len() {
            if self.replenish(i)? {
                self.heap.extend(self.top(i).map(Reverse));
            }
        }
        self.started = true;
        Ok(())
    }

    /// Views of every source's rows consumed since the last block, and the block's tags
    /// renumbered to index them.
    fn block(&mut self, tags: &mut [u32]) -> Vec<Vector> {
        let mut remap = vec![0u32; self.sources.len()];
        let mut views = Vec::new();
        for src in &mut self.sources {
            let Some(vec) = &src.vec else { continue };
            if src.off == src.last_off {
                continue;
            }
            remap[src.tag as usize] = views.len() as u32;
            views.push(slice(vec.clone(), src.last_off, src.off));
            src.last_off = src.off;
        }
        tags.iter_mut().for_each(|t| *t = remap[*t as usize]);
        views
    }

    /// Tells every source still in the current stream to stop.
    fn stop(&mut self) -> RuntimeResult<()> {
        for Reverse(top) in self.heap.drain() {
            let src = &self.sources[top.tag as usize];
            select! {
                send(src.done, ()) -> _ => {}
                recv(self.cancel.receiver()) -> _ => return Err(RuntimeError::Canceled),
            }
        }
        self.started = false;
        Ok(())
    }
}

impl Puller for Merge {
    fn pull(&mut self, done: bool) -> RuntimeResult<Option<Vector>> {
        self.launch()?;
        if done {
            self.stop()?;
            return Ok(None);
        }
        if !self.started {
            self.start()?;
        }
        if self.heap.is_empty() {
            self.started = false;
            return Ok(None);
        }
        let mut tags = Vec::with_capacity(self.batch_size.min(2048));
        while let Some(Reverse(min)) = self.heap.pop() {
            let i = min.tag as usize;
            tags.push(min.tag);
            self.sources[i].off += 1;
            let src = &self.sources[i];
            let end_of_vector = src.vec.as_ref().map_or(true, |v| src.off >= v.len());
            let full = tags.len() >= self.batch_size;
            let views = (end_of_vector || full).then(|| self.block(&mut tags));
            if !end_of_vector {
                self.heap.extend(self.top(i).map(Reverse));
            } else if self.replenish(i)? {
                self.heap.extend(self.top(i).map(Reverse));
            }
            if let Some(mut views) = views {
                let out = match views.len() {
                    1 => views.pop(),
                    _ => Some(Vector::dynamic(tags, views)),
                };
                return Ok(out);
            }
        }
        // Every batch ends at an end of vector, which always closes a block.
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RuntimeOptions;
    use crate::test_support::{field, query, rows, source};
    use pretty_assertions::assert_eq;
    use strata_vector::TypeContext;

    #[test]
    fn interleaves_sorted_inputs() {
        let ctx = query();
        let parents = vec![
            source(&ctx, &["1 4", "6"]),
            source(&ctx, &["2 3 5"]),
            source(&ctx, &[]),
        ];
        let mut m = Merge::new(&ctx, parents, vec![]);
        assert_eq!(rows(&mut m), ["1", "2", "3", "4", "5", "6"]);
    }

    #[test]
    fn descending_keys_and_ties_prefer_the_first_input() {
        let ctx = query();
        let parents = vec![
            source(&ctx, &["{k:3,s:\"a\"} {k:1,s:\"a\"}"]),
            source(&ctx, &["{k:3,s:\"b\"} {k:2,s:\"b\"}"]),
        ];
        let key = SortExpr::new(field(&ctx, "k"), SortKey::desc());
        let mut m = Merge::new(&ctx, parents, vec![key]);
        assert_eq!(rows(&mut m), [
            "{k:3,s:\"a\"}",
            "{k:3,s:\"b\"}",
            "{k:2,s:\"b\"}",
            "{k:1,s:\"a\"}",
        ]);
    }

    #[test]
    fn blocks_respect_batch_size() {
        let ctx = QueryContext::with_options(
            Arc::new(TypeContext::new()),
            RuntimeOptions { batch_size: 2 },
        );
        let parents = vec![source(&ctx, &["1 3 5"]), source(&ctx, &["2 4"])];
        let mut m = Merge::new(&ctx, parents, vec![]);
        let mut lens = Vec::new();
        while let Some(vec) = m.pull(false).unwrap() {
            assert!(vec.len() <= 2);
            lens.push(vec.len());
        }
        assert_eq!(lens.iter().sum::<u32>(), 5);
    }

    #[test]
    fn done_then_resume_starts_a_new_stream() {
        let ctx = query();
        let parents = vec![source(&ctx, &["1 2"]), source(&ctx, &["3"])];
        let mut m = Merge::new(&ctx, parents, vec![]);
        assert!(m.pull(false).unwrap().is_some());
        assert!(m.pull(true).unwrap().is_none());
        // Sources are exhausted after their first stream.
        assert!(m.pull(false).unwrap().is_none());
    }

    #[test]
    fn upstream_errors_end_the_merge() {
        #[derive(Debug)]
        struct Failing;
        impl Puller for Failing {
            fn pull(&mut self, _done: bool) -> RuntimeResult<Option<Vector>> {
                Err(RuntimeError::InvalidOperator("boom".to_string()))
            }
        }
        let ctx = query();
        let mut m = Merge::new(&ctx, vec![source(&ctx, &["1"]), Box::new(Failing)], vec![]);
        let err = m.pull(false).unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }
}
