use crate::context::{CancelToken, QueryContext};
use crate::error::RuntimeResult;
use crate::parallel;
use crate::Puller;
use std::collections::VecDeque;
use strata_expr::order::{compare_keys, compare_values, SortKey};
use strata_expr::Expr;
use strata_vector::{DynamicBuilder, Value, Vector};

/// One sort key: the expression and its direction and null placement.
#[derive(Clone, Debug)]
pub struct SortExpr {
    pub expr: Expr,
    pub key: SortKey,
}

impl SortExpr {
    pub fn new(expr: Expr, key: SortKey) -> Self {
        Self { expr, key }
    }
}

#[derive(Debug)]
struct Row {
    keys: Vec<Value>,
    value: Value,
}

/// Buffers each stream to its end, then emits it ordered by `exprs`.
///
/// Without sort expressions rows are ordered by their whole value. The sort is stable, so
/// rows with equal keys keep their arrival order.
#[derive(Debug)]
pub struct Sort<P> {
    parent: P,
    exprs: Vec<SortExpr>,
    cancel: CancelToken,
    batch_size: usize,
    pending: Option<VecDeque<Vector>>,
}

impl<P: Puller> Sort<P> {
    pub fn new(ctx: &QueryContext, parent: P, exprs: Vec<SortExpr>) -> Self {
        Self {
            parent,
            exprs,
            cancel: ctx.cancel.clone(),
            batch_size: ctx.batch_size(),
            pending: None,
        }
    }

    fn buffer(&mut self) -> RuntimeResult<Vec<Row>> {
        let mut rows = Vec::new();
        while let Some(vec) = self.parent.pull(false)? {
            self.cancel.check()?;
            let cols: Vec<Vector> = self.exprs.iter().map(|e| e.expr.eval(&vec)).collect();
            for slot in 0..vec.len() {
                rows.push(Row {
                    keys: cols.iter().map(|c| c.value_at(slot)).collect(),
                    value: vec.value_at(slot),
                });
            }
        }
        Ok(rows)
    }

    fn sorted(&mut self) -> RuntimeResult<VecDeque<Vector>> {
        let mut rows = self.buffer()?;
        log::trace!("sorting {} rows", rows.len());
        if self.exprs.is_empty() {
            parallel::sort_by(&mut rows, |a, b| compare_values(&a.value, &b.value));
        } else {
            let keys: Vec<SortKey> = self.exprs.iter().map(|e| e.key).collect();
            parallel::sort_by(&mut rows, |a, b| compare_keys(&a.keys, &b.keys, &keys));
        }
        let mut out = VecDeque::new();
        for chunk in rows.chunks(self.batch_size) {
            let mut b = DynamicBuilder::new();
            chunk.iter().for_each(|row| b.write(&row.value));
            out.push_back(b.build());
        }
        Ok(out)
    }
}

impl<P: Puller> Puller for Sort<P> {
    fn pull(&mut self, done: bool) -> RuntimeResult<Option<Vector>> {
        if done {
            self.pending = None;
            return self.parent.pull(true);
        }
        if self.pending.is_none() {
            self.pending = Some(self.sorted()?);
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
    use crate::context::RuntimeOptions;
    use crate::error::RuntimeError;
    use crate::test_support::{field, query, rows, source};
    use pretty_assertions::assert_eq;

    #[test]
    fn sorts_by_key_with_null_placement() {
        let ctx = query();
        let input = source(&ctx, &["{x:3} {x:null}", "{x:1} {x:2.5}"]);
        let mut asc = Sort::new(&ctx, input, vec![SortExpr::new(field(&ctx, "x"), SortKey::asc())]);
        assert_eq!(rows(&mut asc), ["{x:1}", "{x:2.5}", "{x:3}", "{x:null}"]);

        let input = source(&ctx, &["{x:3} {x:null}", "{x:1} {x:2.5}"]);
        let key = SortKey {
            descending: true,
            nulls_first: true,
        };
        let mut desc = Sort::new(&ctx, input, vec![SortExpr::new(field(&ctx, "x"), key)]);
        assert_eq!(rows(&mut desc), ["{x:null}", "{x:3}", "{x:2.5}", "{x:1}"]);
    }

    #[test]
    fn equal_keys_keep_arrival_order() {
        let ctx = query();
        let input = source(&ctx, &["{k:1,v:\"a\"} {k:0,v:\"b\"} {k:1,v:\"c\"} {k:0,v:\"d\"}"]);
        let mut sort = Sort::new(&ctx, input, vec![SortExpr::new(field(&ctx, "k"), SortKey::asc())]);
        let got = rows(&mut sort);
        assert_eq!(got, [
            "{k:0,v:\"b\"}",
            "{k:0,v:\"d\"}",
            "{k:1,v:\"a\"}",
            "{k:1,v:\"c\"}"
        ]);
    }

    #[test]
    fn output_is_chunked_by_batch_size() {
        let ctx = QueryContext::with_options(query().types, RuntimeOptions { batch_size: 2 });
        let mut sort = Sort::new(&ctx, source(&ctx, &["5 4 3", "2 1"]), vec![]);
        let batches = crate::source::pull_all(&mut sort).unwrap();
        let lens: Vec<u32> = batches.iter().map(Vector::len).collect();
        assert_eq!(lens, [2, 2, 1]);
        assert_eq!(crate::test_support::show(&batches[0]), ["1", "2"]);
    }

    #[test]
    fn cancel_stops_buffering() {
        let ctx = query();
        ctx.cancel.cancel();
        let mut sort = Sort::new(&ctx, source(&ctx, &["1"]), vec![]);
        assert!(matches!(sort.pull(false), Err(RuntimeError::Canceled)));
    }
}
