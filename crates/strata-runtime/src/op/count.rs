use crate::error::RuntimeResult;
use crate::Puller;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use strata_expr::{Evaluator, Expr, RecordElem, RecordExpr};
use strata_vector::{BitVec, Type, TypeContext, Vector};

/// Numbers rows with a running 1-based counter.
#[derive(Debug, Default)]
struct Counter {
    count: Arc<AtomicU64>,
}

impl Evaluator for Counter {
    fn eval(&self, this: &Vector) -> Vector {
        let n = u64::from(this.len());
        let start = self.count.fetch_add(n, Ordering::Relaxed);
        Vector::uint(Type::Uint64, (start + 1..=start + n).collect(), BitVec::zero())
    }
}

/// Wraps every batch into a record whose `alias` field counts rows, optionally spreading
/// the fields of `expr` after it.
#[derive(Debug)]
pub struct Count<P> {
    parent: P,
    count: Arc<AtomicU64>,
    expr: RecordExpr,
}

impl<P: Puller> Count<P> {
    pub fn new(ctx: Arc<TypeContext>, parent: P, alias: &str, expr: Option<Expr>) -> Self {
        let count = Arc::new(AtomicU64::new(0));
        let counter: Expr = Arc::new(Counter {
            count: count.clone(),
        });
        let mut elems = vec![RecordElem::Field(alias.to_string(), counter)];
        elems.extend(expr.map(RecordElem::Spread));
        Self {
            parent,
            count,
            expr: RecordExpr::new(ctx, elems),
        }
    }
}

impl<P: Puller> Puller for Count<P> {
    fn pull(&mut self, done: bool) -> RuntimeResult<Option<Vector>> {
        let vec = match self.parent.pull(done) {
            Ok(Some(vec)) => vec,
            other => {
                self.count.store(0, Ordering::Relaxed);
                return other;
            }
        };
        Ok(Some(self.expr.eval(&vec)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{query, rows, source};
    use pretty_assertions::assert_eq;
    use strata_expr::This;

    #[test]
    fn counts_across_batches_and_resets() {
        let ctx = query();
        let mut count = Count::new(
            ctx.types.clone(),
            source(&ctx, &["{a:1} {a:2}", "{a:3}"]),
            "n",
            Some(Arc::new(This)),
        );
        let want = ["{n:1::uint64,a:1}", "{n:2::uint64,a:2}", "{n:3::uint64,a:3}"];
        assert_eq!(rows(&mut count), want);
        assert!(count.pull(false).unwrap().is_none());
    }

    #[test]
    fn bare_count_only_has_the_counter() {
        let ctx = query();
        let mut count = Count::new(ctx.types.clone(), source(&ctx, &["1 \"x\""]), "c", None);
        assert_eq!(rows(&mut count), ["{c:1::uint64}", "{c:2::uint64}"]);
    }
}
