use crate::error::RuntimeResult;
use crate::Puller;
use strata_expr::{bool_mask, Expr};
use strata_vector::Vector;

/// Keeps the rows where the predicate is true. Non-bool and error results drop the row.
#[derive(Debug)]
pub struct Filter<P> {
    parent: P,
    expr: Expr,
}

impl<P: Puller> Filter<P> {
    pub fn new(parent: P, expr: Expr) -> Self {
        Self { parent, expr }
    }
}

impl<P: Puller> Puller for Filter<P> {
    fn pull(&mut self, done: bool) -> RuntimeResult<Option<Vector>> {
        loop {
            let Some(vec) = self.parent.pull(done)? else {
                return Ok(None);
            };
            if let Some(kept) = apply_mask(&vec, &self.expr.eval(&vec)) {
                return Ok(Some(kept));
            }
            log::trace!("filter dropped a batch of {} rows", vec.len());
        }
    }
}

/// `vec` restricted to the slots where `mask` is true, or `None` when there are none.
pub(crate) fn apply_mask(vec: &Vector, mask: &Vector) -> Option<Vector> {
    let trues = bool_mask(mask).trues;
    if !trues.any() {
        return None;
    }
    if trues.true_count() == vec.len() {
        return Some(vec.clone());
    }
    Some(Vector::view(vec.clone(), trues.positions()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{field, query, rows, source};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use strata_expr::{CompareExpr, CompareOp, Literal};
    use strata_vector::Value;

    #[test]
    fn errors_and_non_bools_are_dropped() {
        let ctx = query();
        let gt: Expr = Arc::new(CompareExpr::new(
            ctx.types.clone(),
            CompareOp::Gt,
            field(&ctx, "x"),
            Arc::new(Literal::new(Value::int64(1))),
        ));
        let parent = source(&ctx, &["{x:1} {x:2} {x:\"s\"}", "{x:0}", "{x:5} {x:6}"]);
        let mut filter = Filter::new(parent, gt);
        assert_eq!(rows(&mut filter), ["{x:2}", "{x:5}", "{x:6}"]);
    }

    #[test]
    fn all_true_passes_the_batch_through() {
        let ctx = query();
        let batch = crate::test_support::col(&ctx, "1 2");
        let mask = crate::test_support::col(&ctx, "true true");
        assert!(matches!(apply_mask(&batch, &mask), Some(Vector::Int(_))));
        let mask = crate::test_support::col(&ctx, "false null");
        assert!(apply_mask(&batch, &mask).is_none());
    }
}
