use crate::agg::{self, AggFunc, Distinct, Pattern};
use crate::logic::bool_mask;
use crate::{Evaluator, Expr, ExprResult, Literal};
use std::sync::Arc;
use strata_vector::{copy_and_set_nulls, BitVec, Value, Vector};

/// One aggregate call in a group-by, e.g. `sum(distinct x) where y > 0`.
///
/// [`Evaluator::eval`] produces the column to accumulate: the argument with every slot where
/// the `where` predicate is not true turned into a null. [`Aggregator::new_func`] creates the
/// accumulator that column feeds.
#[derive(Debug)]
pub struct Aggregator {
    name: String,
    distinct: bool,
    pattern: Pattern,
    expr: Expr,
    filter: Option<Expr>,
    counts_rows: bool,
}

impl Aggregator {
    pub fn new(
        name: &str,
        distinct: bool,
        expr: Option<Expr>,
        filter: Option<Expr>,
    ) -> ExprResult<Self> {
        let pattern = agg::new_pattern(name, expr.is_some())?;
        let counts_rows = expr.is_none();
        // count() counts rows.
        let expr = expr.unwrap_or_else(|| Arc::new(Literal::new(Value::bool(true))));
        Ok(Self {
            name: name.to_string(),
            distinct,
            pattern,
            expr,
            filter,
            counts_rows,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this is a bare `count()`: no argument, no `distinct`, no `where`.
    pub fn is_row_count(&self) -> bool {
        self.name == "count" && self.counts_rows && !self.distinct && self.filter.is_none()
    }

    pub fn new_func(&self) -> Box<dyn AggFunc> {
        let f = (self.pattern)();
        if self.distinct {
            Box::new(Distinct::new(f))
        } else {
            f
        }
    }
}

impl Evaluator for Aggregator {
    fn eval(&self, this: &Vector) -> Vector {
        let v = self.expr.eval(this);
        let Some(filter) = &self.filter else {
            return v;
        };
        let mask = bool_mask(&filter.eval(this));
        if !mask.trues.any() {
            return Vector::constant(Value::null(v.ty()), v.len(), BitVec::zero());
        }
        if mask.trues.all_true() {
            return v;
        }
        copy_and_set_nulls(&v, &BitVec::not(&mask.trues))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compare::{CompareExpr, CompareOp};
    use crate::function::test_support::{col, show};
    use crate::{dotted_path, ExprError};
    use pretty_assertions::assert_eq;
    use strata_vector::TypeContext;

    fn run(agg: &Aggregator, input: &Vector) -> String {
        let mut f = agg.new_func();
        agg::consume(f.as_mut(), &agg.eval(input));
        f.result(&TypeContext::new()).to_string()
    }

    #[test]
    fn where_nulls_out_filtered_rows() {
        let ctx = Arc::new(TypeContext::new());
        let input = col(&ctx, "{x:1,y:1} {x:2,y:-1} {x:3,y:5}");
        let y_pos: Expr = Arc::new(CompareExpr::new(
            ctx.clone(),
            CompareOp::Gt,
            dotted_path(&ctx, &["y"]),
            Arc::new(Literal::new(Value::int64(0))),
        ));
        let sum = Aggregator::new("sum", false, Some(dotted_path(&ctx, &["x"])), Some(y_pos.clone()))
            .unwrap();
        assert_eq!(show(&sum.eval(&input)), ["1", "null", "3"]);
        assert_eq!(run(&sum, &input), "4");
        let count = Aggregator::new("count", false, None, Some(y_pos)).unwrap();
        assert_eq!(run(&count, &input), "2::uint64");
    }

    #[test]
    fn no_passing_rows_gives_typed_null() {
        let ctx = Arc::new(TypeContext::new());
        let input = col(&ctx, "{x:1} {x:2}");
        let never: Expr = Arc::new(Literal::new(Value::bool(false)));
        let sum = Aggregator::new("sum", false, Some(dotted_path(&ctx, &["x"])), Some(never))
            .unwrap();
        let out = sum.eval(&input);
        assert_eq!(out.ty().to_string(), "int64");
        assert_eq!(show(&out), ["null", "null"]);
        assert_eq!(run(&sum, &input), "null");
    }

    #[test]
    fn distinct_and_construction_errors() {
        let ctx = Arc::new(TypeContext::new());
        let input = col(&ctx, "1 2 2 3 3");
        let count = Aggregator::new("count", true, Some(Arc::new(crate::This)), None).unwrap();
        assert_eq!(run(&count, &input), "3::uint64");
        assert_eq!(
            Aggregator::new("sum", false, None, None).unwrap_err(),
            ExprError::ArgumentRequired("sum".into())
        );
        assert!(!count.is_row_count());
        assert!(Aggregator::new("count", false, None, None).unwrap().is_row_count());
    }
}
