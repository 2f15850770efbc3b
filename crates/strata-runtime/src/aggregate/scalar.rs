use super::{agg_inputs, FieldPath};
use crate::context::{CancelToken, QueryContext};
use crate::error::RuntimeResult;
use crate::Puller;
use std::sync::Arc;
use strata_expr::agg::{self, AggFunc};
use strata_expr::{Aggregator, Expr};
use strata_vector::{apply, DynamicBuilder, RecordBuilder, TypeContext, Vector};

/// Aggregation without group-by keys: one output row per stream, even for empty input.
#[derive(Debug)]
pub struct ScalarAggregate<P> {
    parent: P,
    types: Arc<TypeContext>,
    cancel: CancelToken,
    aggs: Vec<Arc<Aggregator>>,
    inputs: Vec<Expr>,
    builder: RecordBuilder,
    partials_in: bool,
    partials_out: bool,
    // `None` between emitting the result row and the end of stream that follows it.
    funcs: Option<Vec<Box<dyn AggFunc>>>,
}

impl<P: Puller> ScalarAggregate<P> {
    pub fn new(
        ctx: &QueryContext,
        parent: P,
        aggs: Vec<(FieldPath, Arc<Aggregator>)>,
        partials_in: bool,
        partials_out: bool,
    ) -> RuntimeResult<Self> {
        let paths: Vec<FieldPath> = aggs.iter().map(|(p, _)| p.clone()).collect();
        let builder = RecordBuilder::new(&paths)?;
        let inputs = agg_inputs(&ctx.types, &aggs, partials_in);
        let aggs: Vec<Arc<Aggregator>> = aggs.into_iter().map(|(_, a)| a).collect();
        Ok(Self {
            parent,
            types: ctx.types.clone(),
            cancel: ctx.cancel.clone(),
            funcs: Some(new_funcs(&aggs)),
            aggs,
            inputs,
            builder,
            partials_in,
            partials_out,
        })
    }

    fn consume(&mut self, vec: &Vector) -> RuntimeResult<()> {
        let cols: Vec<Vector> = self.inputs.iter().map(|e| e.eval(vec)).collect();
        let Some(funcs) = self.funcs.as_mut().filter(|_| !cols.is_empty()) else {
            return Ok(());
        };
        let partials_in = self.partials_in;
        let mut failed = None;
        apply(
            false,
            &mut |vecs: &[Vector]| {
                for (f, v) in funcs.iter_mut().zip(vecs) {
                    if !partials_in {
                        agg::consume(f.as_mut(), v);
                    } else if let Err(err) = agg::consume_partial(f.as_mut(), v) {
                        failed.get_or_insert(err);
                    }
                }
                Vector::const_null(vecs[0].len())
            },
            &cols,
        );
        match failed {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }

    fn result(&mut self) -> RuntimeResult<Vector> {
        let mut cols = Vec::with_capacity(self.aggs.len());
        let mut funcs = self.funcs.take().unwrap_or_default();
        for f in &mut funcs {
            let mut b = DynamicBuilder::new();
            b.write(&if self.partials_out {
                f.result_as_partial(&self.types)
            } else {
                f.result(&self.types)
            });
            cols.push(b.build());
        }
        Ok(self.builder.build(&self.types, &cols)?)
    }
}

fn new_funcs(aggs: &[Arc<Aggregator>]) -> Vec<Box<dyn AggFunc>> {
    aggs.iter().map(|a| a.new_func()).collect()
}

impl<P: Puller> Puller for ScalarAggregate<P> {
    fn pull(&mut self, done: bool) -> RuntimeResult<Option<Vector>> {
        if done {
            self.funcs = Some(new_funcs(&self.aggs));
            return self.parent.pull(true);
        }
        if self.funcs.is_none() {
            self.funcs = Some(new_funcs(&self.aggs));
            return Ok(None);
        }
        loop {
            self.cancel.check()?;
            match self.parent.pull(false)? {
                Some(vec) => self.consume(&vec)?,
                None => return self.result().map(Some),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{field, query, rows, source};
    use pretty_assertions::assert_eq;

    fn aggs(ctx: &QueryContext) -> Vec<(FieldPath, Arc<Aggregator>)> {
        let sum = Aggregator::new("sum", false, Some(field(ctx, "x")), None).unwrap();
        let count = Aggregator::new("count", false, None, None).unwrap();
        vec![
            (vec!["s".to_string()], Arc::new(sum)),
            (vec!["c".to_string()], Arc::new(count)),
        ]
    }

    #[test]
    fn one_row_per_stream() {
        let ctx = query();
        let input = source(&ctx, &["{x:1} {x:2.5}", "{y:1}"]);
        let mut op = ScalarAggregate::new(&ctx, input, aggs(&ctx), false, false).unwrap();
        assert_eq!(rows(&mut op), ["{s:3.5,c:3::uint64}"]);
    }

    #[test]
    fn empty_input_still_reports() {
        let ctx = query();
        let mut op = ScalarAggregate::new(&ctx, source(&ctx, &[]), aggs(&ctx), false, false).unwrap();
        assert_eq!(rows(&mut op), ["{s:null,c:0::uint64}"]);
    }
}
