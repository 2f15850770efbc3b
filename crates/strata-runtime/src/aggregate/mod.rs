//! Group-by aggregation.
//!
//! [`Aggregate`] keeps one table per combination of key types, so every table holds
//! homogeneous key columns and can materialize them with a typed builder. A single `count()`
//! keyed by a string uses a specialized table. [`ScalarAggregate`] is the keyless variant.
//!
//! With `partials_out` the aggregate emits partial results meant for a downstream aggregate
//! with `partials_in`, which reads each function's input from the field named by its output
//! path.

mod scalar;
mod table;

pub use scalar::ScalarAggregate;

use crate::context::{CancelToken, QueryContext};
use crate::error::{RuntimeError, RuntimeResult};
use crate::Puller;
use ahash::AHashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use strata_expr::{dotted_path, Aggregator, Expr};
use strata_vector::{apply, RecordBuilder, Type, TypeContext, Vector};
use table::{AggTable, CountByString, KeyedTable};

/// An output path such as `["a","b"]` for `a.b`.
pub type FieldPath = Vec<String>;

/// The columns an aggregate function consumes: the aggregator's own argument, or a partial
/// result read from a field of the input.
pub(crate) fn agg_inputs(
    ctx: &Arc<TypeContext>,
    aggs: &[(FieldPath, Arc<Aggregator>)],
    partials_in: bool,
) -> Vec<Expr> {
    aggs.iter()
        .map(|(path, agg)| -> Expr {
            if partials_in {
                let path: Vec<&str> = path.iter().map(String::as_str).collect();
                dotted_path(ctx, &path)
            } else {
                agg.clone()
            }
        })
        .collect()
}

#[derive(Debug)]
struct Tables {
    aggs: Arc<[Arc<Aggregator>]>,
    partials_in: bool,
    partials_out: bool,
    index: AHashMap<Vec<Type>, usize>,
    tables: Vec<Box<dyn AggTable>>,
}

impl Tables {
    fn count_by_string(&self, key_types: &[Type]) -> bool {
        matches!(key_types, [Type::String])
            && matches!(&self.aggs[..], [agg] if agg.is_row_count())
    }

    fn update(&mut self, keys: &[Vector], args: &[Vector]) -> RuntimeResult<()> {
        let key_types: Vec<Type> = keys.iter().map(Vector::ty).collect();
        let id = match self.index.get(&key_types) {
            Some(&id) => id,
            None => {
                let table: Box<dyn AggTable> = if self.count_by_string(&key_types) {
                    Box::new(CountByString::new(self.partials_in))
                } else {
                    Box::new(KeyedTable::new(
                        self.aggs.clone(),
                        key_types.clone(),
                        self.partials_in,
                        self.partials_out,
                    ))
                };
                log::trace!("new aggregation table for key types {key_types:?}");
                self.tables.push(table);
                self.index.insert(key_types, self.tables.len() - 1);
                self.tables.len() - 1
            }
        };
        self.tables[id].update(keys, args)
    }
}

/// Keyed group-by.
#[derive(Debug)]
pub struct Aggregate<P> {
    parent: P,
    types: Arc<TypeContext>,
    cancel: CancelToken,
    keys: Vec<Expr>,
    inputs: Vec<Expr>,
    builder: RecordBuilder,
    tables: Tables,
    results: Option<VecDeque<Box<dyn AggTable>>>,
}

impl<P: Puller> Aggregate<P> {
    pub fn new(
        ctx: &QueryContext,
        parent: P,
        keys: Vec<(FieldPath, Expr)>,
        aggs: Vec<(FieldPath, Arc<Aggregator>)>,
        partials_in: bool,
        partials_out: bool,
    ) -> RuntimeResult<Self> {
        if keys.is_empty() {
            return Err(RuntimeError::InvalidOperator(
                "aggregate: at least one group-by key is required".to_string(),
            ));
        }
        let paths: Vec<FieldPath> = keys
            .iter()
            .map(|(p, _)| p.clone())
            .chain(aggs.iter().map(|(p, _)| p.clone()))
            .collect();
        let builder = RecordBuilder::new(&paths)?;
        let inputs = agg_inputs(&ctx.types, &aggs, partials_in);
        Ok(Self {
            parent,
            types: ctx.types.clone(),
            cancel: ctx.cancel.clone(),
            keys: keys.into_iter().map(|(_, e)| e).collect(),
            inputs,
            builder,
            tables: Tables {
                aggs: aggs.into_iter().map(|(_, a)| a).collect(),
                partials_in,
                partials_out,
                index: AHashMap::new(),
                tables: Vec::new(),
            },
            results: None,
        })
    }

    fn consume(&mut self, vec: &Vector) -> RuntimeResult<()> {
        let nkeys = self.keys.len();
        let cols: Vec<Vector> = self
            .keys
            .iter()
            .chain(&self.inputs)
            .map(|e| e.eval(vec))
            .collect();
        let tables = &mut self.tables;
        let mut failed = None;
        apply(
            false,
            &mut |vecs: &[Vector]| {
                if failed.is_none() {
                    if let Err(err) = tables.update(&vecs[..nkeys], &vecs[nkeys..]) {
                        failed = Some(err);
                    }
                }
                Vector::const_null(vecs[0].len())
            },
            &cols,
        );
        failed.map_or(Ok(()), Err)
    }

    /// Materializes the next non-empty table.
    fn next(&mut self) -> RuntimeResult<Option<Vector>> {
        let Some(results) = self.results.as_mut() else {
            return Ok(None);
        };
        while let Some(mut table) = results.pop_front() {
            if let Some(vec) = table.materialize(&self.types, &self.builder)? {
                return Ok(Some(vec));
            }
        }
        self.results = None;
        Ok(None)
    }
}

impl<P: Puller> Puller for Aggregate<P> {
    fn pull(&mut self, done: bool) -> RuntimeResult<Option<Vector>> {
        if done {
            self.results = None;
            self.tables.index.clear();
            self.tables.tables.clear();
            return self.parent.pull(true);
        }
        if self.results.is_some() {
            return self.next();
        }
        loop {
            self.cancel.check()?;
            let Some(vec) = self.parent.pull(false)? else {
                self.tables.index.clear();
                self.results = Some(self.tables.tables.drain(..).collect());
                return self.next();
            };
            self.consume(&vec)?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{field, query, rows, source};
    use pretty_assertions::assert_eq;

    fn path(name: &str) -> FieldPath {
        vec![name.to_string()]
    }

    fn agg(name: &str, arg: Option<Expr>) -> Arc<Aggregator> {
        Arc::new(Aggregator::new(name, false, arg, None).unwrap())
    }

    #[test]
    fn one_table_per_key_type() {
        let ctx = query();
        let input = source(&ctx, &["{k:\"a\",v:1} {k:\"a\",v:2}", "{k:1,v:3} {k:1,v:4} {k:\"a\",v:5}"]);
        let mut op = Aggregate::new(
            &ctx,
            input,
            vec![(path("k"), field(&ctx, "k"))],
            vec![(path("sum"), agg("sum", Some(field(&ctx, "v"))))],
            false,
            false,
        )
        .unwrap();
        assert_eq!(rows(&mut op), ["{k:\"a\",sum:8}", "{k:1,sum:7}"]);
    }

    #[test]
    fn count_by_string_fast_path() {
        let ctx = query();
        let input = source(&ctx, &["{s:\"x\"} {s:\"y\"} {s:\"x\"} {t:1}"]);
        let mut op = Aggregate::new(
            &ctx,
            input,
            vec![(path("s"), field(&ctx, "s"))],
            vec![(path("count"), agg("count", None))],
            false,
            false,
        )
        .unwrap();
        let got = rows(&mut op);
        assert_eq!(got[..2], ["{s:\"x\",count:2::uint64}", "{s:\"y\",count:1::uint64}"]);
        assert_eq!(got.len(), 3);
        assert!(got[2].starts_with("{s:error("));
    }

    #[test]
    fn partials_round_trip_through_two_stages() {
        let ctx = query();
        let keys = || vec![(path("k"), field(&ctx, "k"))];
        let aggs = || {
            vec![
                (path("avg"), agg("avg", Some(field(&ctx, "v")))),
                (path("n"), agg("count", Some(field(&ctx, "v")))),
            ]
        };
        let input = source(&ctx, &["{k:1,v:1} {k:2,v:10}", "{k:1,v:3}"]);
        let first = Aggregate::new(&ctx, input, keys(), aggs(), false, true).unwrap();
        let mut second = Aggregate::new(&ctx, first, keys(), aggs(), true, false).unwrap();
        assert_eq!(rows(&mut second), ["{k:1,avg:2.0,n:2::uint64}", "{k:2,avg:10.0,n:1::uint64}"]);
    }

    #[test]
    fn keys_are_required_and_empty_input_yields_nothing() {
        let ctx = query();
        let none = Aggregate::new(&ctx, source(&ctx, &[]), vec![], vec![], false, false);
        assert!(matches!(none, Err(RuntimeError::InvalidOperator(_))));
        let mut op = Aggregate::new(
            &ctx,
            source(&ctx, &[]),
            vec![(path("k"), field(&ctx, "k"))],
            vec![(path("c"), agg("count", None))],
            false,
            false,
        )
        .unwrap();
        assert!(op.pull(false).unwrap().is_none());
    }
}
