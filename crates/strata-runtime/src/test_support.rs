use crate::context::QueryContext;
use crate::source::{pull_all, VectorSource};
use crate::Puller;
use std::sync::Arc;
use strata_expr::{dotted_path, Expr};
use strata_vector::sup::parse_values;
use strata_vector::{TypeContext, Vector};

pub(crate) fn query() -> QueryContext {
    QueryContext::new(Arc::new(TypeContext::new()))
}

pub(crate) fn col(ctx: &QueryContext, text: &str) -> Vector {
    Vector::from_values(&parse_values(&ctx.types, text).unwrap())
}

/// One batch per string.
pub(crate) fn source(ctx: &QueryContext, batches: &[&str]) -> Box<dyn Puller> {
    Box::new(VectorSource::new(batches.iter().map(|text| col(ctx, text))))
}

pub(crate) fn field(ctx: &QueryContext, name: &str) -> Expr {
    dotted_path(&ctx.types, &[name])
}

pub(crate) fn show(v: &Vector) -> Vec<String> {
    v.values().iter().map(ToString::to_string).collect()
}

/// Every row until end of stream.
pub(crate) fn rows(p: &mut dyn Puller) -> Vec<String> {
    pull_all(p).unwrap().iter().flat_map(show).collect()
}
