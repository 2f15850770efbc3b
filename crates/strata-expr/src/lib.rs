//! Vectorized expression evaluation.
//!
//! Every evaluator maps an input column (`this`) to an output column of the same length. Data
//! errors never surface as Rust errors: they are error-typed slots in the output, so a batch
//! with one bad row still evaluates the rest.
//!
//! - Scalar operators ([`ArithExpr`], [`CompareExpr`], [`And`], [`Or`], [`Conditional`], ...)
//!   dispatch heterogeneous inputs through [`strata_vector::apply`].
//! - [`Aggregator`] and the [`agg`] module implement the aggregate function family.
//! - [`function`] holds the built-in scalar functions, looked up by name.
//! - [`ExprError`] only reports construction failures (unknown names, bad arguments).

#![forbid(unsafe_code)]

mod access;
pub mod agg;
mod aggregator;
mod arith;
mod cast;
mod coerce;
mod compare;
mod conditional;
mod construct;
mod dot;
mod error;
pub mod function;
mod index;
mod logic;
pub mod order;
mod put;
mod quiet;
mod search;
mod slice;
mod udf;

use std::fmt;
use std::sync::Arc;
use strata_vector::Vector;

pub use aggregator::Aggregator;
pub use arith::{arith, ArithExpr, ArithOp, Negate};
pub use cast::{cast_to, Cast};
pub use compare::{compare, CompareExpr, CompareOp, IsNull};
pub use conditional::Conditional;
pub use construct::{ArrayExpr, ListElem, MapEntry, MapExpr, RecordElem, RecordExpr, SetExpr};
pub use dot::{dotted_path, DotExpr, Literal, This};
pub use error::{ExprError, ExprResult};
pub use function::{call, Call};
pub use index::IndexExpr;
pub use logic::{bool_mask, And, BoolMask, Not, Or};
pub use put::{Assignment, Put, Rename};
pub use quiet::{quiet_mask, Dequiet};
pub use search::{RegexpMatch, Search, SearchPattern};
pub use slice::SliceExpr;
pub use udf::Udf;

/// Default recursion limit for user-defined functions.
pub const MAX_STACK_DEPTH: usize = 10_000;

/// A vectorized expression.
pub trait Evaluator: Send + Sync + fmt::Debug {
    /// Evaluates against `this`, returning a column of `this.len()` rows.
    fn eval(&self, this: &Vector) -> Vector;
}

/// Shared handle to an evaluator tree node.
pub type Expr = Arc<dyn Evaluator>;
