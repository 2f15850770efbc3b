//! Pull-based dataflow operators over vectors.
//!
//! Every operator is a [`Puller`]: the consumer asks for the next batch and the operator pulls
//! its own parents as needed. A stream ends with `Ok(None)`; after that the next pull starts a
//! new stream, which is how subqueries re-run a graph. Pulling with `done` tells an operator
//! the consumer wants no more of the current stream.
//!
//! Per-row failures stay in the data as error values. [`RuntimeError`] is reserved for
//! failures that end a stream: cancellation, I/O and malformed operator arguments.

#![forbid(unsafe_code)]

pub mod aggregate;
mod context;
mod error;
pub mod join;
pub mod op;
mod parallel;
pub mod route;
pub mod scan;
mod source;

#[cfg(test)]
mod test_support;

pub use aggregate::{Aggregate, FieldPath, ScalarAggregate};
pub use context::{CancelToken, QueryContext, RuntimeOptions};
pub use error::{RuntimeError, RuntimeResult};
pub use join::{CrossJoin, HashJoin, JoinStyle, NestedLoopJoin};
pub use route::{branch, ExprSwitch, Fork, Merge, Route, Switch};
pub use scan::{FileOpener, FileScan, Robot, Scanner};
pub use source::{pull_all, VectorSource};

use std::fmt::Debug;
use strata_vector::Vector;

/// A source of batches.
///
/// `pull(false)` returns the next non-empty batch or `Ok(None)` at the end of the stream.
/// `pull(true)` abandons the current stream and returns `Ok(None)`.
pub trait Puller: Send + Debug {
    fn pull(&mut self, done: bool) -> RuntimeResult<Option<Vector>>;
}

impl<P: Puller + ?Sized> Puller for Box<P> {
    fn pull(&mut self, done: bool) -> RuntimeResult<Option<Vector>> {
        (**self).pull(done)
    }
}
