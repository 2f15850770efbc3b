//! Columnar objects and the shared cache that loads them.
//!
//! An object is a blob of segments followed by a JSON metadata trailer. [`ObjectWriter`]
//! produces one from any vector; [`Object`] opens one and materializes projections of it into
//! a query's type context, loading each segment at most once.

#![forbid(unsafe_code)]

mod cache;
mod encode;
mod error;
mod meta;
mod nulls;
mod object;
mod parallel;
mod project;
mod shadow;
mod writer;

pub use cache::{CacheOptions, ObjectCache};
pub use error::{CacheError, CacheResult};
pub use meta::{FieldMeta, Metadata, Segment};
pub use object::{FileReader, Object, ReadAt};
pub use project::{Projection, ProjectionNode};
pub use writer::ObjectWriter;
