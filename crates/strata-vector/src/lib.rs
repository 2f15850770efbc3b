//! Columnar data model for a dynamically typed query engine.
//!
//! - [`Type`] and [`TypeContext`] describe and intern value shapes.
//! - [`Value`] is one typed value in canonical encoding; [`sup`] parses the text syntax.
//! - [`Vector`] is an immutable column, possibly heterogeneous (`Dynamic`).
//! - [`apply`], [`pick`] and the builders are the algorithms every evaluator is built from.

#![forbid(unsafe_code)]

pub mod apply;
pub mod bitmap;
pub mod builder;
pub mod context;
pub mod encoding;
pub mod error;
pub mod format;
pub mod nulls;
pub mod pick;
pub mod record_builder;
pub mod sup;
pub mod types;
pub mod value;
pub mod vector;

pub use apply::{apply, combine, deunion, flatten_union_nulls, stitch, under, union_with_nulls};
pub use bitmap::BitVec;
pub use builder::{Builder, DynamicBuilder};
pub use context::TypeContext;
pub use error::{TypeError, TypeResult};
pub use nulls::{add_nulls, copy_and_set_nulls, nulls_of, pick_non_null};
pub use pick::{gather_rows, materialize, pick, reverse_index, reverse_pick};
pub use record_builder::RecordBuilder;
pub use types::{Field, Kind, Type};
pub use value::{Net, Value};
pub use vector::{Form, TagMap, Vector};
