//! Single-input operators.

mod count;
mod distinct;
mod filter;
pub(crate) mod limit;
mod sort;
mod unnest;
mod values;

pub use count::Count;
pub use distinct::Distinct;
pub use filter::Filter;
pub use limit::{Head, Skip, Tail};
pub use sort::{Sort, SortExpr};
pub use unnest::Unnest;
pub use values::{Values, Yield};
