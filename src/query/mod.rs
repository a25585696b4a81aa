//! Typed field paths, composable predicates, and the query builder that
//! compiles them to `json_extract` / `json_each` SQL.

pub mod expression;
pub mod field;

mod builder;

#[cfg(feature = "async")]
mod async_builder;

pub use builder::Query;
pub use expression::{CmpOp, Expression};
pub use field::{Field, Segment};

#[cfg(feature = "async")]
pub use async_builder::AsyncQuery;

pub(crate) use builder::QueryParts;
