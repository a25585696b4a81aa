//! doclite: a document micro-ORM over SQLite.
//!
//! Each model is stored as one JSON payload per row in its own table, keyed
//! by a synthetic integer `_id` (safe models add an `_version` column for
//! optimistic concurrency). Typed field paths compile to parameterized
//! `json_extract` / `json_each` SQL, including quantified predicates over
//! nested arrays and joins on cross-document references. The model runtime
//! saves, refreshes, and deletes instances, hydrates referenced documents in
//! one batched lookup per table, and offers restrict/set-null/cascade delete
//! policies. The whole surface exists twice: blocking, and suspending behind
//! the `async` feature.

pub mod adapter;
pub mod db;
pub mod error;
pub mod model;
pub mod query;

pub use adapter::{Param, SqlValue, SqliteAdapter};
pub use db::{Database, TableShape};
pub use error::{AdapterError, DatabaseError, ModelError};
pub use model::{
  CollectRefs, IndexSpec, Model, ModelExt, ModelMeta, ModelQuery, OnDelete, RawRef, Ref, RefSlot,
  Relation,
};
pub use query::{Expression, Field, Query};

#[cfg(feature = "async")]
pub use adapter::AsyncSqliteAdapter;

#[cfg(feature = "async")]
pub use db::AsyncDatabase;

#[cfg(feature = "async")]
pub use model::{AsyncModelExt, AsyncModelQuery};

#[cfg(feature = "async")]
pub use query::AsyncQuery;
