use thiserror::Error;

use crate::db::sanitize::IdentifierError;

/// Errors raised by the storage adapters.
#[derive(Debug, Error)]
pub enum AdapterError {
  #[error("adapter is not connected")]
  NotConnected,

  #[error("execute() takes a single statement; use execute_script() for scripts")]
  MultiStatement,

  /// Engine-reported error, propagated unmodified.
  #[error(transparent)]
  Sqlite(#[from] rusqlite::Error),

  /// Async connection runtime failure (worker thread gone, channel closed).
  #[error("adapter runtime failure: {0}")]
  Runtime(String),
}

#[cfg(feature = "async")]
impl From<tokio_rusqlite::Error> for AdapterError {
  fn from(err: tokio_rusqlite::Error) -> Self {
    match err {
      tokio_rusqlite::Error::Rusqlite(e) => AdapterError::Sqlite(e),
      tokio_rusqlite::Error::ConnectionClosed => AdapterError::NotConnected,
      other => AdapterError::Runtime(other.to_string()),
    }
  }
}

/// Errors raised by the database facade.
#[derive(Debug, Error)]
pub enum DatabaseError {
  #[error(transparent)]
  Adapter(#[from] AdapterError),

  #[error(transparent)]
  Json(#[from] serde_json::Error),

  #[error(transparent)]
  Identifier(#[from] IdentifierError),

  /// A row did not have the expected column shape.
  #[error("unexpected row shape: {0}")]
  Decode(String),
}

impl From<rusqlite::Error> for DatabaseError {
  fn from(err: rusqlite::Error) -> Self {
    DatabaseError::Adapter(AdapterError::Sqlite(err))
  }
}

/// Errors raised by the model runtime.
#[derive(Debug, Error)]
pub enum ModelError {
  #[error("model {model} is not bound to a database; call set_db first")]
  NotBound { model: &'static str },

  #[error("no document with _id {id} in table {table}")]
  NotFound { table: String, id: i64 },

  /// Optimistic update matched no `(id, version)` row; the stored document
  /// was changed by another writer.
  #[error("stale version for _id {id} in table {table}; refresh and retry")]
  StaleVersion { table: String, id: i64 },

  #[error("cannot delete _id {id} from table {table}: still referenced")]
  ReferentialIntegrity { table: String, id: i64 },

  /// refresh/delete invoked on an instance that was never saved.
  #[error("instance of table {table} has no _id")]
  Unsaved { table: String },

  /// A hydrated reference without an identifier reached serialization.
  #[error("reference into table {table} points at an unsaved document")]
  UnsavedReference { table: String },

  /// Declared-schema mismatch on construction or hydration.
  #[error("document does not match the declared model: {0}")]
  Validation(#[source] serde_json::Error),

  #[error(transparent)]
  Database(#[from] DatabaseError),
}

impl From<AdapterError> for ModelError {
  fn from(err: AdapterError) -> Self {
    ModelError::Database(DatabaseError::Adapter(err))
  }
}
