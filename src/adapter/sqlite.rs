use rusqlite::{params_from_iter, Connection};

use super::{is_single_statement, Param, SqlValue};
use crate::error::AdapterError;

const PRAGMAS: &str = r#"
PRAGMA synchronous = NORMAL;
PRAGMA foreign_keys = OFF;
PRAGMA temp_store = MEMORY;
"#;

const DISK_PRAGMAS: &str = "PRAGMA journal_mode = WAL;";

/// Blocking SQLite adapter. Owns one connection; callers share it through
/// the facade's mutex and rely on optimistic versioning for cross-thread
/// coordination.
pub struct SqliteAdapter {
  path: String,
  conn: Option<Connection>,
}

impl SqliteAdapter {
  pub fn new(path: impl Into<String>) -> Self {
    Self {
      path: path.into(),
      conn: None,
    }
  }

  pub fn in_memory() -> Self {
    Self::new(":memory:")
  }

  pub fn on_disk(path: impl Into<String>) -> Self {
    Self::new(path)
  }

  pub fn path(&self) -> &str {
    &self.path
  }

  pub fn is_connected(&self) -> bool {
    self.conn.is_some()
  }

  /// Opens the connection and applies pragmas. Idempotent.
  pub fn connect(&mut self) -> Result<(), AdapterError> {
    if self.conn.is_some() {
      return Ok(());
    }
    let conn = if self.path == ":memory:" {
      Connection::open_in_memory()?
    } else {
      Connection::open(&self.path)?
    };
    conn.execute_batch(PRAGMAS)?;
    if self.path != ":memory:" {
      conn.execute_batch(DISK_PRAGMAS)?;
    }
    tracing::debug!(path = %self.path, "sqlite adapter connected");
    self.conn = Some(conn);
    Ok(())
  }

  /// Drops the connection. Idempotent; later calls fail with `NotConnected`.
  pub fn close(&mut self) {
    if self.conn.take().is_some() {
      tracing::debug!(path = %self.path, "sqlite adapter closed");
    }
  }

  fn conn(&self) -> Result<&Connection, AdapterError> {
    self.conn.as_ref().ok_or(AdapterError::NotConnected)
  }

  /// Runs a single SELECT-like statement and materializes all rows.
  pub fn query(&self, sql: &str, params: &[Param]) -> Result<Vec<Vec<SqlValue>>, AdapterError> {
    if !is_single_statement(sql) {
      return Err(AdapterError::MultiStatement);
    }
    let conn = self.conn()?;
    tracing::trace!(%sql, "query");
    let mut stmt = conn.prepare(sql)?;
    let columns = stmt.column_count();
    let mut rows = stmt.query(params_from_iter(params.iter()))?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
      let mut record = Vec::with_capacity(columns);
      for i in 0..columns {
        record.push(row.get::<_, SqlValue>(i)?);
      }
      out.push(record);
    }
    Ok(out)
  }

  /// Runs a single write statement; returns the affected-row count.
  pub fn execute(&self, sql: &str, params: &[Param]) -> Result<usize, AdapterError> {
    if !is_single_statement(sql) {
      return Err(AdapterError::MultiStatement);
    }
    let conn = self.conn()?;
    tracing::trace!(%sql, "execute");
    Ok(conn.execute(sql, params_from_iter(params.iter()))?)
  }

  /// Runs an INSERT and returns the assigned rowid.
  pub fn insert(&self, sql: &str, params: &[Param]) -> Result<i64, AdapterError> {
    self.execute(sql, params)?;
    Ok(self.conn()?.last_insert_rowid())
  }

  /// Batch path: one prepared statement, many parameter lists. An empty
  /// batch is a no-op.
  pub fn execute_many(&self, sql: &str, batches: &[Vec<Param>]) -> Result<(), AdapterError> {
    if batches.is_empty() {
      return Ok(());
    }
    if !is_single_statement(sql) {
      return Err(AdapterError::MultiStatement);
    }
    let conn = self.conn()?;
    let mut stmt = conn.prepare(sql)?;
    for params in batches {
      stmt.execute(params_from_iter(params.iter()))?;
    }
    Ok(())
  }

  /// Runs a semicolon-delimited script without parameter binding.
  pub fn execute_script(&self, script: &str) -> Result<(), AdapterError> {
    let conn = self.conn()?;
    conn.execute_batch(script)?;
    Ok(())
  }

  /// Commits an open transaction; a no-op in autocommit mode.
  pub fn commit(&self) -> Result<(), AdapterError> {
    let conn = self.conn()?;
    if !conn.is_autocommit() {
      conn.execute_batch("COMMIT")?;
    }
    Ok(())
  }

  /// Runs `f` inside a transaction: commit on `Ok`, rollback on `Err`.
  pub fn transaction<T>(
    &self,
    f: impl FnOnce(&Connection) -> Result<T, AdapterError>,
  ) -> Result<T, AdapterError> {
    let conn = self.conn()?;
    let tx = conn.unchecked_transaction()?;
    match f(&tx) {
      Ok(value) => {
        tx.commit()?;
        Ok(value)
      }
      Err(err) => Err(err), // tx rolls back on drop
    }
  }

  /// Installs (or removes) a statement trace callback. Tests use this to
  /// count the statements a higher layer issues.
  pub fn trace(&mut self, callback: Option<fn(&str)>) -> Result<(), AdapterError> {
    let conn = self.conn.as_mut().ok_or(AdapterError::NotConnected)?;
    conn.trace(callback);
    Ok(())
  }
}

impl Drop for SqliteAdapter {
  fn drop(&mut self) {
    self.close();
  }
}
