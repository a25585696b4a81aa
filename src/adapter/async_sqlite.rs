use rusqlite::params_from_iter;
use tokio_rusqlite::Connection;

use super::{is_single_statement, Param, SqlValue};
use crate::error::AdapterError;

const PRAGMAS: &str = r#"
PRAGMA synchronous = NORMAL;
PRAGMA foreign_keys = OFF;
PRAGMA temp_store = MEMORY;
"#;

const DISK_PRAGMAS: &str = "PRAGMA journal_mode = WAL;";

/// Suspending SQLite adapter. Same contract as [`SqliteAdapter`], but every
/// touch of the connection is an await point; the connection itself lives on
/// a worker thread and serializes all calls.
///
/// [`SqliteAdapter`]: super::SqliteAdapter
pub struct AsyncSqliteAdapter {
  path: String,
  conn: Option<Connection>,
}

impl AsyncSqliteAdapter {
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
  pub async fn connect(&mut self) -> Result<(), AdapterError> {
    if self.conn.is_some() {
      return Ok(());
    }
    let conn = if self.path == ":memory:" {
      Connection::open_in_memory().await?
    } else {
      Connection::open(&self.path).await?
    };
    let on_disk = self.path != ":memory:";
    conn
      .call(move |conn| {
        conn.execute_batch(PRAGMAS)?;
        if on_disk {
          conn.execute_batch(DISK_PRAGMAS)?;
        }
        Ok(())
      })
      .await?;
    tracing::debug!(path = %self.path, "async sqlite adapter connected");
    self.conn = Some(conn);
    Ok(())
  }

  /// Closes the connection. Idempotent; later calls fail with `NotConnected`.
  pub async fn close(&mut self) {
    if let Some(conn) = self.conn.take() {
      let _ = conn.close().await;
      tracing::debug!(path = %self.path, "async sqlite adapter closed");
    }
  }

  fn conn(&self) -> Result<&Connection, AdapterError> {
    self.conn.as_ref().ok_or(AdapterError::NotConnected)
  }

  /// Runs a single SELECT-like statement and materializes all rows.
  pub async fn query(
    &self,
    sql: &str,
    params: Vec<Param>,
  ) -> Result<Vec<Vec<SqlValue>>, AdapterError> {
    if !is_single_statement(sql) {
      return Err(AdapterError::MultiStatement);
    }
    let conn = self.conn()?;
    let sql = sql.to_string();
    let rows = conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
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
      })
      .await?;
    Ok(rows)
  }

  /// Runs a single write statement; returns the affected-row count.
  pub async fn execute(&self, sql: &str, params: Vec<Param>) -> Result<usize, AdapterError> {
    if !is_single_statement(sql) {
      return Err(AdapterError::MultiStatement);
    }
    let conn = self.conn()?;
    let sql = sql.to_string();
    let changed = conn
      .call(move |conn| Ok(conn.execute(&sql, params_from_iter(params.iter()))?))
      .await?;
    Ok(changed)
  }

  /// Runs an INSERT and returns the assigned rowid.
  pub async fn insert(&self, sql: &str, params: Vec<Param>) -> Result<i64, AdapterError> {
    if !is_single_statement(sql) {
      return Err(AdapterError::MultiStatement);
    }
    let conn = self.conn()?;
    let sql = sql.to_string();
    let id = conn
      .call(move |conn| {
        conn.execute(&sql, params_from_iter(params.iter()))?;
        Ok(conn.last_insert_rowid())
      })
      .await?;
    Ok(id)
  }

  /// Batch path: one prepared statement, many parameter lists. An empty
  /// batch is a no-op.
  pub async fn execute_many(
    &self,
    sql: &str,
    batches: Vec<Vec<Param>>,
  ) -> Result<(), AdapterError> {
    if batches.is_empty() {
      return Ok(());
    }
    if !is_single_statement(sql) {
      return Err(AdapterError::MultiStatement);
    }
    let conn = self.conn()?;
    let sql = sql.to_string();
    conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        for params in &batches {
          stmt.execute(params_from_iter(params.iter()))?;
        }
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Runs a semicolon-delimited script without parameter binding.
  pub async fn execute_script(&self, script: &str) -> Result<(), AdapterError> {
    let conn = self.conn()?;
    let script = script.to_string();
    conn.call(move |conn| Ok(conn.execute_batch(&script)?)).await?;
    Ok(())
  }

  /// Commits an open transaction; a no-op in autocommit mode.
  pub async fn commit(&self) -> Result<(), AdapterError> {
    let conn = self.conn()?;
    conn
      .call(|conn| {
        if !conn.is_autocommit() {
          conn.execute_batch("COMMIT")?;
        }
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Runs `f` inside a transaction on the connection's worker thread:
  /// commit on `Ok`, rollback on `Err`.
  pub async fn transaction<T>(
    &self,
    f: impl FnOnce(&rusqlite::Connection) -> Result<T, rusqlite::Error> + Send + 'static,
  ) -> Result<T, AdapterError>
  where
    T: Send + 'static,
  {
    let conn = self.conn()?;
    let value = conn
      .call(move |conn| {
        let tx = conn.unchecked_transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
      })
      .await?;
    Ok(value)
  }

  /// Installs (or removes) a statement trace callback.
  pub async fn trace(&self, callback: Option<fn(&str)>) -> Result<(), AdapterError> {
    let conn = self.conn()?;
    conn
      .call(move |conn| {
        conn.trace(callback);
        Ok(())
      })
      .await?;
    Ok(())
  }
}
