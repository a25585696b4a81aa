use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use super::{
  column_i64, column_json, create_index_sql, create_table_sql, decode_document, decode_row,
  placeholders, sanitize, TableShape, IN_CHUNK,
};
use crate::adapter::{Param, SqlValue, SqliteAdapter};
use crate::error::{AdapterError, DatabaseError};

/// Blocking database facade. Cheap to clone; every clone shares the one
/// adapter and serializes access through its mutex.
#[derive(Clone)]
pub struct Database {
  adapter: Arc<Mutex<SqliteAdapter>>,
}

impl Database {
  /// Wraps an adapter, connecting it if necessary.
  pub fn new(mut adapter: SqliteAdapter) -> Result<Self, DatabaseError> {
    adapter.connect().map_err(DatabaseError::Adapter)?;
    Ok(Self {
      adapter: Arc::new(Mutex::new(adapter)),
    })
  }

  pub fn in_memory() -> Result<Self, DatabaseError> {
    Self::new(SqliteAdapter::in_memory())
  }

  pub fn on_disk(path: impl Into<String>) -> Result<Self, DatabaseError> {
    Self::new(SqliteAdapter::on_disk(path))
  }

  pub fn close(&self) {
    self.adapter.lock().close();
  }

  /// True when both handles share the same underlying adapter.
  pub fn same_as(&self, other: &Database) -> bool {
    Arc::ptr_eq(&self.adapter, &other.adapter)
  }

  /// Runs `f` with the locked adapter. The escape hatch under the escape
  /// hatch; tests use it to poke at journal modes and traces.
  pub fn with_adapter<T>(
    &self,
    f: impl FnOnce(&mut SqliteAdapter) -> Result<T, AdapterError>,
  ) -> Result<T, DatabaseError> {
    let mut adapter = self.adapter.lock();
    f(&mut adapter).map_err(DatabaseError::Adapter)
  }

  /// Installs (or removes) a statement trace callback on the connection.
  pub fn trace_statements(&self, callback: Option<fn(&str)>) -> Result<(), DatabaseError> {
    self.with_adapter(|adapter| adapter.trace(callback))
  }

  /// Creates the table if absent, with the shape the binding model dictates.
  pub fn ensure_table(&self, table: &str, shape: TableShape) -> Result<(), DatabaseError> {
    sanitize::validate_table_name(table)?;
    let sql = create_table_sql(table, shape);
    self.adapter.lock().execute(&sql, &[])?;
    tracing::debug!(%table, ?shape, "ensured table");
    Ok(())
  }

  /// Serializes and inserts a document; returns the assigned identifier.
  pub fn insert_document(&self, table: &str, doc: &Value) -> Result<i64, DatabaseError> {
    sanitize::validate_table_name(table)?;
    let text = serde_json::to_string(doc)?;
    let sql = format!("INSERT INTO {table} (data) VALUES (json(?))");
    let id = self.adapter.lock().insert(&sql, &[Param::Text(text)])?;
    Ok(id)
  }

  /// Inserts a document into a versioned table with an explicit version.
  pub fn insert_document_versioned(
    &self,
    table: &str,
    doc: &Value,
    version: i64,
  ) -> Result<i64, DatabaseError> {
    sanitize::validate_table_name(table)?;
    let text = serde_json::to_string(doc)?;
    let sql = format!("INSERT INTO {table} (data, _version) VALUES (json(?), ?)");
    let id = self
      .adapter
      .lock()
      .insert(&sql, &[Param::Text(text), Param::Int(version)])?;
    Ok(id)
  }

  /// Returns the parsed payload with `_id` injected, or `None`.
  pub fn find_document(&self, table: &str, id: i64) -> Result<Option<Value>, DatabaseError> {
    sanitize::validate_table_name(table)?;
    let sql = format!("SELECT _id, data FROM {table} WHERE _id = ?");
    let rows = self.adapter.lock().query(&sql, &[Param::Int(id)])?;
    rows.first().map(|row| decode_document(row)).transpose()
  }

  /// Like [`find_document`], but also returns the stored version.
  ///
  /// [`find_document`]: Database::find_document
  pub fn find_document_versioned(
    &self,
    table: &str,
    id: i64,
  ) -> Result<Option<(Value, i64)>, DatabaseError> {
    sanitize::validate_table_name(table)?;
    let sql = format!("SELECT _id, data, _version FROM {table} WHERE _id = ?");
    let rows = self.adapter.lock().query(&sql, &[Param::Int(id)])?;
    rows
      .first()
      .map(|row| Ok((decode_document(row)?, column_i64(&row[2])?)))
      .transpose()
  }

  /// One batched lookup: `(id, payload)` for every stored id in `ids`.
  pub fn find_documents(&self, table: &str, ids: &[i64]) -> Result<Vec<(i64, Value)>, DatabaseError> {
    sanitize::validate_table_name(table)?;
    let mut out = Vec::with_capacity(ids.len());
    for chunk in ids.chunks(IN_CHUNK) {
      let sql = format!(
        "SELECT _id, data FROM {table} WHERE _id IN ({})",
        placeholders(chunk.len())
      );
      let params: Vec<Param> = chunk.iter().map(|id| Param::Int(*id)).collect();
      for row in self.adapter.lock().query(&sql, &params)? {
        out.push((column_i64(&row[0])?, column_json(&row[1])?));
      }
    }
    Ok(out)
  }

  /// Batched lookup over a versioned table: `(id, version, payload)`.
  pub fn find_documents_versioned(
    &self,
    table: &str,
    ids: &[i64],
  ) -> Result<Vec<(i64, i64, Value)>, DatabaseError> {
    sanitize::validate_table_name(table)?;
    let mut out = Vec::with_capacity(ids.len());
    for chunk in ids.chunks(IN_CHUNK) {
      let sql = format!(
        "SELECT _id, data, _version FROM {table} WHERE _id IN ({})",
        placeholders(chunk.len())
      );
      let params: Vec<Param> = chunk.iter().map(|id| Param::Int(*id)).collect();
      for row in self.adapter.lock().query(&sql, &params)? {
        out.push((column_i64(&row[0])?, column_i64(&row[2])?, column_json(&row[1])?));
      }
    }
    Ok(out)
  }

  /// Insert-or-replace by identifier. `None` inserts and assigns.
  pub fn upsert_document(
    &self,
    table: &str,
    id: Option<i64>,
    doc: &Value,
  ) -> Result<i64, DatabaseError> {
    match id {
      None => self.insert_document(table, doc),
      Some(id) => {
        sanitize::validate_table_name(table)?;
        let text = serde_json::to_string(doc)?;
        let sql = format!(
          "INSERT INTO {table} (_id, data) VALUES (?, json(?)) \
           ON CONFLICT(_id) DO UPDATE SET data = excluded.data"
        );
        self
          .adapter
          .lock()
          .execute(&sql, &[Param::Int(id), Param::Text(text)])?;
        Ok(id)
      }
    }
  }

  /// Conditional update for optimistic concurrency. Returns the number of
  /// affected rows; zero means the `(id, version)` pair no longer exists.
  pub fn update_document_versioned(
    &self,
    table: &str,
    id: i64,
    version: i64,
    doc: &Value,
  ) -> Result<usize, DatabaseError> {
    sanitize::validate_table_name(table)?;
    let text = serde_json::to_string(doc)?;
    let sql = format!(
      "UPDATE {table} SET data = json(?), _version = _version + 1 WHERE _id = ? AND _version = ?"
    );
    let changed = self.adapter.lock().execute(
      &sql,
      &[Param::Text(text), Param::Int(id), Param::Int(version)],
    )?;
    Ok(changed)
  }

  /// Removes the row; absent identifiers are a no-op.
  pub fn delete_document(&self, table: &str, id: i64) -> Result<(), DatabaseError> {
    sanitize::validate_table_name(table)?;
    let sql = format!("DELETE FROM {table} WHERE _id = ?");
    self.adapter.lock().execute(&sql, &[Param::Int(id)])?;
    Ok(())
  }

  /// Mixed-mode batch in a single transaction: docs without `_id` are
  /// inserted (and get `_id` written back), docs with one are replaced.
  /// Returns the full ordered identifier list.
  pub fn bulk_upsert(&self, table: &str, docs: &mut [Value]) -> Result<Vec<i64>, DatabaseError> {
    sanitize::validate_table_name(table)?;
    if docs.is_empty() {
      return Ok(Vec::new());
    }
    let insert_sql = format!("INSERT INTO {table} (data) VALUES (json(?))");
    let replace_sql = format!(
      "INSERT INTO {table} (_id, data) VALUES (?, json(?)) \
       ON CONFLICT(_id) DO UPDATE SET data = excluded.data"
    );

    // (id-if-known, payload text); `_id` never lands inside the payload
    let mut rows: Vec<(Option<i64>, String)> = Vec::with_capacity(docs.len());
    for doc in docs.iter() {
      let id = doc.get("_id").and_then(Value::as_i64);
      let payload = match doc {
        Value::Object(map) => {
          let mut map = map.clone();
          map.remove("_id");
          Value::Object(map)
        }
        other => other.clone(),
      };
      rows.push((id, serde_json::to_string(&payload)?));
    }

    let ids = self
      .adapter
      .lock()
      .transaction(|conn| {
        let mut ids = Vec::with_capacity(rows.len());
        for (id, text) in &rows {
          match id {
            Some(id) => {
              conn.execute(
                &replace_sql,
                rusqlite::params![id, text],
              )?;
              ids.push(*id);
            }
            None => {
              conn.execute(&insert_sql, rusqlite::params![text])?;
              ids.push(conn.last_insert_rowid());
            }
          }
        }
        Ok(ids)
      })
      .map_err(DatabaseError::Adapter)?;

    for (doc, id) in docs.iter_mut().zip(&ids) {
      if let Some(map) = doc.as_object_mut() {
        map.insert("_id".to_string(), Value::from(*id));
      }
    }
    Ok(ids)
  }

  /// Raw escape hatch for SELECTs; rows decode to JSON values with `_id`
  /// injected where `(_id, data)` is selected.
  pub fn execute_sql(&self, sql: &str, params: &[Param]) -> Result<Vec<Value>, DatabaseError> {
    let rows = self.adapter.lock().query(sql, params)?;
    rows.iter().map(|row| decode_row(row)).collect()
  }

  /// Raw statement passthrough; returns the affected-row count.
  pub fn execute(&self, sql: &str, params: &[Param]) -> Result<usize, DatabaseError> {
    Ok(self.adapter.lock().execute(sql, params)?)
  }

  pub(crate) fn query_rows(
    &self,
    sql: &str,
    params: &[Param],
  ) -> Result<Vec<Vec<SqlValue>>, DatabaseError> {
    Ok(self.adapter.lock().query(sql, params)?)
  }

  /// Builds `CREATE [UNIQUE] INDEX IF NOT EXISTS idx_<table>_<path> ON
  /// <table>(json_extract(data, '$.<path>')) [WHERE …]`.
  pub fn create_index(
    &self,
    table: &str,
    path: &str,
    unique: bool,
    where_clause: Option<&str>,
  ) -> Result<(), DatabaseError> {
    let sql = create_index_sql(table, path, unique, where_clause)?;
    self.adapter.lock().execute(&sql, &[])?;
    tracing::debug!(%table, %path, unique, "ensured index");
    Ok(())
  }
}
