use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;

use super::{
  column_i64, column_json, create_index_sql, create_table_sql, decode_document, decode_row,
  placeholders, sanitize, TableShape, IN_CHUNK,
};
use crate::adapter::{AsyncSqliteAdapter, Param, SqlValue};
use crate::error::DatabaseError;

/// Suspending database facade; the contract of [`Database`] with an await
/// point at every adapter touch.
///
/// [`Database`]: super::Database
#[derive(Clone)]
pub struct AsyncDatabase {
  adapter: Arc<Mutex<AsyncSqliteAdapter>>,
}

impl AsyncDatabase {
  pub fn new(adapter: AsyncSqliteAdapter) -> Self {
    Self {
      adapter: Arc::new(Mutex::new(adapter)),
    }
  }

  pub fn in_memory() -> Self {
    Self::new(AsyncSqliteAdapter::in_memory())
  }

  pub fn on_disk(path: impl Into<String>) -> Self {
    Self::new(AsyncSqliteAdapter::on_disk(path))
  }

  pub async fn connect(&self) -> Result<(), DatabaseError> {
    self
      .adapter
      .lock()
      .await
      .connect()
      .await
      .map_err(DatabaseError::Adapter)
  }

  pub async fn close(&self) {
    self.adapter.lock().await.close().await;
  }

  /// True when both handles share the same underlying adapter.
  pub fn same_as(&self, other: &AsyncDatabase) -> bool {
    Arc::ptr_eq(&self.adapter, &other.adapter)
  }

  /// Installs (or removes) a statement trace callback on the connection.
  pub async fn trace_statements(&self, callback: Option<fn(&str)>) -> Result<(), DatabaseError> {
    let adapter = self.adapter.lock().await;
    adapter.trace(callback).await.map_err(DatabaseError::Adapter)
  }

  pub async fn ensure_table(&self, table: &str, shape: TableShape) -> Result<(), DatabaseError> {
    sanitize::validate_table_name(table)?;
    let sql = create_table_sql(table, shape);
    self.adapter.lock().await.execute(&sql, Vec::new()).await?;
    tracing::debug!(%table, ?shape, "ensured table");
    Ok(())
  }

  pub async fn insert_document(&self, table: &str, doc: &Value) -> Result<i64, DatabaseError> {
    sanitize::validate_table_name(table)?;
    let text = serde_json::to_string(doc)?;
    let sql = format!("INSERT INTO {table} (data) VALUES (json(?))");
    let id = self
      .adapter
      .lock()
      .await
      .insert(&sql, vec![Param::Text(text)])
      .await?;
    Ok(id)
  }

  pub async fn insert_document_versioned(
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
      .await
      .insert(&sql, vec![Param::Text(text), Param::Int(version)])
      .await?;
    Ok(id)
  }

  pub async fn find_document(&self, table: &str, id: i64) -> Result<Option<Value>, DatabaseError> {
    sanitize::validate_table_name(table)?;
    let sql = format!("SELECT _id, data FROM {table} WHERE _id = ?");
    let rows = self
      .adapter
      .lock()
      .await
      .query(&sql, vec![Param::Int(id)])
      .await?;
    rows.first().map(|row| decode_document(row)).transpose()
  }

  pub async fn find_document_versioned(
    &self,
    table: &str,
    id: i64,
  ) -> Result<Option<(Value, i64)>, DatabaseError> {
    sanitize::validate_table_name(table)?;
    let sql = format!("SELECT _id, data, _version FROM {table} WHERE _id = ?");
    let rows = self
      .adapter
      .lock()
      .await
      .query(&sql, vec![Param::Int(id)])
      .await?;
    rows
      .first()
      .map(|row| Ok((decode_document(row)?, column_i64(&row[2])?)))
      .transpose()
  }

  pub async fn find_documents(
    &self,
    table: &str,
    ids: &[i64],
  ) -> Result<Vec<(i64, Value)>, DatabaseError> {
    sanitize::validate_table_name(table)?;
    let mut out = Vec::with_capacity(ids.len());
    for chunk in ids.chunks(IN_CHUNK) {
      let sql = format!(
        "SELECT _id, data FROM {table} WHERE _id IN ({})",
        placeholders(chunk.len())
      );
      let params: Vec<Param> = chunk.iter().map(|id| Param::Int(*id)).collect();
      let rows = self.adapter.lock().await.query(&sql, params).await?;
      for row in rows {
        out.push((column_i64(&row[0])?, column_json(&row[1])?));
      }
    }
    Ok(out)
  }

  pub async fn find_documents_versioned(
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
      let rows = self.adapter.lock().await.query(&sql, params).await?;
      for row in rows {
        out.push((column_i64(&row[0])?, column_i64(&row[2])?, column_json(&row[1])?));
      }
    }
    Ok(out)
  }

  pub async fn upsert_document(
    &self,
    table: &str,
    id: Option<i64>,
    doc: &Value,
  ) -> Result<i64, DatabaseError> {
    match id {
      None => self.insert_document(table, doc).await,
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
          .await
          .execute(&sql, vec![Param::Int(id), Param::Text(text)])
          .await?;
        Ok(id)
      }
    }
  }

  pub async fn update_document_versioned(
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
    let changed = self
      .adapter
      .lock()
      .await
      .execute(&sql, vec![Param::Text(text), Param::Int(id), Param::Int(version)])
      .await?;
    Ok(changed)
  }

  pub async fn delete_document(&self, table: &str, id: i64) -> Result<(), DatabaseError> {
    sanitize::validate_table_name(table)?;
    let sql = format!("DELETE FROM {table} WHERE _id = ?");
    self
      .adapter
      .lock()
      .await
      .execute(&sql, vec![Param::Int(id)])
      .await?;
    Ok(())
  }

  /// Mixed-mode batch in one transaction; see [`Database::bulk_upsert`].
  ///
  /// [`Database::bulk_upsert`]: super::Database::bulk_upsert
  pub async fn bulk_upsert(
    &self,
    table: &str,
    docs: &mut [Value],
  ) -> Result<Vec<i64>, DatabaseError> {
    sanitize::validate_table_name(table)?;
    if docs.is_empty() {
      return Ok(Vec::new());
    }
    let insert_sql = format!("INSERT INTO {table} (data) VALUES (json(?))");
    let replace_sql = format!(
      "INSERT INTO {table} (_id, data) VALUES (?, json(?)) \
       ON CONFLICT(_id) DO UPDATE SET data = excluded.data"
    );

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
      .await
      .transaction(move |conn| {
        let mut ids = Vec::with_capacity(rows.len());
        for (id, text) in &rows {
          match id {
            Some(id) => {
              conn.execute(&replace_sql, rusqlite::params![id, text])?;
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
      .await
      .map_err(DatabaseError::Adapter)?;

    for (doc, id) in docs.iter_mut().zip(&ids) {
      if let Some(map) = doc.as_object_mut() {
        map.insert("_id".to_string(), Value::from(*id));
      }
    }
    Ok(ids)
  }

  pub async fn execute_sql(
    &self,
    sql: &str,
    params: Vec<Param>,
  ) -> Result<Vec<Value>, DatabaseError> {
    let rows = self.adapter.lock().await.query(sql, params).await?;
    rows.iter().map(|row| decode_row(row)).collect()
  }

  pub async fn execute(&self, sql: &str, params: Vec<Param>) -> Result<usize, DatabaseError> {
    Ok(self.adapter.lock().await.execute(sql, params).await?)
  }

  pub(crate) async fn query_rows(
    &self,
    sql: &str,
    params: Vec<Param>,
  ) -> Result<Vec<Vec<SqlValue>>, DatabaseError> {
    Ok(self.adapter.lock().await.query(sql, params).await?)
  }

  pub async fn create_index(
    &self,
    table: &str,
    path: &str,
    unique: bool,
    where_clause: Option<&str>,
  ) -> Result<(), DatabaseError> {
    let sql = create_index_sql(table, path, unique, where_clause)?;
    self.adapter.lock().await.execute(&sql, Vec::new()).await?;
    tracing::debug!(%table, %path, unique, "ensured index");
    Ok(())
  }
}
