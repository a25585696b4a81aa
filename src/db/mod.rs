//! Database facade: per-model tables, primitive document CRUD, bulk upsert,
//! index creation, and a raw-SQL escape hatch over the adapters.

pub mod sanitize;

mod database;

#[cfg(feature = "async")]
mod async_database;

pub use database::Database;

#[cfg(feature = "async")]
pub use async_database::AsyncDatabase;

use serde_json::Value;

use crate::adapter::SqlValue;
use crate::error::DatabaseError;

/// Shape of a model table. Versioned tables carry the `_version` column used
/// for optimistic concurrency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableShape {
  Plain,
  Versioned,
}

pub(crate) fn create_table_sql(table: &str, shape: TableShape) -> String {
  match shape {
    TableShape::Plain => format!(
      "CREATE TABLE IF NOT EXISTS {table} (_id INTEGER PRIMARY KEY AUTOINCREMENT, data JSON NOT NULL)"
    ),
    TableShape::Versioned => format!(
      "CREATE TABLE IF NOT EXISTS {table} (_id INTEGER PRIMARY KEY AUTOINCREMENT, data JSON NOT NULL, _version INTEGER NOT NULL DEFAULT 0)"
    ),
  }
}

pub(crate) fn create_index_sql(
  table: &str,
  path: &str,
  unique: bool,
  where_clause: Option<&str>,
) -> Result<String, DatabaseError> {
  sanitize::validate_table_name(table)?;
  sanitize::validate_field_path(path)?;
  let name = sanitize::index_name(table, path);
  let unique = if unique { "UNIQUE " } else { "" };
  let mut sql = format!(
    "CREATE {unique}INDEX IF NOT EXISTS {name} ON {table}(json_extract(data, '$.{path}'))"
  );
  if let Some(clause) = where_clause {
    sql.push_str(" WHERE ");
    sql.push_str(clause);
  }
  Ok(sql)
}

pub(crate) fn placeholders(n: usize) -> String {
  let mut out = String::with_capacity(n * 3);
  for i in 0..n {
    if i > 0 {
      out.push_str(", ");
    }
    out.push('?');
  }
  out
}

/// SQLite's default variable limit is 999; stay under it for IN lists.
pub(crate) const IN_CHUNK: usize = 500;

pub(crate) fn column_i64(value: &SqlValue) -> Result<i64, DatabaseError> {
  match value {
    SqlValue::Integer(i) => Ok(*i),
    other => Err(DatabaseError::Decode(format!("expected integer, got {other:?}"))),
  }
}

pub(crate) fn column_json(value: &SqlValue) -> Result<Value, DatabaseError> {
  match value {
    SqlValue::Text(text) => Ok(serde_json::from_str(text)?),
    other => Err(DatabaseError::Decode(format!("expected JSON text, got {other:?}"))),
  }
}

/// Decodes an `(_id, data)` row into the payload with `_id` injected.
pub(crate) fn decode_document(row: &[SqlValue]) -> Result<Value, DatabaseError> {
  if row.len() < 2 {
    return Err(DatabaseError::Decode(format!("expected (_id, data), got {} columns", row.len())));
  }
  let id = column_i64(&row[0])?;
  let mut payload = column_json(&row[1])?;
  if let Some(map) = payload.as_object_mut() {
    map.insert("_id".to_string(), Value::from(id));
  }
  Ok(payload)
}

fn scalar_to_json(value: &SqlValue) -> Value {
  match value {
    SqlValue::Null => Value::Null,
    SqlValue::Integer(i) => Value::from(*i),
    SqlValue::Real(f) => Value::from(*f),
    SqlValue::Text(t) => serde_json::from_str(t).unwrap_or_else(|_| Value::from(t.clone())),
    SqlValue::Blob(_) => Value::Null,
  }
}

/// Decodes an arbitrary row from the raw-SQL escape hatch. `(_id, data)`
/// pairs become payloads with `_id` injected; other shapes decode column by
/// column.
pub(crate) fn decode_row(row: &[SqlValue]) -> Result<Value, DatabaseError> {
  if row.len() == 2 {
    if let (SqlValue::Integer(_), SqlValue::Text(text)) = (&row[0], &row[1]) {
      if let Ok(Value::Object(_)) = serde_json::from_str::<Value>(text) {
        return decode_document(row);
      }
    }
  }
  if row.len() == 1 {
    return Ok(scalar_to_json(&row[0]));
  }
  Ok(Value::Array(row.iter().map(scalar_to_json).collect()))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn table_sql_shapes() {
    assert_eq!(
      create_table_sql("users", TableShape::Plain),
      "CREATE TABLE IF NOT EXISTS users (_id INTEGER PRIMARY KEY AUTOINCREMENT, data JSON NOT NULL)"
    );
    assert!(create_table_sql("accounts", TableShape::Versioned)
      .contains("_version INTEGER NOT NULL DEFAULT 0"));
  }

  #[test]
  fn index_sql() {
    let sql = create_index_sql("users", "address.city", false, None).unwrap();
    assert_eq!(
      sql,
      "CREATE INDEX IF NOT EXISTS idx_users_address_city ON users(json_extract(data, '$.address.city'))"
    );
    let sql = create_index_sql("users", "email", true, Some("json_extract(data, '$.email') IS NOT NULL")).unwrap();
    assert!(sql.starts_with("CREATE UNIQUE INDEX IF NOT EXISTS idx_users_email"));
    assert!(sql.ends_with("WHERE json_extract(data, '$.email') IS NOT NULL"));
  }

  #[test]
  fn index_sql_rejects_bad_identifiers() {
    assert!(create_index_sql("users; DROP", "age", false, None).is_err());
    assert!(create_index_sql("users", "age; DROP", false, None).is_err());
  }

  #[test]
  fn decode_document_injects_id() {
    let row = vec![SqlValue::Integer(7), SqlValue::Text(r#"{"name":"Ada"}"#.into())];
    let doc = decode_document(&row).unwrap();
    assert_eq!(doc["_id"], 7);
    assert_eq!(doc["name"], "Ada");
  }
}
