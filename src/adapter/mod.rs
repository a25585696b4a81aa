//! Storage adapters: one SQLite connection per adapter, parameterized
//! execution, WAL journaling on disk. A blocking and a suspending flavor
//! share the same contract.

mod sqlite;

#[cfg(feature = "async")]
mod async_sqlite;

pub use sqlite::SqliteAdapter;

#[cfg(feature = "async")]
pub use async_sqlite::AsyncSqliteAdapter;

/// Raw column value as returned by the engine.
pub use rusqlite::types::Value as SqlValue;

use rusqlite::types::{ToSqlOutput, Value};
use rusqlite::ToSql;

/// A positional SQL parameter. Every payload value that reaches the engine
/// goes through one of these; values never appear inline in SQL text.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
  Null,
  Int(i64),
  Real(f64),
  Text(String),
  Bool(bool),
}

impl ToSql for Param {
  fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
    Ok(match self {
      Param::Null => ToSqlOutput::Owned(Value::Null),
      Param::Int(i) => ToSqlOutput::Owned(Value::Integer(*i)),
      Param::Real(f) => ToSqlOutput::Owned(Value::Real(*f)),
      Param::Text(s) => ToSqlOutput::Owned(Value::Text(s.clone())),
      // json_extract renders JSON booleans as integers
      Param::Bool(b) => ToSqlOutput::Owned(Value::Integer(i64::from(*b))),
    })
  }
}

impl From<i64> for Param {
  fn from(v: i64) -> Self {
    Param::Int(v)
  }
}

impl From<i32> for Param {
  fn from(v: i32) -> Self {
    Param::Int(v.into())
  }
}

impl From<u32> for Param {
  fn from(v: u32) -> Self {
    Param::Int(v.into())
  }
}

impl From<f64> for Param {
  fn from(v: f64) -> Self {
    Param::Real(v)
  }
}

impl From<bool> for Param {
  fn from(v: bool) -> Self {
    Param::Bool(v)
  }
}

impl From<&str> for Param {
  fn from(v: &str) -> Self {
    Param::Text(v.to_string())
  }
}

impl From<String> for Param {
  fn from(v: String) -> Self {
    Param::Text(v)
  }
}

impl From<serde_json::Value> for Param {
  fn from(v: serde_json::Value) -> Self {
    match v {
      serde_json::Value::Null => Param::Null,
      serde_json::Value::Bool(b) => Param::Bool(b),
      serde_json::Value::Number(n) => {
        if let Some(i) = n.as_i64() {
          Param::Int(i)
        } else {
          Param::Real(n.as_f64().unwrap_or(0.0))
        }
      }
      serde_json::Value::String(s) => Param::Text(s),
      // arrays/objects compare against json_extract as their JSON text
      other => Param::Text(other.to_string()),
    }
  }
}

/// Accepts a single statement only: a `;` followed by more content (outside
/// a string literal) is the script path's job.
pub(crate) fn is_single_statement(sql: &str) -> bool {
  let mut in_string = false;
  let mut chars = sql.chars().peekable();
  while let Some(c) = chars.next() {
    match c {
      '\'' => in_string = !in_string,
      ';' if !in_string => {
        let rest: String = chars.collect();
        return rest.trim().is_empty();
      }
      _ => {}
    }
  }
  true
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn single_statement_detection() {
    assert!(is_single_statement("SELECT 1"));
    assert!(is_single_statement("SELECT 1;"));
    assert!(is_single_statement("SELECT 1;  \n"));
    assert!(!is_single_statement("SELECT 1; SELECT 2"));
    assert!(is_single_statement("SELECT 'a;b'"));
    assert!(!is_single_statement("SELECT 'a;b'; DROP TABLE t"));
  }

  #[test]
  fn param_from_json() {
    assert_eq!(Param::from(serde_json::json!(3)), Param::Int(3));
    assert_eq!(Param::from(serde_json::json!(2.5)), Param::Real(2.5));
    assert_eq!(Param::from(serde_json::json!("x")), Param::Text("x".into()));
    assert_eq!(Param::from(serde_json::json!(null)), Param::Null);
    assert_eq!(Param::from(serde_json::json!(true)), Param::Bool(true));
  }
}
