use serde_json::Value;

use crate::adapter::{Param, SqlValue};
use crate::db::{decode_document, AsyncDatabase};
use crate::error::DatabaseError;
use crate::query::{Expression, QueryParts};

/// Suspending mirror of [`Query`]: identical builder surface, terminal
/// operations await the adapter.
///
/// [`Query`]: super::Query
#[derive(Clone)]
pub struct AsyncQuery {
  db: AsyncDatabase,
  parts: QueryParts,
}

impl AsyncQuery {
  pub fn new(db: &AsyncDatabase, table: impl Into<String>) -> Self {
    Self {
      db: db.clone(),
      parts: QueryParts::new(table),
    }
  }

  pub(crate) fn from_parts(db: &AsyncDatabase, parts: QueryParts) -> Self {
    Self {
      db: db.clone(),
      parts,
    }
  }

  pub fn filter(&self, expr: impl Into<Expression>) -> Self {
    Self::from_parts(&self.db, self.parts.filter(expr.into()))
  }

  pub fn exclude(&self, expr: impl Into<Expression>) -> Self {
    Self::from_parts(&self.db, self.parts.exclude(expr.into()))
  }

  pub fn order_by(&self, path: &str) -> Self {
    Self::from_parts(&self.db, self.parts.order_by(path, false))
  }

  pub fn order_by_desc(&self, path: &str) -> Self {
    Self::from_parts(&self.db, self.parts.order_by(path, true))
  }

  pub fn limit(&self, n: u64) -> Self {
    Self::from_parts(&self.db, self.parts.limit(n))
  }

  pub fn offset(&self, n: u64) -> Self {
    Self::from_parts(&self.db, self.parts.offset(n))
  }

  pub fn debug(&self) -> Result<(String, Vec<Param>), DatabaseError> {
    self.parts.compile("_id, data")
  }

  pub fn sql(&self) -> Result<String, DatabaseError> {
    Ok(self.debug()?.0)
  }

  pub async fn all_dicts(&self) -> Result<Vec<Value>, DatabaseError> {
    let (sql, params) = self.parts.compile("_id, data")?;
    let rows = self.db.query_rows(&sql, params).await?;
    rows.iter().map(|row| decode_document(row)).collect()
  }

  pub async fn first_dict(&self) -> Result<Option<Value>, DatabaseError> {
    let (sql, params) = self.parts.limit(1).compile("_id, data")?;
    let rows = self.db.query_rows(&sql, params).await?;
    rows.first().map(|row| decode_document(row)).transpose()
  }

  pub async fn count(&self) -> Result<u64, DatabaseError> {
    let (sql, params) = self.parts.compile_count()?;
    let rows = self.db.query_rows(&sql, params).await?;
    match rows.first().and_then(|row| row.first()) {
      Some(SqlValue::Integer(n)) => Ok(*n as u64),
      other => Err(DatabaseError::Decode(format!("count(*) returned {other:?}"))),
    }
  }

  pub async fn explain_query_plan(&self) -> Result<Vec<Vec<SqlValue>>, DatabaseError> {
    let (sql, params) = self.parts.compile("_id, data")?;
    self
      .db
      .query_rows(&format!("EXPLAIN QUERY PLAN {sql}"), params)
      .await
  }
}
