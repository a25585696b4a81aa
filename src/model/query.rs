use std::marker::PhantomData;

use serde_json::Value;

use crate::adapter::{Param, SqlValue};
use crate::db::{column_i64, column_json, decode_document};
use crate::error::{DatabaseError, ModelError};
use crate::model::{hydrate, materialize, registry, Model};
use crate::query::{Expression, QueryParts};

/// A model-bound query. Immutable and chainable like the raw [`Query`];
/// terminal operations materialize rows into instances and, unless
/// `resolve(false)` was called, hydrate references one hop in a single
/// batched pass.
///
/// [`Query`]: crate::query::Query
pub struct ModelQuery<T: Model> {
  parts: QueryParts,
  resolve: bool,
  _marker: PhantomData<fn() -> T>,
}

impl<T: Model> Clone for ModelQuery<T> {
  fn clone(&self) -> Self {
    Self {
      parts: self.parts.clone(),
      resolve: self.resolve,
      _marker: PhantomData,
    }
  }
}

impl<T: Model> ModelQuery<T> {
  pub(crate) fn new() -> Self {
    Self {
      parts: QueryParts::new(T::table()),
      resolve: true,
      _marker: PhantomData,
    }
  }

  fn with_parts(&self, parts: QueryParts) -> Self {
    Self {
      parts,
      resolve: self.resolve,
      _marker: PhantomData,
    }
  }

  fn projection() -> &'static str {
    if T::SAFE {
      "_id, data, _version"
    } else {
      "_id, data"
    }
  }

  pub fn filter(&self, expr: impl Into<Expression>) -> Self {
    self.with_parts(self.parts.filter(expr.into()))
  }

  pub fn exclude(&self, expr: impl Into<Expression>) -> Self {
    self.with_parts(self.parts.exclude(expr.into()))
  }

  pub fn order_by(&self, path: &str) -> Self {
    self.with_parts(self.parts.order_by(path, false))
  }

  pub fn order_by_desc(&self, path: &str) -> Self {
    self.with_parts(self.parts.order_by(path, true))
  }

  pub fn limit(&self, n: u64) -> Self {
    self.with_parts(self.parts.limit(n))
  }

  pub fn offset(&self, n: u64) -> Self {
    self.with_parts(self.parts.offset(n))
  }

  /// Toggles reference hydration on the results (default: on). When off,
  /// reference fields stay as raw `{_table, _id}` mappings.
  pub fn resolve(&self, resolve: bool) -> Self {
    let mut next = self.clone();
    next.resolve = resolve;
    next
  }

  /// The final statement and parameters, without executing.
  pub fn debug(&self) -> Result<(String, Vec<Param>), ModelError> {
    Ok(self.parts.compile(Self::projection())?)
  }

  pub fn sql(&self) -> Result<String, ModelError> {
    Ok(self.debug()?.0)
  }

  fn materialize_rows(rows: Vec<Vec<SqlValue>>) -> Result<Vec<T>, ModelError> {
    let mut items = Vec::with_capacity(rows.len());
    for row in rows {
      if row.len() < 2 {
        return Err(
          DatabaseError::Decode(format!("expected (_id, data), got {} columns", row.len())).into(),
        );
      }
      let id = column_i64(&row[0])?;
      let payload = column_json(&row[1])?;
      let version = if T::SAFE { Some(column_i64(&row[2])?) } else { None };
      items.push(materialize::<T>(id, version, payload)?);
    }
    Ok(items)
  }

  pub fn all(&self) -> Result<Vec<T>, ModelError> {
    let binding = registry::sync_binding::<T>()?;
    let (sql, params) = self.parts.compile(Self::projection())?;
    let rows = binding.db.query_rows(&sql, &params)?;
    let mut items = Self::materialize_rows(rows)?;
    if self.resolve {
      hydrate::hydrate_batch(&binding.db, &mut items)?;
    }
    Ok(items)
  }

  pub fn first(&self) -> Result<Option<T>, ModelError> {
    let mut items = self.with_parts(self.parts.limit(1)).all()?;
    Ok(if items.is_empty() {
      None
    } else {
      Some(items.swap_remove(0))
    })
  }

  pub fn count(&self) -> Result<u64, ModelError> {
    let binding = registry::sync_binding::<T>()?;
    let (sql, params) = self.parts.compile_count()?;
    let rows = binding.db.query_rows(&sql, &params)?;
    match rows.first().and_then(|row| row.first()) {
      Some(SqlValue::Integer(n)) => Ok(*n as u64),
      other => Err(DatabaseError::Decode(format!("count(*) returned {other:?}")).into()),
    }
  }

  /// Raw payloads with `_id` injected, skipping materialization.
  pub fn all_dicts(&self) -> Result<Vec<Value>, ModelError> {
    let binding = registry::sync_binding::<T>()?;
    let (sql, params) = self.parts.compile("_id, data")?;
    let rows = binding.db.query_rows(&sql, &params)?;
    Ok(
      rows
        .iter()
        .map(|row| decode_document(row))
        .collect::<Result<Vec<_>, _>>()?,
    )
  }

  pub fn first_dict(&self) -> Result<Option<Value>, ModelError> {
    let binding = registry::sync_binding::<T>()?;
    let (sql, params) = self.parts.limit(1).compile("_id, data")?;
    let rows = binding.db.query_rows(&sql, &params)?;
    Ok(rows.first().map(|row| decode_document(row)).transpose()?)
  }

  /// Runs `EXPLAIN QUERY PLAN` over the final statement.
  pub fn explain_query_plan(&self) -> Result<Vec<Vec<SqlValue>>, ModelError> {
    let binding = registry::sync_binding::<T>()?;
    let (sql, params) = self.parts.compile(Self::projection())?;
    Ok(binding.db.query_rows(&format!("EXPLAIN QUERY PLAN {sql}"), &params)?)
  }
}
