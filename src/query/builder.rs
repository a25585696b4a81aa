use serde_json::Value;

use crate::adapter::{Param, SqlValue};
use crate::db::{decode_document, sanitize, Database};
use crate::error::DatabaseError;
use crate::query::Expression;

/// The builder state shared by raw and model-bound queries, sync and async:
/// predicates, ordering, limit, offset, and the SQL assembly over them.
#[derive(Debug, Clone, Default)]
pub(crate) struct QueryParts {
  pub table: String,
  pub filters: Vec<Expression>,
  pub order: Vec<(String, bool)>,
  pub limit: Option<u64>,
  pub offset: Option<u64>,
}

impl QueryParts {
  pub fn new(table: impl Into<String>) -> Self {
    Self {
      table: table.into(),
      ..Default::default()
    }
  }

  pub fn filter(&self, expr: Expression) -> Self {
    let mut next = self.clone();
    next.filters.push(expr);
    next
  }

  pub fn exclude(&self, expr: Expression) -> Self {
    self.filter(!expr)
  }

  pub fn order_by(&self, path: &str, desc: bool) -> Self {
    let mut next = self.clone();
    next.order.push((path.to_string(), desc));
    next
  }

  pub fn limit(&self, n: u64) -> Self {
    let mut next = self.clone();
    next.limit = Some(n);
    next
  }

  pub fn offset(&self, n: u64) -> Self {
    let mut next = self.clone();
    next.offset = Some(n);
    next
  }

  /// Assembles `SELECT <projection> FROM <table> [WHERE …] [ORDER BY …]
  /// [LIMIT …] [OFFSET …]` with positional parameters.
  pub fn compile(&self, projection: &str) -> Result<(String, Vec<Param>), DatabaseError> {
    sanitize::validate_table_name(&self.table)?;
    let mut sql = format!("SELECT {projection} FROM {}", self.table);
    let mut params = Vec::new();

    if !self.filters.is_empty() {
      sql.push_str(" WHERE ");
      if self.filters.len() == 1 {
        let (fragment, mut p) = self.filters[0].compile();
        sql.push_str(&fragment);
        params.append(&mut p);
      } else {
        for (i, filter) in self.filters.iter().enumerate() {
          if i > 0 {
            sql.push_str(" AND ");
          }
          let (fragment, mut p) = filter.compile();
          sql.push('(');
          sql.push_str(&fragment);
          sql.push(')');
          params.append(&mut p);
        }
      }
    }

    if !self.order.is_empty() {
      sql.push_str(" ORDER BY ");
      for (i, (path, desc)) in self.order.iter().enumerate() {
        sanitize::validate_field_path(path)?;
        if i > 0 {
          sql.push_str(", ");
        }
        sql.push_str(&format!("json_extract(data, '$.{path}')"));
        if *desc {
          sql.push_str(" DESC");
        }
      }
    }

    if let Some(limit) = self.limit {
      sql.push_str(&format!(" LIMIT {limit}"));
    }
    if let Some(offset) = self.offset {
      sql.push_str(&format!(" OFFSET {offset}"));
    }

    Ok((sql, params))
  }

  pub fn compile_count(&self) -> Result<(String, Vec<Param>), DatabaseError> {
    let trimmed = Self {
      table: self.table.clone(),
      filters: self.filters.clone(),
      order: Vec::new(),
      limit: None,
      offset: None,
    };
    trimmed.compile("count(*)")
  }
}

/// A raw (model-free) query over one table. Immutable: every builder call
/// returns a new value, so prefixes can be reused and extended freely.
#[derive(Clone)]
pub struct Query {
  db: Database,
  parts: QueryParts,
}

impl Query {
  pub fn new(db: &Database, table: impl Into<String>) -> Self {
    Self {
      db: db.clone(),
      parts: QueryParts::new(table),
    }
  }

  pub(crate) fn from_parts(db: &Database, parts: QueryParts) -> Self {
    Self {
      db: db.clone(),
      parts,
    }
  }

  pub fn filter(&self, expr: impl Into<Expression>) -> Self {
    Self::from_parts(&self.db, self.parts.filter(expr.into()))
  }

  /// Equivalent to `filter(!expr)`.
  pub fn exclude(&self, expr: impl Into<Expression>) -> Self {
    Self::from_parts(&self.db, self.parts.exclude(expr.into()))
  }

  pub fn order_by(&self, path: &str) -> Self {
    Self::from_parts(&self.db, self.parts.order_by(path, false))
  }

  pub fn order_by_desc(&self, path: &str) -> Self {
    Self::from_parts(&self.db, self.parts.order_by(path, true))
  }

  /// Last call wins.
  pub fn limit(&self, n: u64) -> Self {
    Self::from_parts(&self.db, self.parts.limit(n))
  }

  pub fn offset(&self, n: u64) -> Self {
    Self::from_parts(&self.db, self.parts.offset(n))
  }

  /// The final statement and parameters, without executing.
  pub fn debug(&self) -> Result<(String, Vec<Param>), DatabaseError> {
    self.parts.compile("_id, data")
  }

  pub fn sql(&self) -> Result<String, DatabaseError> {
    Ok(self.debug()?.0)
  }

  /// All matching payloads, with `_id` injected.
  pub fn all_dicts(&self) -> Result<Vec<Value>, DatabaseError> {
    let (sql, params) = self.parts.compile("_id, data")?;
    let rows = self.db.query_rows(&sql, &params)?;
    rows.iter().map(|row| decode_document(row)).collect()
  }

  /// First matching payload; compiles with `LIMIT 1`.
  pub fn first_dict(&self) -> Result<Option<Value>, DatabaseError> {
    let (sql, params) = self.parts.limit(1).compile("_id, data")?;
    let rows = self.db.query_rows(&sql, &params)?;
    rows.first().map(|row| decode_document(row)).transpose()
  }

  pub fn count(&self) -> Result<u64, DatabaseError> {
    let (sql, params) = self.parts.compile_count()?;
    let rows = self.db.query_rows(&sql, &params)?;
    match rows.first().and_then(|row| row.first()) {
      Some(SqlValue::Integer(n)) => Ok(*n as u64),
      other => Err(DatabaseError::Decode(format!("count(*) returned {other:?}"))),
    }
  }

  /// Runs `EXPLAIN QUERY PLAN` over the final statement and returns the
  /// engine's rows as-is.
  pub fn explain_query_plan(&self) -> Result<Vec<Vec<SqlValue>>, DatabaseError> {
    let (sql, params) = self.parts.compile("_id, data")?;
    self.db.query_rows(&format!("EXPLAIN QUERY PLAN {sql}"), &params)
  }
}
