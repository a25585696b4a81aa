//! Identifier hygiene for SQL assembly.
//!
//! Table names, JSON field paths, and index names are the only strings that
//! are ever interpolated into SQL text; everything else binds positionally.
//! These checks restrict them to an alphanumeric-plus-underscore class so the
//! interpolation cannot be abused.

use thiserror::Error;

/// Maximum length for identifiers (table names, field path segments).
pub const MAX_IDENTIFIER_LENGTH: usize = 255;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
  #[error("identifier cannot be empty")]
  Empty,

  #[error("identifier too long: {0} > {MAX_IDENTIFIER_LENGTH}")]
  TooLong(usize),

  #[error("identifier must start with a letter or underscore, got {0:?}")]
  InvalidStart(char),

  #[error("invalid character in identifier: {0:?}")]
  InvalidChar(char),

  #[error("table names must be lowercase alphanumeric, got {0:?}")]
  InvalidTableChar(char),

  #[error("invalid field path: {0:?}")]
  InvalidPath(String),

  #[error("{0:?} is a reserved SQL keyword")]
  ReservedKeyword(String),
}

/// Validates a single path segment or column-ish identifier:
/// `[A-Za-z_][A-Za-z0-9_]*`, no SQL keywords.
pub fn validate_identifier(s: &str) -> Result<(), IdentifierError> {
  if s.is_empty() {
    return Err(IdentifierError::Empty);
  }
  if s.len() > MAX_IDENTIFIER_LENGTH {
    return Err(IdentifierError::TooLong(s.len()));
  }

  let first = s.chars().next().unwrap();
  if !first.is_ascii_alphabetic() && first != '_' {
    return Err(IdentifierError::InvalidStart(first));
  }
  for c in s.chars() {
    if !c.is_ascii_alphanumeric() && c != '_' {
      return Err(IdentifierError::InvalidChar(c));
    }
  }

  let upper = s.to_uppercase();
  if SQL_KEYWORDS.contains(&upper.as_str()) {
    return Err(IdentifierError::ReservedKeyword(s.to_string()));
  }

  Ok(())
}

/// Validates a dotted JSON field path like `address.city`.
pub fn validate_field_path(s: &str) -> Result<(), IdentifierError> {
  if s.is_empty() || s.starts_with('.') || s.ends_with('.') || s.contains("..") {
    return Err(IdentifierError::InvalidPath(s.to_string()));
  }
  for segment in s.split('.') {
    validate_identifier(segment)?;
  }
  Ok(())
}

/// Validates a table name. More restrictive than general identifiers:
/// lowercase alphanumeric plus underscore, no dots.
pub fn validate_table_name(s: &str) -> Result<(), IdentifierError> {
  if s.is_empty() {
    return Err(IdentifierError::Empty);
  }
  if s.len() > MAX_IDENTIFIER_LENGTH {
    return Err(IdentifierError::TooLong(s.len()));
  }

  let first = s.chars().next().unwrap();
  if !first.is_ascii_alphabetic() && first != '_' {
    return Err(IdentifierError::InvalidStart(first));
  }
  for c in s.chars() {
    if !c.is_ascii_lowercase() && !c.is_ascii_digit() && c != '_' {
      return Err(IdentifierError::InvalidTableChar(c));
    }
  }

  let upper = s.to_uppercase();
  if SQL_KEYWORDS.contains(&upper.as_str()) {
    return Err(IdentifierError::ReservedKeyword(s.to_string()));
  }

  Ok(())
}

/// Index name for a table + field path: `idx_<table>_<path_with_underscores>`.
pub fn index_name(table: &str, path: &str) -> String {
  format!("idx_{}_{}", table, path.replace('.', "_"))
}

/// SQL keywords that cannot be used as identifiers.
const SQL_KEYWORDS: &[&str] = &[
  "SELECT", "INSERT", "UPDATE", "DELETE", "DROP", "CREATE", "ALTER", "TABLE", "INDEX", "FROM",
  "WHERE", "AND", "OR", "NOT", "NULL", "TRUE", "FALSE", "ORDER", "BY", "ASC", "DESC", "LIMIT",
  "OFFSET", "JOIN", "LEFT", "RIGHT", "INNER", "OUTER", "ON", "AS", "IN", "BETWEEN", "LIKE", "IS",
  "UNION", "ALL", "DISTINCT", "GROUP", "HAVING", "INTO", "VALUES", "SET", "CASCADE", "RESTRICT",
  "REFERENCES", "FOREIGN", "PRIMARY", "KEY", "UNIQUE", "CHECK", "DEFAULT", "CONSTRAINT",
  "TRIGGER", "VIEW", "COMMIT", "ROLLBACK", "BEGIN", "END", "TRANSACTION", "EXISTS",
];
