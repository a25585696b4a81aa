use std::ops::Div;

use crate::adapter::Param;
use crate::db::sanitize;
use crate::query::expression::{CmpOp, Expression};

/// One step of a field path.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
  /// Object key (`$.key`).
  Key(String),
  /// Array index (`$[3]`).
  Index(i64),
  /// Quantified existence over the array at this location, optionally
  /// scoped by a per-element predicate.
  Any(Option<Box<Expression>>),
}

/// A typed path into the JSON payload: keys, numeric indices, and `any()`
/// nodes. Comparisons on a field produce [`Expression`]s.
///
/// Keys are restricted to `[A-Za-z_][A-Za-z0-9_]*`; constructors panic on
/// anything else (use [`Field::parse`] for untrusted input). Dotted strings
/// split into one key per segment, so `Field::new("address.city")` equals
/// `Field::new(["address", "city"])`.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
  pub(crate) segments: Vec<Segment>,
}

impl Field {
  pub fn new(path: impl Into<Field>) -> Self {
    path.into()
  }

  /// Fallible constructor for externally supplied paths.
  pub fn parse(path: &str) -> Result<Self, sanitize::IdentifierError> {
    sanitize::validate_field_path(path)?;
    Ok(Self {
      segments: path.split('.').map(|k| Segment::Key(k.to_string())).collect(),
    })
  }

  fn push_key(mut self, key: &str) -> Self {
    sanitize::validate_identifier(key)
      .unwrap_or_else(|err| panic!("invalid field key {key:?}: {err}"));
    self.segments.push(Segment::Key(key.to_string()));
    self
  }

  /// Appends an object key.
  pub fn key(self, key: &str) -> Self {
    self.push_key(key)
  }

  /// Appends a numeric array index.
  pub fn at(mut self, index: i64) -> Self {
    self.segments.push(Segment::Index(index));
    self
  }

  /// Quantifies over the array at the current location: the resulting
  /// predicate holds when at least one element satisfies the rest of the
  /// chain.
  pub fn any(mut self) -> Self {
    self.segments.push(Segment::Any(None));
    self
  }

  /// Scopes a per-element predicate onto the `any()` node just created.
  /// Field references inside the predicate resolve against the array
  /// element, not the outer document.
  pub fn filter(mut self, predicate: impl Into<Expression>) -> Self {
    match self.segments.last_mut() {
      Some(Segment::Any(slot)) if slot.is_none() => {
        *slot = Some(Box::new(predicate.into()));
        self
      }
      _ => panic!("filter() must directly follow any()"),
    }
  }

  pub fn eq(self, value: impl Into<Param>) -> Expression {
    Expression::compare(self, CmpOp::Eq, value.into())
  }

  pub fn ne(self, value: impl Into<Param>) -> Expression {
    Expression::compare(self, CmpOp::Ne, value.into())
  }

  pub fn gt(self, value: impl Into<Param>) -> Expression {
    Expression::compare(self, CmpOp::Gt, value.into())
  }

  pub fn ge(self, value: impl Into<Param>) -> Expression {
    Expression::compare(self, CmpOp::Ge, value.into())
  }

  pub fn lt(self, value: impl Into<Param>) -> Expression {
    Expression::compare(self, CmpOp::Lt, value.into())
  }

  pub fn le(self, value: impl Into<Param>) -> Expression {
    Expression::compare(self, CmpOp::Le, value.into())
  }

  /// `LIKE` on the extracted value.
  pub fn like(self, pattern: impl Into<String>) -> Expression {
    Expression::like(self, pattern.into())
  }

  pub fn is_null(self) -> Expression {
    Expression::is_null(self, false)
  }

  pub fn not_null(self) -> Expression {
    Expression::is_null(self, true)
  }

  /// Array membership by equality: holds when the array at this path
  /// contains `value`. Scalars behave as one-element arrays under
  /// `json_each`, so this also matches a scalar equal to `value`.
  pub fn contains(self, value: impl Into<Param>) -> Expression {
    Expression::contains(self, value.into())
  }

  /// Holds when the array at this path shares at least one element with
  /// `values`. An empty list compiles to the always-false `0`.
  pub fn isin<P: Into<Param>>(self, values: impl IntoIterator<Item = P>) -> Expression {
    Expression::isin(self, values.into_iter().map(Into::into).collect())
  }
}

impl From<&str> for Field {
  fn from(path: &str) -> Self {
    let mut field = Field { segments: Vec::new() };
    for key in path.split('.') {
      field = field.push_key(key);
    }
    field
  }
}

impl From<String> for Field {
  fn from(path: String) -> Self {
    Field::from(path.as_str())
  }
}

impl<const N: usize> From<[&str; N]> for Field {
  fn from(keys: [&str; N]) -> Self {
    let mut field = Field { segments: Vec::new() };
    for key in keys {
      field = field.push_key(key);
    }
    field
  }
}

impl From<Vec<&str>> for Field {
  fn from(keys: Vec<&str>) -> Self {
    let mut field = Field { segments: Vec::new() };
    for key in keys {
      field = field.push_key(key);
    }
    field
  }
}

impl From<Vec<String>> for Field {
  fn from(keys: Vec<String>) -> Self {
    let mut field = Field { segments: Vec::new() };
    for key in &keys {
      field = field.push_key(key);
    }
    field
  }
}

/// `field / "key"` is sugar for [`Field::key`].
impl Div<&str> for Field {
  type Output = Field;

  fn div(self, key: &str) -> Field {
    self.key(key)
  }
}

/// Renders the JSON path for a run of `Any`-free segments: `$.a.b[0].c`.
pub(crate) fn json_path(segments: &[Segment]) -> String {
  let mut path = String::from("$");
  for segment in segments {
    match segment {
      Segment::Key(key) => {
        path.push('.');
        path.push_str(key);
      }
      Segment::Index(i) => {
        path.push('[');
        path.push_str(&i.to_string());
        path.push(']');
      }
      Segment::Any(_) => unreachable!("any() nodes are handled by scope rendering"),
    }
  }
  path
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn paths_build_the_same_way() {
    assert_eq!(Field::new("sequence"), Field::new(["sequence"]));
    assert_eq!(Field::new("address.city"), Field::new(["address", "city"]));
    assert_ne!(Field::new("sequence"), Field::new(["sequence", "region"]));
  }

  #[test]
  fn key_index_and_div_sugar() {
    let specs = Field::new("specs");
    assert_eq!(specs.clone().key("bases"), Field::new(["specs", "bases"]));
    assert_eq!(specs.clone() / "tag", Field::new(["specs", "tag"]));
    let indexed = specs.at(0);
    assert_eq!(json_path(&indexed.segments), "$.specs[0]");
  }

  #[test]
  fn parse_rejects_bad_paths() {
    assert!(Field::parse("address.city").is_ok());
    assert!(Field::parse("a..b").is_err());
    assert!(Field::parse("drop table").is_err());
  }

  #[test]
  #[should_panic(expected = "invalid field key")]
  fn constructor_panics_on_injection() {
    let _ = Field::new("x'; DROP TABLE users; --");
  }

  #[test]
  #[should_panic(expected = "filter() must directly follow any()")]
  fn filter_requires_any() {
    let _ = Field::new("reads").filter(Field::new("note").eq("good"));
  }
}
