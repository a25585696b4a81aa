use std::marker::PhantomData;

use crate::adapter::Param;
use crate::db::sanitize;
use crate::model::Model;
use crate::query::expression::CmpOp;
use crate::query::{Expression, Field};

/// Relationship query sugar: a predicate on a referenced document, compiled
/// to a correlated `EXISTS` join on the reference identifier in the payload.
/// No hydration is involved.
///
/// `User::relation::<Address>("address").field("city").eq("Kyoto")` matches
/// users whose referenced address has that city; `.any()` before `field`
/// quantifies over a list of references.
pub struct Relation<R: Model> {
  field: String,
  over_list: bool,
  _marker: PhantomData<fn() -> R>,
}

impl<R: Model> Relation<R> {
  pub fn new(field: &str) -> Self {
    sanitize::validate_identifier(field)
      .unwrap_or_else(|err| panic!("invalid reference field {field:?}: {err}"));
    Self {
      field: field.to_string(),
      over_list: false,
      _marker: PhantomData,
    }
  }

  /// Quantifies over a list of references instead of a single one.
  pub fn any(mut self) -> Self {
    self.over_list = true;
    self
  }

  /// Selects a path inside the referenced document.
  pub fn field(self, path: impl Into<Field>) -> RelationField<R> {
    RelationField {
      relation: self,
      path: path.into(),
    }
  }
}

/// A path inside a referenced document, ready for comparison.
pub struct RelationField<R: Model> {
  relation: Relation<R>,
  path: Field,
}

impl<R: Model> RelationField<R> {
  fn compare(self, op: CmpOp, value: impl Into<Param>) -> Expression {
    Expression::ref_compare(
      self.relation.field,
      R::table(),
      self.relation.over_list,
      self.path,
      op,
      value,
    )
  }

  pub fn eq(self, value: impl Into<Param>) -> Expression {
    self.compare(CmpOp::Eq, value)
  }

  pub fn ne(self, value: impl Into<Param>) -> Expression {
    self.compare(CmpOp::Ne, value)
  }

  pub fn gt(self, value: impl Into<Param>) -> Expression {
    self.compare(CmpOp::Gt, value)
  }

  pub fn ge(self, value: impl Into<Param>) -> Expression {
    self.compare(CmpOp::Ge, value)
  }

  pub fn lt(self, value: impl Into<Param>) -> Expression {
    self.compare(CmpOp::Lt, value)
  }

  pub fn le(self, value: impl Into<Param>) -> Expression {
    self.compare(CmpOp::Le, value)
  }
}
