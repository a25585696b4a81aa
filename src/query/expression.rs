use std::ops::{BitAnd, BitOr, Not};

use crate::adapter::Param;
use crate::db::placeholders;
use crate::query::field::{json_path, Field, Segment};

/// Comparison operator on an extracted JSON value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
  Eq,
  Ne,
  Gt,
  Ge,
  Lt,
  Le,
}

impl CmpOp {
  fn as_sql(self) -> &'static str {
    match self {
      CmpOp::Eq => "=",
      CmpOp::Ne => "!=",
      CmpOp::Gt => ">",
      CmpOp::Ge => ">=",
      CmpOp::Lt => "<",
      CmpOp::Le => "<=",
    }
  }
}

/// A compiled predicate: a SQL fragment plus its positional parameters.
///
/// Expressions are stored as a tree and rendered on demand so that a
/// predicate embedded in an `any()` scope can bind to the array element
/// instead of the outer document, and so that sub-query aliases stay unique
/// across the whole statement. `sql()` and `params()` walk the tree in
/// textual order.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
  kind: ExprKind,
}

#[derive(Debug, Clone, PartialEq)]
enum ExprKind {
  /// A raw fragment. Field references inside it bind to the outer document.
  Raw { sql: String, params: Vec<Param> },
  Cmp { field: Field, op: CmpOp, value: Param },
  Like { field: Field, pattern: String },
  IsNull { field: Field, negated: bool },
  Contains { field: Field, value: Param },
  IsIn { field: Field, values: Vec<Param> },
  /// A bare field chain used as a predicate; chains ending in `any()`
  /// quantify over the array, plain chains assert the value is present.
  Quantified { field: Field },
  /// Correlated EXISTS against a referenced table, joined on the reference
  /// identifier stored in the payload.
  RefCmp {
    ref_field: String,
    target_table: String,
    over_list: bool,
    path: Field,
    op: CmpOp,
    value: Param,
  },
  And(Box<Expression>, Box<Expression>),
  Or(Box<Expression>, Box<Expression>),
  Not(Box<Expression>),
  /// Tautologically false; keeps `isin([])` legal SQL.
  AlwaysFalse,
}

impl Expression {
  /// A raw SQL fragment with its parameters. No rewriting is applied, so
  /// field references inside it always address the outer `data` column.
  pub fn raw(sql: impl Into<String>, params: Vec<Param>) -> Self {
    Self {
      kind: ExprKind::Raw { sql: sql.into(), params },
    }
  }

  pub(crate) fn compare(field: Field, op: CmpOp, value: Param) -> Self {
    Self {
      kind: ExprKind::Cmp { field, op, value },
    }
  }

  pub(crate) fn like(field: Field, pattern: String) -> Self {
    Self {
      kind: ExprKind::Like { field, pattern },
    }
  }

  pub(crate) fn is_null(field: Field, negated: bool) -> Self {
    Self {
      kind: ExprKind::IsNull { field, negated },
    }
  }

  pub(crate) fn contains(field: Field, value: Param) -> Self {
    Self {
      kind: ExprKind::Contains { field, value },
    }
  }

  pub(crate) fn isin(field: Field, values: Vec<Param>) -> Self {
    if values.is_empty() {
      return Self { kind: ExprKind::AlwaysFalse };
    }
    Self {
      kind: ExprKind::IsIn { field, values },
    }
  }

  /// Building block for the relationship sugar on models; compiles to a
  /// correlated `EXISTS` joining the referenced table on the identifier
  /// encoded in the payload.
  pub fn ref_compare(
    ref_field: impl Into<String>,
    target_table: impl Into<String>,
    over_list: bool,
    path: Field,
    op: CmpOp,
    value: impl Into<Param>,
  ) -> Self {
    Self {
      kind: ExprKind::RefCmp {
        ref_field: ref_field.into(),
        target_table: target_table.into(),
        over_list,
        path,
        op,
        value: value.into(),
      },
    }
  }

  /// Renders the SQL fragment. Aliases and parameter order are stable for a
  /// given expression.
  pub fn sql(&self) -> String {
    self.compile().0
  }

  /// The positional parameters, in textual order of the fragment.
  pub fn params(&self) -> Vec<Param> {
    self.compile().1
  }

  pub fn compile(&self) -> (String, Vec<Param>) {
    let mut gen = AliasGen::default();
    let mut params = Vec::new();
    let sql = render(self, "data", &mut gen, &mut params);
    (sql, params)
  }

  pub(crate) fn render_with(
    &self,
    base: &str,
    gen: &mut AliasGen,
    params: &mut Vec<Param>,
  ) -> String {
    render(self, base, gen, params)
  }
}

impl From<Field> for Expression {
  fn from(field: Field) -> Self {
    Self {
      kind: ExprKind::Quantified { field },
    }
  }
}

impl BitAnd for Expression {
  type Output = Expression;

  fn bitand(self, rhs: Expression) -> Expression {
    Expression {
      kind: ExprKind::And(Box::new(self), Box::new(rhs)),
    }
  }
}

impl BitOr for Expression {
  type Output = Expression;

  fn bitor(self, rhs: Expression) -> Expression {
    Expression {
      kind: ExprKind::Or(Box::new(self), Box::new(rhs)),
    }
  }
}

impl Not for Expression {
  type Output = Expression;

  fn not(self) -> Expression {
    Expression {
      kind: ExprKind::Not(Box::new(self)),
    }
  }
}

/// Unique sub-query aliases per compiled statement: `e0, e1, …` for
/// `json_each` scopes, `r0, r1, …` for referenced tables.
#[derive(Debug, Default)]
pub(crate) struct AliasGen {
  each: usize,
  referenced: usize,
}

impl AliasGen {
  fn next_each(&mut self) -> String {
    let alias = format!("e{}", self.each);
    self.each += 1;
    alias
  }

  fn next_ref(&mut self) -> String {
    let alias = format!("r{}", self.referenced);
    self.referenced += 1;
    alias
  }
}

fn render(expr: &Expression, base: &str, gen: &mut AliasGen, params: &mut Vec<Param>) -> String {
  match &expr.kind {
    ExprKind::Raw { sql, params: raw } => {
      params.extend(raw.iter().cloned());
      sql.clone()
    }
    ExprKind::Cmp { field, op, value } => {
      let op = *op;
      let value = value.clone();
      render_scoped(&field.segments, base, gen, params, &mut |b, path, params| {
        params.push(value.clone());
        format!("json_extract({b}, '{path}') {} ?", op.as_sql())
      })
    }
    ExprKind::Like { field, pattern } => {
      let pattern = pattern.clone();
      render_scoped(&field.segments, base, gen, params, &mut |b, path, params| {
        params.push(Param::Text(pattern.clone()));
        format!("json_extract({b}, '{path}') LIKE ?")
      })
    }
    ExprKind::IsNull { field, negated } => {
      let negated = *negated;
      render_scoped(&field.segments, base, gen, params, &mut |b, path, _| {
        if negated {
          format!("json_extract({b}, '{path}') IS NOT NULL")
        } else {
          format!("json_extract({b}, '{path}') IS NULL")
        }
      })
    }
    ExprKind::Contains { field, value } => {
      let value = value.clone();
      render_scoped(&field.segments, base, gen, params, &mut |b, path, params| {
        params.push(value.clone());
        format!("EXISTS (SELECT 1 FROM json_each({b}, '{path}') WHERE value = ?)")
      })
    }
    ExprKind::IsIn { field, values } => {
      let values = values.clone();
      render_scoped(&field.segments, base, gen, params, &mut |b, path, params| {
        params.extend(values.iter().cloned());
        format!(
          "EXISTS (SELECT 1 FROM json_each({b}, '{path}') WHERE value IN ({}))",
          placeholders(values.len())
        )
      })
    }
    ExprKind::Quantified { field } => {
      render_scoped(&field.segments, base, gen, params, &mut |b, path, _| {
        if path == "$" {
          "1".to_string()
        } else {
          format!("json_extract({b}, '{path}') IS NOT NULL")
        }
      })
    }
    ExprKind::RefCmp {
      ref_field,
      target_table,
      over_list,
      path,
      op,
      value,
    } => {
      let sub_path = json_path(&path.segments);
      params.push(value.clone());
      if *over_list {
        let each = gen.next_each();
        let joined = gen.next_ref();
        format!(
          "EXISTS (SELECT 1 FROM json_each({base}, '$.{ref_field}') AS {each}, {target_table} AS {joined} \
           WHERE {joined}._id = json_extract({each}.value, '$._id') \
           AND json_extract({joined}.data, '{sub_path}') {} ?)",
          op.as_sql()
        )
      } else {
        let joined = gen.next_ref();
        format!(
          "EXISTS (SELECT 1 FROM {target_table} AS {joined} \
           WHERE {joined}._id = json_extract({base}, '$.{ref_field}._id') \
           AND json_extract({joined}.data, '{sub_path}') {} ?)",
          op.as_sql()
        )
      }
    }
    ExprKind::And(left, right) => {
      let left = render(left, base, gen, params);
      let right = render(right, base, gen, params);
      format!("({left}) AND ({right})")
    }
    ExprKind::Or(left, right) => {
      let left = render(left, base, gen, params);
      let right = render(right, base, gen, params);
      format!("({left}) OR ({right})")
    }
    ExprKind::Not(inner) => {
      let inner = render(inner, base, gen, params);
      format!("NOT ({inner})")
    }
    ExprKind::AlwaysFalse => "0".to_string(),
  }
}

/// Walks the segment chain, opening one correlated `json_each` scope per
/// `any()` node; `leaf` renders the terminal condition against the innermost
/// base and the remaining `Any`-free path.
fn render_scoped(
  segments: &[Segment],
  base: &str,
  gen: &mut AliasGen,
  params: &mut Vec<Param>,
  leaf: &mut dyn FnMut(&str, &str, &mut Vec<Param>) -> String,
) -> String {
  match segments.iter().position(|s| matches!(s, Segment::Any(_))) {
    None => {
      let path = json_path(segments);
      leaf(base, &path, params)
    }
    Some(idx) => {
      let array_path = json_path(&segments[..idx]);
      let filter = match &segments[idx] {
        Segment::Any(filter) => filter.as_deref(),
        _ => unreachable!(),
      };
      let alias = gen.next_each();
      let element = format!("{alias}.value");
      let filter_sql = filter.map(|f| f.render_with(&element, gen, params));
      let tail_sql = render_scoped(&segments[idx + 1..], &element, gen, params, leaf);
      let condition = match (filter_sql, tail_sql.as_str()) {
        (Some(f), "1") => f,
        (Some(f), _) => format!("({f}) AND ({tail_sql})"),
        (None, _) => tail_sql,
      };
      format!("EXISTS (SELECT 1 FROM json_each({base}, '{array_path}') AS {alias} WHERE {condition})")
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn comparison_operators() {
    let length = Field::new("length");
    let expr = length.clone().eq(18);
    assert_eq!(expr.sql(), "json_extract(data, '$.length') = ?");
    assert_eq!(expr.params(), vec![Param::Int(18)]);

    assert_eq!(length.clone().ne(10).sql(), "json_extract(data, '$.length') != ?");
    assert_eq!(length.clone().gt(5).sql(), "json_extract(data, '$.length') > ?");
    assert_eq!(length.clone().ge(2).sql(), "json_extract(data, '$.length') >= ?");
    assert_eq!(length.clone().lt(3).sql(), "json_extract(data, '$.length') < ?");
    assert_eq!(length.le(4).sql(), "json_extract(data, '$.length') <= ?");

    let seq = Field::new("sequence").eq("ACGT");
    assert_eq!(seq.sql(), "json_extract(data, '$.sequence') = ?");
    assert_eq!(seq.params(), vec![Param::Text("ACGT".into())]);
  }

  #[test]
  fn nested_paths() {
    let bases = Field::new("specs").key("bases");
    assert_eq!(bases.eq(10).sql(), "json_extract(data, '$.specs.bases') = ?");
    let tag = Field::new("specs") / "tag";
    assert_eq!(tag.eq("A").sql(), "json_extract(data, '$.specs.tag') = ?");
    let indexed = Field::new("tags").at(0);
    assert_eq!(indexed.eq("first").sql(), "json_extract(data, '$.tags[0]') = ?");
  }

  #[test]
  fn contains_and_isin() {
    let tags = Field::new("tags");

    let expr = tags.clone().contains("exon");
    assert_eq!(
      expr.sql(),
      "EXISTS (SELECT 1 FROM json_each(data, '$.tags') WHERE value = ?)"
    );
    assert_eq!(expr.params(), vec![Param::Text("exon".into())]);

    let expr = tags.clone().isin(["exon", "intron", "utr"]);
    assert_eq!(
      expr.sql(),
      "EXISTS (SELECT 1 FROM json_each(data, '$.tags') WHERE value IN (?, ?, ?))"
    );
    assert_eq!(expr.params().len(), 3);

    let expr = tags.like("exon%");
    assert_eq!(expr.sql(), "json_extract(data, '$.tags') LIKE ?");
  }

  #[test]
  fn isin_empty_is_false() {
    let expr = Field::new("type").isin(Vec::<String>::new());
    assert_eq!(expr.sql(), "0");
    assert_eq!(expr.params(), vec![]);
  }

  #[test]
  fn boolean_composition() {
    let a = Expression::raw("length < ?", vec![Param::Int(20)]);
    let b = Expression::raw("tm < ?", vec![Param::Int(50)]);
    let c = Expression::raw("sequence LIKE ?", vec![Param::Text("TTT%".into())]);
    let d = Expression::raw("modification IS NULL", vec![]);

    let and = a.clone() & b.clone();
    assert_eq!(and.sql(), "(length < ?) AND (tm < ?)");
    assert_eq!(and.params(), vec![Param::Int(20), Param::Int(50)]);

    let or = a.clone() | b.clone();
    assert_eq!(or.sql(), "(length < ?) OR (tm < ?)");

    let negated = !d.clone();
    assert_eq!(negated.sql(), "NOT (modification IS NULL)");
    assert_eq!(negated.params(), vec![]);

    let chained = ((a | b) & c) & !d;
    assert_eq!(
      chained.sql(),
      "(((length < ?) OR (tm < ?)) AND (sequence LIKE ?)) AND (NOT (modification IS NULL))"
    );
    assert_eq!(
      chained.params(),
      vec![Param::Int(20), Param::Int(50), Param::Text("TTT%".into())]
    );
  }

  #[test]
  fn any_one_level() {
    let expr = Field::new("peaks").any().key("mz").gt(900);
    assert_eq!(
      expr.sql(),
      "EXISTS (SELECT 1 FROM json_each(data, '$.peaks') AS e0 WHERE json_extract(e0.value, '$.mz') > ?)"
    );
    assert_eq!(expr.params(), vec![Param::Int(900)]);
  }

  #[test]
  fn any_two_levels() {
    let expr = Field::new("reads").any().key("masses").any().key("mz").gt(900);
    assert_eq!(
      expr.sql(),
      "EXISTS (SELECT 1 FROM json_each(data, '$.reads') AS e0 WHERE \
       EXISTS (SELECT 1 FROM json_each(e0.value, '$.masses') AS e1 WHERE \
       json_extract(e1.value, '$.mz') > ?))"
    );
  }

  #[test]
  fn any_with_scoped_filter() {
    let expr = Field::new("reads")
      .any()
      .filter(Field::new("note").eq("good"))
      .key("masses")
      .any()
      .key("val")
      .gt(10);
    assert_eq!(
      expr.sql(),
      "EXISTS (SELECT 1 FROM json_each(data, '$.reads') AS e0 WHERE \
       (json_extract(e0.value, '$.note') = ?) AND \
       (EXISTS (SELECT 1 FROM json_each(e0.value, '$.masses') AS e1 WHERE \
       json_extract(e1.value, '$.val') > ?)))"
    );
    assert_eq!(expr.params(), vec![Param::Text("good".into()), Param::Int(10)]);
  }

  #[test]
  fn quantified_chain_is_a_predicate() {
    let expr: Expression = Field::new("items")
      .any()
      .filter(Field::new("sku").eq("RamenSet") & Field::new("qty").ge(2))
      .into();
    assert_eq!(
      expr.sql(),
      "EXISTS (SELECT 1 FROM json_each(data, '$.items') AS e0 WHERE \
       (json_extract(e0.value, '$.sku') = ?) AND (json_extract(e0.value, '$.qty') >= ?))"
    );
    assert_eq!(expr.params(), vec![Param::Text("RamenSet".into()), Param::Int(2)]);
  }

  #[test]
  fn ref_compare_single_and_list() {
    let expr = Expression::ref_compare(
      "address",
      "addresses",
      false,
      Field::new("city"),
      CmpOp::Eq,
      "Kyoto",
    );
    assert_eq!(
      expr.sql(),
      "EXISTS (SELECT 1 FROM addresses AS r0 WHERE r0._id = json_extract(data, '$.address._id') \
       AND json_extract(r0.data, '$.city') = ?)"
    );

    let expr = Expression::ref_compare(
      "orders",
      "orders",
      true,
      Field::new("total"),
      CmpOp::Gt,
      100,
    );
    assert_eq!(
      expr.sql(),
      "EXISTS (SELECT 1 FROM json_each(data, '$.orders') AS e0, orders AS r0 \
       WHERE r0._id = json_extract(e0.value, '$._id') AND json_extract(r0.data, '$.total') > ?)"
    );
  }

  #[test]
  fn param_count_matches_placeholders() {
    let expr = (Field::new("a").eq(1) & Field::new("tags").isin([1, 2, 3]))
      | !Field::new("reads").any().filter(Field::new("note").eq("x")).key("v").gt(2.5);
    let (sql, params) = expr.compile();
    let holes = sql.matches('?').count();
    assert_eq!(holes, params.len());
  }
}
