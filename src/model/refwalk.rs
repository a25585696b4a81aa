//! Pure walkers over stored payloads for the delete policies: finding and
//! rewriting embedded `{_table, _id}` reference mappings.

use serde_json::Value;

/// Recognizes a reference mapping: exactly the two keys `_table` and `_id`.
pub(crate) fn as_reference(value: &Value) -> Option<(&str, i64)> {
  let map = value.as_object()?;
  if map.len() != 2 {
    return None;
  }
  let table = map.get("_table")?.as_str()?;
  let id = map.get("_id")?.as_i64()?;
  Some((table, id))
}

/// True when the payload embeds a reference to `(table, id)` anywhere.
pub(crate) fn references(payload: &Value, table: &str, id: i64) -> bool {
  if let Some((t, i)) = as_reference(payload) {
    return t == table && i == id;
  }
  match payload {
    Value::Object(map) => map.values().any(|v| references(v, table, id)),
    Value::Array(items) => items.iter().any(|v| references(v, table, id)),
    _ => false,
  }
}

/// Replaces every reference to `(table, id)` with `null`. Array arity is
/// preserved: list entries become `null` placeholders rather than being
/// removed.
pub(crate) fn strip_references(payload: &mut Value, table: &str, id: i64) {
  if let Some((t, i)) = as_reference(payload) {
    if t == table && i == id {
      *payload = Value::Null;
    }
    return;
  }
  match payload {
    Value::Object(map) => {
      for value in map.values_mut() {
        strip_references(value, table, id);
      }
    }
    Value::Array(items) => {
      for value in items.iter_mut() {
        strip_references(value, table, id);
      }
    }
    _ => {}
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn recognizes_exact_reference_shape() {
    assert_eq!(
      as_reference(&json!({"_table": "addresses", "_id": 3})),
      Some(("addresses", 3))
    );
    // extra keys mean it is ordinary data
    assert_eq!(as_reference(&json!({"_table": "a", "_id": 1, "x": 2})), None);
    assert_eq!(as_reference(&json!({"_table": "a"})), None);
    assert_eq!(as_reference(&json!([1, 2])), None);
  }

  #[test]
  fn finds_references_at_depth() {
    let payload = json!({
      "name": "Bob",
      "address": {"_table": "addresses", "_id": 1},
      "friends": [{"_table": "addresses", "_id": 2}, null],
      "nested": {"inner": [{"deep": {"_table": "addresses", "_id": 9}}]}
    });
    assert!(references(&payload, "addresses", 1));
    assert!(references(&payload, "addresses", 2));
    assert!(references(&payload, "addresses", 9));
    assert!(!references(&payload, "addresses", 7));
    assert!(!references(&payload, "users", 1));
  }

  #[test]
  fn strip_preserves_list_arity() {
    let mut payload = json!({
      "address": {"_table": "addresses", "_id": 1},
      "friends": [{"_table": "addresses", "_id": 1}, {"_table": "addresses", "_id": 2}]
    });
    strip_references(&mut payload, "addresses", 1);
    assert_eq!(payload["address"], json!(null));
    assert_eq!(payload["friends"][0], json!(null));
    assert_eq!(payload["friends"][1], json!({"_table": "addresses", "_id": 2}));
    assert_eq!(payload["friends"].as_array().unwrap().len(), 2);
  }
}
