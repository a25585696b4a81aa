//! Referential-integrity delete policies. Referrer discovery narrows
//! candidate rows with a `data LIKE ?` pre-filter on the serialized table
//! name, then verifies by walking the payload for exact reference mappings.
//! The scan covers the tables of every model bound to the same database.

use std::collections::HashSet;

use serde_json::Value;

use crate::adapter::Param;
use crate::db::{column_i64, column_json, Database};
use crate::error::ModelError;
use crate::model::{refwalk, registry};

#[cfg(feature = "async")]
use crate::db::AsyncDatabase;

/// What happens to referrers when a referenced document is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnDelete {
  /// Refuse the delete while any referrer exists.
  Restrict,
  /// Null out single references and replace list entries with `null`
  /// placeholders (list arity is preserved), then delete.
  SetNull,
  /// Delete the transitive referrer closure, cycles bounded by a visited
  /// set, then delete the target.
  Cascade,
}

/// One row that embeds a reference to the target.
struct Referrer {
  table: String,
  id: i64,
  payload: Value,
  safe: bool,
}

fn find_referrers(
  db: &Database,
  target_table: &str,
  target_id: i64,
) -> Result<Vec<Referrer>, ModelError> {
  let mut out = Vec::new();
  let pattern = format!("%\"_table\":\"{target_table}\"%");
  for (table, safe) in registry::sync_tables_on(db) {
    let sql = format!("SELECT _id, data FROM {table} WHERE data LIKE ?");
    for row in db.query_rows(&sql, &[Param::Text(pattern.clone())])? {
      let id = column_i64(&row[0])?;
      if table == target_table && id == target_id {
        continue; // a row does not block its own delete
      }
      let payload = column_json(&row[1])?;
      if refwalk::references(&payload, target_table, target_id) {
        out.push(Referrer {
          table: table.clone(),
          id,
          payload,
          safe,
        });
      }
    }
  }
  Ok(out)
}

fn write_back(db: &Database, referrer: &Referrer) -> Result<(), ModelError> {
  if referrer.safe {
    // a policy rewrite is a write like any other; holders of the old
    // version will see it as stale
    let sql = format!(
      "UPDATE {} SET data = json(?), _version = _version + 1 WHERE _id = ?",
      referrer.table
    );
    let text = serde_json::to_string(&referrer.payload)
      .map_err(|e| ModelError::Database(e.into()))?;
    db.execute(&sql, &[Param::Text(text), Param::Int(referrer.id)])?;
  } else {
    db.upsert_document(&referrer.table, Some(referrer.id), &referrer.payload)?;
  }
  Ok(())
}

pub(crate) fn apply_policy(
  db: &Database,
  table: &str,
  id: i64,
  policy: OnDelete,
) -> Result<(), ModelError> {
  match policy {
    OnDelete::Restrict => {
      if !find_referrers(db, table, id)?.is_empty() {
        return Err(ModelError::ReferentialIntegrity {
          table: table.to_string(),
          id,
        });
      }
      db.delete_document(table, id)?;
    }
    OnDelete::SetNull => {
      for mut referrer in find_referrers(db, table, id)? {
        refwalk::strip_references(&mut referrer.payload, table, id);
        write_back(db, &referrer)?;
      }
      db.delete_document(table, id)?;
    }
    OnDelete::Cascade => {
      // DFS over referrers; discovery order reversed deletes the outermost
      // referrers first and the target last
      let mut visited: HashSet<(String, i64)> = HashSet::new();
      visited.insert((table.to_string(), id));
      let mut order = vec![(table.to_string(), id)];
      let mut queue = vec![(table.to_string(), id)];
      while let Some((current_table, current_id)) = queue.pop() {
        for referrer in find_referrers(db, &current_table, current_id)? {
          let key = (referrer.table.clone(), referrer.id);
          if visited.insert(key.clone()) {
            order.push(key.clone());
            queue.push(key);
          }
        }
      }
      for (t, i) in order.iter().rev() {
        db.delete_document(t, *i)?;
      }
      tracing::debug!(%table, id, closure = order.len(), "cascade delete");
    }
  }
  Ok(())
}

#[cfg(feature = "async")]
async fn find_referrers_async(
  db: &AsyncDatabase,
  target_table: &str,
  target_id: i64,
) -> Result<Vec<Referrer>, ModelError> {
  let mut out = Vec::new();
  let pattern = format!("%\"_table\":\"{target_table}\"%");
  for (table, safe) in registry::async_tables_on(db) {
    let sql = format!("SELECT _id, data FROM {table} WHERE data LIKE ?");
    let rows = db.query_rows(&sql, vec![Param::Text(pattern.clone())]).await?;
    for row in rows {
      let id = column_i64(&row[0])?;
      if table == target_table && id == target_id {
        continue;
      }
      let payload = column_json(&row[1])?;
      if refwalk::references(&payload, target_table, target_id) {
        out.push(Referrer {
          table: table.clone(),
          id,
          payload,
          safe,
        });
      }
    }
  }
  Ok(out)
}

#[cfg(feature = "async")]
async fn write_back_async(db: &AsyncDatabase, referrer: &Referrer) -> Result<(), ModelError> {
  if referrer.safe {
    let sql = format!(
      "UPDATE {} SET data = json(?), _version = _version + 1 WHERE _id = ?",
      referrer.table
    );
    let text = serde_json::to_string(&referrer.payload)
      .map_err(|e| ModelError::Database(e.into()))?;
    db.execute(&sql, vec![Param::Text(text), Param::Int(referrer.id)])
      .await?;
  } else {
    db.upsert_document(&referrer.table, Some(referrer.id), &referrer.payload)
      .await?;
  }
  Ok(())
}

#[cfg(feature = "async")]
pub(crate) async fn apply_policy_async(
  db: &AsyncDatabase,
  table: &str,
  id: i64,
  policy: OnDelete,
) -> Result<(), ModelError> {
  match policy {
    OnDelete::Restrict => {
      if !find_referrers_async(db, table, id).await?.is_empty() {
        return Err(ModelError::ReferentialIntegrity {
          table: table.to_string(),
          id,
        });
      }
      db.delete_document(table, id).await?;
    }
    OnDelete::SetNull => {
      for mut referrer in find_referrers_async(db, table, id).await? {
        refwalk::strip_references(&mut referrer.payload, table, id);
        write_back_async(db, &referrer).await?;
      }
      db.delete_document(table, id).await?;
    }
    OnDelete::Cascade => {
      // DFS over referrers; discovery order reversed deletes the outermost
      // referrers first and the target last
      let mut visited: HashSet<(String, i64)> = HashSet::new();
      visited.insert((table.to_string(), id));
      let mut order = vec![(table.to_string(), id)];
      let mut queue = vec![(table.to_string(), id)];
      while let Some((current_table, current_id)) = queue.pop() {
        for referrer in find_referrers_async(db, &current_table, current_id).await? {
          let key = (referrer.table.clone(), referrer.id);
          if visited.insert(key.clone()) {
            order.push(key.clone());
            queue.push(key);
          }
        }
      }
      for (t, i) in order.iter().rev() {
        db.delete_document(t, *i).await?;
      }
      tracing::debug!(%table, id, closure = order.len(), "cascade delete");
    }
  }
  Ok(())
}
