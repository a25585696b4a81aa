//! Batched single-hop hydration: after materializing a result set, replace
//! raw reference mappings with child instances using one `IN` lookup per
//! referenced table. Children keep their own references raw, so reference
//! cycles terminate structurally.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde_json::Value;

use crate::db::Database;
use crate::error::ModelError;
use crate::model::Model;

#[cfg(feature = "async")]
use crate::db::AsyncDatabase;

type Wanted = BTreeMap<String, (bool, BTreeSet<i64>)>;
type Fetched = HashMap<(String, i64), (Option<i64>, Value)>;

fn gather<T: Model>(items: &mut [T]) -> Wanted {
  let mut wanted: Wanted = BTreeMap::new();
  for item in items.iter_mut() {
    let mut slots = Vec::new();
    item.collect_refs(&mut slots);
    for slot in slots {
      if let Some(id) = slot.pending_id() {
        let entry = wanted
          .entry(slot.target_table())
          .or_insert_with(|| (slot.target_safe(), BTreeSet::new()));
        entry.1.insert(id);
      }
    }
  }
  wanted
}

fn assign<T: Model>(items: &mut [T], fetched: &Fetched) -> Result<(), ModelError> {
  for item in items.iter_mut() {
    let mut slots = Vec::new();
    item.collect_refs(&mut slots);
    for slot in slots {
      if let Some(id) = slot.pending_id() {
        // dangling references stay raw
        if let Some((version, payload)) = fetched.get(&(slot.target_table(), id)) {
          slot.hydrate(id, *version, payload.clone())?;
        }
      }
    }
  }
  Ok(())
}

pub(crate) fn hydrate_batch<T: Model>(db: &Database, items: &mut [T]) -> Result<(), ModelError> {
  let wanted = gather(items);
  if wanted.is_empty() {
    return Ok(());
  }

  let mut fetched: Fetched = HashMap::new();
  for (table, (safe, ids)) in &wanted {
    let ids: Vec<i64> = ids.iter().copied().collect();
    if *safe {
      for (id, version, payload) in db.find_documents_versioned(table, &ids)? {
        fetched.insert((table.clone(), id), (Some(version), payload));
      }
    } else {
      for (id, payload) in db.find_documents(table, &ids)? {
        fetched.insert((table.clone(), id), (None, payload));
      }
    }
  }

  assign(items, &fetched)
}

#[cfg(feature = "async")]
pub(crate) async fn hydrate_batch_async<T: Model>(
  db: &AsyncDatabase,
  items: &mut [T],
) -> Result<(), ModelError> {
  let wanted = gather(items);
  if wanted.is_empty() {
    return Ok(());
  }

  let mut fetched: Fetched = HashMap::new();
  for (table, (safe, ids)) in &wanted {
    let ids: Vec<i64> = ids.iter().copied().collect();
    if *safe {
      for (id, version, payload) in db.find_documents_versioned(table, &ids).await? {
        fetched.insert((table.clone(), id), (Some(version), payload));
      }
    } else {
      for (id, payload) in db.find_documents(table, &ids).await? {
        fetched.insert((table.clone(), id), (None, payload));
      }
    }
  }

  assign(items, &fetched)
}
