use serde_json::Value;

use crate::db::Database;
use crate::error::ModelError;
use crate::model::delete::{apply_policy, OnDelete};
use crate::model::query::ModelQuery;
use crate::model::relation::Relation;
use crate::model::{hydrate, materialize, registry, Model};

/// Blocking model operations; blanket-implemented for every [`Model`].
pub trait ModelExt: Model {
  /// Binds this model to `db` (process-wide), ensuring its table and
  /// declared indexes. Rebinding is allowed; tests rely on it.
  fn set_db(db: &Database) -> Result<(), ModelError> {
    registry::bind_sync::<Self>(db)
  }

  /// Clears the binding; subsequent operations fail with `NotBound`.
  fn clear_db() {
    registry::unbind_sync::<Self>();
  }

  fn query() -> ModelQuery<Self> {
    ModelQuery::new()
  }

  /// Entry point for relationship predicates:
  /// `User::relation::<Address>("address").field("city").eq("Kyoto")`.
  fn relation<R: Model>(field: &str) -> Relation<R> {
    Relation::new(field)
  }

  fn ensure_index(path: &str) -> Result<(), ModelError> {
    let binding = registry::sync_binding::<Self>()?;
    binding.db.create_index(&binding.table, path, false, None)?;
    Ok(())
  }

  /// Loads one instance by identifier, hydrated one hop.
  fn from_id(id: i64) -> Result<Option<Self>, ModelError> {
    let binding = registry::sync_binding::<Self>()?;
    let found = if Self::SAFE {
      binding
        .db
        .find_document_versioned(&binding.table, id)?
        .map(|(payload, version)| (payload, Some(version)))
    } else {
      binding
        .db
        .find_document(&binding.table, id)?
        .map(|payload| (payload, None))
    };
    match found {
      None => Ok(None),
      Some((payload, version)) => {
        let mut instance = materialize::<Self>(id, version, payload)?;
        hydrate::hydrate_batch(&binding.db, std::slice::from_mut(&mut instance))?;
        Ok(Some(instance))
      }
    }
  }

  /// The payload this instance would store: declared fields only, nested
  /// models as reference mappings.
  fn to_document(&self) -> Result<Value, ModelError> {
    serde_json::to_value(self).map_err(ModelError::Validation)
  }

  /// Persists the instance. Unsaved referenced children are saved first
  /// (depth-first, through their own bindings). New instances insert and
  /// capture an identifier; existing safe instances update conditionally on
  /// `(_id, _version)` and raise `StaleVersion` on a miss.
  fn save(&mut self) -> Result<i64, ModelError> {
    let binding = registry::sync_binding::<Self>()?;
    {
      let mut slots = Vec::new();
      self.collect_refs(&mut slots);
      for slot in slots {
        if slot.needs_save() {
          slot.save_hydrated()?;
        }
      }
    }
    let payload = serde_json::to_value(&*self).map_err(ModelError::Validation)?;

    match self.meta().id {
      None => {
        let id = if Self::SAFE {
          binding.db.insert_document_versioned(&binding.table, &payload, 0)?
        } else {
          binding.db.insert_document(&binding.table, &payload)?
        };
        self.meta_mut().id = Some(id);
        if Self::SAFE {
          self.meta_mut().version = Some(0);
        }
        tracing::debug!(table = %binding.table, id, "inserted document");
        Ok(id)
      }
      Some(id) => {
        if Self::SAFE {
          let version = self.meta().version.unwrap_or(0);
          let changed = binding
            .db
            .update_document_versioned(&binding.table, id, version, &payload)?;
          if changed == 0 {
            return Err(ModelError::StaleVersion {
              table: binding.table,
              id,
            });
          }
          self.meta_mut().version = Some(version + 1);
        } else {
          binding.db.upsert_document(&binding.table, Some(id), &payload)?;
        }
        tracing::debug!(table = %binding.table, id, "updated document");
        Ok(id)
      }
    }
  }

  /// Re-reads the stored row and overwrites every declared field (and the
  /// version, for safe models), then re-hydrates one hop.
  fn refresh(&mut self) -> Result<(), ModelError> {
    let binding = registry::sync_binding::<Self>()?;
    let id = self.meta().id.ok_or(ModelError::Unsaved {
      table: binding.table.clone(),
    })?;
    let found = if Self::SAFE {
      binding
        .db
        .find_document_versioned(&binding.table, id)?
        .map(|(payload, version)| (payload, Some(version)))
    } else {
      binding
        .db
        .find_document(&binding.table, id)?
        .map(|payload| (payload, None))
    };
    let (payload, version) = found.ok_or(ModelError::NotFound {
      table: binding.table.clone(),
      id,
    })?;
    let mut fresh = materialize::<Self>(id, version, payload)?;
    hydrate::hydrate_batch(&binding.db, std::slice::from_mut(&mut fresh))?;
    *self = fresh;
    Ok(())
  }

  /// Removes the row without referential checks and clears the identifier.
  fn delete(&mut self) -> Result<(), ModelError> {
    let binding = registry::sync_binding::<Self>()?;
    let id = self.meta().id.ok_or(ModelError::Unsaved {
      table: binding.table.clone(),
    })?;
    binding.db.delete_document(&binding.table, id)?;
    self.meta_mut().id = None;
    self.meta_mut().version = None;
    Ok(())
  }

  /// Removes the row under a referential-integrity policy; see [`OnDelete`].
  fn delete_with_policy(&mut self, policy: OnDelete) -> Result<(), ModelError> {
    let binding = registry::sync_binding::<Self>()?;
    let id = self.meta().id.ok_or(ModelError::Unsaved {
      table: binding.table.clone(),
    })?;
    apply_policy(&binding.db, &binding.table, id, policy)?;
    self.meta_mut().id = None;
    self.meta_mut().version = None;
    Ok(())
  }
}

impl<T: Model> ModelExt for T {}
