use async_trait::async_trait;
use serde_json::Value;

use crate::db::AsyncDatabase;
use crate::error::ModelError;
use crate::model::async_query::AsyncModelQuery;
use crate::model::delete::{apply_policy_async, OnDelete};
use crate::model::relation::Relation;
use crate::model::{hydrate, materialize, registry, Model};

/// Suspending model operations; blanket-implemented for every [`Model`].
/// The contract of [`ModelExt`], with an await point at every adapter touch.
/// Import one of the two traits per scope, not both.
///
/// [`ModelExt`]: crate::model::ModelExt
#[async_trait]
pub trait AsyncModelExt: Model {
  /// Binds this model to `db` (process-wide), ensuring its table and
  /// declared indexes.
  async fn set_db(db: &AsyncDatabase) -> Result<(), ModelError> {
    registry::bind_async::<Self>(db).await
  }

  /// Clears the binding; subsequent operations fail with `NotBound`.
  fn clear_db() {
    registry::unbind_async::<Self>();
  }

  fn query() -> AsyncModelQuery<Self> {
    AsyncModelQuery::new()
  }

  /// Entry point for relationship predicates; compiles to SQL, no await.
  fn relation<R: Model>(field: &str) -> Relation<R> {
    Relation::new(field)
  }

  async fn ensure_index(path: &str) -> Result<(), ModelError> {
    let binding = registry::async_binding::<Self>()?;
    binding
      .db
      .create_index(&binding.table, path, false, None)
      .await?;
    Ok(())
  }

  async fn from_id(id: i64) -> Result<Option<Self>, ModelError> {
    let binding = registry::async_binding::<Self>()?;
    let found = if Self::SAFE {
      binding
        .db
        .find_document_versioned(&binding.table, id)
        .await?
        .map(|(payload, version)| (payload, Some(version)))
    } else {
      binding
        .db
        .find_document(&binding.table, id)
        .await?
        .map(|payload| (payload, None))
    };
    match found {
      None => Ok(None),
      Some((payload, version)) => {
        let mut instance = materialize::<Self>(id, version, payload)?;
        hydrate::hydrate_batch_async(&binding.db, std::slice::from_mut(&mut instance)).await?;
        Ok(Some(instance))
      }
    }
  }

  fn to_document(&self) -> Result<Value, ModelError> {
    serde_json::to_value(self).map_err(ModelError::Validation)
  }

  async fn save(&mut self) -> Result<i64, ModelError> {
    let binding = registry::async_binding::<Self>()?;
    {
      let mut slots = Vec::new();
      self.collect_refs(&mut slots);
      for slot in slots {
        if slot.needs_save() {
          slot.save_hydrated_async().await?;
        }
      }
    }
    let payload = serde_json::to_value(&*self).map_err(ModelError::Validation)?;

    match self.meta().id {
      None => {
        let id = if Self::SAFE {
          binding
            .db
            .insert_document_versioned(&binding.table, &payload, 0)
            .await?
        } else {
          binding.db.insert_document(&binding.table, &payload).await?
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
            .update_document_versioned(&binding.table, id, version, &payload)
            .await?;
          if changed == 0 {
            return Err(ModelError::StaleVersion {
              table: binding.table,
              id,
            });
          }
          self.meta_mut().version = Some(version + 1);
        } else {
          binding
            .db
            .upsert_document(&binding.table, Some(id), &payload)
            .await?;
        }
        tracing::debug!(table = %binding.table, id, "updated document");
        Ok(id)
      }
    }
  }

  async fn refresh(&mut self) -> Result<(), ModelError> {
    let binding = registry::async_binding::<Self>()?;
    let id = self.meta().id.ok_or(ModelError::Unsaved {
      table: binding.table.clone(),
    })?;
    let found = if Self::SAFE {
      binding
        .db
        .find_document_versioned(&binding.table, id)
        .await?
        .map(|(payload, version)| (payload, Some(version)))
    } else {
      binding
        .db
        .find_document(&binding.table, id)
        .await?
        .map(|payload| (payload, None))
    };
    let (payload, version) = found.ok_or(ModelError::NotFound {
      table: binding.table.clone(),
      id,
    })?;
    let mut fresh = materialize::<Self>(id, version, payload)?;
    hydrate::hydrate_batch_async(&binding.db, std::slice::from_mut(&mut fresh)).await?;
    *self = fresh;
    Ok(())
  }

  async fn delete(&mut self) -> Result<(), ModelError> {
    let binding = registry::async_binding::<Self>()?;
    let id = self.meta().id.ok_or(ModelError::Unsaved {
      table: binding.table.clone(),
    })?;
    binding.db.delete_document(&binding.table, id).await?;
    self.meta_mut().id = None;
    self.meta_mut().version = None;
    Ok(())
  }

  async fn delete_with_policy(&mut self, policy: OnDelete) -> Result<(), ModelError> {
    let binding = registry::async_binding::<Self>()?;
    let id = self.meta().id.ok_or(ModelError::Unsaved {
      table: binding.table.clone(),
    })?;
    apply_policy_async(&binding.db, &binding.table, id, policy).await?;
    self.meta_mut().id = None;
    self.meta_mut().version = None;
    Ok(())
  }
}

#[async_trait]
impl<T: Model> AsyncModelExt for T {}
