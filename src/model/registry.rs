//! Process-wide model bindings: one mutable slot per model type, guarded for
//! rebinding in tests and cleared on shutdown.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::OnceLock;

use parking_lot::RwLock;

use crate::db::{Database, TableShape};
use crate::error::ModelError;
use crate::model::Model;

#[derive(Clone)]
pub(crate) struct SyncBinding {
  pub table: String,
  pub safe: bool,
  pub db: Database,
}

fn sync_registry() -> &'static RwLock<HashMap<TypeId, SyncBinding>> {
  static REGISTRY: OnceLock<RwLock<HashMap<TypeId, SyncBinding>>> = OnceLock::new();
  REGISTRY.get_or_init(Default::default)
}

/// Binds `T` to `db`, ensuring its table shape and declared indexes.
pub(crate) fn bind_sync<T: Model>(db: &Database) -> Result<(), ModelError> {
  let table = T::table();
  let shape = if T::SAFE {
    TableShape::Versioned
  } else {
    TableShape::Plain
  };
  db.ensure_table(&table, shape)?;
  for index in T::indexes() {
    db.create_index(&table, &index.path, index.unique, index.partial.as_deref())?;
  }
  sync_registry().write().insert(
    TypeId::of::<T>(),
    SyncBinding {
      table,
      safe: T::SAFE,
      db: db.clone(),
    },
  );
  Ok(())
}

pub(crate) fn unbind_sync<T: Model>() {
  sync_registry().write().remove(&TypeId::of::<T>());
}

pub(crate) fn sync_binding<T: Model>() -> Result<SyncBinding, ModelError> {
  sync_registry()
    .read()
    .get(&TypeId::of::<T>())
    .cloned()
    .ok_or(ModelError::NotBound {
      model: std::any::type_name::<T>(),
    })
}

/// Tables of every model currently bound to `db`, for referrer scans.
pub(crate) fn sync_tables_on(db: &Database) -> Vec<(String, bool)> {
  let mut tables: Vec<(String, bool)> = sync_registry()
    .read()
    .values()
    .filter(|binding| binding.db.same_as(db))
    .map(|binding| (binding.table.clone(), binding.safe))
    .collect();
  tables.sort();
  tables.dedup();
  tables
}

#[cfg(feature = "async")]
pub(crate) use async_registry::{bind_async, async_binding, async_tables_on, unbind_async, AsyncBinding};

#[cfg(feature = "async")]
mod async_registry {
  use super::*;
  use crate::db::AsyncDatabase;

  #[derive(Clone)]
  pub(crate) struct AsyncBinding {
    pub table: String,
    pub safe: bool,
    pub db: AsyncDatabase,
  }

  fn registry() -> &'static RwLock<HashMap<TypeId, AsyncBinding>> {
    static REGISTRY: OnceLock<RwLock<HashMap<TypeId, AsyncBinding>>> = OnceLock::new();
    REGISTRY.get_or_init(Default::default)
  }

  pub(crate) async fn bind_async<T: Model>(db: &AsyncDatabase) -> Result<(), ModelError> {
    let table = T::table();
    let shape = if T::SAFE {
      TableShape::Versioned
    } else {
      TableShape::Plain
    };
    db.ensure_table(&table, shape).await?;
    for index in T::indexes() {
      db.create_index(&table, &index.path, index.unique, index.partial.as_deref())
        .await?;
    }
    registry().write().insert(
      TypeId::of::<T>(),
      AsyncBinding {
        table,
        safe: T::SAFE,
        db: db.clone(),
      },
    );
    Ok(())
  }

  pub(crate) fn unbind_async<T: Model>() {
    registry().write().remove(&TypeId::of::<T>());
  }

  pub(crate) fn async_binding<T: Model>() -> Result<AsyncBinding, ModelError> {
    registry()
      .read()
      .get(&TypeId::of::<T>())
      .cloned()
      .ok_or(ModelError::NotBound {
        model: std::any::type_name::<T>(),
      })
  }

  pub(crate) fn async_tables_on(db: &AsyncDatabase) -> Vec<(String, bool)> {
    let mut tables: Vec<(String, bool)> = registry()
      .read()
      .values()
      .filter(|binding| binding.db.same_as(db))
      .map(|binding| (binding.table.clone(), binding.safe))
      .collect();
    tables.sort();
    tables.dedup();
    tables
  }
}
