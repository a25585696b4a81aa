//! Model runtime: declarative models over per-table JSON documents, with
//! reference hydration, optimistic versioning, and delete policies.

mod delete;
mod hydrate;
mod ops;
mod query;
mod reference;
mod refwalk;
mod registry;
mod relation;

#[cfg(feature = "async")]
mod async_ops;

#[cfg(feature = "async")]
mod async_query;

pub use delete::OnDelete;
pub use ops::ModelExt;
pub use query::ModelQuery;
pub use reference::{CollectRefs, RawRef, Ref, RefSlot};
pub use relation::{Relation, RelationField};

#[cfg(feature = "async")]
pub use async_ops::AsyncModelExt;

#[cfg(feature = "async")]
pub use async_query::AsyncModelQuery;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::ModelError;

/// Identifier and version state carried by every model instance, outside the
/// stored payload. Embed it under `#[serde(skip)]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelMeta {
  /// Assigned on first save; immutable afterwards.
  pub id: Option<i64>,
  /// Stored `_version` for safe models; `None` before the first save and on
  /// plain models.
  pub version: Option<i64>,
}

/// A declared index, ensured when the model binds to a database.
#[derive(Debug, Clone)]
pub struct IndexSpec {
  pub path: String,
  pub unique: bool,
  pub partial: Option<String>,
}

impl IndexSpec {
  pub fn new(path: impl Into<String>) -> Self {
    Self {
      path: path.into(),
      unique: false,
      partial: None,
    }
  }

  pub fn unique(path: impl Into<String>) -> Self {
    Self {
      path: path.into(),
      unique: true,
      partial: None,
    }
  }

  pub fn with_partial(mut self, clause: impl Into<String>) -> Self {
    self.partial = Some(clause.into());
    self
  }
}

/// A declared model: a serde-serializable struct stored as one JSON payload
/// per row in its own table.
///
/// ```ignore
/// #[derive(Serialize, Deserialize, Default)]
/// struct User {
///   #[serde(skip)]
///   meta: ModelMeta,
///   name: String,
///   address: Option<Ref<Address>>,
/// }
///
/// impl Model for User {
///   fn meta(&self) -> &ModelMeta { &self.meta }
///   fn meta_mut(&mut self) -> &mut ModelMeta { &mut self.meta }
///   fn collect_refs<'a>(&'a mut self, out: &mut Vec<&'a mut dyn RefSlot>) {
///     self.address.collect(out);
///   }
/// }
/// ```
pub trait Model: Serialize + DeserializeOwned + Send + 'static {
  /// Safe models store a `_version` column and update under optimistic
  /// concurrency.
  const SAFE: bool = false;

  /// Table name; defaults to the lowercased, pluralized type name.
  fn table() -> String {
    default_table_name::<Self>()
  }

  fn meta(&self) -> &ModelMeta;

  fn meta_mut(&mut self) -> &mut ModelMeta;

  /// Visits every reference-valued field, for the save pre-pass and for
  /// hydration. Models without references keep the default.
  fn collect_refs<'a>(&'a mut self, out: &mut Vec<&'a mut dyn RefSlot>) {
    let _ = out;
  }

  /// Indexes ensured at bind time.
  fn indexes() -> Vec<IndexSpec> {
    Vec::new()
  }
}

/// Implements [`Model`] for a struct with a `#[serde(skip)] meta: ModelMeta`
/// field. Optional named arguments, in this order: `table` overrides the
/// derived table name, `safe` enables optimistic versioning, `refs` lists the
/// reference-valued fields.
///
/// ```ignore
/// impl_model!(User, refs = [address, friends]);
/// impl_model!(Account, table = "ledger", safe = true);
/// ```
#[macro_export]
macro_rules! impl_model {
  (@build $ty:ty, [$($table:tt)?], [$($safe:tt)?], [$($field:ident),*]) => {
    impl $crate::Model for $ty {
      $(const SAFE: bool = $safe;)?

      $(fn table() -> String {
        String::from($table)
      })?

      fn meta(&self) -> &$crate::ModelMeta {
        &self.meta
      }

      fn meta_mut(&mut self) -> &mut $crate::ModelMeta {
        &mut self.meta
      }

      fn collect_refs<'a>(&'a mut self, out: &mut Vec<&'a mut dyn $crate::RefSlot>) {
        let _ = &out;
        $($crate::CollectRefs::collect(&mut self.$field, out);)*
      }
    }
  };
  ($ty:ty) => {
    $crate::impl_model!(@build $ty, [], [], []);
  };
  ($ty:ty, table = $table:expr) => {
    $crate::impl_model!(@build $ty, [$table], [], []);
  };
  ($ty:ty, safe = $safe:expr) => {
    $crate::impl_model!(@build $ty, [], [$safe], []);
  };
  ($ty:ty, refs = [$($field:ident),* $(,)?]) => {
    $crate::impl_model!(@build $ty, [], [], [$($field),*]);
  };
  ($ty:ty, table = $table:expr, safe = $safe:expr) => {
    $crate::impl_model!(@build $ty, [$table], [$safe], []);
  };
  ($ty:ty, table = $table:expr, refs = [$($field:ident),* $(,)?]) => {
    $crate::impl_model!(@build $ty, [$table], [], [$($field),*]);
  };
  ($ty:ty, safe = $safe:expr, refs = [$($field:ident),* $(,)?]) => {
    $crate::impl_model!(@build $ty, [], [$safe], [$($field),*]);
  };
  ($ty:ty, table = $table:expr, safe = $safe:expr, refs = [$($field:ident),* $(,)?]) => {
    $crate::impl_model!(@build $ty, [$table], [$safe], [$($field),*]);
  };
}

/// Lowercases the bare type name and pluralizes it: `User` → `users`,
/// `Address` → `addresses`.
pub fn default_table_name<T: 'static>() -> String {
  let full = std::any::type_name::<T>();
  let bare = full.rsplit("::").next().unwrap_or(full);
  let lower = bare.to_lowercase();
  pluralize(&lower)
}

fn pluralize(noun: &str) -> String {
  let es = noun.ends_with('s')
    || noun.ends_with('x')
    || noun.ends_with('z')
    || noun.ends_with("ch")
    || noun.ends_with("sh");
  if es {
    format!("{noun}es")
  } else {
    format!("{noun}s")
  }
}

/// Builds a model instance from a stored row.
pub(crate) fn materialize<T: Model>(
  id: i64,
  version: Option<i64>,
  payload: Value,
) -> Result<T, ModelError> {
  let mut instance: T = serde_json::from_value(payload).map_err(ModelError::Validation)?;
  instance.meta_mut().id = Some(id);
  instance.meta_mut().version = version;
  Ok(instance)
}
