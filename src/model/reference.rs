use serde::de::{Deserialize, Deserializer};
use serde::ser::{Serialize, Serializer};
use serde_json::Value;

use crate::error::ModelError;
use crate::model::{Model, ModelExt};

#[cfg(feature = "async")]
use crate::model::AsyncModelExt;

/// The stored shape of a cross-document reference: a mapping with exactly a
/// table name and an identifier.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RawRef {
  #[serde(rename = "_table")]
  pub table: String,
  #[serde(rename = "_id")]
  pub id: i64,
}

/// A reference-valued field: either a hydrated child instance or the raw
/// `{_table, _id}` mapping as stored.
///
/// Serializes to the raw mapping (the child's own row is independent);
/// deserializes from it. Hydration upgrades `Raw` to `Hydrated` in place.
pub enum Ref<T: Model> {
  Hydrated(Box<T>),
  Raw(RawRef),
}

impl<T: Model> Ref<T> {
  pub fn new(value: T) -> Self {
    Ref::Hydrated(Box::new(value))
  }

  /// The referenced identifier, if known.
  pub fn id(&self) -> Option<i64> {
    match self {
      Ref::Hydrated(child) => child.meta().id,
      Ref::Raw(raw) => Some(raw.id),
    }
  }

  pub fn is_hydrated(&self) -> bool {
    matches!(self, Ref::Hydrated(_))
  }

  pub fn get(&self) -> Option<&T> {
    match self {
      Ref::Hydrated(child) => Some(child),
      Ref::Raw(_) => None,
    }
  }

  pub fn get_mut(&mut self) -> Option<&mut T> {
    match self {
      Ref::Hydrated(child) => Some(child),
      Ref::Raw(_) => None,
    }
  }

  pub fn into_inner(self) -> Option<T> {
    match self {
      Ref::Hydrated(child) => Some(*child),
      Ref::Raw(_) => None,
    }
  }

  pub fn raw(&self) -> Option<&RawRef> {
    match self {
      Ref::Raw(raw) => Some(raw),
      Ref::Hydrated(_) => None,
    }
  }
}

impl<T: Model> From<T> for Ref<T> {
  fn from(value: T) -> Self {
    Ref::new(value)
  }
}

impl<T: Model + Clone> Clone for Ref<T> {
  fn clone(&self) -> Self {
    match self {
      Ref::Hydrated(child) => Ref::Hydrated(child.clone()),
      Ref::Raw(raw) => Ref::Raw(raw.clone()),
    }
  }
}

impl<T: Model + std::fmt::Debug> std::fmt::Debug for Ref<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Ref::Hydrated(child) => f.debug_tuple("Hydrated").field(child).finish(),
      Ref::Raw(raw) => f.debug_tuple("Raw").field(raw).finish(),
    }
  }
}

impl<T: Model> Serialize for Ref<T> {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    match self {
      Ref::Raw(raw) => raw.serialize(serializer),
      Ref::Hydrated(child) => match child.meta().id {
        Some(id) => RawRef {
          table: T::table(),
          id,
        }
        .serialize(serializer),
        None => Err(serde::ser::Error::custom(format!(
          "reference into table {} points at an unsaved document",
          T::table()
        ))),
      },
    }
  }
}

impl<'de, T: Model> Deserialize<'de> for Ref<T> {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    Ok(Ref::Raw(RawRef::deserialize(deserializer)?))
  }
}

/// Type-erased view of one reference-valued field, used by the save
/// pre-pass and the hydrator.
#[cfg_attr(feature = "async", async_trait::async_trait)]
pub trait RefSlot: Send {
  /// Table the reference points into.
  fn target_table(&self) -> String;

  /// Whether the referenced table is versioned.
  fn target_safe(&self) -> bool;

  /// The referenced id when the slot is still raw; `None` once hydrated.
  fn pending_id(&self) -> Option<i64>;

  /// A hydrated child that was never saved.
  fn needs_save(&self) -> bool;

  /// Saves the hydrated child through its own binding.
  fn save_hydrated(&mut self) -> Result<(), ModelError>;

  #[cfg(feature = "async")]
  async fn save_hydrated_async(&mut self) -> Result<(), ModelError>;

  /// Upgrades a raw slot to a hydrated child built from the stored row.
  fn hydrate(&mut self, id: i64, version: Option<i64>, payload: Value) -> Result<(), ModelError>;
}

#[cfg_attr(feature = "async", async_trait::async_trait)]
impl<T: Model> RefSlot for Ref<T> {
  fn target_table(&self) -> String {
    match self {
      Ref::Raw(raw) => raw.table.clone(),
      Ref::Hydrated(_) => T::table(),
    }
  }

  fn target_safe(&self) -> bool {
    T::SAFE
  }

  fn pending_id(&self) -> Option<i64> {
    match self {
      Ref::Raw(raw) => Some(raw.id),
      Ref::Hydrated(_) => None,
    }
  }

  fn needs_save(&self) -> bool {
    matches!(self, Ref::Hydrated(child) if child.meta().id.is_none())
  }

  fn save_hydrated(&mut self) -> Result<(), ModelError> {
    if let Ref::Hydrated(child) = self {
      ModelExt::save(child.as_mut())?;
    }
    Ok(())
  }

  #[cfg(feature = "async")]
  async fn save_hydrated_async(&mut self) -> Result<(), ModelError> {
    if let Ref::Hydrated(child) = self {
      AsyncModelExt::save(child.as_mut()).await?;
    }
    Ok(())
  }

  fn hydrate(&mut self, id: i64, version: Option<i64>, payload: Value) -> Result<(), ModelError> {
    let mut child: T = serde_json::from_value(payload).map_err(ModelError::Validation)?;
    child.meta_mut().id = Some(id);
    child.meta_mut().version = version;
    *self = Ref::Hydrated(Box::new(child));
    Ok(())
  }
}

/// Gathers `&mut dyn RefSlot` out of reference-shaped fields; implemented
/// for `Ref<T>` and lifted over `Option` and `Vec` so a model's
/// `collect_refs` body is one line per field.
pub trait CollectRefs {
  fn collect<'a>(&'a mut self, out: &mut Vec<&'a mut dyn RefSlot>);
}

impl<T: Model> CollectRefs for Ref<T> {
  fn collect<'a>(&'a mut self, out: &mut Vec<&'a mut dyn RefSlot>) {
    out.push(self);
  }
}

impl<T: CollectRefs> CollectRefs for Option<T> {
  fn collect<'a>(&'a mut self, out: &mut Vec<&'a mut dyn RefSlot>) {
    if let Some(inner) = self {
      inner.collect(out);
    }
  }
}

impl<T: CollectRefs> CollectRefs for Vec<T> {
  fn collect<'a>(&'a mut self, out: &mut Vec<&'a mut dyn RefSlot>) {
    for item in self {
      item.collect(out);
    }
  }
}
