//! The optional per-instance transform pipeline.
//!
//! A transform turns a value into bytes on `set` and back on `get`. Concrete
//! compression or encryption codecs are supplied by the host; the crate only
//! ships [`JsonTransform`] (behind the `serde` feature) as a reference codec.
//!
//! Implementations must round-trip: `deserialize(serialize(v)) == v`.

use crate::error::TransformError;

/// A reversible value codec.
pub trait ValueTransform<V>: Send + Sync {
  fn serialize(&self, value: &V) -> Result<Vec<u8>, TransformError>;

  fn deserialize(&self, bytes: &[u8]) -> Result<V, TransformError>;
}

impl<V, F, G> ValueTransform<V> for (F, G)
where
  F: Fn(&V) -> Result<Vec<u8>, TransformError> + Send + Sync,
  G: Fn(&[u8]) -> Result<V, TransformError> + Send + Sync,
{
  fn serialize(&self, value: &V) -> Result<Vec<u8>, TransformError> {
    (self.0)(value)
  }

  fn deserialize(&self, bytes: &[u8]) -> Result<V, TransformError> {
    (self.1)(bytes)
  }
}

#[cfg(feature = "serde")]
pub use json::JsonTransform;

#[cfg(feature = "serde")]
mod json {
  use super::ValueTransform;
  use crate::error::TransformError;

  use std::fmt;
  use std::marker::PhantomData;

  use serde::de::DeserializeOwned;
  use serde::Serialize;

  /// Encodes values as JSON.
  pub struct JsonTransform<V> {
    _marker: PhantomData<fn() -> V>,
  }

  impl<V> JsonTransform<V> {
    pub fn new() -> Self {
      Self {
        _marker: PhantomData,
      }
    }
  }

  impl<V> Default for JsonTransform<V> {
    fn default() -> Self {
      Self::new()
    }
  }

  impl<V> fmt::Debug for JsonTransform<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.write_str("JsonTransform")
    }
  }

  impl<V> ValueTransform<V> for JsonTransform<V>
  where
    V: Serialize + DeserializeOwned,
  {
    fn serialize(&self, value: &V) -> Result<Vec<u8>, TransformError> {
      serde_json::to_vec(value).map_err(|e| TransformError::Serialize(e.to_string()))
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<V, TransformError> {
      serde_json::from_slice(bytes).map_err(|e| TransformError::Deserialize(e.to_string()))
    }
  }

}
