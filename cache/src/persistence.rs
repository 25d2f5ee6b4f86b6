//! The optional persistence adapter and the policy that decides what happens
//! when it fails.

use crate::entry::{EntryMetadata, StoredValue};
use crate::error::PersistenceError;

use std::fmt;

use ahash::{HashMap, HashMapExt};
use parking_lot::Mutex;

/// A best-effort mirror of the writes made to persistent instances.
///
/// Every method receives the owning instance name so one adapter can serve
/// the whole engine.
pub trait PersistenceAdapter<V>: Send + Sync {
  fn save(
    &self,
    cache: &str,
    key: &str,
    value: &StoredValue<V>,
    metadata: &EntryMetadata,
  ) -> Result<(), PersistenceError>;

  fn load(
    &self,
    cache: &str,
    key: &str,
  ) -> Result<Option<(StoredValue<V>, EntryMetadata)>, PersistenceError>;

  fn delete(&self, cache: &str, key: &str) -> Result<(), PersistenceError>;

  fn clear(&self, cache: &str) -> Result<(), PersistenceError>;
}

/// Decides whether adapter failures are swallowed or returned to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PersistenceErrorPolicy {
  /// Failures are logged and counted; the in-memory operation still succeeds.
  #[default]
  LogAndContinue,
  /// Failures are returned as [`CacheError::Persistence`](crate::CacheError::Persistence)
  /// after the in-memory operation has been applied.
  Strict,
}

/// An adapter that keeps persisted copies in process memory.
pub struct MemoryPersistence<V> {
  records: Mutex<HashMap<(String, String), (StoredValue<V>, EntryMetadata)>>,
}

impl<V> MemoryPersistence<V> {
  pub fn new() -> Self {
    Self {
      records: Mutex::new(HashMap::new()),
    }
  }

  /// The number of persisted records across all instances.
  pub fn len(&self) -> usize {
    self.records.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn contains(&self, cache: &str, key: &str) -> bool {
    self
      .records
      .lock()
      .contains_key(&(cache.to_string(), key.to_string()))
  }
}

impl<V> Default for MemoryPersistence<V> {
  fn default() -> Self {
    Self::new()
  }
}

impl<V> fmt::Debug for MemoryPersistence<V> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("MemoryPersistence")
      .field("records", &self.len())
      .finish()
  }
}

impl<V: Send + Sync> PersistenceAdapter<V> for MemoryPersistence<V> {
  fn save(
    &self,
    cache: &str,
    key: &str,
    value: &StoredValue<V>,
    metadata: &EntryMetadata,
  ) -> Result<(), PersistenceError> {
    self.records.lock().insert(
      (cache.to_string(), key.to_string()),
      (value.clone(), metadata.clone()),
    );
    Ok(())
  }

  fn load(
    &self,
    cache: &str,
    key: &str,
  ) -> Result<Option<(StoredValue<V>, EntryMetadata)>, PersistenceError> {
    Ok(
      self
        .records
        .lock()
        .get(&(cache.to_string(), key.to_string()))
        .cloned(),
    )
  }

  fn delete(&self, cache: &str, key: &str) -> Result<(), PersistenceError> {
    self
      .records
      .lock()
      .remove(&(cache.to_string(), key.to_string()));
    Ok(())
  }

  fn clear(&self, cache: &str) -> Result<(), PersistenceError> {
    self.records.lock().retain(|(owner, _), _| owner != cache);
    Ok(())
  }
}
