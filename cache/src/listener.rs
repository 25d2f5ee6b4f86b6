use crate::entry::StoredValue;

use std::fmt;

/// Describes the reason an entry was removed from an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionReason {
  /// The entry was chosen as a victim to admit a new entry.
  Capacity,
  /// The entry's time-to-live elapsed.
  Expired,
  /// The entry was removed by `delete` or tag invalidation.
  Invalidated,
  /// The entry's stored bytes could not be decoded on read.
  Corrupted,
}

impl fmt::Display for EvictionReason {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      EvictionReason::Capacity => write!(f, "evicted due to capacity"),
      EvictionReason::Expired => write!(f, "evicted due to expiration (TTL)"),
      EvictionReason::Invalidated => write!(f, "manually invalidated"),
      EvictionReason::Corrupted => write!(f, "dropped after a failed decode"),
    }
  }
}

/// A listener that can be registered with the engine to receive notifications
/// when entries are removed.
///
/// `on_evict` is called with the instance name, the key, the stored value and
/// the reason. It runs on the thread that triggered the removal, after the
/// instance lock has been released, so it may call back into the engine.
/// `clear` and `remove_cache` do not notify.
pub trait EvictionListener<V>: Send + Sync {
  fn on_evict(&self, cache: &str, key: &str, value: StoredValue<V>, reason: EvictionReason);
}

impl<V, F> EvictionListener<V> for F
where
  F: Fn(&str, &str, StoredValue<V>, EvictionReason) + Send + Sync,
{
  fn on_evict(&self, cache: &str, key: &str, value: StoredValue<V>, reason: EvictionReason) {
    self(cache, key, value, reason)
  }
}

/// A removal recorded under the instance lock and dispatched after it is released.
pub(crate) struct Removal<V> {
  pub(crate) key: String,
  pub(crate) value: StoredValue<V>,
  pub(crate) reason: EvictionReason,
}

impl<V> Removal<V> {
  pub(crate) fn new(key: String, value: StoredValue<V>, reason: EvictionReason) -> Self {
    Self { key, value, reason }
  }
}

impl<V> fmt::Debug for Removal<V> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Removal")
      .field("key", &self.key)
      .field("reason", &self.reason)
      .finish_non_exhaustive()
  }
}
