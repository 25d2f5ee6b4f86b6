use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crate::time;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The retention priority of an entry, consulted by weighted-score eviction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Priority {
  Low,
  #[default]
  Normal,
  High,
  Critical,
}

impl Priority {
  /// The weight this priority contributes to an entry's retention score.
  pub fn weight(self) -> f64 {
    match self {
      Priority::Low => 0.1,
      Priority::Normal => 0.5,
      Priority::High => 0.9,
      Priority::Critical => 1.0,
    }
  }
}

/// Records which transforms were applied to a stored value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TransformFlags {
  /// The value went through the instance's transform pipeline and is held as bytes.
  pub encoded: bool,
}

/// A value as the engine holds it: either the original value or its
/// transformed byte form.
pub enum StoredValue<V> {
  Plain(Arc<V>),
  Encoded(Arc<[u8]>),
}

impl<V> StoredValue<V> {
  /// The value itself, if it was stored without a transform.
  pub fn as_plain(&self) -> Option<&Arc<V>> {
    match self {
      StoredValue::Plain(value) => Some(value),
      StoredValue::Encoded(_) => None,
    }
  }

  /// The encoded bytes, if the value went through a transform.
  pub fn as_encoded(&self) -> Option<&[u8]> {
    match self {
      StoredValue::Plain(_) => None,
      StoredValue::Encoded(bytes) => Some(bytes),
    }
  }

  pub(crate) fn flags(&self) -> TransformFlags {
    TransformFlags {
      encoded: matches!(self, StoredValue::Encoded(_)),
    }
  }
}

impl<V> Clone for StoredValue<V> {
  fn clone(&self) -> Self {
    match self {
      StoredValue::Plain(value) => StoredValue::Plain(Arc::clone(value)),
      StoredValue::Encoded(bytes) => StoredValue::Encoded(Arc::clone(bytes)),
    }
  }
}

impl<V> fmt::Debug for StoredValue<V> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      StoredValue::Plain(_) => f.write_str("StoredValue::Plain(..)"),
      StoredValue::Encoded(bytes) => write!(f, "StoredValue::Encoded({} bytes)", bytes.len()),
    }
  }
}

/// Entry metadata handed to persistence adapters alongside the stored value.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EntryMetadata {
  pub size_bytes: u64,
  pub ttl: Option<Duration>,
  /// The wall-clock moment the entry expires. A restored copy keeps this
  /// deadline rather than starting its TTL over.
  #[cfg_attr(feature = "serde", serde(default))]
  pub expires_at: Option<SystemTime>,
  pub priority: Priority,
  pub tags: Vec<String>,
  pub transform_flags: TransformFlags,
}

impl EntryMetadata {
  /// Whether the deadline in [`expires_at`](Self::expires_at) has passed at `now`.
  pub fn is_expired_at(&self, now: SystemTime) -> bool {
    self.expires_at.is_some_and(|deadline| deadline <= now)
  }

  /// The TTL left at `now`, or `None` for an entry without a deadline.
  pub fn remaining_ttl(&self, now: SystemTime) -> Option<Duration> {
    self
      .expires_at
      .map(|deadline| deadline.duration_since(now).unwrap_or(Duration::ZERO))
  }
}

/// A container for a value in an instance, holding all eviction metadata.
#[derive(Debug)]
pub(crate) struct CacheEntry<V> {
  pub(crate) key: String,
  pub(crate) value: StoredValue<V>,
  pub(crate) size_bytes: u64,
  /// Offsets from the engine epoch.
  pub(crate) created_at: Duration,
  pub(crate) last_accessed_at: Duration,
  pub(crate) access_count: u64,
  pub(crate) ttl: Option<Duration>,
  pub(crate) priority: Priority,
  pub(crate) tags: BTreeSet<String>,
  pub(crate) transform_flags: TransformFlags,
}

impl<V> CacheEntry<V> {
  pub(crate) fn new(
    key: String,
    value: StoredValue<V>,
    size_bytes: u64,
    now: Duration,
    ttl: Option<Duration>,
    priority: Priority,
    tags: BTreeSet<String>,
  ) -> Self {
    let transform_flags = value.flags();
    Self {
      key,
      value,
      size_bytes,
      created_at: now,
      last_accessed_at: now,
      access_count: 0,
      ttl,
      priority,
      tags,
      transform_flags,
    }
  }

  /// Checks whether the entry's TTL has elapsed at `now`.
  #[inline]
  pub(crate) fn is_expired(&self, now: Duration) -> bool {
    match self.ttl {
      Some(ttl) => now.saturating_sub(self.created_at) >= ttl,
      None => false,
    }
  }

  /// Marks the entry as read at `now`.
  #[inline]
  pub(crate) fn touch(&mut self, now: Duration) {
    self.last_accessed_at = now;
    self.access_count += 1;
  }

  pub(crate) fn metadata(&self) -> EntryMetadata {
    EntryMetadata {
      size_bytes: self.size_bytes,
      ttl: self.ttl,
      expires_at: self
        .ttl
        .and_then(|ttl| self.created_at.checked_add(ttl))
        .and_then(time::to_system_time),
      priority: self.priority,
      tags: self.tags.iter().cloned().collect(),
      transform_flags: self.transform_flags,
    }
  }
}
