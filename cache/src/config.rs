use crate::entry::{EntryMetadata, Priority};
use crate::error::{CacheError, Result};
use crate::policy::StrategyKind;

use std::time::{Duration, SystemTime};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Default maximum number of entries per instance.
pub const DEFAULT_MAX_ENTRIES: usize = 100;
/// Default memory bound per instance (50 MiB).
pub const DEFAULT_MAX_MEMORY_BYTES: u64 = 50 * 1024 * 1024;
/// Default time-to-live applied to entries that do not override it.
pub const DEFAULT_TTL: Duration = Duration::from_millis(300_000);

/// Per-instance configuration, supplied to [`CacheEngine::create_cache`](crate::CacheEngine::create_cache).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CacheConfig {
  pub(crate) max_entries: usize,
  pub(crate) max_memory_bytes: u64,
  pub(crate) strategy: StrategyKind,
  pub(crate) default_ttl: Option<Duration>,
  pub(crate) persistent: bool,
  pub(crate) auto_tune: bool,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      max_entries: DEFAULT_MAX_ENTRIES,
      max_memory_bytes: DEFAULT_MAX_MEMORY_BYTES,
      strategy: StrategyKind::default(),
      default_ttl: Some(DEFAULT_TTL),
      persistent: false,
      auto_tune: true,
    }
  }
}

impl CacheConfig {
  pub fn new() -> Self {
    Self::default()
  }

  /// Sets the maximum number of entries the instance may hold.
  pub fn max_entries(mut self, max_entries: usize) -> Self {
    self.max_entries = max_entries;
    self
  }

  /// Sets the maximum estimated memory, in bytes, the instance may hold.
  pub fn max_memory_bytes(mut self, max_memory_bytes: u64) -> Self {
    self.max_memory_bytes = max_memory_bytes;
    self
  }

  /// Sets the eviction strategy the instance starts with.
  pub fn strategy(mut self, strategy: StrategyKind) -> Self {
    self.strategy = strategy;
    self
  }

  /// Sets the TTL applied when `set` does not override it.
  pub fn default_ttl(mut self, ttl: Duration) -> Self {
    self.default_ttl = Some(ttl);
    self
  }

  /// Entries never expire unless `set` supplies a TTL.
  pub fn no_default_ttl(mut self) -> Self {
    self.default_ttl = None;
    self
  }

  /// Mirrors every write to the engine's persistence adapter.
  pub fn persistent(mut self, persistent: bool) -> Self {
    self.persistent = persistent;
    self
  }

  /// Allows the self-tuning controller to switch this instance's strategy.
  ///
  /// Enabled by default.
  pub fn auto_tune(mut self, enabled: bool) -> Self {
    self.auto_tune = enabled;
    self
  }

  pub fn get_max_entries(&self) -> usize {
    self.max_entries
  }

  pub fn get_max_memory_bytes(&self) -> u64 {
    self.max_memory_bytes
  }

  pub fn get_strategy(&self) -> StrategyKind {
    self.strategy
  }

  pub fn get_default_ttl(&self) -> Option<Duration> {
    self.default_ttl
  }

  pub fn is_persistent(&self) -> bool {
    self.persistent
  }

  pub(crate) fn validate(&self) -> Result<()> {
    if self.max_entries == 0 {
      return Err(CacheError::invalid_config("max_entries", "must be at least 1"));
    }
    if self.max_memory_bytes == 0 {
      return Err(CacheError::invalid_config("max_memory_bytes", "must be at least 1"));
    }
    if let Some(ttl) = self.default_ttl {
      if let Some(err) = CacheError::zero_duration("default_ttl", ttl) {
        return Err(err);
      }
    }
    Ok(())
  }
}

/// Per-call overrides for [`CacheEngine::set_with`](crate::CacheEngine::set_with).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SetOptions {
  pub(crate) ttl: Option<Duration>,
  pub(crate) no_ttl: bool,
  pub(crate) priority: Option<Priority>,
  pub(crate) tags: Vec<String>,
  pub(crate) transform: Option<bool>,
}

impl SetOptions {
  pub fn new() -> Self {
    Self::default()
  }

  /// Overrides the instance's default TTL for this entry.
  pub fn ttl(mut self, ttl: Duration) -> Self {
    self.ttl = Some(ttl);
    self.no_ttl = false;
    self
  }

  /// Stores the entry without any TTL.
  pub fn no_ttl(mut self) -> Self {
    self.ttl = None;
    self.no_ttl = true;
    self
  }

  pub fn priority(mut self, priority: Priority) -> Self {
    self.priority = Some(priority);
    self
  }

  /// Adds a tag usable with [`CacheEngine::invalidate_tag`](crate::CacheEngine::invalidate_tag).
  pub fn tag(mut self, tag: impl Into<String>) -> Self {
    self.tags.push(tag.into());
    self
  }

  /// Forces the instance transform pipeline on or off for this entry.
  ///
  /// Without an override, the pipeline is applied whenever the instance has one.
  pub fn transform(mut self, enabled: bool) -> Self {
    self.transform = Some(enabled);
    self
  }

  /// Options that reproduce a persisted entry's metadata, keeping whatever
  /// is left of its TTL at `now`. Metadata without a deadline falls back to
  /// its full TTL.
  pub(crate) fn restoring(metadata: &EntryMetadata, now: SystemTime) -> Self {
    let ttl = metadata.remaining_ttl(now).or(metadata.ttl);
    Self {
      ttl,
      no_ttl: ttl.is_none(),
      priority: Some(metadata.priority),
      tags: metadata.tags.clone(),
      transform: None,
    }
  }

  pub(crate) fn resolve_ttl(&self, default_ttl: Option<Duration>) -> Option<Duration> {
    if self.no_ttl {
      None
    } else {
      self.ttl.or(default_ttl)
    }
  }
}

/// Per-call options for [`CacheEngine::get_with_options`](crate::CacheEngine::get_with_options).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GetOptions {
  pub(crate) predictive_load: bool,
}

impl GetOptions {
  pub fn new() -> Self {
    Self::default()
  }

  /// On a miss, schedules a background load through the instance's loader.
  pub fn predictive_load(mut self, enabled: bool) -> Self {
    self.predictive_load = enabled;
    self
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_match_documented_values() {
    let config = CacheConfig::default();
    assert_eq!(config.get_max_entries(), 100);
    assert_eq!(config.get_max_memory_bytes(), 50 * 1024 * 1024);
    assert_eq!(config.get_strategy(), StrategyKind::WeightedScore);
    assert_eq!(config.get_default_ttl(), Some(Duration::from_millis(300_000)));
    assert!(!config.is_persistent());
  }

  #[test]
  fn zero_bounds_are_rejected() {
    assert!(matches!(
      CacheConfig::new().max_entries(0).validate(),
      Err(CacheError::InvalidConfig { .. })
    ));
    assert!(matches!(
      CacheConfig::new().max_memory_bytes(0).validate(),
      Err(CacheError::InvalidConfig { .. })
    ));
  }

  #[test]
  fn ttl_resolution_prefers_overrides() {
    let default = Some(Duration::from_secs(5));
    assert_eq!(SetOptions::new().resolve_ttl(default), default);
    assert_eq!(
      SetOptions::new().ttl(Duration::from_secs(1)).resolve_ttl(default),
      Some(Duration::from_secs(1))
    );
    assert_eq!(SetOptions::new().no_ttl().resolve_ttl(default), None);
  }
}
