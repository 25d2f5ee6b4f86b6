//! A single named cache: its entries, bounds, counters and predictor.
//!
//! Every public engine operation runs its bookkeeping under the instance's
//! state mutex. Work that may be slow or re-enter the engine (transforms,
//! producers, persistence, listeners) is done by the engine before or after
//! the lock, using the data these methods return.

use crate::config::{CacheConfig, SetOptions};
use crate::entry::{CacheEntry, EntryMetadata, StoredValue};
use crate::error::CacheError;
use crate::listener::{EvictionReason, Removal};
use crate::loader::{LoadFuture, Loader};
use crate::metrics::InstanceCounters;
use crate::policy::{EvictionContext, ScoreWeights, Selection, StrategyKind};
use crate::predictor::{AccessKind, AccessPatternRecord, PredictionRecord, UsagePredictor};
use crate::report::{percent, InstanceReport};
use crate::transform::ValueTransform;
use crate::tuning::{self, TuningSample, TuningThresholds};

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use ahash::{HashMap, HashMapExt};
use parking_lot::{Mutex, RwLock};
use tracing::debug;

/// Consecutive empty strategy rounds after which a write is refused.
const MAX_IDLE_ROUNDS: u32 = 2;

/// How a write entered the instance, which decides what it counts as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WriteOrigin {
  /// A caller's `set`, or a value stored after a foreground load.
  Set,
  /// A value stored by a background load. It never requests further prefetches.
  Background,
  /// A value brought back from the persistence adapter on a miss.
  Restore,
}

/// Failures counted per instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FailureKind {
  Load,
  Transform,
  Persistence,
}

/// The result of a successful write.
pub(crate) struct Admitted<V> {
  /// Whether an existing entry under the same key was replaced.
  pub(crate) replaced: bool,
  pub(crate) removals: Vec<Removal<V>>,
  /// Absent keys the prefetch strategy wants loaded.
  pub(crate) prefetch: Vec<String>,
  pub(crate) metadata: EntryMetadata,
}

pub(crate) enum Lookup<V> {
  Hit(StoredValue<V>),
  /// `expired` carries the entry removed because its TTL had elapsed.
  Miss { expired: Option<Removal<V>> },
}

/// What one maintenance pass did to an instance.
pub(crate) struct MaintenanceOutcome<V> {
  pub(crate) expired: Vec<Removal<V>>,
  pub(crate) switched: Option<(StrategyKind, StrategyKind)>,
  pub(crate) pruned_patterns: usize,
}

struct InstanceState<V> {
  entries: HashMap<String, CacheEntry<V>>,
  config: CacheConfig,
  counters: InstanceCounters,
  predictor: UsagePredictor,
}

impl<V> InstanceState<V> {
  /// Whether admitting `size_bytes` under `key` would break either bound.
  fn needs_room(&self, key: &str, size_bytes: u64) -> bool {
    let old_size = self.entries.get(key).map(|entry| entry.size_bytes);
    let over_count = old_size.is_none() && self.entries.len() >= self.config.max_entries;
    let projected = self
      .counters
      .memory_bytes_used
      .saturating_sub(old_size.unwrap_or(0))
      + size_bytes;
    over_count || projected > self.config.max_memory_bytes
  }

  fn remove_entry(&mut self, key: &str, reason: EvictionReason) -> Option<Removal<V>> {
    let entry = self.entries.remove(key)?;
    self.counters.memory_bytes_used = self.counters.memory_bytes_used.saturating_sub(entry.size_bytes);
    match reason {
      EvictionReason::Capacity => self.counters.evicted_by_capacity += 1,
      EvictionReason::Expired => self.counters.evicted_by_ttl += 1,
      EvictionReason::Invalidated | EvictionReason::Corrupted => {}
    }
    Some(Removal::new(entry.key, entry.value, reason))
  }

  fn expired_keys(&self, now: Duration, protected: Option<&str>) -> Vec<String> {
    let mut keys: Vec<String> = self
      .entries
      .values()
      .filter(|entry| entry.is_expired(now) && Some(entry.key.as_str()) != protected)
      .map(|entry| entry.key.clone())
      .collect();
    keys.sort();
    keys
  }

  fn remove_expired(&mut self, now: Duration, protected: Option<&str>) -> Vec<Removal<V>> {
    self
      .expired_keys(now, protected)
      .into_iter()
      .filter_map(|key| self.remove_entry(&key, EvictionReason::Expired))
      .collect()
  }
}

pub(crate) struct CacheInstance<V> {
  name: String,
  persistent: bool,
  state: Mutex<InstanceState<V>>,
  /// Held for the duration of a maintenance pass so overlapping ticks skip.
  maintenance: Mutex<()>,
  pub(crate) pending_loads: Mutex<HashMap<String, Arc<LoadFuture<V>>>>,
  loader: RwLock<Option<Loader<V>>>,
  transform: Option<Arc<dyn ValueTransform<V>>>,
}

impl<V> fmt::Debug for CacheInstance<V> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CacheInstance")
      .field("name", &self.name)
      .field("persistent", &self.persistent)
      .field("has_transform", &self.transform.is_some())
      .finish_non_exhaustive()
  }
}

impl<V> CacheInstance<V> {
  pub(crate) fn new(
    name: String,
    config: CacheConfig,
    transform: Option<Arc<dyn ValueTransform<V>>>,
    pattern_capacity: usize,
    now: Duration,
  ) -> Self {
    Self {
      name,
      persistent: config.persistent,
      state: Mutex::new(InstanceState {
        entries: HashMap::new(),
        config,
        counters: InstanceCounters::new(now),
        predictor: UsagePredictor::new(pattern_capacity),
      }),
      maintenance: Mutex::new(()),
      pending_loads: Mutex::new(HashMap::new()),
      loader: RwLock::new(None),
      transform,
    }
  }

  pub(crate) fn name(&self) -> &str {
    &self.name
  }

  pub(crate) fn is_persistent(&self) -> bool {
    self.persistent
  }

  pub(crate) fn transform(&self) -> Option<&Arc<dyn ValueTransform<V>>> {
    self.transform.as_ref()
  }

  pub(crate) fn loader(&self) -> Option<Loader<V>> {
    self.loader.read().clone()
  }

  pub(crate) fn set_loader(&self, loader: Loader<V>) {
    *self.loader.write() = Some(loader);
  }

  pub(crate) fn config(&self) -> CacheConfig {
    self.state.lock().config.clone()
  }

  /// Looks up `key`, touching it on a hit.
  ///
  /// Misses are counted here unless the instance is persistent, in which case
  /// the caller consults the adapter first and then calls
  /// [`record_miss`](Self::record_miss) or restores the value.
  pub(crate) fn lookup(&self, key: &str, now: Duration) -> Lookup<V> {
    let mut guard = self.state.lock();
    let state = &mut *guard;
    state.counters.last_access_at = Some(now);

    let expired = match state.entries.get(key).map(|entry| entry.is_expired(now)) {
      Some(false) => {
        if let Some(entry) = state.entries.get_mut(key) {
          entry.touch(now);
          let value = entry.value.clone();
          state.counters.hits += 1;
          state.predictor.update_pattern(key, AccessKind::Hit, now);
          return Lookup::Hit(value);
        }
        None
      }
      Some(true) => state.remove_entry(key, EvictionReason::Expired),
      None => None,
    };

    if !self.persistent {
      state.counters.misses += 1;
      state.predictor.update_pattern(key, AccessKind::Miss, now);
    }
    Lookup::Miss { expired }
  }

  pub(crate) fn record_miss(&self, key: &str, now: Duration) {
    let mut state = self.state.lock();
    state.counters.misses += 1;
    state.predictor.update_pattern(key, AccessKind::Miss, now);
  }

  /// Counts a value served from persistence that could not be re-admitted.
  pub(crate) fn record_uncached_hit(&self, key: &str, now: Duration) {
    let mut state = self.state.lock();
    state.counters.hits += 1;
    state.predictor.update_pattern(key, AccessKind::Hit, now);
  }

  /// Drops an entry whose bytes failed to decode, turning the hit recorded by
  /// [`lookup`](Self::lookup) into a miss. The entry is only removed if it
  /// still holds `bytes`, so a concurrent replacement survives.
  pub(crate) fn discard_corrupted(&self, key: &str, bytes: &Arc<[u8]>) -> Option<Removal<V>> {
    let mut state = self.state.lock();
    state.counters.transform_failures += 1;
    state.counters.hits = state.counters.hits.saturating_sub(1);
    state.counters.misses += 1;

    let still_stored = matches!(
      state.entries.get(key).map(|entry| &entry.value),
      Some(StoredValue::Encoded(stored)) if Arc::ptr_eq(stored, bytes)
    );
    if still_stored {
      state.remove_entry(key, EvictionReason::Corrupted)
    } else {
      None
    }
  }

  /// Admits a value, evicting through the active strategy until both bounds hold.
  ///
  /// Fails with [`CacheError::CapacityExceeded`] without inserting anything
  /// when the value is larger than the memory bound or the strategy runs out
  /// of victims.
  #[allow(clippy::too_many_arguments)]
  pub(crate) fn insert(
    &self,
    key: &str,
    value: StoredValue<V>,
    size_bytes: u64,
    opts: &SetOptions,
    origin: WriteOrigin,
    weights: &ScoreWeights,
    now: Duration,
  ) -> Result<Admitted<V>, CacheError> {
    let can_prefetch = origin != WriteOrigin::Background && self.loader.read().is_some();

    let mut guard = self.state.lock();
    let state = &mut *guard;

    let mut removals = Vec::new();
    let mut prefetch = Vec::new();
    self.make_room(state, key, size_bytes, weights, can_prefetch, now, &mut removals, &mut prefetch)?;

    let replaced = match state.entries.remove(key) {
      Some(old) => {
        state.counters.memory_bytes_used = state.counters.memory_bytes_used.saturating_sub(old.size_bytes);
        true
      }
      None => false,
    };

    let ttl = opts.resolve_ttl(state.config.default_ttl);
    let priority = opts.priority.unwrap_or_default();
    let tags: BTreeSet<String> = opts.tags.iter().cloned().collect();
    let entry = CacheEntry::new(key.to_string(), value, size_bytes, now, ttl, priority, tags);
    let metadata = entry.metadata();
    state.entries.insert(key.to_string(), entry);
    state.counters.memory_bytes_used += size_bytes;
    state.counters.last_access_at = Some(now);

    let kind = match origin {
      WriteOrigin::Set | WriteOrigin::Background => {
        state.counters.sets += 1;
        AccessKind::Set
      }
      WriteOrigin::Restore => {
        state.counters.hits += 1;
        state.counters.restored += 1;
        AccessKind::Hit
      }
    };
    state.predictor.update_pattern(key, kind, now);

    if !prefetch.is_empty() {
      state.counters.prefetch_requests += prefetch.len() as u64;
    }

    Ok(Admitted {
      replaced,
      removals,
      prefetch,
      metadata,
    })
  }

  #[allow(clippy::too_many_arguments)]
  fn make_room(
    &self,
    state: &mut InstanceState<V>,
    key: &str,
    size_bytes: u64,
    weights: &ScoreWeights,
    can_prefetch: bool,
    now: Duration,
    removals: &mut Vec<Removal<V>>,
    prefetch: &mut Vec<String>,
  ) -> Result<(), CacheError> {
    if size_bytes > state.config.max_memory_bytes {
      return Err(self.capacity_exceeded(state, key, size_bytes));
    }
    if !state.needs_room(key, size_bytes) {
      return Ok(());
    }

    // Expired entries are free to reclaim before any live entry is touched.
    removals.extend(state.remove_expired(now, Some(key)));

    let mut idle_rounds = 0;
    while state.needs_room(key, size_bytes) {
      let strategy = state.config.strategy;
      let (selection, requested) = {
        let mut ctx = EvictionContext {
          entries: &state.entries,
          predictor: &state.predictor,
          weights,
          now,
          protected: Some(key),
          can_prefetch,
          prefetch: Vec::new(),
        };
        let selection = strategy.select_victim(&mut ctx);
        (selection, ctx.prefetch)
      };

      for wanted in requested {
        if !prefetch.contains(&wanted) {
          prefetch.push(wanted);
        }
      }

      let freed = match selection {
        Selection::Victim(victim) => match state.remove_entry(&victim, EvictionReason::Capacity) {
          Some(removal) => {
            debug!(cache = %self.name, key = %removal.key, %strategy, "evicted entry");
            removals.push(removal);
            true
          }
          None => false,
        },
        Selection::Expired(keys) => {
          let before = removals.len();
          for expired in keys {
            if let Some(removal) = state.remove_entry(&expired, EvictionReason::Expired) {
              removals.push(removal);
            }
          }
          removals.len() > before
        }
        Selection::NoVictim => false,
      };

      if freed {
        idle_rounds = 0;
      } else {
        idle_rounds += 1;
        if idle_rounds >= MAX_IDLE_ROUNDS {
          return Err(self.capacity_exceeded(state, key, size_bytes));
        }
      }
    }

    Ok(())
  }

  fn capacity_exceeded(&self, state: &InstanceState<V>, key: &str, size_bytes: u64) -> CacheError {
    CacheError::CapacityExceeded {
      cache: self.name.clone(),
      key: key.to_string(),
      size_bytes,
      max_entries: state.config.max_entries,
      max_memory_bytes: state.config.max_memory_bytes,
    }
  }

  pub(crate) fn delete(&self, key: &str) -> Option<Removal<V>> {
    let mut state = self.state.lock();
    let removal = state.remove_entry(key, EvictionReason::Invalidated)?;
    state.counters.deletes += 1;
    Some(removal)
  }

  /// Drops every entry. Pattern records and counters are kept.
  pub(crate) fn clear(&self) -> usize {
    let mut state = self.state.lock();
    let removed = state.entries.len();
    state.entries.clear();
    state.counters.memory_bytes_used = 0;
    removed
  }

  pub(crate) fn invalidate_tag(&self, tag: &str) -> Vec<Removal<V>> {
    let mut state = self.state.lock();
    let mut keys: Vec<String> = state
      .entries
      .values()
      .filter(|entry| entry.tags.contains(tag))
      .map(|entry| entry.key.clone())
      .collect();
    keys.sort();

    let removals: Vec<Removal<V>> = keys
      .iter()
      .filter_map(|key| state.remove_entry(key, EvictionReason::Invalidated))
      .collect();
    state.counters.deletes += removals.len() as u64;
    removals
  }

  /// Whether `key` holds a live entry. Does not count as an access.
  pub(crate) fn contains(&self, key: &str, now: Duration) -> bool {
    self
      .state
      .lock()
      .entries
      .get(key)
      .is_some_and(|entry| !entry.is_expired(now))
  }

  pub(crate) fn len(&self) -> usize {
    self.state.lock().entries.len()
  }

  pub(crate) fn strategy(&self) -> StrategyKind {
    self.state.lock().config.strategy
  }

  /// Installs `strategy`, returning the one it replaced.
  pub(crate) fn set_strategy(&self, strategy: StrategyKind) -> StrategyKind {
    let mut state = self.state.lock();
    let previous = std::mem::replace(&mut state.config.strategy, strategy);
    if previous != strategy {
      state.counters.strategy_switches += 1;
    }
    previous
  }

  pub(crate) fn record_hint(&self, key: &str, kind: AccessKind, now: Duration) {
    self.state.lock().predictor.update_pattern(key, kind, now);
  }

  pub(crate) fn access_pattern(&self, key: &str) -> Option<AccessPatternRecord> {
    self.state.lock().predictor.record(key).cloned()
  }

  pub(crate) fn predict_usage(&self, key: &str, now: Duration) -> f64 {
    self.state.lock().predictor.predict_usage(key, now)
  }

  pub(crate) fn predictions(&self, now: Duration) -> Vec<PredictionRecord> {
    self.state.lock().predictor.predictions(now)
  }

  pub(crate) fn count_failure(&self, kind: FailureKind) {
    let mut state = self.state.lock();
    match kind {
      FailureKind::Load => state.counters.load_failures += 1,
      FailureKind::Transform => state.counters.transform_failures += 1,
      FailureKind::Persistence => state.counters.persistence_failures += 1,
    }
  }

  /// Expiry sweep, pattern pruning and self-tuning, in that order.
  ///
  /// Returns `None` when another pass already holds this instance.
  pub(crate) fn maintain(
    &self,
    now: Duration,
    thresholds: &TuningThresholds,
    pattern_max_idle: Duration,
  ) -> Option<MaintenanceOutcome<V>> {
    let _pass = self.maintenance.try_lock()?;
    let mut guard = self.state.lock();
    let state = &mut *guard;

    let expired = state.remove_expired(now, None);
    if !expired.is_empty() {
      debug!(cache = %self.name, removed = expired.len(), "expiry sweep");
    }

    let entries = &state.entries;
    let pruned_patterns = state
      .predictor
      .prune_idle(now, pattern_max_idle, |key| entries.contains_key(key));

    let mut switched = None;
    if state.config.auto_tune {
      let sample = TuningSample {
        hits: state.counters.hits,
        misses: state.counters.misses,
        len: state.entries.len(),
        max_entries: state.config.max_entries,
      };
      let current = state.config.strategy;
      if let Some(target) = tuning::recommend(thresholds, &sample, current) {
        state.config.strategy = target;
        state.counters.strategy_switches += 1;
        switched = Some((current, target));
      }
    }

    Some(MaintenanceOutcome {
      expired,
      switched,
      pruned_patterns,
    })
  }

  pub(crate) fn report(&self, now: Duration) -> InstanceReport {
    let state = self.state.lock();
    let counters = &state.counters;
    let item_count = state.entries.len();
    let average_item_size = if item_count == 0 {
      0
    } else {
      counters.memory_bytes_used / item_count as u64
    };

    InstanceReport {
      name: self.name.clone(),
      strategy: state.config.strategy,
      item_count,
      max_entries: state.config.max_entries,
      memory_bytes_used: counters.memory_bytes_used,
      max_memory_bytes: state.config.max_memory_bytes,
      hit_rate_percent: counters.hit_rate() * 100.0,
      memory_usage_percent: percent(
        counters.memory_bytes_used as f64,
        state.config.max_memory_bytes as f64,
      ),
      average_item_size,
      hits: counters.hits,
      misses: counters.misses,
      sets: counters.sets,
      deletes: counters.deletes,
      evicted_by_capacity: counters.evicted_by_capacity,
      evicted_by_ttl: counters.evicted_by_ttl,
      restored: counters.restored,
      prefetch_requests: counters.prefetch_requests,
      load_failures: counters.load_failures,
      transform_failures: counters.transform_failures,
      persistence_failures: counters.persistence_failures,
      strategy_switches: counters.strategy_switches,
      pattern_records: state.predictor.len(),
      uptime_secs: now.saturating_sub(counters.created_at).as_secs(),
      idle_secs: counters
        .last_access_at
        .map(|at| now.saturating_sub(at).as_secs()),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::entry::Priority;

  fn instance(config: CacheConfig) -> CacheInstance<u32> {
    CacheInstance::new("test".to_string(), config, None, 64, Duration::ZERO)
  }

  fn put(cache: &CacheInstance<u32>, key: &str, size: u64, now_ms: u64) -> Result<Admitted<u32>, CacheError> {
    cache.insert(
      key,
      StoredValue::Plain(Arc::new(1)),
      size,
      &SetOptions::new(),
      WriteOrigin::Set,
      &ScoreWeights::default(),
      Duration::from_millis(now_ms),
    )
  }

  #[test]
  fn replacing_a_key_never_evicts_it() {
    let cache = instance(CacheConfig::new().max_entries(1).strategy(StrategyKind::Recency));
    assert!(!put(&cache, "a", 10, 0).unwrap().replaced);
    let admitted = put(&cache, "a", 20, 1).unwrap();
    assert!(admitted.replaced);
    assert!(admitted.removals.is_empty());
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.report(Duration::ZERO).memory_bytes_used, 20);
  }

  #[test]
  fn memory_bound_evicts_until_the_value_fits() {
    let cache = instance(
      CacheConfig::new()
        .max_entries(10)
        .max_memory_bytes(100)
        .strategy(StrategyKind::Recency),
    );
    put(&cache, "a", 40, 0).unwrap();
    put(&cache, "b", 40, 1).unwrap();
    let admitted = put(&cache, "c", 70, 2).unwrap();

    let evicted: Vec<&str> = admitted.removals.iter().map(|r| r.key.as_str()).collect();
    assert_eq!(evicted, vec!["a", "b"]);
    assert_eq!(cache.report(Duration::ZERO).memory_bytes_used, 70);
  }

  #[test]
  fn oversize_values_are_refused_without_side_effects() {
    let cache = instance(CacheConfig::new().max_memory_bytes(50));
    put(&cache, "a", 10, 0).unwrap();
    assert!(matches!(
      put(&cache, "big", 51, 1),
      Err(CacheError::CapacityExceeded { .. })
    ));
    assert_eq!(cache.len(), 1);
  }

  #[test]
  fn expiry_strategy_refuses_when_nothing_has_expired() {
    let cache = instance(
      CacheConfig::new()
        .max_entries(1)
        .no_default_ttl()
        .strategy(StrategyKind::Expiry),
    );
    put(&cache, "a", 1, 0).unwrap();
    assert!(matches!(
      put(&cache, "b", 1, 1),
      Err(CacheError::CapacityExceeded { .. })
    ));
    assert!(cache.contains("a", Duration::from_millis(2)));
  }

  #[test]
  fn expired_entries_are_reclaimed_before_live_ones() {
    let cache = instance(
      CacheConfig::new()
        .max_entries(2)
        .default_ttl(Duration::from_millis(100))
        .strategy(StrategyKind::Recency),
    );
    put(&cache, "old", 1, 0).unwrap();
    cache
      .insert(
        "live",
        StoredValue::Plain(Arc::new(2)),
        1,
        &SetOptions::new().no_ttl(),
        WriteOrigin::Set,
        &ScoreWeights::default(),
        Duration::from_millis(1),
      )
      .unwrap();

    let admitted = put(&cache, "new", 1, 500).unwrap();
    assert_eq!(admitted.removals.len(), 1);
    assert_eq!(admitted.removals[0].key, "old");
    assert_eq!(admitted.removals[0].reason, EvictionReason::Expired);
    assert!(cache.contains("live", Duration::from_millis(500)));
  }

  #[test]
  fn lookup_of_an_expired_entry_is_a_miss() {
    let cache = instance(CacheConfig::new().default_ttl(Duration::from_millis(100)));
    put(&cache, "k", 1, 0).unwrap();

    match cache.lookup("k", Duration::from_millis(150)) {
      Lookup::Miss { expired: Some(removal) } => assert_eq!(removal.reason, EvictionReason::Expired),
      _ => panic!("expected an expired miss"),
    }
    let report = cache.report(Duration::from_millis(150));
    assert_eq!(report.misses, 1);
    assert_eq!(report.evicted_by_ttl, 1);
    assert_eq!(report.item_count, 0);
  }

  #[test]
  fn tag_invalidation_removes_only_tagged_entries() {
    let cache = instance(CacheConfig::new());
    let tagged = SetOptions::new().tag("user:1").priority(Priority::High);
    for key in ["a", "b"] {
      cache
        .insert(
          key,
          StoredValue::Plain(Arc::new(0)),
          1,
          &tagged,
          WriteOrigin::Set,
          &ScoreWeights::default(),
          Duration::ZERO,
        )
        .unwrap();
    }
    put(&cache, "c", 1, 0).unwrap();

    let removed: Vec<String> = cache.invalidate_tag("user:1").into_iter().map(|r| r.key).collect();
    assert_eq!(removed, vec!["a", "b"]);
    assert_eq!(cache.len(), 1);
  }

  #[test]
  fn maintenance_respects_auto_tune_flag() {
    let cache = instance(
      CacheConfig::new()
        .strategy(StrategyKind::Recency)
        .auto_tune(false),
    );
    put(&cache, "k", 1, 0).unwrap();
    for _ in 0..9 {
      let _ = cache.lookup("k", Duration::from_millis(1));
    }
    let outcome = cache
      .maintain(Duration::from_millis(2), &TuningThresholds::default(), Duration::from_secs(86_400))
      .unwrap();
    assert!(outcome.switched.is_none());
    assert_eq!(cache.strategy(), StrategyKind::Recency);
  }
}
