//! The engine: a registry of named cache instances and the operations that
//! route through it.
//!
//! [`CacheEngine`] is the user-facing handle. The state it shares with the
//! janitor and with background load threads lives in [`EngineShared`].

use crate::builder::EngineBuilder;
use crate::config::{CacheConfig, GetOptions, SetOptions};
use crate::entry::StoredValue;
use crate::error::{BoxError, CacheError, LoadError, PersistenceError, Result, TransformError};
use crate::instance::{CacheInstance, FailureKind, Lookup, WriteOrigin};
use crate::listener::{EvictionListener, EvictionReason, Removal};
use crate::loader::{LeaderGuard, LoadFuture, LoadOutcome};
use crate::metrics::GlobalMetrics;
use crate::persistence::{PersistenceAdapter, PersistenceErrorPolicy};
use crate::policy::{ScoreWeights, StrategyKind};
use crate::predictor::{AccessKind, AccessPatternRecord, PredictionRecord};
use crate::report::StatisticsReport;
use crate::task::janitor::Janitor;
use crate::task::prefetcher::{LoadQueue, LoadRequest, Prefetcher, MAX_QUEUED_LOADS};
use crate::time;
use crate::transform::ValueTransform;
use crate::tuning::{StrategySwitch, TuningThresholds};

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use ahash::{HashMap, HashMapExt};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// Estimates the size, in bytes, of a value stored without a transform.
pub(crate) type Weigher<V> = Arc<dyn Fn(&V) -> u64 + Send + Sync>;

/// Engine-wide settings fixed at build time.
pub(crate) struct EngineSettings<V> {
  pub(crate) maintenance_interval: Duration,
  pub(crate) score_weights: ScoreWeights,
  pub(crate) tuning_thresholds: TuningThresholds,
  pub(crate) pattern_capacity: usize,
  pub(crate) pattern_max_idle: Duration,
  pub(crate) weigher: Weigher<V>,
  pub(crate) persistence: Option<Arc<dyn PersistenceAdapter<V>>>,
  pub(crate) persistence_error_policy: PersistenceErrorPolicy,
  pub(crate) listener: Option<Arc<dyn EvictionListener<V>>>,
}

/// What one call to [`CacheEngine::run_maintenance`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaintenanceSummary {
  /// Instances that were swept and evaluated.
  pub instances: usize,
  /// Instances skipped because a previous pass still held them.
  pub skipped: usize,
  pub expired: usize,
  pub pruned_patterns: usize,
  pub strategy_switches: Vec<StrategySwitch>,
}

/// The state shared between the engine handle, the janitor thread and
/// the background loader.
pub(crate) struct EngineShared<V> {
  caches: RwLock<HashMap<String, Arc<CacheInstance<V>>>>,
  settings: EngineSettings<V>,
  metrics: GlobalMetrics,
  load_queue: Arc<LoadQueue<V>>,
  /// Held for the duration of a maintenance pass so overlapping ticks skip.
  maintenance: Mutex<()>,
  shut_down: AtomicBool,
}

/// Removes a key's pending-load slot when the leader finishes or unwinds.
struct PendingSlot<'a, V> {
  instance: &'a CacheInstance<V>,
  key: &'a str,
  future: &'a Arc<LoadFuture<V>>,
}

impl<V> Drop for PendingSlot<'_, V> {
  fn drop(&mut self) {
    let mut pending = self.instance.pending_loads.lock();
    if pending
      .get(self.key)
      .is_some_and(|current| Arc::ptr_eq(current, self.future))
    {
      pending.remove(self.key);
    }
  }
}

impl<V> EngineShared<V>
where
  V: Send + Sync + 'static,
{
  fn ensure_running(&self) -> Result<()> {
    if self.shut_down.load(Ordering::Acquire) {
      Err(CacheError::ShutDown)
    } else {
      Ok(())
    }
  }

  fn instance(&self, name: &str) -> Result<Arc<CacheInstance<V>>> {
    self.ensure_running()?;
    self
      .caches
      .read()
      .get(name)
      .cloned()
      .ok_or_else(|| CacheError::UnknownCache(name.to_string()))
  }

  fn create_cache(
    &self,
    name: &str,
    config: CacheConfig,
    transform: Option<Arc<dyn ValueTransform<V>>>,
  ) -> Result<()> {
    self.ensure_running()?;
    config.validate()?;
    if config.persistent && self.settings.persistence.is_none() {
      return Err(CacheError::invalid_config(
        "persistent",
        "the engine has no persistence adapter",
      ));
    }

    let mut caches = self.caches.write();
    if caches.contains_key(name) {
      return Err(CacheError::DuplicateName(name.to_string()));
    }

    info!(
      cache = name,
      strategy = %config.strategy,
      max_entries = config.max_entries,
      max_memory_bytes = config.max_memory_bytes,
      persistent = config.persistent,
      has_transform = transform.is_some(),
      "cache created"
    );
    let instance = CacheInstance::new(
      name.to_string(),
      config,
      transform,
      self.settings.pattern_capacity,
      time::now_duration(),
    );
    caches.insert(name.to_string(), Arc::new(instance));
    Ok(())
  }

  // --- Writes ---

  /// Transforms and sizes a value. Runs outside the instance lock.
  fn encode(
    &self,
    instance: &CacheInstance<V>,
    key: &str,
    value: Arc<V>,
    opts: &SetOptions,
  ) -> Result<(StoredValue<V>, u64)> {
    match instance.transform() {
      Some(transform) if opts.transform.unwrap_or(true) => match transform.serialize(&value) {
        Ok(bytes) => {
          let size = bytes.len() as u64;
          Ok((StoredValue::Encoded(Arc::from(bytes)), size))
        }
        Err(source) => {
          instance.count_failure(FailureKind::Transform);
          warn!(cache = instance.name(), key, error = %source, "value transform failed on write");
          Err(CacheError::Transform {
            key: key.to_string(),
            source,
          })
        }
      },
      _ => {
        let size = (self.settings.weigher)(&value);
        Ok((StoredValue::Plain(value), size))
      }
    }
  }

  fn size_of(&self, stored: &StoredValue<V>) -> u64 {
    match stored {
      StoredValue::Plain(value) => (self.settings.weigher)(value),
      StoredValue::Encoded(bytes) => bytes.len() as u64,
    }
  }

  /// Stores a value, returning `true` if the key was not present before.
  fn store(
    self: &Arc<Self>,
    instance: &Arc<CacheInstance<V>>,
    key: &str,
    value: Arc<V>,
    opts: &SetOptions,
    origin: WriteOrigin,
  ) -> Result<bool> {
    let (stored, size_bytes) = self.encode(instance, key, value, opts)?;
    let admitted = instance.insert(
      key,
      stored.clone(),
      size_bytes,
      opts,
      origin,
      &self.settings.score_weights,
      time::now_duration(),
    )?;

    let removed = self.dispatch_removals(instance, admitted.removals);
    self.schedule_loads(instance, admitted.prefetch);

    let saved = match &self.settings.persistence {
      Some(adapter) if instance.is_persistent() => adapter
        .save(instance.name(), key, &stored, &admitted.metadata)
        .or_else(|source| self.persistence_failed(instance, source)),
      _ => Ok(()),
    };

    removed.and(saved).map(|()| !admitted.replaced)
  }

  // --- Reads ---

  fn read(
    self: &Arc<Self>,
    instance: &Arc<CacheInstance<V>>,
    key: &str,
    opts: GetOptions,
  ) -> Result<Option<Arc<V>>> {
    let now = time::now_duration();
    let found = match instance.lookup(key, now) {
      Lookup::Hit(stored) => self.decode_hit(instance, key, stored)?,
      Lookup::Miss { expired } => {
        if let Some(removal) = expired {
          self.dispatch_removals(instance, vec![removal])?;
        }
        if instance.is_persistent() {
          self.restore(instance, key, now)?
        } else {
          None
        }
      }
    };

    match found {
      Some(_) => self.metrics.record_hit(),
      None => {
        self.metrics.record_miss();
        if opts.predictive_load {
          self.schedule_loads(instance, vec![key.to_string()]);
        }
      }
    }
    Ok(found)
  }

  fn decode(&self, instance: &CacheInstance<V>, stored: &StoredValue<V>) -> Result<Arc<V>, TransformError> {
    match stored {
      StoredValue::Plain(value) => Ok(Arc::clone(value)),
      StoredValue::Encoded(bytes) => match instance.transform() {
        Some(transform) => transform.deserialize(bytes).map(Arc::new),
        None => Err(TransformError::Deserialize(
          "encoded value but the cache has no transform".to_string(),
        )),
      },
    }
  }

  /// Decodes a hit. A value that fails to decode is dropped and reads as a miss.
  fn decode_hit(
    &self,
    instance: &CacheInstance<V>,
    key: &str,
    stored: StoredValue<V>,
  ) -> Result<Option<Arc<V>>> {
    match self.decode(instance, &stored) {
      Ok(value) => Ok(Some(value)),
      Err(error) => {
        warn!(cache = instance.name(), key, %error, "dropping entry that failed to decode");
        if let StoredValue::Encoded(bytes) = &stored {
          if let Some(removal) = instance.discard_corrupted(key, bytes) {
            self.dispatch_removals(instance, vec![removal])?;
          }
        }
        Ok(None)
      }
    }
  }

  /// Consults the persistence adapter after a miss on a persistent instance.
  fn restore(
    self: &Arc<Self>,
    instance: &Arc<CacheInstance<V>>,
    key: &str,
    now: Duration,
  ) -> Result<Option<Arc<V>>> {
    let Some(adapter) = &self.settings.persistence else {
      instance.record_miss(key, now);
      return Ok(None);
    };

    let (stored, metadata) = match adapter.load(instance.name(), key) {
      Ok(Some(found)) => found,
      Ok(None) => {
        instance.record_miss(key, now);
        return Ok(None);
      }
      Err(source) => {
        instance.record_miss(key, now);
        self.persistence_failed(instance, source)?;
        return Ok(None);
      }
    };

    let wall_now = SystemTime::now();
    if metadata.is_expired_at(wall_now) {
      debug!(cache = instance.name(), key, "persisted copy has expired");
      instance.record_miss(key, now);
      self.forget_persisted(instance, key)?;
      return Ok(None);
    }

    let value = match self.decode(instance, &stored) {
      Ok(value) => value,
      Err(error) => {
        instance.count_failure(FailureKind::Transform);
        instance.record_miss(key, now);
        warn!(cache = instance.name(), key, %error, "persisted value failed to decode");
        return Ok(None);
      }
    };

    let size_bytes = self.size_of(&stored);
    let opts = SetOptions::restoring(&metadata, wall_now);
    match instance.insert(
      key,
      stored,
      size_bytes,
      &opts,
      WriteOrigin::Restore,
      &self.settings.score_weights,
      now,
    ) {
      Ok(admitted) => {
        debug!(cache = instance.name(), key, "restored entry from persistence");
        let removed = self.dispatch_removals(instance, admitted.removals);
        self.schedule_loads(instance, admitted.prefetch);
        removed?;
      }
      Err(error) => {
        instance.record_uncached_hit(key, now);
        warn!(cache = instance.name(), key, %error, "restored value could not be cached");
      }
    }
    Ok(Some(value))
  }

  // --- Loads ---

  /// Read-through: returns the cached value or produces, stores and returns it.
  /// Concurrent callers for the same key share one producer call.
  fn load_through<F>(
    self: &Arc<Self>,
    instance: &Arc<CacheInstance<V>>,
    key: &str,
    producer: F,
  ) -> Result<Arc<V>>
  where
    F: FnOnce(&str) -> std::result::Result<V, BoxError>,
  {
    if let Some(value) = self.read(instance, key, GetOptions::default())? {
      return Ok(value);
    }

    let (future, is_leader) = {
      let mut pending = instance.pending_loads.lock();
      match pending.get(key) {
        Some(future) => (Arc::clone(future), false),
        None => {
          let future = Arc::new(LoadFuture::new());
          pending.insert(key.to_string(), Arc::clone(&future));
          (future, true)
        }
      }
    };

    let outcome = if is_leader {
      self.lead_load(instance, key, &future, WriteOrigin::Set, producer)
    } else {
      future.wait()
    };
    outcome.map_err(|source| CacheError::Load {
      key: key.to_string(),
      source,
    })
  }

  /// Runs the producer for a pending load this thread registered, stores the
  /// value and wakes every follower.
  fn lead_load<F>(
    self: &Arc<Self>,
    instance: &Arc<CacheInstance<V>>,
    key: &str,
    future: &Arc<LoadFuture<V>>,
    origin: WriteOrigin,
    producer: F,
  ) -> LoadOutcome<V>
  where
    F: FnOnce(&str) -> std::result::Result<V, BoxError>,
  {
    let slot = PendingSlot {
      instance,
      key,
      future,
    };
    let guard = LeaderGuard::new(future);

    let outcome: LoadOutcome<V> = match producer(key) {
      Ok(value) => Ok(Arc::new(value)),
      Err(error) => {
        instance.count_failure(FailureKind::Load);
        warn!(cache = instance.name(), key, %error, "value producer failed");
        Err(LoadError::from(error))
      }
    };

    if let Ok(value) = &outcome {
      if let Err(error) = self.store(instance, key, Arc::clone(value), &SetOptions::default(), origin) {
        warn!(cache = instance.name(), key, %error, "loaded value was not cached");
      }
    }

    drop(slot);
    guard.complete(outcome.clone());
    outcome
  }

  /// Queues `keys` for the background loader. Keys already cached or
  /// already loading are skipped, and so are keys that find the queue full.
  fn schedule_loads(&self, instance: &Arc<CacheInstance<V>>, keys: Vec<String>) {
    if keys.is_empty() || instance.loader().is_none() {
      return;
    }

    let now = time::now_duration();
    for key in keys {
      if instance.contains(&key, now) || instance.pending_loads.lock().contains_key(&key) {
        continue;
      }
      self.load_queue.push(LoadRequest {
        instance: Arc::clone(instance),
        key,
      });
    }
  }

  /// Runs one queued load on the background loader thread.
  pub(crate) fn background_load(self: &Arc<Self>, instance: &Arc<CacheInstance<V>>, key: &str) {
    if self.ensure_running().is_err() || instance.contains(key, time::now_duration()) {
      return;
    }
    let Some(loader) = instance.loader() else {
      return;
    };

    let future = {
      let mut pending = instance.pending_loads.lock();
      if pending.contains_key(key) {
        return;
      }
      let future = Arc::new(LoadFuture::new());
      pending.insert(key.to_string(), Arc::clone(&future));
      future
    };

    debug!(cache = instance.name(), key, "background load");
    let _ = self
      .lead_load(instance, key, &future, WriteOrigin::Background, |key| loader(key));
  }

  // --- Removals ---

  /// Notifies the listener and drops persisted copies for removed entries.
  ///
  /// Capacity evictions keep their persisted copy so a later miss can restore
  /// it. Every removal is dispatched; the first persistence error is returned.
  fn dispatch_removals(&self, instance: &CacheInstance<V>, removals: Vec<Removal<V>>) -> Result<()> {
    let mut outcome = Ok(());
    for removal in removals {
      if removal.reason != EvictionReason::Capacity {
        let forgotten = self.forget_persisted(instance, &removal.key);
        if outcome.is_ok() {
          outcome = forgotten;
        }
      }
      if let Some(listener) = &self.settings.listener {
        listener.on_evict(instance.name(), &removal.key, removal.value, removal.reason);
      }
    }
    outcome
  }

  fn forget_persisted(&self, instance: &CacheInstance<V>, key: &str) -> Result<()> {
    if !instance.is_persistent() {
      return Ok(());
    }
    match &self.settings.persistence {
      Some(adapter) => match adapter.delete(instance.name(), key) {
        Ok(()) => Ok(()),
        Err(source) => self.persistence_failed(instance, source),
      },
      None => Ok(()),
    }
  }

  fn clear_persisted(&self, instance: &CacheInstance<V>) -> Result<()> {
    if !instance.is_persistent() {
      return Ok(());
    }
    match &self.settings.persistence {
      Some(adapter) => match adapter.clear(instance.name()) {
        Ok(()) => Ok(()),
        Err(source) => self.persistence_failed(instance, source),
      },
      None => Ok(()),
    }
  }

  /// Applies the persistence error policy to an adapter failure.
  fn persistence_failed(&self, instance: &CacheInstance<V>, source: PersistenceError) -> Result<()> {
    instance.count_failure(FailureKind::Persistence);
    match self.settings.persistence_error_policy {
      PersistenceErrorPolicy::LogAndContinue => {
        warn!(cache = instance.name(), error = %source, "persistence adapter failed");
        Ok(())
      }
      PersistenceErrorPolicy::Strict => Err(CacheError::Persistence {
        cache: instance.name().to_string(),
        source,
      }),
    }
  }

  // --- Maintenance ---

  pub(crate) fn run_maintenance(&self) -> Option<MaintenanceSummary> {
    if self.shut_down.load(Ordering::Acquire) {
      return None;
    }
    let _pass = self.maintenance.try_lock()?;

    let instances: Vec<Arc<CacheInstance<V>>> = self.caches.read().values().cloned().collect();
    let now = time::now_duration();
    let mut summary = MaintenanceSummary::default();

    for instance in instances {
      let Some(outcome) = instance.maintain(
        now,
        &self.settings.tuning_thresholds,
        self.settings.pattern_max_idle,
      ) else {
        summary.skipped += 1;
        continue;
      };

      summary.instances += 1;
      summary.expired += outcome.expired.len();
      summary.pruned_patterns += outcome.pruned_patterns;

      if let Err(error) = self.dispatch_removals(&instance, outcome.expired) {
        warn!(cache = instance.name(), %error, "expiry sweep could not update persistence");
      }

      if let Some((from, to)) = outcome.switched {
        info!(cache = instance.name(), %from, %to, "self-tuning switched eviction strategy");
        summary.strategy_switches.push(StrategySwitch {
          cache: instance.name().to_string(),
          from,
          to,
        });
      }
    }

    debug!(
      instances = summary.instances,
      skipped = summary.skipped,
      expired = summary.expired,
      pruned_patterns = summary.pruned_patterns,
      "maintenance pass finished"
    );
    Some(summary)
  }
}

/// An adaptive, multi-instance in-process cache engine.
///
/// Each named instance holds string keys and values of type `V`, bounded by
/// both an entry count and an estimated memory size. Values are handed out as
/// shared `Arc<V>`s. All methods take `&self`; wrap the engine in an `Arc` to
/// share it between threads.
///
/// Dropping the engine shuts it down and stops its background threads.
pub struct CacheEngine<V> {
  shared: Arc<EngineShared<V>>,
  janitor: Mutex<Option<Janitor>>,
  prefetcher: Mutex<Option<Prefetcher<V>>>,
}

impl<V> fmt::Debug for CacheEngine<V> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CacheEngine")
      .field("caches", &self.shared.caches.read().len())
      .field("maintenance_interval", &self.shared.settings.maintenance_interval)
      .field("shut_down", &self.shared.shut_down.load(Ordering::Relaxed))
      .finish_non_exhaustive()
  }
}

impl<V> CacheEngine<V>
where
  V: Send + Sync + 'static,
{
  /// Returns a builder for configuring the engine.
  pub fn builder() -> EngineBuilder<V> {
    EngineBuilder::new()
  }

  pub(crate) fn from_settings(settings: EngineSettings<V>, start_janitor: bool) -> Self {
    let interval = settings.maintenance_interval;
    let load_queue = Arc::new(LoadQueue::new(MAX_QUEUED_LOADS));
    let shared = Arc::new(EngineShared {
      caches: RwLock::new(HashMap::new()),
      settings,
      metrics: GlobalMetrics::new(),
      load_queue: Arc::clone(&load_queue),
      maintenance: Mutex::new(()),
      shut_down: AtomicBool::new(false),
    });
    let janitor = start_janitor.then(|| Janitor::spawn(Arc::downgrade(&shared), interval));
    let prefetcher = Prefetcher::spawn(Arc::downgrade(&shared), load_queue);

    Self {
      shared,
      janitor: Mutex::new(janitor),
      prefetcher: Mutex::new(Some(prefetcher)),
    }
  }

  // --- Registry ---

  /// Registers a new instance.
  ///
  /// Fails with [`CacheError::DuplicateName`] if `name` is taken and with
  /// [`CacheError::InvalidConfig`] for zero bounds, or for a persistent
  /// instance on an engine without a persistence adapter.
  pub fn create_cache(&self, name: &str, config: CacheConfig) -> Result<()> {
    self.shared.create_cache(name, config, None)
  }

  /// Registers a new instance whose values pass through `transform` on every
  /// write and read.
  pub fn create_cache_with_transform(
    &self,
    name: &str,
    config: CacheConfig,
    transform: impl ValueTransform<V> + 'static,
  ) -> Result<()> {
    self.shared.create_cache(name, config, Some(Arc::new(transform)))
  }

  /// Unregisters an instance, dropping its entries, patterns and persisted copies.
  pub fn remove_cache(&self, name: &str) -> Result<()> {
    self.shared.ensure_running()?;
    let removed = self
      .shared
      .caches
      .write()
      .remove(name)
      .ok_or_else(|| CacheError::UnknownCache(name.to_string()))?;
    let entries = removed.clear();
    info!(cache = name, entries, "cache removed");
    self.shared.clear_persisted(&removed)
  }

  /// Names of all registered instances, sorted.
  pub fn cache_names(&self) -> Vec<String> {
    let mut names: Vec<String> = self.shared.caches.read().keys().cloned().collect();
    names.sort();
    names
  }

  /// Returns the configuration an instance currently runs with, including
  /// any strategy the tuner has switched to.
  pub fn config(&self, name: &str) -> Result<CacheConfig> {
    Ok(self.shared.instance(name)?.config())
  }

  // --- Writes ---

  /// Inserts or replaces `key` with the instance defaults.
  ///
  /// Returns `true` if the key was new and `false` if an existing entry was
  /// replaced.
  pub fn set(&self, name: &str, key: &str, value: V) -> Result<bool> {
    self.set_with(name, key, value, SetOptions::default())
  }

  /// Inserts or replaces `key`, overriding TTL, priority, tags or transform use.
  ///
  /// Capacity is enforced before insertion. If the active strategy cannot
  /// make room, [`CacheError::CapacityExceeded`] is returned and the entry is
  /// not inserted.
  pub fn set_with(&self, name: &str, key: &str, value: V, opts: SetOptions) -> Result<bool> {
    let started = Instant::now();
    let instance = self.shared.instance(name)?;
    let result = self
      .shared
      .store(&instance, key, Arc::new(value), &opts, WriteOrigin::Set);
    self.shared.metrics.record_request(started);
    result
  }

  /// Removes `key`. Returns `false` if it was not cached.
  pub fn delete(&self, name: &str, key: &str) -> Result<bool> {
    let instance = self.shared.instance(name)?;
    match instance.delete(key) {
      Some(removal) => {
        self.shared.dispatch_removals(&instance, vec![removal])?;
        Ok(true)
      }
      None => {
        self.shared.forget_persisted(&instance, key)?;
        Ok(false)
      }
    }
  }

  /// Removes every entry of an instance and its persisted copies. Returns the
  /// number of entries removed. Access patterns and counters survive.
  pub fn clear(&self, name: &str) -> Result<usize> {
    let instance = self.shared.instance(name)?;
    let removed = instance.clear();
    debug!(cache = name, removed, "cache cleared");
    self.shared.clear_persisted(&instance)?;
    Ok(removed)
  }

  /// Removes every entry tagged with `tag`. Returns the number removed.
  pub fn invalidate_tag(&self, name: &str, tag: &str) -> Result<usize> {
    let instance = self.shared.instance(name)?;
    let removals = instance.invalidate_tag(tag);
    let removed = removals.len();
    self.shared.dispatch_removals(&instance, removals)?;
    Ok(removed)
  }

  // --- Reads ---

  /// Returns the value for `key`, or `None` if it is missing or expired.
  pub fn get(&self, name: &str, key: &str) -> Result<Option<Arc<V>>> {
    self.get_with_options(name, key, GetOptions::default())
  }

  /// Like [`get`](Self::get), with per-call options.
  pub fn get_with_options(&self, name: &str, key: &str, opts: GetOptions) -> Result<Option<Arc<V>>> {
    let started = Instant::now();
    let instance = self.shared.instance(name)?;
    let result = self.shared.read(&instance, key, opts);
    self.shared.metrics.record_request(started);
    result
  }

  /// Returns the cached value or computes it with the instance's registered
  /// loader. Concurrent misses on the same key share a single loader call.
  pub fn get_or_load(&self, name: &str, key: &str) -> Result<Arc<V>> {
    let started = Instant::now();
    let instance = self.shared.instance(name)?;
    let loader = instance
      .loader()
      .ok_or_else(|| CacheError::NoLoader(name.to_string()))?;
    let result = self.shared.load_through(&instance, key, |key| loader(key));
    self.shared.metrics.record_request(started);
    result
  }

  /// Returns the cached value or computes it with `producer`.
  ///
  /// If another thread is already computing the same key, this call waits for
  /// that result instead of running `producer`.
  pub fn get_with<F, E>(&self, name: &str, key: &str, producer: F) -> Result<Arc<V>>
  where
    F: FnOnce(&str) -> std::result::Result<V, E>,
    E: Into<BoxError>,
  {
    let started = Instant::now();
    let instance = self.shared.instance(name)?;
    let result = self
      .shared
      .load_through(&instance, key, |key| producer(key).map_err(Into::into));
    self.shared.metrics.record_request(started);
    result
  }

  /// Whether `key` holds a live entry. Does not count as an access.
  pub fn contains(&self, name: &str, key: &str) -> Result<bool> {
    Ok(self.shared.instance(name)?.contains(key, time::now_duration()))
  }

  /// The number of entries held, including expired ones not yet swept.
  pub fn len(&self, name: &str) -> Result<usize> {
    Ok(self.shared.instance(name)?.len())
  }

  /// Registers the value producer used by [`get_or_load`](Self::get_or_load)
  /// and by prefetching. Replaces any previous loader.
  pub fn register_loader<F, E>(&self, name: &str, loader: F) -> Result<()>
  where
    F: Fn(&str) -> std::result::Result<V, E> + Send + Sync + 'static,
    E: Into<BoxError>,
  {
    let instance = self.shared.instance(name)?;
    instance.set_loader(Arc::new(
      move |key: &str| -> std::result::Result<V, BoxError> { loader(key).map_err(Into::into) },
    ));
    Ok(())
  }

  // --- Strategy and prediction ---

  pub fn strategy(&self, name: &str) -> Result<StrategyKind> {
    Ok(self.shared.instance(name)?.strategy())
  }

  /// Switches the eviction strategy by hand. Affects future evictions only.
  pub fn set_strategy(&self, name: &str, strategy: StrategyKind) -> Result<()> {
    let previous = self.shared.instance(name)?.set_strategy(strategy);
    if previous != strategy {
      info!(cache = name, from = %previous, to = %strategy, "eviction strategy set");
    }
    Ok(())
  }

  /// Feeds an external usage signal, such as one from host analytics, into
  /// the key's access pattern.
  pub fn record_hint(&self, name: &str, key: &str, hint: AccessKind) -> Result<()> {
    self
      .shared
      .instance(name)?
      .record_hint(key, hint, time::now_duration());
    Ok(())
  }

  pub fn access_pattern(&self, name: &str, key: &str) -> Result<Option<AccessPatternRecord>> {
    Ok(self.shared.instance(name)?.access_pattern(key))
  }

  /// The reuse confidence of `key`, in `[0, 1]`. Unseen keys return 0.5.
  pub fn predict_usage(&self, name: &str, key: &str) -> Result<f64> {
    Ok(
      self
        .shared
        .instance(name)?
        .predict_usage(key, time::now_duration()),
    )
  }

  /// Predictions for every tracked key, most likely first.
  pub fn predictions(&self, name: &str) -> Result<Vec<PredictionRecord>> {
    Ok(self.shared.instance(name)?.predictions(time::now_duration()))
  }

  // --- Diagnostics and lifecycle ---

  /// A read-only report for one instance, or for all of them with `None`.
  ///
  /// Available after [`shutdown`](Self::shutdown).
  pub fn get_statistics(&self, name: Option<&str>) -> Result<StatisticsReport> {
    let now = time::now_duration();
    let instances = match name {
      Some(name) => {
        let instance = self
          .shared
          .caches
          .read()
          .get(name)
          .cloned()
          .ok_or_else(|| CacheError::UnknownCache(name.to_string()))?;
        vec![instance.report(now)]
      }
      None => {
        let all: Vec<Arc<CacheInstance<V>>> = self.shared.caches.read().values().cloned().collect();
        all.iter().map(|instance| instance.report(now)).collect()
      }
    };
    Ok(StatisticsReport::build(instances, self.shared.metrics.snapshot()))
  }

  /// Runs one maintenance pass now: expiry sweep, pattern pruning and
  /// self-tuning for every instance.
  ///
  /// Returns `None` if another pass is in progress or the engine is shut down.
  pub fn run_maintenance(&self) -> Option<MaintenanceSummary> {
    self.shared.run_maintenance()
  }

  /// Stops background maintenance and loading, and rejects further
  /// operations with [`CacheError::ShutDown`]. Queued background loads are
  /// discarded; one already running is waited for. Persisted copies are left
  /// in place.
  pub fn shutdown(&self) {
    if self.shared.shut_down.swap(true, Ordering::AcqRel) {
      return;
    }
    self.stop_tasks();
    info!("cache engine shut down");
  }

  pub fn is_shut_down(&self) -> bool {
    self.shared.shut_down.load(Ordering::Acquire)
  }
}

impl<V> CacheEngine<V> {
  fn stop_tasks(&self) {
    if let Some(janitor) = self.janitor.lock().take() {
      janitor.stop();
    }
    if let Some(prefetcher) = self.prefetcher.lock().take() {
      prefetcher.stop();
    }
  }
}

impl<V> Drop for CacheEngine<V> {
  fn drop(&mut self) {
    self.shared.shut_down.store(true, Ordering::Release);
    self.stop_tasks();
  }
}
