pub mod maintenance_interval;

use crate::engine::{CacheEngine, EngineSettings, Weigher};
use crate::error::{CacheError, Result};
use crate::listener::EvictionListener;
use crate::persistence::{PersistenceAdapter, PersistenceErrorPolicy};
use crate::policy::ScoreWeights;
use crate::predictor::DEFAULT_PATTERN_CAPACITY;
use crate::tuning::TuningThresholds;

use core::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Pattern records idle for longer than this, whose key is not cached, are
/// dropped during maintenance.
pub const DEFAULT_PATTERN_MAX_IDLE: Duration = Duration::from_secs(24 * 60 * 60);

/// A builder for creating a [`CacheEngine`].
///
/// Instances are registered on the built engine with
/// [`CacheEngine::create_cache`]; the builder only holds engine-wide settings.
pub struct EngineBuilder<V> {
  maintenance_interval: Duration,
  janitor: bool,
  score_weights: ScoreWeights,
  tuning_thresholds: TuningThresholds,
  pattern_capacity: usize,
  pattern_max_idle: Duration,
  weigher: Option<Weigher<V>>,
  persistence: Option<Arc<dyn PersistenceAdapter<V>>>,
  persistence_error_policy: PersistenceErrorPolicy,
  listener: Option<Arc<dyn EvictionListener<V>>>,
}

// Manual Debug implementation for EngineBuilder.
impl<V> fmt::Debug for EngineBuilder<V> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("EngineBuilder")
      .field("maintenance_interval", &self.maintenance_interval)
      .field("janitor", &self.janitor)
      .field("score_weights", &self.score_weights)
      .field("tuning_thresholds", &self.tuning_thresholds)
      .field("pattern_capacity", &self.pattern_capacity)
      .field("has_weigher", &self.weigher.is_some())
      .field("has_persistence", &self.persistence.is_some())
      .field("persistence_error_policy", &self.persistence_error_policy)
      .field("has_listener", &self.listener.is_some())
      .finish_non_exhaustive()
  }
}

impl<V> Default for EngineBuilder<V> {
  fn default() -> Self {
    Self {
      maintenance_interval: maintenance_interval::BALANCED,
      janitor: true,
      score_weights: ScoreWeights::default(),
      tuning_thresholds: TuningThresholds::default(),
      pattern_capacity: DEFAULT_PATTERN_CAPACITY,
      pattern_max_idle: DEFAULT_PATTERN_MAX_IDLE,
      weigher: None,
      persistence: None,
      persistence_error_policy: PersistenceErrorPolicy::default(),
      listener: None,
    }
  }
}

impl<V> EngineBuilder<V>
where
  V: Send + Sync + 'static,
{
  /// Creates a new `EngineBuilder` with default settings.
  pub fn new() -> Self {
    Self::default()
  }

  /// Sets the period of the background maintenance pass (expiry sweep,
  /// pattern pruning and self-tuning).
  ///
  /// See the [`maintenance_interval`] module for presets.
  pub fn maintenance_interval(mut self, interval: Duration) -> Self {
    self.maintenance_interval = interval;
    self
  }

  /// Enables or disables the background maintenance thread.
  ///
  /// Without it, maintenance only happens through
  /// [`CacheEngine::run_maintenance`].
  pub fn janitor(mut self, enabled: bool) -> Self {
    self.janitor = enabled;
    self
  }

  /// Sets the weights of the weighted-score retention formula.
  pub fn score_weights(mut self, weights: ScoreWeights) -> Self {
    self.score_weights = weights;
    self
  }

  /// Sets the thresholds the self-tuning controller switches strategies on.
  pub fn tuning_thresholds(mut self, thresholds: TuningThresholds) -> Self {
    self.tuning_thresholds = thresholds;
    self
  }

  /// Sets how many access pattern records each instance keeps.
  pub fn pattern_capacity(mut self, capacity: usize) -> Self {
    self.pattern_capacity = capacity;
    self
  }

  /// Sets how long a pattern record for an uncached key survives without access.
  pub fn pattern_max_idle(mut self, max_idle: Duration) -> Self {
    self.pattern_max_idle = max_idle;
    self
  }

  /// Sets the function estimating the size, in bytes, of a value stored
  /// without a transform. Transformed values are sized by their encoding.
  ///
  /// Defaults to `size_of::<V>()`.
  pub fn weigher(mut self, weigher: impl Fn(&V) -> u64 + Send + Sync + 'static) -> Self {
    self.weigher = Some(Arc::new(weigher));
    self
  }

  /// Sets the adapter that mirrors writes of persistent instances.
  pub fn persistence(mut self, adapter: impl PersistenceAdapter<V> + 'static) -> Self {
    self.persistence = Some(Arc::new(adapter));
    self
  }

  /// Shares an adapter the caller keeps a handle to.
  pub fn persistence_arc(mut self, adapter: Arc<dyn PersistenceAdapter<V>>) -> Self {
    self.persistence = Some(adapter);
    self
  }

  /// Sets whether adapter failures are logged or returned.
  pub fn persistence_error_policy(mut self, policy: PersistenceErrorPolicy) -> Self {
    self.persistence_error_policy = policy;
    self
  }

  /// Sets an eviction listener for the engine.
  pub fn eviction_listener(mut self, listener: impl EvictionListener<V> + 'static) -> Self {
    self.listener = Some(Arc::new(listener));
    self
  }

  fn validate(&self) -> Result<()> {
    if let Some(err) = CacheError::zero_duration("maintenance_interval", self.maintenance_interval) {
      return Err(err);
    }
    if let Some(err) = CacheError::zero_duration("pattern_max_idle", self.pattern_max_idle) {
      return Err(err);
    }
    if self.pattern_capacity == 0 {
      return Err(CacheError::invalid_config("pattern_capacity", "must be at least 1"));
    }
    if !self.score_weights.is_valid() {
      return Err(CacheError::invalid_config(
        "score_weights",
        "weights must be finite and non-negative",
      ));
    }
    if !self.tuning_thresholds.is_valid() {
      return Err(CacheError::invalid_config(
        "tuning_thresholds",
        "thresholds must lie within [0, 1]",
      ));
    }
    Ok(())
  }

  /// Builds the engine and, unless disabled, starts its maintenance thread.
  pub fn build(self) -> Result<CacheEngine<V>> {
    self.validate()?;

    let weigher: Weigher<V> = match self.weigher {
      Some(weigher) => weigher,
      None => Arc::new(|_: &V| std::mem::size_of::<V>() as u64),
    };

    let settings = EngineSettings {
      maintenance_interval: self.maintenance_interval,
      score_weights: self.score_weights,
      tuning_thresholds: self.tuning_thresholds,
      pattern_capacity: self.pattern_capacity,
      pattern_max_idle: self.pattern_max_idle,
      weigher,
      persistence: self.persistence,
      persistence_error_policy: self.persistence_error_policy,
      listener: self.listener,
    };

    Ok(CacheEngine::from_settings(settings, self.janitor))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn zero_interval_is_rejected() {
    let result = EngineBuilder::<u32>::new()
      .maintenance_interval(Duration::ZERO)
      .build();
    assert!(matches!(result, Err(CacheError::InvalidConfig { .. })));
  }

  #[test]
  fn negative_weights_are_rejected() {
    let weights = ScoreWeights {
      recency: -1.0,
      ..ScoreWeights::default()
    };
    let result = EngineBuilder::<u32>::new().score_weights(weights).build();
    assert!(matches!(result, Err(CacheError::InvalidConfig { .. })));
  }

  #[test]
  fn out_of_range_thresholds_are_rejected() {
    let thresholds = TuningThresholds {
      high_hit_rate: 1.5,
      ..TuningThresholds::default()
    };
    let result = EngineBuilder::<u32>::new()
      .janitor(false)
      .tuning_thresholds(thresholds)
      .build();
    assert!(matches!(result, Err(CacheError::InvalidConfig { .. })));
  }
}
