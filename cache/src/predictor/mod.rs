//! Per-instance access pattern tracking and reuse prediction.
//!
//! Every operation on a key feeds its [`AccessPatternRecord`]. The predictor
//! turns a record into a reuse confidence in `[0, 1]`, which weighted-score
//! eviction blends into its retention score and predictive prefetch uses to
//! rank keys worth loading ahead of demand.

pub(crate) mod lru_index;
pub mod tracker;

use crate::time;
use lru_index::LruIndex;
pub use tracker::{AccessKind, AccessPatternRecord, Trend};

use std::cmp::Ordering;
use std::time::Duration;

use ahash::{HashMap, HashMapExt};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Default maximum number of pattern records kept per instance.
pub const DEFAULT_PATTERN_CAPACITY: usize = 10_000;
/// Confidence reported for keys the predictor has never seen.
pub const NEUTRAL_CONFIDENCE: f64 = 0.5;

const ONE_HOUR_MS: f64 = 3_600_000.0;
const ONE_DAY_MS: f64 = 86_400_000.0;

/// A derived reuse estimate for one key.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PredictionRecord {
  pub key: String,
  pub confidence: f64,
  /// Offset from the engine epoch.
  pub computed_at: Duration,
}

/// Computes a reuse confidence from a record as seen at `now`.
pub(crate) fn confidence_for(record: &AccessPatternRecord, now: Duration) -> f64 {
  let mut confidence = NEUTRAL_CONFIDENCE;

  let frequency = record.frequency_score();
  if frequency > 0.7 {
    confidence += 0.2;
  } else if frequency < 0.3 {
    confidence -= 0.2;
  }

  let idle_ms = time::millis_between(record.last_access_at, now);
  if idle_ms < ONE_HOUR_MS {
    confidence += 0.15;
  } else if idle_ms > ONE_DAY_MS {
    confidence -= 0.15;
  }

  match record.trend() {
    Trend::Increasing => confidence += 0.1,
    Trend::Decreasing => confidence -= 0.1,
    Trend::Stable => {}
  }

  confidence.clamp(0.0, 1.0)
}

/// Pattern records for one instance, bounded by an LRU limit. Confidences
/// are derived from a record on demand.
#[derive(Debug)]
pub(crate) struct UsagePredictor {
  patterns: HashMap<String, AccessPatternRecord>,
  order: LruIndex<String>,
  capacity: usize,
}

impl UsagePredictor {
  pub(crate) fn new(capacity: usize) -> Self {
    Self {
      patterns: HashMap::new(),
      order: LruIndex::new(),
      capacity: capacity.max(1),
    }
  }

  /// Records one operation against the key's pattern.
  pub(crate) fn update_pattern(&mut self, key: &str, kind: AccessKind, now: Duration) {
    let key = key.to_string();
    self
      .patterns
      .entry(key.clone())
      .or_insert_with(|| AccessPatternRecord::new(now))
      .record(kind, now);

    self.order.touch(&key);
    while self.order.len() > self.capacity {
      match self.order.pop_back() {
        Some(victim) => {
          self.patterns.remove(&victim);
        }
        None => break,
      }
    }
  }

  /// The reuse confidence for `key` at `now`, or the neutral prior if unseen.
  pub(crate) fn predict_usage(&self, key: &str, now: Duration) -> f64 {
    self
      .patterns
      .get(key)
      .map_or(NEUTRAL_CONFIDENCE, |record| confidence_for(record, now))
  }

  /// All predictions, most likely to be reused first. Ties go to the smaller key.
  pub(crate) fn predictions(&self, now: Duration) -> Vec<PredictionRecord> {
    let mut predictions: Vec<PredictionRecord> = self
      .patterns
      .iter()
      .map(|(key, record)| PredictionRecord {
        key: key.clone(),
        confidence: confidence_for(record, now),
        computed_at: now,
      })
      .collect();
    predictions.sort_by(|a, b| match b.confidence.total_cmp(&a.confidence) {
      Ordering::Equal => a.key.cmp(&b.key),
      other => other,
    });
    predictions
  }

  pub(crate) fn record(&self, key: &str) -> Option<&AccessPatternRecord> {
    self.patterns.get(key)
  }

  /// Drops records idle for longer than `max_idle` whose key `is_cached`
  /// reports as absent. Returns how many were dropped.
  pub(crate) fn prune_idle<F>(&mut self, now: Duration, max_idle: Duration, is_cached: F) -> usize
  where
    F: Fn(&str) -> bool,
  {
    let stale: Vec<String> = self
      .patterns
      .iter()
      .filter(|(key, record)| now.saturating_sub(record.last_access_at) > max_idle && !is_cached(key))
      .map(|(key, _)| key.clone())
      .collect();

    for key in &stale {
      self.patterns.remove(key);
      self.order.remove(key);
    }
    stale.len()
  }

  pub(crate) fn len(&self) -> usize {
    self.patterns.len()
  }
}
