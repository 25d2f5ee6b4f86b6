use super::{min_by_rank, EvictionContext, EvictionStrategy, Selection};
use crate::entry::CacheEntry;
use crate::time;

use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

const RECENCY_HORIZON_MS: f64 = 86_400_000.0;
const SIZE_HORIZON_BYTES: f64 = 1024.0 * 1024.0;

/// Weights of the retention score used by [`StrategyKind::WeightedScore`](super::StrategyKind::WeightedScore).
///
/// The defaults sum to 1.0. Lower scores are evicted first.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ScoreWeights {
  pub access_count: f64,
  pub recency: f64,
  pub priority: f64,
  pub inverse_size: f64,
  pub prediction: f64,
}

impl Default for ScoreWeights {
  fn default() -> Self {
    Self {
      access_count: 0.30,
      recency: 0.25,
      priority: 0.20,
      inverse_size: 0.15,
      prediction: 0.10,
    }
  }
}

impl ScoreWeights {
  pub(crate) fn is_valid(&self) -> bool {
    [
      self.access_count,
      self.recency,
      self.priority,
      self.inverse_size,
      self.prediction,
    ]
    .iter()
    .all(|w| w.is_finite() && *w >= 0.0)
  }
}

/// The retention score of one entry.
pub(crate) fn retention_score<V>(
  entry: &CacheEntry<V>,
  max_access_count: u64,
  confidence: f64,
  now: Duration,
  weights: &ScoreWeights,
) -> f64 {
  let norm_access = if max_access_count == 0 {
    0.0
  } else {
    entry.access_count as f64 / max_access_count as f64
  };
  let age_ms = time::millis_between(entry.last_accessed_at, now);
  let recency = (1.0 - age_ms / RECENCY_HORIZON_MS).max(0.0);
  let inverse_size = 1.0 - (entry.size_bytes as f64 / SIZE_HORIZON_BYTES).min(1.0);

  weights.access_count * norm_access
    + weights.recency * recency
    + weights.priority * entry.priority.weight()
    + weights.inverse_size * inverse_size
    + weights.prediction * confidence
}

/// Evicts the entry with the lowest composite retention score.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct WeightedScoreStrategy;

impl EvictionStrategy for WeightedScoreStrategy {
  fn select_victim<V>(&self, ctx: &mut EvictionContext<'_, V>) -> Selection {
    let max_access_count = ctx
      .candidates()
      .map(|entry| entry.access_count)
      .max()
      .unwrap_or(0);
    let (now, weights, predictor) = (ctx.now, ctx.weights, ctx.predictor);

    min_by_rank(ctx.candidates(), |entry| {
      let confidence = predictor.predict_usage(&entry.key, now);
      retention_score(entry, max_access_count, confidence, now, weights)
    })
  }
}
