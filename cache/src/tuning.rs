//! The self-tuning controller: picks a better eviction strategy from an
//! instance's hit rate and fill level.

use crate::policy::StrategyKind;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Thresholds driving strategy switches. All values are ratios in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TuningThresholds {
  /// Below this hit rate, a nearly full instance switches to weighted-score eviction.
  pub low_hit_rate: f64,
  /// Fill level (`len / max_entries`) above which an instance counts as nearly full.
  pub high_memory_efficiency: f64,
  /// Above this hit rate, an instance switches to predictive prefetch.
  pub high_hit_rate: f64,
}

impl Default for TuningThresholds {
  fn default() -> Self {
    Self {
      low_hit_rate: 0.5,
      high_memory_efficiency: 0.8,
      high_hit_rate: 0.8,
    }
  }
}

impl TuningThresholds {
  pub(crate) fn is_valid(&self) -> bool {
    [self.low_hit_rate, self.high_memory_efficiency, self.high_hit_rate]
      .iter()
      .all(|t| (0.0..=1.0).contains(t))
  }
}

/// A strategy change made by the controller during one maintenance pass.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StrategySwitch {
  pub cache: String,
  pub from: StrategyKind,
  pub to: StrategyKind,
}

/// The observations one tuning decision is based on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct TuningSample {
  pub(crate) hits: u64,
  pub(crate) misses: u64,
  pub(crate) len: usize,
  pub(crate) max_entries: usize,
}

impl TuningSample {
  pub(crate) fn hit_rate(&self) -> Option<f64> {
    let lookups = self.hits + self.misses;
    if lookups == 0 {
      None
    } else {
      Some(self.hits as f64 / lookups as f64)
    }
  }

  pub(crate) fn memory_efficiency(&self) -> f64 {
    if self.max_entries == 0 {
      0.0
    } else {
      self.len as f64 / self.max_entries as f64
    }
  }
}

/// Returns the strategy the instance should switch to, or `None` to keep `current`.
pub(crate) fn recommend(
  thresholds: &TuningThresholds,
  sample: &TuningSample,
  current: StrategyKind,
) -> Option<StrategyKind> {
  let hit_rate = sample.hit_rate()?;

  let target = if hit_rate < thresholds.low_hit_rate
    && sample.memory_efficiency() > thresholds.high_memory_efficiency
  {
    StrategyKind::WeightedScore
  } else if hit_rate > thresholds.high_hit_rate {
    StrategyKind::PredictivePrefetch
  } else {
    return None;
  };

  (target != current).then_some(target)
}
