use std::collections::VecDeque;
use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Maximum number of events retained per record.
pub const HISTORY_LIMIT: usize = 50;
/// Number of most recent events the short-term trend looks at.
pub const TREND_WINDOW: usize = 10;

/// A single tracked operation on a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum AccessKind {
  Hit,
  Miss,
  Set,
}

/// Direction of a key's recent demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Trend {
  Increasing,
  Decreasing,
  Stable,
}

/// Access history for one key within one instance.
///
/// Records outlive the entry they describe, so a key that is evicted and
/// later set again starts with the demand it had before.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AccessPatternRecord {
  pub hits: u64,
  pub misses: u64,
  pub sets: u64,
  /// Offset from the engine epoch.
  pub last_access_at: Duration,
  history: VecDeque<AccessKind>,
}

impl AccessPatternRecord {
  pub(crate) fn new(now: Duration) -> Self {
    Self {
      hits: 0,
      misses: 0,
      sets: 0,
      last_access_at: now,
      history: VecDeque::with_capacity(TREND_WINDOW),
    }
  }

  pub(crate) fn record(&mut self, kind: AccessKind, now: Duration) {
    match kind {
      AccessKind::Hit => self.hits += 1,
      AccessKind::Miss => self.misses += 1,
      AccessKind::Set => self.sets += 1,
    }
    self.last_access_at = now;
    if self.history.len() == HISTORY_LIMIT {
      self.history.pop_front();
    }
    self.history.push_back(kind);
  }

  /// `hits / (hits + misses + sets)`, or 0 for an empty record.
  pub fn frequency_score(&self) -> f64 {
    let total = self.hits + self.misses + self.sets;
    if total == 0 {
      0.0
    } else {
      self.hits as f64 / total as f64
    }
  }

  /// Compares hit density of the newer half of the last ten events
  /// against the older half.
  pub fn trend(&self) -> Trend {
    let window = self.history.len().min(TREND_WINDOW);
    if window < 4 {
      return Trend::Stable;
    }

    let recent = self.history.iter().skip(self.history.len() - window);
    let half = window / 2;
    let (mut older_hits, mut newer_hits) = (0i64, 0i64);
    for (position, kind) in recent.enumerate() {
      if *kind != AccessKind::Hit {
        continue;
      }
      if position < half {
        older_hits += 1;
      } else {
        newer_hits += 1;
      }
    }

    match newer_hits - older_hits {
      d if d > 1 => Trend::Increasing,
      d if d < -1 => Trend::Decreasing,
      _ => Trend::Stable,
    }
  }

  pub fn history_len(&self) -> usize {
    self.history.len()
  }
}
