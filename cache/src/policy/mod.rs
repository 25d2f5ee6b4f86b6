//! The closed set of eviction strategies.
//!
//! Each [`StrategyKind`] variant is backed by a type implementing
//! [`EvictionStrategy`]. A strategy only selects; the instance performs the
//! removal and its bookkeeping, then asks again until the new entry fits.

pub(crate) mod expiry;
pub(crate) mod frequency;
pub(crate) mod prefetch;
pub(crate) mod recency;
pub(crate) mod weighted;

use crate::entry::CacheEntry;
use crate::error::CacheError;
use crate::predictor::UsagePredictor;

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use ahash::HashMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub use weighted::ScoreWeights;

/// The eviction strategies an instance can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum StrategyKind {
  /// Evicts the least recently accessed entry.
  Recency,
  /// Evicts the least accessed entry, oldest access first on ties.
  Frequency,
  /// Removes every expired entry in one pass.
  Expiry,
  /// Evicts the entry with the lowest composite retention score.
  #[default]
  WeightedScore,
  /// Schedules loads for likely-needed absent keys, then evicts by score.
  PredictivePrefetch,
}

impl StrategyKind {
  pub const ALL: [StrategyKind; 5] = [
    StrategyKind::Recency,
    StrategyKind::Frequency,
    StrategyKind::Expiry,
    StrategyKind::WeightedScore,
    StrategyKind::PredictivePrefetch,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      StrategyKind::Recency => "recency",
      StrategyKind::Frequency => "frequency",
      StrategyKind::Expiry => "expiry",
      StrategyKind::WeightedScore => "weighted_score",
      StrategyKind::PredictivePrefetch => "predictive_prefetch",
    }
  }

  /// Runs this strategy once against the instance state in `ctx`.
  pub(crate) fn select_victim<V>(self, ctx: &mut EvictionContext<'_, V>) -> Selection {
    match self {
      StrategyKind::Recency => recency::RecencyStrategy.select_victim(ctx),
      StrategyKind::Frequency => frequency::FrequencyStrategy.select_victim(ctx),
      StrategyKind::Expiry => expiry::ExpiryStrategy.select_victim(ctx),
      StrategyKind::WeightedScore => weighted::WeightedScoreStrategy.select_victim(ctx),
      StrategyKind::PredictivePrefetch => prefetch::PredictivePrefetchStrategy.select_victim(ctx),
    }
  }
}

impl fmt::Display for StrategyKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for StrategyKind {
  type Err = CacheError;

  /// Accepts the canonical names plus the common aliases
  /// (`lru`, `lfu`, `ttl`, `intelligent`, `predictive`).
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "recency" | "lru" => Ok(StrategyKind::Recency),
      "frequency" | "lfu" => Ok(StrategyKind::Frequency),
      "expiry" | "ttl" => Ok(StrategyKind::Expiry),
      "weighted_score" | "weighted" | "intelligent" => Ok(StrategyKind::WeightedScore),
      "predictive_prefetch" | "predictive" | "prefetch" => Ok(StrategyKind::PredictivePrefetch),
      other => Err(CacheError::invalid_config(
        "strategy",
        format!("unknown eviction strategy '{other}'"),
      )),
    }
  }
}

/// The outcome of one strategy invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Selection {
  /// Remove this single entry.
  Victim(String),
  /// Remove all of these expired entries. Never empty.
  Expired(Vec<String>),
  /// Nothing could be selected.
  NoVictim,
}

/// Read-only view of an instance handed to a strategy, plus an outbox for
/// prefetch requests.
pub(crate) struct EvictionContext<'a, V> {
  pub(crate) entries: &'a HashMap<String, CacheEntry<V>>,
  pub(crate) predictor: &'a UsagePredictor,
  pub(crate) weights: &'a ScoreWeights,
  pub(crate) now: Duration,
  /// The key being written; it is never its own victim.
  pub(crate) protected: Option<&'a str>,
  pub(crate) can_prefetch: bool,
  pub(crate) prefetch: Vec<String>,
}

impl<'a, V> EvictionContext<'a, V> {
  /// Entries eligible for eviction.
  pub(crate) fn candidates(&self) -> impl Iterator<Item = &'a CacheEntry<V>> + '_ {
    let protected = self.protected;
    self
      .entries
      .values()
      .filter(move |entry| Some(entry.key.as_str()) != protected)
  }
}

/// A victim selection policy.
pub(crate) trait EvictionStrategy {
  fn select_victim<V>(&self, ctx: &mut EvictionContext<'_, V>) -> Selection;
}

/// Picks the candidate with the smallest `(rank, key)`.
///
/// `rank` must return a totally ordered value; ties fall back to the
/// lexicographically smaller key so selection is deterministic.
pub(crate) fn min_by_rank<'e, V, R, F>(
  candidates: impl Iterator<Item = &'e CacheEntry<V>>,
  mut rank: F,
) -> Selection
where
  V: 'e,
  F: FnMut(&CacheEntry<V>) -> R,
  R: PartialOrd,
{
  let mut best: Option<(R, &'e CacheEntry<V>)> = None;
  for entry in candidates {
    let entry_rank = rank(entry);
    let replace = match &best {
      None => true,
      Some((best_rank, best_entry)) => match entry_rank.partial_cmp(best_rank) {
        Some(Ordering::Less) => true,
        Some(Ordering::Equal) | None => entry.key < best_entry.key,
        Some(Ordering::Greater) => false,
      },
    };
    if replace {
      best = Some((entry_rank, entry));
    }
  }

  match best {
    Some((_, entry)) => Selection::Victim(entry.key.clone()),
    None => Selection::NoVictim,
  }
}

#[cfg(test)]
pub(crate) mod test_support {
  use crate::entry::{CacheEntry, Priority, StoredValue};

  use std::collections::BTreeSet;
  use std::sync::Arc;
  use std::time::Duration;

  use ahash::{HashMap, HashMapExt};

  pub(crate) struct EntryFixture {
    pub key: &'static str,
    pub last_accessed_ms: u64,
    pub access_count: u64,
    pub size_bytes: u64,
    pub ttl_ms: Option<u64>,
    pub priority: Priority,
  }

  impl EntryFixture {
    pub fn new(key: &'static str) -> Self {
      Self {
        key,
        last_accessed_ms: 0,
        access_count: 0,
        size_bytes: 100,
        ttl_ms: None,
        priority: Priority::Normal,
      }
    }

    pub fn accessed(mut self, at_ms: u64, count: u64) -> Self {
      self.last_accessed_ms = at_ms;
      self.access_count = count;
      self
    }

    pub fn size(mut self, size_bytes: u64) -> Self {
      self.size_bytes = size_bytes;
      self
    }

    pub fn ttl(mut self, ttl_ms: u64) -> Self {
      self.ttl_ms = Some(ttl_ms);
      self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
      self.priority = priority;
      self
    }
  }

  pub(crate) fn entries(specs: Vec<EntryFixture>) -> HashMap<String, CacheEntry<u32>> {
    let mut map = HashMap::new();
    for spec in specs {
      let mut entry = CacheEntry::new(
        spec.key.to_string(),
        StoredValue::Plain(Arc::new(0)),
        spec.size_bytes,
        Duration::ZERO,
        spec.ttl_ms.map(Duration::from_millis),
        spec.priority,
        BTreeSet::new(),
      );
      entry.last_accessed_at = Duration::from_millis(spec.last_accessed_ms);
      entry.access_count = spec.access_count;
      map.insert(spec.key.to_string(), entry);
    }
    map
  }
}
