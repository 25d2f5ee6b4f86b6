//! Read-only diagnostics: per-instance statistics, engine totals and
//! advisory recommendations.

use crate::metrics::GlobalSnapshot;
use crate::policy::StrategyKind;

#[cfg(feature = "serde")]
use serde::Serialize;

/// Hit rate, in percent, under which an instance gets a review recommendation.
pub const LOW_HIT_RATE_PERCENT: f64 = 60.0;
/// Memory usage, in percent, above which an instance gets a bounds recommendation.
pub const HIGH_MEMORY_USAGE_PERCENT: f64 = 90.0;

/// Statistics of one instance at the time of the report.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct InstanceReport {
  pub name: String,
  pub strategy: StrategyKind,
  pub item_count: usize,
  pub max_entries: usize,
  pub memory_bytes_used: u64,
  pub max_memory_bytes: u64,
  pub hit_rate_percent: f64,
  pub memory_usage_percent: f64,
  pub average_item_size: u64,
  pub hits: u64,
  pub misses: u64,
  pub sets: u64,
  pub deletes: u64,
  pub evicted_by_capacity: u64,
  pub evicted_by_ttl: u64,
  pub restored: u64,
  pub prefetch_requests: u64,
  pub load_failures: u64,
  pub transform_failures: u64,
  pub persistence_failures: u64,
  pub strategy_switches: u64,
  pub pattern_records: usize,
  pub uptime_secs: u64,
  /// Seconds since the last get or set, if any.
  pub idle_secs: Option<u64>,
}

/// Engine-wide totals.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct GlobalTotals {
  pub instance_count: usize,
  pub total_requests: u64,
  pub total_hits: u64,
  pub total_misses: u64,
  pub hit_rate_percent: f64,
  pub estimated_memory_bytes: u64,
  /// Exponential moving average of get/set latency.
  pub average_latency_micros: f64,
  pub uptime_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum RecommendationKind {
  /// Hit rate is low: capacity or strategy may not fit the workload.
  ReviewCapacityOrStrategy,
  /// Memory is nearly exhausted: raise the bounds or shorten TTLs.
  RaiseBoundsOrTightenTtl,
}

/// Advisory output only; the engine never acts on it.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Recommendation {
  pub cache: String,
  pub kind: RecommendationKind,
  pub message: String,
}

/// The polling shape returned by [`CacheEngine::get_statistics`](crate::CacheEngine::get_statistics).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct StatisticsReport {
  pub instances: Vec<InstanceReport>,
  pub totals: GlobalTotals,
  pub recommendations: Vec<Recommendation>,
}

impl StatisticsReport {
  pub(crate) fn build(mut instances: Vec<InstanceReport>, global: GlobalSnapshot) -> Self {
    instances.sort_by(|a, b| a.name.cmp(&b.name));

    let lookups = global.hits + global.misses;
    let totals = GlobalTotals {
      instance_count: instances.len(),
      total_requests: global.requests,
      total_hits: global.hits,
      total_misses: global.misses,
      hit_rate_percent: percent(global.hits as f64, lookups as f64),
      estimated_memory_bytes: instances.iter().map(|i| i.memory_bytes_used).sum(),
      average_latency_micros: global.average_latency_micros,
      uptime_secs: global.uptime_secs,
    };

    let recommendations = instances.iter().flat_map(recommendations_for).collect();

    Self {
      instances,
      totals,
      recommendations,
    }
  }

  pub fn instance(&self, name: &str) -> Option<&InstanceReport> {
    self.instances.iter().find(|i| i.name == name)
  }

  /// Serializes the report as JSON for polling consumers.
  #[cfg(feature = "serde")]
  pub fn to_json(&self) -> Result<String, serde_json::Error> {
    serde_json::to_string(self)
  }
}

fn recommendations_for(report: &InstanceReport) -> Vec<Recommendation> {
  let mut out = Vec::new();

  if report.hits + report.misses > 0 && report.hit_rate_percent < LOW_HIT_RATE_PERCENT {
    out.push(Recommendation {
      cache: report.name.clone(),
      kind: RecommendationKind::ReviewCapacityOrStrategy,
      message: format!(
        "hit rate is {:.1}%; consider a larger capacity or a different eviction strategy than {}",
        report.hit_rate_percent, report.strategy
      ),
    });
  }

  if report.memory_usage_percent > HIGH_MEMORY_USAGE_PERCENT {
    out.push(Recommendation {
      cache: report.name.clone(),
      kind: RecommendationKind::RaiseBoundsOrTightenTtl,
      message: format!(
        "memory usage is {:.1}% of {} bytes; consider raising the bound or shortening TTLs",
        report.memory_usage_percent, report.max_memory_bytes
      ),
    });
  }

  out
}

pub(crate) fn percent(part: f64, whole: f64) -> f64 {
  if whole <= 0.0 {
    0.0
  } else {
    part / whole * 100.0
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;

  fn instance(name: &str, hits: u64, misses: u64, memory_usage_percent: f64) -> InstanceReport {
    InstanceReport {
      name: name.to_string(),
      strategy: StrategyKind::WeightedScore,
      item_count: 1,
      max_entries: 10,
      memory_bytes_used: 100,
      max_memory_bytes: 1000,
      hit_rate_percent: percent(hits as f64, (hits + misses) as f64),
      memory_usage_percent,
      average_item_size: 100,
      hits,
      misses,
      sets: 1,
      deletes: 0,
      evicted_by_capacity: 0,
      evicted_by_ttl: 0,
      restored: 0,
      prefetch_requests: 0,
      load_failures: 0,
      transform_failures: 0,
      persistence_failures: 0,
      strategy_switches: 0,
      pattern_records: 1,
      uptime_secs: 0,
      idle_secs: None,
    }
  }

  fn global() -> GlobalSnapshot {
    GlobalSnapshot {
      requests: 10,
      hits: 6,
      misses: 4,
      average_latency_micros: 2.5,
      uptime_secs: 1,
    }
  }

  #[test]
  fn low_hit_rate_and_high_memory_produce_recommendations() {
    let report = StatisticsReport::build(
      vec![instance("b", 1, 9, 95.0), instance("a", 9, 1, 10.0)],
      global(),
    );

    let kinds: Vec<(String, RecommendationKind)> = report
      .recommendations
      .iter()
      .map(|r| (r.cache.clone(), r.kind))
      .collect();
    assert_eq!(
      kinds,
      vec![
        ("b".to_string(), RecommendationKind::ReviewCapacityOrStrategy),
        ("b".to_string(), RecommendationKind::RaiseBoundsOrTightenTtl),
      ]
    );
  }

  #[test]
  fn idle_instances_get_no_hit_rate_advice() {
    let report = StatisticsReport::build(vec![instance("idle", 0, 0, 0.0)], global());
    assert!(report.recommendations.is_empty());
  }

  #[test]
  fn totals_aggregate_instances() {
    let report = StatisticsReport::build(
      vec![instance("a", 1, 0, 1.0), instance("b", 1, 0, 1.0)],
      global(),
    );
    assert_eq!(report.totals.instance_count, 2);
    assert_eq!(report.totals.estimated_memory_bytes, 200);
    assert_eq!(report.totals.hit_rate_percent, 60.0);
    assert_eq!(report.instances[0].name, "a");
  }
}
