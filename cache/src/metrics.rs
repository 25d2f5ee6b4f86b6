use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crossbeam_utils::CachePadded;

/// Smoothing factor of the latency moving average.
const LATENCY_EWMA_ALPHA: f64 = 0.1;

/// Running statistics of one instance. Mutated only under the instance lock.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct InstanceCounters {
  pub(crate) hits: u64,
  pub(crate) misses: u64,
  pub(crate) sets: u64,
  pub(crate) deletes: u64,
  pub(crate) memory_bytes_used: u64,
  /// Offsets from the engine epoch.
  pub(crate) created_at: Duration,
  pub(crate) last_access_at: Option<Duration>,

  pub(crate) evicted_by_capacity: u64,
  pub(crate) evicted_by_ttl: u64,
  pub(crate) restored: u64,
  pub(crate) prefetch_requests: u64,
  pub(crate) load_failures: u64,
  pub(crate) transform_failures: u64,
  pub(crate) persistence_failures: u64,
  pub(crate) strategy_switches: u64,
}

impl InstanceCounters {
  pub(crate) fn new(now: Duration) -> Self {
    Self {
      created_at: now,
      ..Self::default()
    }
  }

  pub(crate) fn hit_rate(&self) -> f64 {
    ratio(self.hits, self.hits + self.misses)
  }
}

/// A thread-safe collector for engine-wide totals.
/// All fields are atomic to allow for lock-free updates.
#[derive(Debug)]
pub(crate) struct GlobalMetrics {
  pub(crate) requests: CachePadded<AtomicU64>,
  pub(crate) hits: CachePadded<AtomicU64>,
  pub(crate) misses: CachePadded<AtomicU64>,
  // f64 bits of the latency moving average, in microseconds.
  latency_ewma_micros: CachePadded<AtomicU64>,
  latency_samples: CachePadded<AtomicU64>,
  created_at: Instant,
}

impl Default for GlobalMetrics {
  fn default() -> Self {
    Self {
      requests: CachePadded::new(AtomicU64::new(0)),
      hits: CachePadded::new(AtomicU64::new(0)),
      misses: CachePadded::new(AtomicU64::new(0)),
      latency_ewma_micros: CachePadded::new(AtomicU64::new(0f64.to_bits())),
      latency_samples: CachePadded::new(AtomicU64::new(0)),
      created_at: Instant::now(),
    }
  }
}

impl GlobalMetrics {
  pub(crate) fn new() -> Self {
    Self::default()
  }

  pub(crate) fn record_hit(&self) {
    self.hits.fetch_add(1, Ordering::Relaxed);
  }

  pub(crate) fn record_miss(&self) {
    self.misses.fetch_add(1, Ordering::Relaxed);
  }

  /// Counts one request and folds its latency into the moving average.
  pub(crate) fn record_request(&self, started: Instant) {
    self.requests.fetch_add(1, Ordering::Relaxed);

    let sample = started.elapsed().as_secs_f64() * 1_000_000.0;
    let first = self.latency_samples.fetch_add(1, Ordering::Relaxed) == 0;
    let _ = self
      .latency_ewma_micros
      .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |bits| {
        let current = f64::from_bits(bits);
        let next = if first {
          sample
        } else {
          current + LATENCY_EWMA_ALPHA * (sample - current)
        };
        Some(next.to_bits())
      });
  }

  pub(crate) fn snapshot(&self) -> GlobalSnapshot {
    GlobalSnapshot {
      requests: self.requests.load(Ordering::Relaxed),
      hits: self.hits.load(Ordering::Relaxed),
      misses: self.misses.load(Ordering::Relaxed),
      average_latency_micros: f64::from_bits(self.latency_ewma_micros.load(Ordering::Relaxed)),
      uptime_secs: self.created_at.elapsed().as_secs(),
    }
  }
}

/// A point-in-time copy of the engine-wide counters.
#[derive(Clone, Copy, PartialEq)]
pub(crate) struct GlobalSnapshot {
  pub(crate) requests: u64,
  pub(crate) hits: u64,
  pub(crate) misses: u64,
  pub(crate) average_latency_micros: f64,
  pub(crate) uptime_secs: u64,
}

impl fmt::Debug for GlobalSnapshot {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("GlobalSnapshot")
      .field("requests", &self.requests)
      .field("hits", &self.hits)
      .field("misses", &self.misses)
      .field(
        "average_latency",
        &format!("{:.2}us", self.average_latency_micros),
      )
      .field("uptime_secs", &self.uptime_secs)
      .finish()
  }
}

/// `part / whole`, or 0 when `whole` is 0.
pub(crate) fn ratio(part: u64, whole: u64) -> f64 {
  if whole == 0 {
    0.0
  } else {
    part as f64 / whole as f64
  }
}
