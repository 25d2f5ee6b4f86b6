use std::time::Duration;

/// Recommended when entries carry short TTLs or the workload shifts quickly.
///
/// Sweeps expired entries and re-evaluates strategies every second. Expired
/// entries are already invisible to `get`; a short interval mainly returns
/// their memory sooner and lets the tuner react faster.
pub const RESPONSIVE: Duration = Duration::from_secs(1);

/// Recommended for most general-purpose workloads.
///
/// One pass per minute keeps the tuner's hit-rate samples meaningful while
/// costing almost nothing.
pub const BALANCED: Duration = Duration::from_secs(60);

/// Recommended for large, slowly changing caches with long TTLs.
///
/// Runs maintenance every five minutes. Expired entries may hold memory for
/// longer between passes; capacity enforcement still reclaims them on demand.
pub const RELAXED: Duration = Duration::from_secs(300);
