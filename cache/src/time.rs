use once_cell::sync::Lazy;
use std::time::{Duration, Instant, SystemTime};

struct Epoch {
  instant: Instant,
  wall: SystemTime,
}

// The single, static reference point for every timestamp the engine stores.
// Entry and pattern timestamps are offsets from it. The wall-clock reading
// taken at the same moment anchors deadlines handed to persistence.
static ENGINE_EPOCH: Lazy<Epoch> = Lazy::new(|| Epoch {
  instant: Instant::now(),
  wall: SystemTime::now(),
});

/// Converts an `Instant` into a `Duration` since the engine epoch.
#[inline]
pub(crate) fn instant_to_duration(instant: Instant) -> Duration {
  instant.saturating_duration_since(ENGINE_EPOCH.instant)
}

/// The current time as a `Duration` since the engine epoch.
#[inline]
pub(crate) fn now_duration() -> Duration {
  instant_to_duration(Instant::now())
}

/// The wall-clock time of an epoch offset. `None` if it cannot be represented.
#[inline]
pub(crate) fn to_system_time(offset: Duration) -> Option<SystemTime> {
  ENGINE_EPOCH.wall.checked_add(offset)
}

/// Milliseconds elapsed between two epoch offsets, saturating at zero.
#[inline]
pub(crate) fn millis_between(earlier: Duration, later: Duration) -> f64 {
  later.saturating_sub(earlier).as_secs_f64() * 1000.0
}
