#![allow(dead_code)]

use adaptive_cache::{CacheConfig, CacheEngine, EngineBuilder, EvictionReason, StoredValue};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// An engine without a janitor, so maintenance only runs when a test asks.
pub fn manual_engine<V: Send + Sync + 'static>() -> CacheEngine<V> {
  EngineBuilder::new().janitor(false).build().unwrap()
}

/// An engine with one instance named "test".
pub fn engine_with_cache<V: Send + Sync + 'static>(config: CacheConfig) -> CacheEngine<V> {
  let engine = manual_engine();
  engine.create_cache("test", config).unwrap();
  engine
}

/// Collects (cache, key, reason) for every eviction notification.
#[derive(Clone, Default)]
pub struct RecordingListener {
  pub events: Arc<Mutex<Vec<(String, String, EvictionReason)>>>,
}

impl RecordingListener {
  pub fn callback<V: 'static>(&self) -> impl Fn(&str, &str, StoredValue<V>, EvictionReason) + Send + Sync + 'static {
    let events = self.events.clone();
    move |cache: &str, key: &str, _value: StoredValue<V>, reason: EvictionReason| {
      events.lock().push((cache.to_string(), key.to_string(), reason));
    }
  }

  pub fn keys_with(&self, reason: EvictionReason) -> Vec<String> {
    self
      .events
      .lock()
      .iter()
      .filter(|(_, _, r)| *r == reason)
      .map(|(_, key, _)| key.clone())
      .collect()
  }
}

/// Polls `condition` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
  let deadline = Instant::now() + timeout;
  while Instant::now() < deadline {
    if condition() {
      return true;
    }
    thread::sleep(Duration::from_millis(5));
  }
  condition()
}
