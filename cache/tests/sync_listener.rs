mod common;

use adaptive_cache::{
  CacheConfig, CacheEngine, EngineBuilder, EvictionReason, SetOptions, StoredValue, StrategyKind,
};
use common::RecordingListener;
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn listened_engine(config: CacheConfig) -> (CacheEngine<i32>, RecordingListener) {
  let listener = RecordingListener::default();
  let engine = EngineBuilder::new()
    .janitor(false)
    .eviction_listener(listener.callback::<i32>())
    .build()
    .unwrap();
  engine.create_cache("test", config).unwrap();
  (engine, listener)
}

#[test]
fn test_delete_notifies_invalidated() {
  let (engine, listener) = listened_engine(CacheConfig::new());
  engine.set("test", "a", 1).unwrap();

  assert!(engine.delete("test", "a").unwrap());
  assert!(!engine.delete("test", "a").unwrap());

  assert_eq!(listener.keys_with(EvictionReason::Invalidated), vec!["a".to_string()]);
}

#[test]
fn test_tag_invalidation_notifies_each_entry() {
  let (engine, listener) = listened_engine(CacheConfig::new());
  engine
    .set_with("test", "u1", 1, SetOptions::new().tag("users"))
    .unwrap();
  engine
    .set_with("test", "u2", 2, SetOptions::new().tag("users").tag("admins"))
    .unwrap();
  engine
    .set_with("test", "p1", 3, SetOptions::new().tag("posts"))
    .unwrap();

  assert_eq!(engine.invalidate_tag("test", "users").unwrap(), 2);
  assert_eq!(
    listener.keys_with(EvictionReason::Invalidated),
    vec!["u1".to_string(), "u2".to_string()]
  );
  assert!(engine.contains("test", "p1").unwrap());
}

#[test]
fn test_expired_read_notifies_expired() {
  let (engine, listener) = listened_engine(CacheConfig::new().default_ttl(Duration::from_millis(30)));
  engine.set("test", "a", 1).unwrap();
  thread::sleep(Duration::from_millis(50));

  assert!(engine.get("test", "a").unwrap().is_none());
  assert_eq!(listener.keys_with(EvictionReason::Expired), vec!["a".to_string()]);
}

#[test]
fn test_capacity_eviction_hands_over_the_value() {
  let seen: Arc<Mutex<Vec<(String, i32, EvictionReason)>>> = Arc::default();
  let sink = seen.clone();
  let engine = EngineBuilder::<i32>::new()
    .janitor(false)
    .eviction_listener(move |_cache: &str, key: &str, value: StoredValue<i32>, reason: EvictionReason| {
      let value = value.as_plain().map(|v| **v).unwrap_or_default();
      sink.lock().push((key.to_string(), value, reason));
    })
    .build()
    .unwrap();
  engine
    .create_cache("test", CacheConfig::new().max_entries(1).strategy(StrategyKind::Recency))
    .unwrap();

  engine.set("test", "a", 10).unwrap();
  engine.set("test", "b", 20).unwrap();

  assert_eq!(
    *seen.lock(),
    vec![("a".to_string(), 10, EvictionReason::Capacity)]
  );
}

#[test]
fn test_replacement_is_not_an_eviction() {
  let (engine, listener) = listened_engine(CacheConfig::new());
  engine.set("test", "a", 1).unwrap();
  engine.set("test", "a", 2).unwrap();
  assert!(listener.events.lock().is_empty());
}

#[test]
fn test_clear_and_remove_cache_do_not_notify() {
  let (engine, listener) = listened_engine(CacheConfig::new());
  engine.set("test", "a", 1).unwrap();
  engine.set("test", "b", 2).unwrap();

  engine.clear("test").unwrap();
  engine.set("test", "c", 3).unwrap();
  engine.remove_cache("test").unwrap();

  assert!(listener.events.lock().is_empty());
}

#[test]
fn test_listener_may_call_back_into_the_engine() {
  let engine: Arc<Mutex<Option<Arc<CacheEngine<i32>>>>> = Arc::default();
  let handle = engine.clone();
  let built = Arc::new(
    EngineBuilder::<i32>::new()
      .janitor(false)
      .eviction_listener(move |cache: &str, key: &str, _value: StoredValue<i32>, _reason: EvictionReason| {
        if let Some(engine) = handle.lock().as_ref() {
          // Re-entering the engine from the callback must not deadlock.
          let _ = engine.contains(cache, key);
        }
      })
      .build()
      .unwrap(),
  );
  *engine.lock() = Some(built.clone());

  built
    .create_cache("test", CacheConfig::new().max_entries(1))
    .unwrap();
  built.set("test", "a", 1).unwrap();
  built.set("test", "b", 2).unwrap();
  assert!(built.contains("test", "b").unwrap());

  // Break the reference cycle through the listener.
  engine.lock().take();
}
