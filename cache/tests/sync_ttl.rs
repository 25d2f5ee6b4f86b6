mod common;

use adaptive_cache::{CacheConfig, EngineBuilder, EvictionReason, SetOptions};
use common::{engine_with_cache, wait_until, RecordingListener};
use std::thread;
use std::time::Duration;

#[test]
fn test_entry_expires_after_default_ttl() {
  let engine = engine_with_cache::<i32>(CacheConfig::new().default_ttl(Duration::from_millis(100)));
  engine.set("test", "k", 1).unwrap();
  assert_eq!(engine.get("test", "k").unwrap().as_deref(), Some(&1));

  thread::sleep(Duration::from_millis(150));

  assert!(engine.get("test", "k").unwrap().is_none());
  let stats = engine.get_statistics(Some("test")).unwrap();
  let instance = stats.instance("test").unwrap();
  assert_eq!(instance.hits, 1);
  assert_eq!(instance.misses, 1);
  assert_eq!(instance.evicted_by_ttl, 1);
  assert_eq!(instance.item_count, 0);
}

#[test]
fn test_expired_entry_is_not_contained() {
  let engine = engine_with_cache::<i32>(CacheConfig::new().default_ttl(Duration::from_millis(50)));
  engine.set("test", "k", 1).unwrap();
  thread::sleep(Duration::from_millis(80));

  assert!(!engine.contains("test", "k").unwrap());
  // Still held until swept or read.
  assert_eq!(engine.len("test").unwrap(), 1);
}

#[test]
fn test_per_entry_ttl_overrides_default() {
  let engine = engine_with_cache::<i32>(CacheConfig::new().default_ttl(Duration::from_secs(60)));
  engine
    .set_with("test", "short", 1, SetOptions::new().ttl(Duration::from_millis(50)))
    .unwrap();
  engine.set("test", "long", 2).unwrap();

  thread::sleep(Duration::from_millis(80));

  assert!(engine.get("test", "short").unwrap().is_none());
  assert_eq!(engine.get("test", "long").unwrap().as_deref(), Some(&2));
}

#[test]
fn test_no_ttl_entry_outlives_default() {
  let engine = engine_with_cache::<i32>(CacheConfig::new().default_ttl(Duration::from_millis(50)));
  engine
    .set_with("test", "pinned", 1, SetOptions::new().no_ttl())
    .unwrap();

  thread::sleep(Duration::from_millis(80));
  assert_eq!(engine.get("test", "pinned").unwrap().as_deref(), Some(&1));
}

#[test]
fn test_reading_an_entry_does_not_extend_its_ttl() {
  let engine = engine_with_cache::<i32>(CacheConfig::new().default_ttl(Duration::from_millis(120)));
  engine.set("test", "k", 1).unwrap();
  thread::sleep(Duration::from_millis(70));
  assert!(engine.get("test", "k").unwrap().is_some());
  thread::sleep(Duration::from_millis(70));
  assert!(engine.get("test", "k").unwrap().is_none());
}

#[test]
fn test_replacing_an_entry_restarts_its_ttl() {
  let engine = engine_with_cache::<i32>(CacheConfig::new().default_ttl(Duration::from_millis(120)));
  engine.set("test", "k", 1).unwrap();
  thread::sleep(Duration::from_millis(70));
  engine.set("test", "k", 2).unwrap();
  thread::sleep(Duration::from_millis(70));
  assert_eq!(engine.get("test", "k").unwrap().as_deref(), Some(&2));
}

#[test]
fn test_run_maintenance_sweeps_expired_entries() {
  let listener = RecordingListener::default();
  let engine = EngineBuilder::<i32>::new()
    .janitor(false)
    .eviction_listener(listener.callback::<i32>())
    .build()
    .unwrap();
  engine
    .create_cache(
      "test",
      CacheConfig::new().default_ttl(Duration::from_millis(50)).auto_tune(false),
    )
    .unwrap();
  engine.set("test", "a", 1).unwrap();
  engine.set("test", "b", 2).unwrap();
  engine
    .set_with("test", "c", 3, SetOptions::new().no_ttl())
    .unwrap();

  thread::sleep(Duration::from_millis(80));
  let summary = engine.run_maintenance().unwrap();

  assert_eq!(summary.instances, 1);
  assert_eq!(summary.expired, 2);
  assert_eq!(engine.len("test").unwrap(), 1);
  assert_eq!(
    listener.keys_with(EvictionReason::Expired),
    vec!["a".to_string(), "b".to_string()]
  );
  let stats = engine.get_statistics(Some("test")).unwrap();
  assert_eq!(stats.instance("test").unwrap().evicted_by_ttl, 2);
}

#[test]
fn test_janitor_sweeps_in_the_background() {
  let engine = EngineBuilder::<i32>::new()
    .maintenance_interval(Duration::from_millis(20))
    .build()
    .unwrap();
  engine
    .create_cache("test", CacheConfig::new().default_ttl(Duration::from_millis(30)))
    .unwrap();
  for i in 0..10 {
    engine.set("test", &format!("k{i}"), i).unwrap();
  }

  let swept = wait_until(Duration::from_secs(2), || engine.len("test").unwrap() == 0);
  assert!(swept, "janitor should have removed every expired entry");
  let stats = engine.get_statistics(Some("test")).unwrap();
  assert_eq!(stats.instance("test").unwrap().evicted_by_ttl, 10);
}

#[test]
fn test_expired_entries_are_reclaimed_before_live_ones() {
  let engine = engine_with_cache::<i32>(CacheConfig::new().max_entries(2).no_default_ttl());
  engine
    .set_with("test", "stale", 1, SetOptions::new().ttl(Duration::from_millis(30)))
    .unwrap();
  engine.set("test", "live", 2).unwrap();
  thread::sleep(Duration::from_millis(50));

  engine.set("test", "new", 3).unwrap();

  assert!(engine.contains("test", "live").unwrap());
  assert!(engine.contains("test", "new").unwrap());
  let stats = engine.get_statistics(Some("test")).unwrap();
  let instance = stats.instance("test").unwrap();
  assert_eq!(instance.evicted_by_ttl, 1);
  assert_eq!(instance.evicted_by_capacity, 0);
}

#[test]
fn test_shutdown_stops_the_janitor() {
  let engine = EngineBuilder::<i32>::new()
    .maintenance_interval(Duration::from_millis(10))
    .build()
    .unwrap();
  engine.create_cache("test", CacheConfig::new()).unwrap();
  engine.shutdown();
  assert!(engine.run_maintenance().is_none());
}
