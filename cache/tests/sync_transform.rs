mod common;

use adaptive_cache::{
  CacheConfig, CacheEngine, CacheError, EngineBuilder, EvictionReason, SetOptions, TransformError,
  ValueTransform,
};
use common::{manual_engine, RecordingListener};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Encodes integers as decimal text. Negative values cannot be encoded, and
/// once `corrupt` is set every decode fails.
#[derive(Default, Clone)]
struct DecimalTransform {
  corrupt: Arc<AtomicBool>,
}

impl ValueTransform<i64> for DecimalTransform {
  fn serialize(&self, value: &i64) -> Result<Vec<u8>, TransformError> {
    if *value < 0 {
      return Err(TransformError::Serialize(format!("{value} is negative")));
    }
    Ok(value.to_string().into_bytes())
  }

  fn deserialize(&self, bytes: &[u8]) -> Result<i64, TransformError> {
    if self.corrupt.load(Ordering::SeqCst) {
      return Err(TransformError::Deserialize("checksum mismatch".to_string()));
    }
    std::str::from_utf8(bytes)
      .ok()
      .and_then(|text| text.parse().ok())
      .ok_or_else(|| TransformError::Deserialize("not a decimal".to_string()))
  }
}

fn transformed_engine(transform: DecimalTransform) -> CacheEngine<i64> {
  let engine = manual_engine();
  engine
    .create_cache_with_transform("test", CacheConfig::new(), transform)
    .unwrap();
  engine
}

#[test]
fn test_values_round_trip_through_the_transform() {
  let engine = transformed_engine(DecimalTransform::default());
  engine.set("test", "k", 12345).unwrap();
  assert_eq!(engine.get("test", "k").unwrap().as_deref(), Some(&12345));
}

#[test]
fn test_encoded_values_are_sized_by_their_bytes() {
  let engine = transformed_engine(DecimalTransform::default());
  engine.set("test", "k", 1_000_000).unwrap();

  let stats = engine.get_statistics(Some("test")).unwrap();
  assert_eq!(stats.instance("test").unwrap().memory_bytes_used, 7);
}

#[test]
fn test_serialize_failure_stores_nothing() {
  let engine = transformed_engine(DecimalTransform::default());

  let err = engine.set("test", "k", -1).unwrap_err();
  assert!(matches!(
    err,
    CacheError::Transform { ref key, source: TransformError::Serialize(_) } if key == "k"
  ));
  assert!(!engine.contains("test", "k").unwrap());

  let stats = engine.get_statistics(Some("test")).unwrap();
  let instance = stats.instance("test").unwrap();
  assert_eq!(instance.transform_failures, 1);
  assert_eq!(instance.sets, 0);
}

#[test]
fn test_corrupted_entry_reads_as_a_miss_and_is_dropped() {
  let listener = RecordingListener::default();
  let transform = DecimalTransform::default();
  let engine = EngineBuilder::<i64>::new()
    .janitor(false)
    .eviction_listener(listener.callback::<i64>())
    .build()
    .unwrap();
  engine
    .create_cache_with_transform("test", CacheConfig::new(), transform.clone())
    .unwrap();
  engine.set("test", "k", 7).unwrap();

  transform.corrupt.store(true, Ordering::SeqCst);

  assert!(engine.get("test", "k").unwrap().is_none());
  assert!(!engine.contains("test", "k").unwrap());
  assert_eq!(listener.keys_with(EvictionReason::Corrupted), vec!["k".to_string()]);

  let stats = engine.get_statistics(Some("test")).unwrap();
  let instance = stats.instance("test").unwrap();
  assert_eq!(instance.hits, 0);
  assert_eq!(instance.misses, 1);
  assert_eq!(instance.transform_failures, 1);
}

#[test]
fn test_transform_can_be_skipped_per_entry() {
  let transform = DecimalTransform::default();
  let engine = EngineBuilder::<i64>::new()
    .janitor(false)
    .weigher(|_: &i64| 100)
    .build()
    .unwrap();
  engine
    .create_cache_with_transform("test", CacheConfig::new(), transform.clone())
    .unwrap();

  // Negative values cannot be encoded, but a raw entry never touches the codec.
  engine
    .set_with("test", "raw", -5, SetOptions::new().transform(false))
    .unwrap();
  transform.corrupt.store(true, Ordering::SeqCst);

  assert_eq!(engine.get("test", "raw").unwrap().as_deref(), Some(&-5));
  let stats = engine.get_statistics(Some("test")).unwrap();
  assert_eq!(stats.instance("test").unwrap().memory_bytes_used, 100);
}

#[cfg(feature = "serde")]
mod json {
  use super::*;
  use adaptive_cache::JsonTransform;
  use serde::{Deserialize, Serialize};

  #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
  struct Profile {
    id: u32,
    name: String,
    roles: Vec<String>,
  }

  #[test]
  fn test_json_transform_round_trips_structs() {
    let engine: CacheEngine<Profile> = manual_engine();
    engine
      .create_cache_with_transform("profiles", CacheConfig::new(), JsonTransform::new())
      .unwrap();
    let profile = Profile {
      id: 7,
      name: "ada".to_string(),
      roles: vec!["admin".to_string(), "ops".to_string()],
    };

    engine.set("profiles", "7", profile.clone()).unwrap();

    assert_eq!(engine.get("profiles", "7").unwrap().as_deref(), Some(&profile));
    let stats = engine.get_statistics(Some("profiles")).unwrap();
    let encoded_len = serde_json::to_vec(&profile).unwrap().len() as u64;
    assert_eq!(stats.instance("profiles").unwrap().memory_bytes_used, encoded_len);
  }
}
