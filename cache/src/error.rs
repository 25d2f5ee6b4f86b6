use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// The boxed error type returned by value producers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A producer failure, shared between every caller that waited on the same load.
pub type LoadError = Arc<dyn std::error::Error + Send + Sync>;

/// The main error type for cache engine operations.
#[derive(Debug, Error)]
pub enum CacheError {
  #[error("a cache named '{0}' is already registered")]
  DuplicateName(String),

  #[error("no cache named '{0}' is registered")]
  UnknownCache(String),

  #[error("invalid configuration for '{field}': {message}")]
  InvalidConfig { field: String, message: String },

  /// Eviction could not make room for the new entry. Nothing was inserted.
  #[error(
    "cache '{cache}' cannot admit key '{key}' ({size_bytes} bytes): \
     limits are {max_entries} entries / {max_memory_bytes} bytes"
  )]
  CapacityExceeded {
    cache: String,
    key: String,
    size_bytes: u64,
    max_entries: usize,
    max_memory_bytes: u64,
  },

  #[error("value transform failed for key '{key}': {source}")]
  Transform {
    key: String,
    #[source]
    source: TransformError,
  },

  #[error("persistence failed for cache '{cache}': {source}")]
  Persistence {
    cache: String,
    #[source]
    source: PersistenceError,
  },

  #[error("value producer failed for key '{key}': {source}")]
  Load {
    key: String,
    #[source]
    source: LoadError,
  },

  #[error("cache '{0}' has no registered loader")]
  NoLoader(String),

  #[error("the cache engine has been shut down")]
  ShutDown,
}

impl CacheError {
  pub(crate) fn invalid_config(field: &str, message: impl Into<String>) -> Self {
    CacheError::InvalidConfig {
      field: field.to_string(),
      message: message.into(),
    }
  }

  pub(crate) fn zero_duration(field: &str, duration: Duration) -> Option<Self> {
    if duration.is_zero() {
      Some(Self::invalid_config(field, "duration must be greater than zero"))
    } else {
      None
    }
  }
}

/// Errors raised by a [`ValueTransform`](crate::transform::ValueTransform).
#[derive(Debug, Clone, Error)]
pub enum TransformError {
  #[error("failed to serialize value: {0}")]
  Serialize(String),

  #[error("failed to deserialize value: {0}")]
  Deserialize(String),
}

/// Errors raised by a [`PersistenceAdapter`](crate::persistence::PersistenceAdapter).
#[derive(Debug, Clone, Error)]
pub enum PersistenceError {
  #[error("persistence backend unavailable: {0}")]
  Unavailable(String),

  #[error("persistence backend failed: {0}")]
  Backend(String),
}

/// A specialized `Result` type for cache engine operations.
pub type Result<T, E = CacheError> = std::result::Result<T, E>;
