//! An in-process adaptive caching engine with named instances.
//!
//! # Features
//! - **Dual Bounds**: Every instance is limited by entry count and by estimated
//!   memory; capacity is enforced before each insert.
//! - **Interchangeable Strategies**: Recency, frequency, expiry-first,
//!   weighted-score and predictive-prefetch eviction, switchable at runtime.
//! - **Usage Prediction**: Per-key access patterns feed a reuse confidence into
//!   eviction scoring and prefetching.
//! - **Self-Tuning**: A background pass sweeps expired entries and switches an
//!   instance's strategy based on its hit rate and fill level.
//! - **Read-Through Loading**: Concurrent misses on one key share a single
//!   producer call.
//! - **Pluggable Edges**: Value transforms, a persistence adapter and an
//!   eviction listener are injected by the host.
//!
//! # Example
//! ```
//! use adaptive_cache::{CacheConfig, CacheEngine, StrategyKind};
//!
//! let engine = CacheEngine::<String>::builder().janitor(false).build().unwrap();
//! engine
//!   .create_cache("pages", CacheConfig::new().max_entries(2).strategy(StrategyKind::Recency))
//!   .unwrap();
//!
//! engine.set("pages", "home", "<h1>home</h1>".to_string()).unwrap();
//! assert_eq!(engine.get("pages", "home").unwrap().as_deref().map(String::as_str), Some("<h1>home</h1>"));
//! assert!(engine.get("pages", "missing").unwrap().is_none());
//! ```

// Public modules that form the API
pub mod builder;
pub mod config;
pub mod error;
pub mod listener;
pub mod persistence;
pub mod policy;
pub mod predictor;
pub mod report;
pub mod transform;
pub mod tuning;

// Internal, crate-only modules
mod engine;
mod entry;
mod instance;
mod loader;
mod metrics;
mod task;
mod time;

// Re-export the primary user-facing types for convenience
pub use builder::{maintenance_interval, EngineBuilder};
pub use config::{CacheConfig, GetOptions, SetOptions};
pub use engine::{CacheEngine, MaintenanceSummary};
pub use entry::{EntryMetadata, Priority, StoredValue, TransformFlags};
pub use error::{BoxError, CacheError, LoadError, PersistenceError, Result, TransformError};
pub use listener::{EvictionListener, EvictionReason};
pub use persistence::{MemoryPersistence, PersistenceAdapter, PersistenceErrorPolicy};
pub use policy::{ScoreWeights, StrategyKind};
pub use predictor::{AccessKind, AccessPatternRecord, PredictionRecord, Trend};
pub use report::{GlobalTotals, InstanceReport, Recommendation, RecommendationKind, StatisticsReport};
#[cfg(feature = "serde")]
pub use transform::JsonTransform;
pub use transform::ValueTransform;
pub use tuning::{StrategySwitch, TuningThresholds};
