//! # Ouroboros Cache (ouroboros-cache)
//!
//! An in-process, multi-backend cache for Rust with time-based expiry,
//! tag and dependency invalidation, and usage metrics.
//!
//! ## Features
//!
//! - Five interchangeable storage strategies behind one async API
//! - Tag index and dependency graph for bulk invalidation
//! - Per-key serialization of every backend + index mutation
//! - Background sweep of expired and evicted entries
//! - Storage failures degrade to cache misses, never to caller errors
//!
//! ## Strategies
//!
//! | Strategy        | Storage                                   |
//! |-----------------|-------------------------------------------|
//! | `memory-lru`    | bounded map, least-recently-used eviction |
//! | `memory`        | unbounded map                             |
//! | `session`       | process-scoped string store with a quota  |
//! | `persistent`    | one file per key under `storage_dir`      |
//! | `transactional` | LMDB database under `storage_dir`         |
//!
//! The string-based strategies need `serialization.enabled`; the on-disk
//! ones also need a `storage_dir`.
//!
//! ## Example
//!
//! ```no_run
//! use ouroboros_cache::{CacheConfig, CacheManager, CacheStrategy, SetOptions};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = CacheConfig::builder()
//!         .default_ttl(Duration::from_secs(300))
//!         .max_entries(1_000)
//!         .storage_dir("/var/cache/app")
//!         .build();
//!     let cache = CacheManager::new(config)?;
//!
//!     cache
//!         .set(
//!             "academia:42:summary",
//!             &vec!["crossfit", "yoga"],
//!             SetOptions::new()
//!                 .strategy(CacheStrategy::Persistent)
//!                 .dependency("academia:42"),
//!         )
//!         .await?;
//!
//!     let summary: Option<Vec<String>> = cache
//!         .get("academia:42:summary", Some(CacheStrategy::Persistent))
//!         .await?;
//!     println!("Summary: {:?}", summary);
//!
//!     println!("Metrics: {}", cache.metrics());
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod error;

// Re-export main types for convenience
pub use cache::{
    CacheBackend, CacheConfig, CacheConfigBuilder, CacheEntry, CacheKey, CacheKeyBuilder,
    CacheManager, CacheMetrics, CacheReport, CacheStrategy, CacheValue, InvalidationEvent,
    InvalidationReason, ResourceKind, SerializationConfig, SetOptions, WarmUpEntry,
};
pub use error::{CacheError, Result};
