//! # Multi-Backend Cache
//!
//! An in-process key/value cache with pluggable storage and two secondary
//! indices for bulk invalidation.
//!
//! ## Features
//!
//! - **TTL-Based Expiration**: entries are live while `now - created_at < ttl`,
//!   checked on every read
//! - **Pluggable Backends**: bounded LRU, unbounded memory, volatile and
//!   file-backed scoped stores, and an LMDB transactional store
//! - **Tag Invalidation**: drop every entry carrying a label
//! - **Dependency Invalidation**: drop every entry derived from a changed
//!   upstream resource (`academia:42`)
//! - **Metrics**: hits, misses, sets, deletes, evictions and hit rate
//! - **Background Sweep**: periodic purge of expired entries and index pruning
//!
//! ## Example
//!
//! ```rust
//! use ouroboros_cache::cache::{CacheConfig, CacheManager, SetOptions};
//! use serde_json::{json, Value};
//! use std::time::Duration;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let cache = CacheManager::new(CacheConfig::default())?;
//!
//! cache
//!     .set(
//!         "user:1",
//!         &json!({"name": "Ana"}),
//!         SetOptions::new()
//!             .ttl(Duration::from_secs(60))
//!             .tag("users")
//!             .dependency("academia:42"),
//!     )
//!     .await?;
//!
//! let user: Option<Value> = cache.get("user:1", None).await?;
//! assert!(user.is_some());
//!
//! // The academy changed: everything derived from it goes
//! cache.invalidate_by_dependencies(&["academia:42"]).await;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod codec;
pub mod config;
pub mod entry;
pub mod index;
pub mod invalidation;
pub mod keys;
pub mod locks;
pub mod manager;
pub mod metrics;
pub mod sweeper;
pub mod types;

pub use backend::{CacheBackend, StoreError};
pub use config::{CacheConfig, CacheConfigBuilder, SerializationConfig};
pub use entry::{CacheEntry, SetOptions, WarmUpEntry};
pub use invalidation::{InvalidationEvent, InvalidationReason};
pub use keys::{CacheKeyBuilder, ResourceKind};
pub use manager::{CacheManager, CacheReport};
pub use metrics::MetricsCollector;
pub use sweeper::SweepHandle;
pub use types::{CacheKey, CacheMetrics, CacheStrategy, CacheValue};
