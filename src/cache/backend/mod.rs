//! Storage backends behind the cache manager
//!
//! Every strategy implements [`CacheBackend`]. Backends swallow their own
//! storage failures (logged at warn) so a broken store looks like an empty
//! one; only encoding failures come back as errors from `set`.

mod durable;
mod lru;
mod memory;
mod scoped;
mod transactional;

pub use durable::DurableBackend;
pub use lru::LruBackend;
pub use memory::MemoryBackend;
pub use scoped::{FileStore, ScopedStore, StoreError, VolatileStore};
pub use transactional::TransactionalBackend;

use crate::cache::config::CacheConfig;
use crate::cache::entry::CacheEntry;
use crate::cache::metrics::MetricsCollector;
use crate::cache::types::{CacheKey, CacheStrategy};
use crate::error::{CacheError, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// Uniform contract over one storage strategy
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Short name used in logs and errors
    fn name(&self) -> &'static str;

    /// Read an entry, live or not
    async fn get(&self, key: &str) -> Option<CacheEntry>;

    /// Read an entry without counting it as a use
    async fn peek(&self, key: &str) -> Option<CacheEntry> {
        self.get(key).await
    }

    /// Store an entry
    ///
    /// `Ok(false)` means the store was unavailable and nothing was written.
    async fn set(&self, key: &str, entry: CacheEntry) -> Result<bool>;

    /// Remove an entry, true if it existed
    async fn delete(&self, key: &str) -> bool;

    /// Remove every entry owned by this backend
    async fn clear(&self);

    /// Keys that are stale or already gone
    ///
    /// In-memory backends purge expired entries under their own lock and
    /// report them along with evictions. Stores shared with other writers
    /// only report; the manager re-reads each key under its lock and deletes
    /// what is still stale.
    async fn cleanup(&self) -> Result<Vec<CacheKey>> {
        Ok(Vec::new())
    }

    /// Presence check that does not count as a use
    async fn contains(&self, key: &str) -> bool {
        self.get(key).await.is_some()
    }

    /// Number of stored entries, live or not
    async fn len(&self) -> usize;

    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Approximate bytes held in process memory
    async fn size_bytes(&self) -> usize {
        0
    }
}

/// The fixed set of backends a manager was built with
///
/// Resolution is a `match` over [`CacheStrategy`]; a strategy the
/// configuration could not build resolves to `UnknownStrategy`.
pub struct Backends {
    lru: LruBackend,
    memory: MemoryBackend,
    session: Option<DurableBackend<VolatileStore>>,
    persistent: Option<DurableBackend<FileStore>>,
    transactional: Option<TransactionalBackend>,
}

impl Backends {
    pub fn from_config(config: &CacheConfig, metrics: Arc<MetricsCollector>) -> Self {
        let build = |strategy: CacheStrategy| config.is_available(strategy);
        let storage_dir = config.storage_dir.clone().unwrap_or_default();

        Self {
            lru: LruBackend::new(config.max_entries, metrics),
            memory: MemoryBackend::new(),
            session: build(CacheStrategy::Session).then(|| {
                DurableBackend::new(
                    VolatileStore::new(config.scoped_quota_bytes),
                    &config.serialization,
                )
            }),
            persistent: build(CacheStrategy::Persistent).then(|| {
                DurableBackend::new(
                    FileStore::new(storage_dir.join("persistent"), config.scoped_quota_bytes),
                    &config.serialization,
                )
            }),
            transactional: build(CacheStrategy::Transactional).then(|| {
                TransactionalBackend::new(
                    storage_dir.join("lmdb"),
                    config.transactional_map_size_mb,
                    &config.serialization,
                )
            }),
        }
    }

    /// Backend for `strategy`, or `UnknownStrategy` naming what is available
    pub fn resolve(&self, strategy: CacheStrategy) -> Result<&dyn CacheBackend> {
        let backend: Option<&dyn CacheBackend> = match strategy {
            CacheStrategy::MemoryLru => Some(&self.lru),
            CacheStrategy::Memory => Some(&self.memory),
            CacheStrategy::Session => self.session.as_ref().map(|b| b as &dyn CacheBackend),
            CacheStrategy::Persistent => self.persistent.as_ref().map(|b| b as &dyn CacheBackend),
            CacheStrategy::Transactional => {
                self.transactional.as_ref().map(|b| b as &dyn CacheBackend)
            }
        };

        backend.ok_or_else(|| CacheError::UnknownStrategy {
            requested: strategy.to_string(),
            available: self.available().iter().map(ToString::to_string).collect(),
        })
    }

    /// Strategies that resolve
    pub fn available(&self) -> Vec<CacheStrategy> {
        CacheStrategy::ALL
            .into_iter()
            .filter(|strategy| self.is_available(*strategy))
            .collect()
    }

    pub fn is_available(&self, strategy: CacheStrategy) -> bool {
        match strategy {
            CacheStrategy::MemoryLru | CacheStrategy::Memory => true,
            CacheStrategy::Session => self.session.is_some(),
            CacheStrategy::Persistent => self.persistent.is_some(),
            CacheStrategy::Transactional => self.transactional.is_some(),
        }
    }

    /// Every built backend with its strategy
    pub fn iter(&self) -> impl Iterator<Item = (CacheStrategy, &dyn CacheBackend)> + '_ {
        CacheStrategy::ALL
            .into_iter()
            .filter_map(move |strategy| self.resolve(strategy).ok().map(|b| (strategy, b)))
    }
}
