//! Cache manager: the public face of the cache
//!
//! Routes each operation to a backend, keeps the tag index and dependency
//! graph in step with what the backends hold, and counts usage. Every
//! mutation of a key, on a backend and in the index together, happens under
//! that key's lock.

use crate::cache::backend::{Backends, CacheBackend};
use crate::cache::config::CacheConfig;
use crate::cache::entry::{CacheEntry, SetOptions, WarmUpEntry};
use crate::cache::index::{CacheIndex, LabelKind};
use crate::cache::invalidation::{InvalidationEvent, InvalidationReason};
use crate::cache::locks::KeyLocks;
use crate::cache::metrics::MetricsCollector;
use crate::cache::sweeper::SweepHandle;
use crate::cache::types::{CacheKey, CacheMetrics, CacheStrategy};
use crate::error::Result;
use chrono::Utc;
use futures::future::join_all;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Multi-backend cache with tag and dependency invalidation
///
/// Construct one per logical cache and share it behind an `Arc`. Dropping
/// the manager stops its background sweep.
pub struct CacheManager {
    inner: Arc<ManagerInner>,
    sweeper: Mutex<Option<SweepHandle>>,
}

/// State shared with the background sweep
pub(crate) struct ManagerInner {
    config: CacheConfig,
    backends: Backends,
    index: RwLock<CacheIndex>,
    metrics: Arc<MetricsCollector>,
    locks: KeyLocks,
    /// Held for the duration of a sweep pass
    sweeping: tokio::sync::Mutex<()>,
}

impl CacheManager {
    /// Build a manager, starting the background sweep when configured
    ///
    /// Fails if the configuration is invalid or its default strategy cannot
    /// be built. The sweep needs a running tokio runtime; without one the
    /// manager works but expired entries are only purged on read or by
    /// [`CacheManager::sweep`].
    pub fn new(config: CacheConfig) -> Result<Self> {
        config.validate()?;

        let metrics = Arc::new(MetricsCollector::new(config.enable_metrics));
        let backends = Backends::from_config(&config, Arc::clone(&metrics));

        info!(
            strategy = %config.strategy,
            max_entries = config.max_entries,
            default_ttl_ms = config.default_ttl.as_millis() as u64,
            available = ?backends.available(),
            "Initializing cache manager"
        );

        let manager = Self {
            inner: Arc::new(ManagerInner {
                config,
                backends,
                index: RwLock::new(CacheIndex::new()),
                metrics,
                locks: KeyLocks::default(),
                sweeping: tokio::sync::Mutex::new(()),
            }),
            sweeper: Mutex::new(None),
        };

        if manager.inner.config.sweeper_enabled() {
            manager.start_sweeper();
        }

        Ok(manager)
    }

    /// Build from environment variables (see [`CacheConfig::from_env`])
    pub fn from_env() -> Result<Self> {
        Self::new(CacheConfig::from_env()?)
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Read a live value
    ///
    /// Absent, expired and undecodable entries all read as `None`. An
    /// expired entry is deleted on the way out.
    pub async fn get<T>(&self, key: &str, strategy: Option<CacheStrategy>) -> Result<Option<T>>
    where
        T: DeserializeOwned,
    {
        self.inner.get(key, strategy).await
    }

    /// Store a value, replacing any previous entry and its labels
    ///
    /// Only an encoding failure is an error. A backend that cannot take
    /// the write leaves the key uncached.
    pub async fn set<T>(&self, key: &str, data: &T, options: SetOptions) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        self.inner.set(key, data, options).await
    }

    /// Remove a key, true if the backend held it
    pub async fn delete(&self, key: &str, strategy: Option<CacheStrategy>) -> Result<bool> {
        self.inner.delete(key, strategy).await
    }

    /// Delete every key carrying any of `tags`
    pub async fn invalidate_by_tags<S: AsRef<str>>(&self, tags: &[S]) -> InvalidationEvent {
        let tags: Vec<String> = tags.iter().map(|t| t.as_ref().to_string()).collect();
        let keys = self.inner.invalidate(LabelKind::Tag, &tags).await;

        info!("Invalidated {} entries with tags: {}", keys.len(), tags.join(", "));
        InvalidationEvent::new(InvalidationReason::TagMatch { tags }, keys)
    }

    /// Delete every key depending on any of `dependencies`
    pub async fn invalidate_by_dependencies<S: AsRef<str>>(
        &self,
        dependencies: &[S],
    ) -> InvalidationEvent {
        let dependencies: Vec<String> = dependencies
            .iter()
            .map(|d| d.as_ref().to_string())
            .collect();
        let keys = self
            .inner
            .invalidate(LabelKind::Dependency, &dependencies)
            .await;

        info!(
            "Invalidated {} entries depending on: {}",
            keys.len(),
            dependencies.join(", ")
        );
        InvalidationEvent::new(InvalidationReason::DependencyChanged { dependencies }, keys)
    }

    /// Clear one backend, or all of them
    ///
    /// Both indices are emptied and metrics reset either way, so entries
    /// left in other backends stay readable but lose their labels.
    pub async fn clear(&self, strategy: Option<CacheStrategy>) -> Result<()> {
        self.inner.clear(strategy).await
    }

    /// Set each entry independently, returning how many were stored
    pub async fn warm_up<T>(&self, entries: Vec<WarmUpEntry<T>>) -> usize
    where
        T: Serialize,
    {
        let total = entries.len();
        let results = join_all(entries.into_iter().map(|entry| async move {
            let (key, data, options) = entry.into_parts();
            let result = self.inner.set(&key, &data, options).await;
            if let Err(e) = &result {
                warn!("Warm-up of '{}' failed: {}", key, e);
            }
            result.is_ok()
        }))
        .await;

        let loaded = results.into_iter().filter(|ok| *ok).count();
        info!("Cache warm-up loaded {}/{} entries", loaded, total);
        loaded
    }

    /// Snapshot of the usage counters
    pub fn metrics(&self) -> CacheMetrics {
        self.inner.metrics.snapshot()
    }

    /// Return the cached value, or compute, store and return it
    ///
    /// A failure to store the computed value is logged, not returned.
    pub async fn get_or_insert_with<T, F, Fut>(
        &self,
        key: &str,
        options: SetOptions,
        compute: F,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        if let Some(value) = self.get(key, options.strategy).await? {
            return Ok(value);
        }

        let value = compute().await;
        if let Err(e) = self.set(key, &value, options).await {
            warn!("Computed value for '{}' not cached: {}", key, e);
        }
        Ok(value)
    }

    /// Run one sweep pass now, waiting for a running one to finish first
    pub async fn sweep(&self) -> InvalidationEvent {
        self.inner.sweep().await
    }

    /// Start the background sweep; false if already running or not possible
    pub fn start_sweeper(&self) -> bool {
        let interval = self.inner.config.cleanup_interval;
        if interval.is_zero() {
            return false;
        }

        let mut slot = self.sweeper.lock();
        if slot.as_ref().is_some_and(SweepHandle::is_running) {
            return false;
        }

        match SweepHandle::spawn(Arc::downgrade(&self.inner), interval) {
            Some(handle) => {
                *slot = Some(handle);
                true
            }
            None => false,
        }
    }

    /// Stop scheduling sweeps; a pass in progress still completes
    pub fn stop_sweeper(&self) -> bool {
        match self.sweeper.lock().take() {
            Some(handle) => {
                handle.stop();
                true
            }
            None => false,
        }
    }

    pub fn is_sweeper_running(&self) -> bool {
        self.sweeper
            .lock()
            .as_ref()
            .is_some_and(SweepHandle::is_running)
    }

    /// Stored entries in one backend, live or not
    pub async fn len(&self, strategy: Option<CacheStrategy>) -> Result<usize> {
        let strategy = self.inner.strategy_or_default(strategy);
        Ok(self.inner.backends.resolve(strategy)?.len().await)
    }

    pub async fn is_empty(&self, strategy: Option<CacheStrategy>) -> Result<bool> {
        Ok(self.len(strategy).await? == 0)
    }

    /// Distinct tags with at least one key
    pub async fn tag_count(&self) -> usize {
        self.inner.index.read().await.tag_count()
    }

    /// Distinct dependencies with at least one key
    pub async fn dependency_count(&self) -> usize {
        self.inner.index.read().await.dependency_count()
    }

    /// Keys currently tagged with `tag`
    pub async fn keys_with_tag(&self, tag: &str) -> Vec<CacheKey> {
        self.inner.index.read().await.keys_with_tag(tag)
    }

    /// Keys currently depending on `dependency`
    pub async fn keys_depending_on(&self, dependency: &str) -> Vec<CacheKey> {
        self.inner.index.read().await.keys_depending_on(dependency)
    }

    pub fn available_strategies(&self) -> Vec<CacheStrategy> {
        self.inner.backends.available()
    }
}

impl Drop for CacheManager {
    fn drop(&mut self) {
        if let Some(handle) = self.sweeper.get_mut().take() {
            handle.stop();
        }
    }
}

impl ManagerInner {
    fn strategy_or_default(&self, strategy: Option<CacheStrategy>) -> CacheStrategy {
        strategy.unwrap_or(self.config.strategy)
    }

    async fn get<T>(&self, key: &str, strategy: Option<CacheStrategy>) -> Result<Option<T>>
    where
        T: DeserializeOwned,
    {
        let strategy = self.strategy_or_default(strategy);
        let backend = self.backends.resolve(strategy)?;
        let _guard = self.locks.lock(key).await;

        let Some(mut entry) = backend.get(key).await else {
            debug!("Cache miss: {}", key);
            self.metrics.record_miss();
            return Ok(None);
        };

        let now = Utc::now();
        if !entry.is_live_at(now) {
            debug!("Cache entry expired: {}", key);
            self.remove_locked(key, strategy, backend).await;
            self.metrics.record_miss();
            return Ok(None);
        }

        let value = match T::deserialize(&entry.data) {
            Ok(value) => value,
            Err(e) => {
                warn!("Cached value for '{}' has an unexpected shape: {}", key, e);
                self.metrics.record_miss();
                return Ok(None);
            }
        };

        entry.mark_accessed(now);
        if let Err(e) = backend.set(key, entry).await {
            warn!("Failed to record access of '{}': {}", key, e);
        }

        debug!("Cache hit: {}", key);
        self.metrics.record_hit();
        Ok(Some(value))
    }

    async fn set<T>(&self, key: &str, data: &T, options: SetOptions) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        let strategy = self.strategy_or_default(options.strategy);
        let backend = self.backends.resolve(strategy)?;

        let ttl = options.ttl.unwrap_or(self.config.default_ttl);
        let entry = CacheEntry::new(serde_json::to_value(data)?, ttl)
            .with_tags(options.tags)
            .with_dependencies(options.dependencies)
            .with_metadata(options.metadata);
        let tags = entry.tags.clone();
        let dependencies = entry.dependencies.clone();

        let _guard = self.locks.lock(key).await;
        if !backend.set(key, entry).await? {
            debug!("Cache entry not stored, {} unavailable: {}", backend.name(), key);
            return Ok(());
        }

        self.index
            .write()
            .await
            .track(key, strategy, &tags, &dependencies);
        self.metrics.record_set();
        debug!("Cached {} in {} (ttl {:?})", key, backend.name(), ttl);
        Ok(())
    }

    async fn delete(&self, key: &str, strategy: Option<CacheStrategy>) -> Result<bool> {
        let strategy = self.strategy_or_default(strategy);
        let backend = self.backends.resolve(strategy)?;

        let _guard = self.locks.lock(key).await;
        let removed = self.remove_locked(key, strategy, backend).await;
        if removed {
            debug!("Removed cache entry: {}", key);
        }
        Ok(removed)
    }

    /// Delete `key` from `backend` and drop its index record; caller holds the key lock
    async fn remove_locked(
        &self,
        key: &str,
        strategy: CacheStrategy,
        backend: &dyn CacheBackend,
    ) -> bool {
        let removed = backend.delete(key).await;
        if removed || !backend.contains(key).await {
            self.index.write().await.untrack(key, strategy);
        }
        if removed {
            self.metrics.record_delete();
        }
        removed
    }

    /// Delete every stored entry carrying one of `labels`, in whichever
    /// backend it lives; a key stored in several backends is listed once
    async fn invalidate(&self, kind: LabelKind, labels: &[String]) -> Vec<CacheKey> {
        let candidates = self.index.read().await.keys_for(kind, labels);

        let removed = join_all(candidates.into_iter().map(|(strategy, key)| async move {
            let _guard = self.locks.lock(&key).await;

            // Labels may have changed between the lookup and the lock
            if !self
                .index
                .read()
                .await
                .carries_any(&key, strategy, kind, labels)
            {
                return None;
            }
            let backend = self.backends.resolve(strategy).ok()?;

            self.remove_locked(&key, strategy, backend)
                .await
                .then_some(key)
        }))
        .await;

        let mut seen = HashSet::new();
        removed
            .into_iter()
            .flatten()
            .filter(|key| seen.insert(key.clone()))
            .collect()
    }

    async fn clear(&self, strategy: Option<CacheStrategy>) -> Result<()> {
        let targets: Vec<&dyn CacheBackend> = match strategy {
            Some(strategy) => vec![self.backends.resolve(strategy)?],
            None => self.backends.iter().map(|(_, backend)| backend).collect(),
        };

        let _guards = self.locks.lock_all().await;
        for backend in &targets {
            backend.clear().await;
        }
        self.index.write().await.clear();
        self.metrics.reset();

        match strategy {
            Some(strategy) => info!("Cleared {} cache", strategy),
            None => info!("Cleared all caches"),
        }
        Ok(())
    }

    /// One pass: purge stale entries, reconcile the index, prune empty buckets
    ///
    /// Each reported key is re-read under its lock, so an entry written
    /// after the backend reported it survives the pass.
    pub(crate) async fn sweep(&self) -> InvalidationEvent {
        let _pass = self.sweeping.lock().await;
        let mut removed = Vec::new();

        for (strategy, backend) in self.backends.iter() {
            let keys = match backend.cleanup().await {
                Ok(keys) => keys,
                Err(e) => {
                    warn!("Cleanup of {} cache failed: {}", backend.name(), e);
                    continue;
                }
            };

            for key in keys {
                let _guard = self.locks.lock(&key).await;
                if let Some(entry) = backend.peek(&key).await {
                    // Re-set since the backend reported it
                    if entry.is_live_at(Utc::now()) {
                        continue;
                    }
                    backend.delete(&key).await;
                }
                self.index.write().await.untrack(&key, strategy);
                removed.push(key);
            }
        }

        let pruned = self.index.write().await.prune_empty();
        self.refresh_memory_usage().await;

        if !removed.is_empty() || pruned > 0 {
            debug!(
                "Sweep removed {} entries, pruned {} empty index buckets",
                removed.len(),
                pruned
            );
        }

        InvalidationEvent::new(InvalidationReason::Expired, removed)
            .with_context(format!("pruned {pruned} empty index buckets"))
    }

    async fn refresh_memory_usage(&self) {
        if !self.metrics.is_enabled() {
            return;
        }

        let mut bytes = self.index.read().await.approximate_size();
        for (_, backend) in self.backends.iter() {
            bytes += backend.size_bytes().await;
        }
        self.metrics.set_memory_usage(bytes as u64);
    }
}

/// Serializable view of a manager's state for diagnostics endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheReport {
    pub strategy: CacheStrategy,
    pub available: Vec<CacheStrategy>,
    pub entries: usize,
    pub tags: usize,
    pub dependencies: usize,
    pub metrics: CacheMetrics,
}

impl CacheManager {
    /// Collect a [`CacheReport`] for the default strategy
    pub async fn report(&self) -> Result<CacheReport> {
        Ok(CacheReport {
            strategy: self.inner.config.strategy,
            available: self.available_strategies(),
            entries: self.len(None).await?,
            tags: self.tag_count().await,
            dependencies: self.dependency_count().await,
            metrics: self.metrics(),
        })
    }
}
