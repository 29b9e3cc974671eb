//! Durable backend over a scoped string store

use super::scoped::{ScopedStore, StoreError};
use super::CacheBackend;
use crate::cache::codec::EntryCodec;
use crate::cache::config::SerializationConfig;
use crate::cache::entry::CacheEntry;
use crate::cache::types::CacheKey;
use crate::error::{CacheError, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, warn};

/// Namespace prefix of every key this backend owns in its store
pub const KEY_PREFIX: &str = "cache:";

/// Stores encoded entries under `cache:<key>`
///
/// Store failures (quota, I/O) are logged and reported as a miss or a
/// dropped write. Only a failure to encode the entry is returned to the
/// caller. Calls into a store that does blocking I/O run on the blocking
/// pool.
pub struct DurableBackend<S> {
    store: Arc<S>,
    codec: EntryCodec,
}

fn scoped(key: &str) -> String {
    format!("{KEY_PREFIX}{key}")
}

/// Keys this backend owns in `store`, prefix stripped
fn owned_keys<S: ScopedStore>(store: &S) -> std::result::Result<Vec<CacheKey>, StoreError> {
    Ok(store
        .keys()?
        .into_iter()
        .filter_map(|key| key.strip_prefix(KEY_PREFIX).map(str::to_string))
        .collect())
}

impl<S: ScopedStore + 'static> DurableBackend<S> {
    pub fn new(store: S, serialization: &SerializationConfig) -> Self {
        Self {
            store: Arc::new(store),
            codec: EntryCodec::from_config(serialization),
        }
    }

    /// Run `op` against the store, off the async workers if it blocks
    async fn with_store<T, F>(&self, op: F) -> std::result::Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&S) -> std::result::Result<T, StoreError> + Send + 'static,
    {
        if !self.store.is_blocking() {
            return op(self.store.as_ref());
        }

        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || op(store.as_ref())).await?
    }

    fn unavailable(&self, operation: &str, key: &str, reason: impl std::fmt::Display) {
        let err = CacheError::StorageUnavailable {
            backend: self.store.name(),
            reason: reason.to_string(),
        };
        warn!("Cache {} of '{}' skipped: {}", operation, key, err);
    }

    async fn remove(&self, key: &str) -> std::result::Result<bool, StoreError> {
        let item = scoped(key);
        self.with_store(move |store| store.remove_item(&item)).await
    }
}

#[async_trait]
impl<S: ScopedStore + 'static> CacheBackend for DurableBackend<S> {
    fn name(&self) -> &'static str {
        self.store.name()
    }

    async fn get(&self, key: &str) -> Option<CacheEntry> {
        let item = scoped(key);
        let raw = match self.with_store(move |store| store.get_item(&item)).await {
            Ok(raw) => raw?,
            Err(e) => {
                self.unavailable("read", key, e);
                return None;
            }
        };

        match self.codec.decode(&raw) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Dropping undecodable cache entry '{}': {}", key, e);
                if let Err(e) = self.remove(key).await {
                    self.unavailable("removal", key, e);
                }
                None
            }
        }
    }

    async fn set(&self, key: &str, entry: CacheEntry) -> Result<bool> {
        let raw = self.codec.encode(&entry)?;
        let item = scoped(key);
        match self.with_store(move |store| store.set_item(&item, &raw)).await {
            Ok(()) => Ok(true),
            Err(e) => {
                self.unavailable("write", key, e);
                Ok(false)
            }
        }
    }

    async fn delete(&self, key: &str) -> bool {
        match self.remove(key).await {
            Ok(existed) => existed,
            Err(e) => {
                self.unavailable("removal", key, e);
                false
            }
        }
    }

    async fn clear(&self) {
        let name = self.store.name();
        let cleared = self
            .with_store(move |store| {
                let keys = owned_keys(store)?;
                for key in &keys {
                    if let Err(e) = store.remove_item(&scoped(key)) {
                        warn!("Cache removal of '{}' skipped: {}", key, e);
                    }
                }
                Ok(keys.len())
            })
            .await;

        match cleared {
            Ok(count) => debug!("Cleared {} {} entries", count, name),
            Err(e) => self.unavailable("clear", "*", e),
        }
    }

    async fn cleanup(&self) -> Result<Vec<CacheKey>> {
        let codec = self.codec;
        let now = Utc::now();

        self.with_store(move |store| {
            let mut stale = Vec::new();
            for key in owned_keys(store)? {
                let expired = match store.get_item(&scoped(&key)) {
                    Ok(Some(raw)) => codec
                        .decode(&raw)
                        .map(|entry| !entry.is_live_at(now))
                        .unwrap_or(true),
                    Ok(None) => false,
                    Err(e) => {
                        warn!("Cache read of '{}' skipped: {}", key, e);
                        false
                    }
                };
                if expired {
                    stale.push(key);
                }
            }
            Ok(stale)
        })
        .await
        .map_err(|e| CacheError::StorageUnavailable {
            backend: self.store.name(),
            reason: e.to_string(),
        })
    }

    async fn contains(&self, key: &str) -> bool {
        let item = scoped(key);
        matches!(
            self.with_store(move |store| store.get_item(&item)).await,
            Ok(Some(_))
        )
    }

    async fn len(&self) -> usize {
        self.with_store(|store| owned_keys(store).map(|keys| keys.len()))
            .await
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::backend::{FileStore, VolatileStore};
    use serde_json::json;
    use std::time::Duration;

    fn session(quota: usize) -> DurableBackend<VolatileStore> {
        DurableBackend::new(VolatileStore::new(quota), &SerializationConfig::default())
    }

    #[tokio::test]
    async fn test_keys_are_prefixed() {
        let backend = session(1024);
        backend
            .set("user:1", CacheEntry::new(json!({"name": "Ana"}), Duration::from_secs(60)))
            .await
            .unwrap();

        assert_eq!(backend.store.keys().unwrap(), vec!["cache:user:1".to_string()]);
        assert_eq!(backend.get("user:1").await.unwrap().data, json!({"name": "Ana"}));
        assert_eq!(backend.len().await, 1);
    }

    #[tokio::test]
    async fn test_foreign_keys_are_left_alone() {
        let backend = session(1024);
        backend.store.set_item("theme", "dark").unwrap();
        backend
            .set("k", CacheEntry::new(json!(1), Duration::from_secs(60)))
            .await
            .unwrap();

        backend.clear().await;
        assert_eq!(backend.store.keys().unwrap(), vec!["theme".to_string()]);
        assert!(backend.is_empty().await);
    }

    #[tokio::test]
    async fn test_quota_exceeded_is_a_dropped_write() {
        let backend = session(64);
        let stored = backend
            .set("big", CacheEntry::new(json!("x".repeat(500)), Duration::from_secs(60)))
            .await
            .unwrap();

        assert!(!stored);
        assert!(backend.get("big").await.is_none());
    }

    #[tokio::test]
    async fn test_corrupt_entry_reads_as_miss() {
        let backend = session(1024);
        backend.store.set_item("cache:bad", "{not json").unwrap();

        assert!(backend.get("bad").await.is_none());
        assert!(!backend.contains("bad").await);
    }

    #[tokio::test]
    async fn test_cleanup_reports_without_deleting() {
        let backend = session(4096);
        backend
            .set("old", CacheEntry::new(json!(1), Duration::ZERO))
            .await
            .unwrap();
        backend
            .set("new", CacheEntry::new(json!(2), Duration::from_secs(60)))
            .await
            .unwrap();

        assert_eq!(backend.cleanup().await.unwrap(), vec!["old".to_string()]);
        assert!(backend.contains("old").await);
        assert!(backend.contains("new").await);
    }

    #[tokio::test]
    async fn test_file_backed_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let config = SerializationConfig {
            enabled: true,
            compress: true,
        };

        DurableBackend::new(FileStore::new(dir.path(), 1 << 20), &config)
            .set("report", CacheEntry::new(json!([1, 2, 3]), Duration::from_secs(60)))
            .await
            .unwrap();

        let reopened = DurableBackend::new(FileStore::new(dir.path(), 1 << 20), &config);
        assert_eq!(reopened.get("report").await.unwrap().data, json!([1, 2, 3]));
        assert_eq!(reopened.len().await, 1);
        assert!(reopened.cleanup().await.unwrap().is_empty());
        assert!(reopened.delete("report").await);
        assert!(!reopened.delete("report").await);
    }
}
