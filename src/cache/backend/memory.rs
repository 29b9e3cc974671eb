//! Unbounded in-memory backend

use super::CacheBackend;
use crate::cache::entry::CacheEntry;
use crate::cache::types::CacheKey;
use crate::error::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// Plain map with no capacity limit; only TTL removes entries
#[derive(Default)]
pub struct MemoryBackend {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Option<CacheEntry> {
        self.entries.read().await.get(key).cloned()
    }

    async fn set(&self, key: &str, entry: CacheEntry) -> Result<bool> {
        self.entries.write().await.insert(key.to_string(), entry);
        Ok(true)
    }

    async fn delete(&self, key: &str) -> bool {
        self.entries.write().await.remove(key).is_some()
    }

    async fn clear(&self) {
        let mut entries = self.entries.write().await;
        debug!("Cleared {} memory entries", entries.len());
        entries.clear();
    }

    async fn cleanup(&self) -> Result<Vec<CacheKey>> {
        let now = Utc::now();
        let mut entries = self.entries.write().await;

        let expired: Vec<CacheKey> = entries
            .iter()
            .filter(|(_, entry)| !entry.is_live_at(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            entries.remove(key);
        }

        Ok(expired)
    }

    async fn contains(&self, key: &str) -> bool {
        self.entries.read().await.contains_key(key)
    }

    async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    async fn size_bytes(&self) -> usize {
        self.entries
            .read()
            .await
            .values()
            .map(CacheEntry::calculate_size)
            .sum()
    }
}
