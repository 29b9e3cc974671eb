//! Bounded in-memory backend with least-recently-used eviction

use super::CacheBackend;
use crate::cache::entry::CacheEntry;
use crate::cache::metrics::MetricsCollector;
use crate::cache::types::CacheKey;
use crate::error::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Bounded store holding at most `capacity` entries
///
/// Recency is a monotonic tick per touch; the smallest tick is the least
/// recently used key. Evicted keys are buffered until the next `cleanup`
/// so the manager can drop them from its index.
pub struct LruBackend {
    capacity: usize,
    store: RwLock<LruStore>,
    metrics: Arc<MetricsCollector>,
}

#[derive(Default)]
struct LruStore {
    /// key -> (entry, recency tick)
    entries: HashMap<CacheKey, (CacheEntry, u64)>,

    /// recency tick -> key, oldest first
    recency: BTreeMap<u64, CacheKey>,

    next_tick: u64,

    /// Evicted since the last cleanup, bounded by capacity
    evicted: VecDeque<CacheKey>,

    size_bytes: usize,
}

impl LruStore {
    fn touch(&mut self, key: &str) {
        let tick = self.next_tick;
        if let Some((_, old_tick)) = self.entries.get_mut(key) {
            let previous = std::mem::replace(old_tick, tick);
            self.recency.remove(&previous);
            self.recency.insert(tick, key.to_string());
            self.next_tick += 1;
        }
    }

    fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let (entry, tick) = self.entries.remove(key)?;
        self.recency.remove(&tick);
        self.size_bytes = self.size_bytes.saturating_sub(entry.calculate_size());
        Some(entry)
    }

    fn pop_least_recent(&mut self) -> Option<CacheKey> {
        let (_, key) = self.recency.pop_first()?;
        if let Some((entry, _)) = self.entries.remove(&key) {
            self.size_bytes = self.size_bytes.saturating_sub(entry.calculate_size());
        }
        Some(key)
    }
}

impl LruBackend {
    pub fn new(capacity: usize, metrics: Arc<MetricsCollector>) -> Self {
        Self {
            capacity: capacity.max(1),
            store: RwLock::new(LruStore::default()),
            metrics,
        }
    }

}

#[async_trait]
impl CacheBackend for LruBackend {
    fn name(&self) -> &'static str {
        "memory-lru"
    }

    async fn get(&self, key: &str) -> Option<CacheEntry> {
        let mut store = self.store.write().await;
        let entry = store.entries.get(key).map(|(entry, _)| entry.clone())?;
        store.touch(key);
        Some(entry)
    }

    async fn peek(&self, key: &str) -> Option<CacheEntry> {
        let store = self.store.read().await;
        store.entries.get(key).map(|(entry, _)| entry.clone())
    }

    async fn set(&self, key: &str, entry: CacheEntry) -> Result<bool> {
        let size = entry.calculate_size();
        let mut store = self.store.write().await;

        if store.entries.contains_key(key) {
            debug!("Updating existing LRU entry: {}", key);
            store.remove(key);
        } else {
            while store.entries.len() >= self.capacity {
                let Some(evicted) = store.pop_least_recent() else {
                    break;
                };
                debug!("Evicting entry due to max_entries limit: {}", evicted);
                self.metrics.record_eviction();
                if store.evicted.len() >= self.capacity {
                    store.evicted.pop_front();
                }
                store.evicted.push_back(evicted);
            }
        }

        let tick = store.next_tick;
        store.next_tick += 1;
        store.entries.insert(key.to_string(), (entry, tick));
        store.recency.insert(tick, key.to_string());
        store.size_bytes += size;

        Ok(true)
    }

    async fn delete(&self, key: &str) -> bool {
        let mut store = self.store.write().await;
        store.remove(key).is_some()
    }

    async fn clear(&self) {
        let mut store = self.store.write().await;
        let count = store.entries.len();
        *store = LruStore::default();
        debug!("Cleared {} LRU entries", count);
    }

    async fn cleanup(&self) -> Result<Vec<CacheKey>> {
        let now = Utc::now();
        let mut store = self.store.write().await;

        let expired: Vec<CacheKey> = store
            .entries
            .iter()
            .filter(|(_, (entry, _))| !entry.is_live_at(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            store.remove(key);
        }

        let mut removed: Vec<CacheKey> = store.evicted.drain(..).collect();
        removed.extend(expired);
        Ok(removed)
    }

    async fn contains(&self, key: &str) -> bool {
        let store = self.store.read().await;
        store.entries.contains_key(key)
    }

    async fn len(&self) -> usize {
        let store = self.store.read().await;
        store.entries.len()
    }

    async fn size_bytes(&self) -> usize {
        let store = self.store.read().await;
        store.size_bytes
    }
}
