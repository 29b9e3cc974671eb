//! Lock-free usage counters shared by the manager and its backends

use crate::cache::types::CacheMetrics;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Process-wide cache counters
///
/// Counting is skipped entirely when metrics are disabled. `hit_rate` is
/// only ever computed in [`MetricsCollector::snapshot`].
#[derive(Debug)]
pub struct MetricsCollector {
    enabled: bool,
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
    evictions: AtomicU64,
    memory_usage: AtomicU64,
    last_access_ms: AtomicI64,
}

impl MetricsCollector {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            sets: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            memory_usage: AtomicU64::new(0),
            last_access_ms: AtomicI64::new(Utc::now().timestamp_millis()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn record_hit(&self) {
        self.bump(&self.hits);
    }

    pub fn record_miss(&self) {
        self.bump(&self.misses);
    }

    pub fn record_set(&self) {
        self.bump(&self.sets);
    }

    pub fn record_delete(&self) {
        self.bump(&self.deletes);
    }

    /// Evictions do not count as an access
    pub fn record_eviction(&self) {
        if self.enabled {
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn set_memory_usage(&self, bytes: u64) {
        if self.enabled {
            self.memory_usage.store(bytes, Ordering::Relaxed);
        }
    }

    /// Zero every counter
    pub fn reset(&self) {
        for counter in [
            &self.hits,
            &self.misses,
            &self.sets,
            &self.deletes,
            &self.evictions,
            &self.memory_usage,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.last_access_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    /// Read-only snapshot with the derived hit rate
    pub fn snapshot(&self) -> CacheMetrics {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;

        CacheMetrics {
            hits,
            misses,
            sets: self.sets.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            hit_rate: if lookups == 0 {
                0.0
            } else {
                hits as f64 / lookups as f64
            },
            memory_usage: self.memory_usage.load(Ordering::Relaxed),
            last_access: DateTime::from_timestamp_millis(
                self.last_access_ms.load(Ordering::Relaxed),
            )
            .unwrap_or_else(Utc::now),
        }
    }

    fn bump(&self, counter: &AtomicU64) {
        if !self.enabled {
            return;
        }
        counter.fetch_add(1, Ordering::Relaxed);
        self.last_access_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new(true)
    }
}
