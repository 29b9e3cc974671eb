//! Core type definitions for the cache system

use crate::error::CacheError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Cache key type
pub type CacheKey = String;

/// Cache value type - payloads are held as JSON values so every backend can
/// store them, typed again at the manager boundary
pub type CacheValue = serde_json::Value;

/// Storage strategy backing a cache operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheStrategy {
    /// Bounded in-memory cache with least-recently-used eviction
    MemoryLru,

    /// Unbounded in-memory map, expired entries reclaimed by the sweep
    Memory,

    /// Volatile string store with a quota, lost when the process exits
    Session,

    /// File-backed string store with a quota
    Persistent,

    /// LMDB store, every operation is its own transaction
    Transactional,
}

impl CacheStrategy {
    /// Every strategy, in resolution order
    pub const ALL: [CacheStrategy; 5] = [
        CacheStrategy::MemoryLru,
        CacheStrategy::Memory,
        CacheStrategy::Session,
        CacheStrategy::Persistent,
        CacheStrategy::Transactional,
    ];

    /// Stable string name used in configuration
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStrategy::MemoryLru => "memory-lru",
            CacheStrategy::Memory => "memory",
            CacheStrategy::Session => "session",
            CacheStrategy::Persistent => "persistent",
            CacheStrategy::Transactional => "transactional",
        }
    }

    /// Whether entries must be encoded to strings for this strategy
    pub fn requires_serialization(&self) -> bool {
        matches!(
            self,
            CacheStrategy::Session | CacheStrategy::Persistent | CacheStrategy::Transactional
        )
    }

    /// Whether the strategy needs an on-disk location
    pub fn requires_storage_dir(&self) -> bool {
        matches!(self, CacheStrategy::Persistent | CacheStrategy::Transactional)
    }
}

impl Default for CacheStrategy {
    fn default() -> Self {
        CacheStrategy::MemoryLru
    }
}

impl fmt::Display for CacheStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CacheStrategy {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        CacheStrategy::ALL
            .into_iter()
            .find(|strategy| strategy.as_str() == normalized)
            .ok_or_else(|| CacheError::UnknownStrategy {
                requested: s.to_string(),
                available: CacheStrategy::ALL
                    .iter()
                    .map(|strategy| strategy.to_string())
                    .collect(),
            })
    }
}

/// Snapshot of cache usage counters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheMetrics {
    /// Total number of cache hits
    pub hits: u64,

    /// Total number of cache misses
    pub misses: u64,

    /// Number of successful writes
    pub sets: u64,

    /// Number of successful deletes
    pub deletes: u64,

    /// Number of entries evicted by a bounded backend
    pub evictions: u64,

    /// `hits / (hits + misses)`, 0 when nothing was read
    pub hit_rate: f64,

    /// Approximate bytes held by in-memory backends and the indices
    pub memory_usage: u64,

    /// Time of the last recorded operation
    pub last_access: DateTime<Utc>,
}

impl CacheMetrics {
    /// Calculate miss rate (0.0 - 1.0)
    pub fn miss_rate(&self) -> f64 {
        if self.hits + self.misses == 0 {
            0.0
        } else {
            1.0 - self.hit_rate
        }
    }

    /// Total number of reads
    pub fn lookups(&self) -> u64 {
        self.hits + self.misses
    }
}

impl fmt::Display for CacheMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CacheMetrics {{ hits: {}, misses: {}, hit_rate: {:.2}%, sets: {}, deletes: {}, evictions: {}, memory: {} bytes }}",
            self.hits,
            self.misses,
            self.hit_rate * 100.0,
            self.sets,
            self.deletes,
            self.evictions,
            self.memory_usage
        )
    }
}
