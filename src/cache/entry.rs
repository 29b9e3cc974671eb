//! Cache entry management with TTL support

use crate::cache::types::{CacheStrategy, CacheValue};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

/// Metadata key recording the last time an entry was read
pub const LAST_ACCESS_KEY: &str = "last_access";

/// A cache entry with TTL, invalidation labels and open metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// The cached payload
    pub data: CacheValue,

    /// When the entry was written
    pub created_at: DateTime<Utc>,

    /// Time-to-live measured from `created_at`
    #[serde(with = "duration_millis")]
    pub ttl: Duration,

    /// Tags for bulk invalidation
    #[serde(default)]
    pub tags: BTreeSet<String>,

    /// Upstream resources this entry was derived from
    #[serde(default)]
    pub dependencies: BTreeSet<String>,

    /// Entry version, 1 on every write
    pub version: u64,

    /// Open key/value metadata
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl CacheEntry {
    /// Create a new entry created now
    pub fn new(data: CacheValue, ttl: Duration) -> Self {
        Self::created_at(data, ttl, Utc::now())
    }

    /// Create a new entry with an explicit creation time
    pub fn created_at(data: CacheValue, ttl: Duration, created_at: DateTime<Utc>) -> Self {
        let mut metadata = HashMap::new();
        metadata.insert(
            LAST_ACCESS_KEY.to_string(),
            serde_json::Value::from(created_at.timestamp_millis()),
        );

        Self {
            data,
            created_at,
            ttl,
            tags: BTreeSet::new(),
            dependencies: BTreeSet::new(),
            version: 1,
            metadata,
        }
    }

    /// Attach tags
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Attach dependencies
    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies
            .extend(dependencies.into_iter().map(Into::into));
        self
    }

    /// Merge caller metadata, keeping `last_access` owned by the cache
    pub fn with_metadata(mut self, metadata: HashMap<String, serde_json::Value>) -> Self {
        for (key, value) in metadata {
            if key != LAST_ACCESS_KEY {
                self.metadata.insert(key, value);
            }
        }
        self
    }

    /// Age of the entry at `now`; zero if `created_at` lies in the future
    ///
    /// Ages come from wall-clock timestamps so durable entries keep their
    /// expiry across restarts. A clock stepped backwards reads as age zero.
    pub fn age_at(&self, now: DateTime<Utc>) -> Duration {
        (now - self.created_at).to_std().unwrap_or(Duration::ZERO)
    }

    /// Live iff `now - created_at < ttl`
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.age_at(now) < self.ttl
    }

    /// Record a read
    pub fn mark_accessed(&mut self, now: DateTime<Utc>) {
        self.metadata.insert(
            LAST_ACCESS_KEY.to_string(),
            serde_json::Value::from(now.timestamp_millis()),
        );
    }

    /// Last read time, if recorded
    pub fn last_access(&self) -> Option<DateTime<Utc>> {
        self.metadata
            .get(LAST_ACCESS_KEY)
            .and_then(|v| v.as_i64())
            .and_then(DateTime::from_timestamp_millis)
    }

    /// Approximate in-memory size of this entry in bytes
    pub fn calculate_size(&self) -> usize {
        let labels: usize = self
            .tags
            .iter()
            .chain(self.dependencies.iter())
            .map(String::len)
            .sum();
        json_size(&self.data) + labels + self.metadata.len() * 32 + std::mem::size_of::<Self>()
    }
}

fn json_size(value: &serde_json::Value) -> usize {
    match value {
        serde_json::Value::Null | serde_json::Value::Bool(_) => 1,
        serde_json::Value::Number(_) => 8,
        serde_json::Value::String(s) => s.len(),
        serde_json::Value::Array(items) => items.iter().map(json_size).sum::<usize>() + 8,
        serde_json::Value::Object(map) => {
            map.iter().map(|(k, v)| k.len() + json_size(v)).sum::<usize>() + 16
        }
    }
}

/// Options accepted by `CacheManager::set`
#[derive(Debug, Clone, Default)]
pub struct SetOptions {
    /// Overrides the configured default TTL
    pub ttl: Option<Duration>,

    /// Tags for bulk invalidation
    pub tags: Vec<String>,

    /// Upstream resources the value was derived from
    pub dependencies: Vec<String>,

    /// Overrides the configured default strategy
    pub strategy: Option<CacheStrategy>,

    /// Extra metadata stored alongside the entry
    pub metadata: HashMap<String, serde_json::Value>,
}

impl SetOptions {
    /// Empty options, every field falls back to configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the TTL
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Add a tag
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Replace the tag list
    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Add a dependency
    pub fn dependency(mut self, dependency: impl Into<String>) -> Self {
        self.dependencies.push(dependency.into());
        self
    }

    /// Replace the dependency list
    pub fn dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }

    /// Route to a specific strategy
    pub fn strategy(mut self, strategy: CacheStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Add one metadata value
    pub fn metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// One entry for `CacheManager::warm_up`
#[derive(Debug, Clone)]
pub struct WarmUpEntry<T> {
    pub key: String,
    pub data: T,
    pub ttl: Option<Duration>,
    pub tags: Vec<String>,
    pub dependencies: Vec<String>,
}

impl<T> WarmUpEntry<T> {
    /// Entry with default TTL and no labels
    pub fn new(key: impl Into<String>, data: T) -> Self {
        Self {
            key: key.into(),
            data,
            ttl: None,
            tags: Vec::new(),
            dependencies: Vec::new(),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }

    pub(crate) fn into_parts(self) -> (String, T, SetOptions) {
        let options = SetOptions {
            ttl: self.ttl,
            tags: self.tags,
            dependencies: self.dependencies,
            ..SetOptions::default()
        };
        (self.key, self.data, options)
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis().min(u64::MAX as u128) as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cache_entry_creation() {
        let entry = CacheEntry::new(json!({"name": "Ana"}), Duration::from_secs(3600));

        assert_eq!(entry.data, json!({"name": "Ana"}));
        assert!(entry.is_live_at(Utc::now()));
        assert_eq!(entry.version, 1);
        assert!(entry.last_access().is_some());
    }

    #[test]
    fn test_liveness_boundary() {
        let t0 = Utc::now();
        let entry = CacheEntry::created_at(json!(1), Duration::from_millis(1000), t0);

        assert!(entry.is_live_at(t0));
        assert!(entry.is_live_at(t0 + chrono::Duration::milliseconds(999)));
        assert!(!entry.is_live_at(t0 + chrono::Duration::milliseconds(1000)));
        assert!(!entry.is_live_at(t0 + chrono::Duration::milliseconds(5000)));
    }

    #[test]
    fn test_zero_ttl_is_never_live() {
        let entry = CacheEntry::new(json!("x"), Duration::ZERO);
        assert!(!entry.is_live_at(entry.created_at));
    }

    #[test]
    fn test_backwards_clock_reads_as_fresh() {
        let t0 = Utc::now();
        let entry = CacheEntry::created_at(json!(1), Duration::from_millis(1000), t0);
        let earlier = t0 - chrono::Duration::seconds(30);

        assert_eq!(entry.age_at(earlier), Duration::ZERO);
        assert!(entry.is_live_at(earlier));
    }

    #[test]
    fn test_labels() {
        let entry = CacheEntry::new(json!(null), Duration::from_secs(60))
            .with_tags(["users", "users"])
            .with_dependencies(["academia:42"]);

        assert_eq!(entry.tags.len(), 1);
        assert!(entry.tags.contains("users"));
        assert!(!entry.tags.contains("groups"));
        assert!(entry.dependencies.contains("academia:42"));
    }

    #[test]
    fn test_metadata_cannot_override_last_access() {
        let mut metadata = HashMap::new();
        metadata.insert("source".to_string(), json!("api"));
        metadata.insert(LAST_ACCESS_KEY.to_string(), json!("bogus"));

        let entry = CacheEntry::new(json!(1), Duration::from_secs(60)).with_metadata(metadata);
        assert_eq!(entry.metadata.get("source"), Some(&json!("api")));
        assert!(entry.last_access().is_some());
    }

    #[test]
    fn test_mark_accessed() {
        let t0 = Utc::now() - chrono::Duration::seconds(10);
        let mut entry = CacheEntry::created_at(json!(1), Duration::from_secs(60), t0);
        let before = entry.last_access().unwrap();

        entry.mark_accessed(Utc::now());
        assert!(entry.last_access().unwrap() > before);
    }

    #[test]
    fn test_serde_keeps_ttl_in_millis() {
        let entry = CacheEntry::new(json!([1, 2]), Duration::from_millis(1500)).with_tags(["a"]);
        let encoded = serde_json::to_value(&entry).unwrap();
        assert_eq!(encoded["ttl"], json!(1500));

        let decoded: CacheEntry = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded.ttl, Duration::from_millis(1500));
        assert!(decoded.tags.contains("a"));
    }

    #[test]
    fn test_calculate_size() {
        let small = CacheEntry::new(json!("a"), Duration::from_secs(1));
        let large = CacheEntry::new(json!("a".repeat(1000)), Duration::from_secs(1));
        assert!(large.calculate_size() > small.calculate_size() + 900);
    }

    #[test]
    fn test_warm_up_entry_parts() {
        let (key, data, options) = WarmUpEntry::new("u1", 5)
            .with_ttl(Duration::from_secs(1))
            .with_tags(["users"])
            .into_parts();
        assert_eq!(key, "u1");
        assert_eq!(data, 5);
        assert_eq!(options.ttl, Some(Duration::from_secs(1)));
        assert_eq!(options.tags, vec!["users".to_string()]);
        assert!(options.strategy.is_none());
    }
}
