//! Configuration for the cache system

use crate::cache::types::CacheStrategy;
use crate::error::{CacheError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// How entries are encoded for the string-based backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializationConfig {
    /// Durable strategies are only available when enabled
    pub enabled: bool,

    /// Gzip + base64 encoded payloads
    pub compress: bool,
}

impl Default for SerializationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            compress: false,
        }
    }
}

/// Configuration for the cache manager
///
/// Immutable once the manager is built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Strategy used when an operation does not name one
    pub strategy: CacheStrategy,

    /// Default time-to-live for cache entries
    pub default_ttl: Duration,

    /// Maximum number of entries held by the LRU backend
    pub max_entries: usize,

    /// Interval between background sweeps, zero disables the sweeper
    pub cleanup_interval: Duration,

    /// Enable metrics collection
    pub enable_metrics: bool,

    /// Encoding of durable entries
    pub serialization: SerializationConfig,

    /// Root directory for the persistent and transactional stores
    pub storage_dir: Option<PathBuf>,

    /// Byte quota of each scoped string store
    pub scoped_quota_bytes: usize,

    /// LMDB map size in megabytes
    pub transactional_map_size_mb: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            strategy: CacheStrategy::MemoryLru,
            // 5 minutes
            default_ttl: Duration::from_secs(300),
            max_entries: 1_000,
            // Sweep every minute
            cleanup_interval: Duration::from_secs(60),
            enable_metrics: true,
            serialization: SerializationConfig::default(),
            storage_dir: None,
            // 5 MB, the usual browser storage quota
            scoped_quota_bytes: 5 * 1024 * 1024,
            transactional_map_size_mb: 64,
        }
    }
}

impl CacheConfig {
    /// Create a new builder for cache configuration
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::default()
    }

    /// Load configuration from the environment (and `.env` if present)
    ///
    /// Unset variables keep their defaults.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = CacheConfig::builder();

        if let Some(value) = lookup("CACHE_STRATEGY") {
            builder = builder.strategy(value.parse()?);
        }
        if let Some(value) = lookup("CACHE_DEFAULT_TTL_MS") {
            builder = builder.default_ttl(Duration::from_millis(parse_var(
                "CACHE_DEFAULT_TTL_MS",
                &value,
            )?));
        }
        if let Some(value) = lookup("CACHE_MAX_ENTRIES") {
            builder = builder.max_entries(parse_var("CACHE_MAX_ENTRIES", &value)?);
        }
        if let Some(value) = lookup("CACHE_CLEANUP_INTERVAL_MS") {
            builder = builder.cleanup_interval(Duration::from_millis(parse_var(
                "CACHE_CLEANUP_INTERVAL_MS",
                &value,
            )?));
        }
        if let Some(value) = lookup("CACHE_ENABLE_METRICS") {
            builder = builder.enable_metrics(parse_var("CACHE_ENABLE_METRICS", &value)?);
        }
        let defaults = SerializationConfig::default();
        let enabled = match lookup("CACHE_SERIALIZATION") {
            Some(value) => parse_var("CACHE_SERIALIZATION", &value)?,
            None => defaults.enabled,
        };
        let compress = match lookup("CACHE_COMPRESS") {
            Some(value) => parse_var("CACHE_COMPRESS", &value)?,
            None => defaults.compress,
        };
        builder = builder.serialization(SerializationConfig { enabled, compress });
        if let Some(value) = lookup("CACHE_STORAGE_DIR") {
            builder = builder.storage_dir(value);
        }

        let config = builder.build();
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_entries == 0 {
            return Err(CacheError::ConfigError(
                "max_entries must be greater than 0".to_string(),
            ));
        }

        if self.scoped_quota_bytes == 0 {
            return Err(CacheError::ConfigError(
                "scoped_quota_bytes must be greater than 0".to_string(),
            ));
        }

        if self.transactional_map_size_mb == 0 {
            return Err(CacheError::ConfigError(
                "transactional_map_size_mb must be greater than 0".to_string(),
            ));
        }

        if !self.is_available(self.strategy) {
            return Err(CacheError::UnknownStrategy {
                requested: self.strategy.to_string(),
                available: self
                    .available_strategies()
                    .iter()
                    .map(ToString::to_string)
                    .collect(),
            });
        }

        Ok(())
    }

    /// Whether this configuration can build a backend for `strategy`
    pub fn is_available(&self, strategy: CacheStrategy) -> bool {
        if strategy.requires_serialization() && !self.serialization.enabled {
            return false;
        }
        if strategy.requires_storage_dir() && self.storage_dir.is_none() {
            return false;
        }
        true
    }

    /// Strategies this configuration can build
    pub fn available_strategies(&self) -> Vec<CacheStrategy> {
        CacheStrategy::ALL
            .into_iter()
            .filter(|strategy| self.is_available(*strategy))
            .collect()
    }

    /// Whether the background sweeper should run
    pub fn sweeper_enabled(&self) -> bool {
        !self.cleanup_interval.is_zero()
    }
}

fn parse_var<T>(name: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| CacheError::ConfigError(format!("{name}={value:?}: {e}")))
}

/// Builder for cache configuration
#[derive(Debug, Default)]
pub struct CacheConfigBuilder {
    strategy: Option<CacheStrategy>,
    default_ttl: Option<Duration>,
    max_entries: Option<usize>,
    cleanup_interval: Option<Duration>,
    enable_metrics: Option<bool>,
    serialization: Option<SerializationConfig>,
    storage_dir: Option<PathBuf>,
    scoped_quota_bytes: Option<usize>,
    transactional_map_size_mb: Option<usize>,
}

impl CacheConfigBuilder {
    /// Set the default strategy
    pub fn strategy(mut self, strategy: CacheStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Set default TTL for cache entries
    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    /// Set maximum number of LRU entries
    pub fn max_entries(mut self, max: usize) -> Self {
        self.max_entries = Some(max);
        self
    }

    /// Set sweep interval, `Duration::ZERO` disables the sweeper
    pub fn cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = Some(interval);
        self
    }

    /// Enable or disable metrics collection
    pub fn enable_metrics(mut self, enable: bool) -> Self {
        self.enable_metrics = Some(enable);
        self
    }

    /// Set serialization options
    pub fn serialization(mut self, serialization: SerializationConfig) -> Self {
        self.serialization = Some(serialization);
        self
    }

    /// Set the directory for on-disk strategies
    pub fn storage_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.storage_dir = Some(dir.into());
        self
    }

    /// Set the byte quota of scoped stores
    pub fn scoped_quota_bytes(mut self, bytes: usize) -> Self {
        self.scoped_quota_bytes = Some(bytes);
        self
    }

    /// Set the LMDB map size
    pub fn transactional_map_size_mb(mut self, mb: usize) -> Self {
        self.transactional_map_size_mb = Some(mb);
        self
    }

    /// Build the cache configuration
    pub fn build(self) -> CacheConfig {
        let defaults = CacheConfig::default();

        CacheConfig {
            strategy: self.strategy.unwrap_or(defaults.strategy),
            default_ttl: self.default_ttl.unwrap_or(defaults.default_ttl),
            max_entries: self.max_entries.unwrap_or(defaults.max_entries),
            cleanup_interval: self.cleanup_interval.unwrap_or(defaults.cleanup_interval),
            enable_metrics: self.enable_metrics.unwrap_or(defaults.enable_metrics),
            serialization: self.serialization.unwrap_or(defaults.serialization),
            storage_dir: self.storage_dir.or(defaults.storage_dir),
            scoped_quota_bytes: self
                .scoped_quota_bytes
                .unwrap_or(defaults.scoped_quota_bytes),
            transactional_map_size_mb: self
                .transactional_map_size_mb
                .unwrap_or(defaults.transactional_map_size_mb),
        }
    }
}

/// Preset configurations for common use cases
impl CacheConfig {
    /// Short-lived data that changes quickly
    pub fn realtime() -> Self {
        Self {
            default_ttl: Duration::from_secs(30),
            max_entries: 5_000,
            cleanup_interval: Duration::from_secs(15),
            ..Default::default()
        }
    }

    /// Memory-constrained environments
    pub fn small() -> Self {
        Self {
            default_ttl: Duration::from_secs(120),
            max_entries: 100,
            ..Default::default()
        }
    }
}
