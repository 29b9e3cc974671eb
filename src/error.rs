//! Error types for cache operations
//!
//! Storage failures are normally swallowed at the backend boundary and only
//! show up in logs. The variants here are what callers can actually observe:
//! serialization failures from `set` and configuration mistakes.

use thiserror::Error;

/// Main error type for cache operations
#[derive(Error, Debug)]
pub enum CacheError {
    /// A backend could not be read or written (quota, missing store, I/O)
    #[error("Storage unavailable ({backend}): {reason}")]
    StorageUnavailable {
        backend: &'static str,
        reason: String,
    },

    /// Payload could not be encoded or decoded
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// A strategy was requested that this cache was not built with
    #[error("Cache strategy '{requested}' not available (available: {})", .available.join(", "))]
    UnknownStrategy {
        requested: String,
        available: Vec<String>,
    },

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Generic error with context
    #[error("Error: {0}")]
    Other(String),
}

/// Result type alias for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;

impl CacheError {
    /// True for errors the manager is allowed to swallow
    pub fn is_storage_unavailable(&self) -> bool {
        matches!(self, CacheError::StorageUnavailable { .. })
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        CacheError::SerializationError(e.to_string())
    }
}

impl From<String> for CacheError {
    fn from(s: String) -> Self {
        CacheError::Other(s)
    }
}

impl From<&str> for CacheError {
    fn from(s: &str) -> Self {
        CacheError::Other(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = CacheError::StorageUnavailable {
            backend: "session",
            reason: "quota exceeded".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Storage unavailable (session): quota exceeded"
        );

        let unknown = CacheError::UnknownStrategy {
            requested: "persistent".to_string(),
            available: vec!["memory-lru".to_string(), "memory".to_string()],
        };
        let message = unknown.to_string();
        assert!(message.contains("'persistent'"));
        assert!(message.contains("memory-lru, memory"));
    }

    #[test]
    fn test_error_conversion() {
        let error: CacheError = "test error".into();
        assert!(matches!(error, CacheError::Other(_)));

        let error: CacheError = "test error".to_string().into();
        assert!(matches!(error, CacheError::Other(_)));

        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let error: CacheError = json_err.into();
        assert!(matches!(error, CacheError::SerializationError(_)));
        assert!(!error.is_storage_unavailable());
    }
}
