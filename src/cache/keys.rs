//! Key and label conventions for application resources
//!
//! Keys look like `kind:id` with optional sorted `?name=value` parameters;
//! dependencies use the bare `kind:id` form so that a change to one
//! resource can invalidate every derived entry.

use crate::cache::types::CacheKey;
use serde::{Deserialize, Serialize};

/// Kind of resource a cached value is built from
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    User,

    /// Gym / academy profile
    Academia,

    Listing,

    Event,

    Form,

    Payment,

    Notification,

    /// Anything else, rendered verbatim
    Custom(String),
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::User => write!(f, "user"),
            ResourceKind::Academia => write!(f, "academia"),
            ResourceKind::Listing => write!(f, "listing"),
            ResourceKind::Event => write!(f, "event"),
            ResourceKind::Form => write!(f, "form"),
            ResourceKind::Payment => write!(f, "payment"),
            ResourceKind::Notification => write!(f, "notification"),
            ResourceKind::Custom(s) => write!(f, "{}", s),
        }
    }
}

impl ResourceKind {
    /// Dependency label for one resource, e.g. `academia:42`
    pub fn dependency(&self, id: impl std::fmt::Display) -> String {
        format!("{}:{}", self, id)
    }

    /// Tag covering every entry of this kind
    pub fn tag(&self) -> String {
        format!("{}s", self)
    }
}

/// Cache key builder for resource lookups
pub struct CacheKeyBuilder {
    kind: ResourceKind,
    identifier: String,
    params: Vec<(String, String)>,
}

impl CacheKeyBuilder {
    pub fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            identifier: String::new(),
            params: Vec::new(),
        }
    }

    /// Set the primary identifier
    pub fn identifier(mut self, id: impl std::fmt::Display) -> Self {
        self.identifier = id.to_string();
        self
    }

    /// Add a parameter to the key
    pub fn param(mut self, key: impl Into<String>, value: impl std::fmt::Display) -> Self {
        self.params.push((key.into(), value.to_string()));
        self
    }

    /// Build the key; parameter order does not matter
    pub fn build(mut self) -> CacheKey {
        let mut key = format!("{}:{}", self.kind, self.identifier);

        if !self.params.is_empty() {
            self.params.sort();
            let params: Vec<String> = self
                .params
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            key.push('?');
            key.push_str(&params.join("&"));
        }

        key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_key() {
        let key = CacheKeyBuilder::new(ResourceKind::User).identifier(1).build();
        assert_eq!(key, "user:1");
    }

    #[test]
    fn test_params_are_sorted() {
        let a = CacheKeyBuilder::new(ResourceKind::Listing)
            .identifier("search")
            .param("page", 2)
            .param("city", "recife")
            .build();
        let b = CacheKeyBuilder::new(ResourceKind::Listing)
            .identifier("search")
            .param("city", "recife")
            .param("page", 2)
            .build();

        assert_eq!(a, "listing:search?city=recife&page=2");
        assert_eq!(a, b);
    }

    #[test]
    fn test_labels() {
        assert_eq!(ResourceKind::Academia.dependency(42), "academia:42");
        assert_eq!(ResourceKind::User.tag(), "users");
        assert_eq!(
            ResourceKind::Custom("plan".to_string()).dependency("gold"),
            "plan:gold"
        );
    }
}
