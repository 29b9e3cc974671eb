//! Demonstrates the cache manager
//!
//! This example shows how to:
//! - Configure the cache from the environment
//! - Cache values with tags and dependencies
//! - Invalidate by tag and by dependency
//! - Read metrics

use ouroboros_cache::{
    CacheConfig, CacheKeyBuilder, CacheManager, ResourceKind, SetOptions, WarmUpEntry,
};
use serde_json::{json, Value};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = CacheConfig::from_env()?;
    println!("Cache strategy: {}", config.strategy);
    let cache = CacheManager::new(config)?;

    // 1. Cache a user profile
    println!("1. Caching user profile...");
    let user_key = CacheKeyBuilder::new(ResourceKind::User).identifier(1).build();
    cache
        .set(
            &user_key,
            &json!({"name": "Ana", "academia": 42}),
            SetOptions::new()
                .ttl(Duration::from_secs(30))
                .tag(ResourceKind::User.tag())
                .dependency(ResourceKind::Academia.dependency(42)),
        )
        .await?;
    let user: Option<Value> = cache.get(&user_key, None).await?;
    println!("   {} -> {:?}\n", user_key, user);

    // 2. Warm up event listings
    println!("2. Warming up event listings...");
    let entries = (1..=3)
        .map(|page| {
            let key = CacheKeyBuilder::new(ResourceKind::Event)
                .identifier(7)
                .param("page", page)
                .build();
            WarmUpEntry::new(key, json!({"page": page}))
                .with_tags([ResourceKind::Event.tag()])
                .with_dependencies([ResourceKind::Academia.dependency(42)])
        })
        .collect();
    let loaded = cache.warm_up(entries).await;
    println!("   Loaded {} entries\n", loaded);

    // 3. The academy changed
    println!("3. Invalidating everything derived from academia:42...");
    let event = cache
        .invalidate_by_dependencies(&[ResourceKind::Academia.dependency(42)])
        .await;
    println!("   {} ({} keys)", event.reason, event.len());
    for key in &event.keys {
        println!("   - {}", key);
    }

    let user: Option<Value> = cache.get(&user_key, None).await?;
    println!("   {} after invalidation -> {:?}\n", user_key, user);

    // 4. Metrics
    println!("4. Metrics");
    println!("   {}", cache.metrics());

    Ok(())
}
