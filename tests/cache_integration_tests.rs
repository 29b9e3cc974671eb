//! Integration tests for the cache manager
//!
//! These tests verify the complete cache functionality including:
//! - Basic cache operations
//! - TTL expiration
//! - LRU eviction
//! - Tag and dependency invalidation
//! - Metrics and clear
//! - Warm-up
//! - Background sweep
//! - Concurrent access

use futures::future::join_all;
use ouroboros_cache::cache::{
    CacheConfig, CacheKeyBuilder, CacheManager, CacheStrategy, InvalidationReason, ResourceKind,
    SetOptions, WarmUpEntry,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct User {
    name: String,
}

fn config() -> CacheConfig {
    CacheConfig::builder()
        .default_ttl(Duration::from_secs(60))
        .cleanup_interval(Duration::ZERO)
        .build()
}

fn manager() -> CacheManager {
    CacheManager::new(config()).unwrap()
}

async fn get_value(cache: &CacheManager, key: &str) -> Option<Value> {
    cache.get(key, None).await.unwrap()
}

#[tokio::test]
async fn test_basic_cache_operations() {
    let cache = manager();

    let ana = User {
        name: "Ana".to_string(),
    };
    cache.set("user:1", &ana, SetOptions::new()).await.unwrap();

    let value: Option<User> = cache.get("user:1", None).await.unwrap();
    assert_eq!(value, Some(ana));

    let metrics = cache.metrics();
    assert_eq!(metrics.hits, 1);
    assert_eq!(metrics.misses, 0);
    assert_eq!(metrics.sets, 1);
}

#[tokio::test]
async fn test_ttl_boundary() {
    let cache = manager();

    cache
        .set(
            "expiring_key",
            &"expiring_value",
            SetOptions::new().ttl(Duration::from_millis(100)),
        )
        .await
        .unwrap();

    // Should be available immediately
    assert!(get_value(&cache, "expiring_key").await.is_some());

    // Wait for expiration
    tokio::time::sleep(Duration::from_millis(150)).await;

    // Should be expired now
    assert!(get_value(&cache, "expiring_key").await.is_none());
    assert_eq!(cache.len(None).await.unwrap(), 0);
}

#[tokio::test]
async fn test_default_ttl_applies() {
    let cache = CacheManager::new(
        CacheConfig::builder()
            .default_ttl(Duration::from_millis(50))
            .cleanup_interval(Duration::ZERO)
            .build(),
    )
    .unwrap();

    cache.set("k", &1, SetOptions::new()).await.unwrap();
    assert!(get_value(&cache, "k").await.is_some());

    tokio::time::sleep(Duration::from_millis(80)).await;
    assert!(get_value(&cache, "k").await.is_none());
}

#[tokio::test]
async fn test_delete_nonexistent_key() {
    let cache = manager();

    assert!(!cache.delete("ghost", None).await.unwrap());
    assert_eq!(cache.metrics().deletes, 0);

    cache.set("real", &1, SetOptions::new()).await.unwrap();
    assert!(cache.delete("real", None).await.unwrap());
    assert_eq!(cache.metrics().deletes, 1);
}

#[tokio::test]
async fn test_tag_invalidation() {
    let cache = manager();

    cache
        .set("a", &"v", SetOptions::new().tag("x"))
        .await
        .unwrap();
    cache
        .set("b", &"v", SetOptions::new().tag("x"))
        .await
        .unwrap();
    cache
        .set("c", &"v", SetOptions::new().tag("y"))
        .await
        .unwrap();

    let event = cache.invalidate_by_tags(&["x"]).await;
    assert_eq!(event.len(), 2);
    assert!(event.contains("a"));
    assert!(event.contains("b"));
    assert!(matches!(event.reason, InvalidationReason::TagMatch { .. }));

    assert!(get_value(&cache, "a").await.is_none());
    assert!(get_value(&cache, "b").await.is_none());
    assert!(get_value(&cache, "c").await.is_some());
}

#[tokio::test]
async fn test_unknown_tags_are_noop() {
    let cache = manager();
    cache.set("a", &1, SetOptions::new().tag("x")).await.unwrap();

    let event = cache.invalidate_by_tags(&["missing", "also-missing"]).await;
    assert!(event.is_empty());
    assert!(get_value(&cache, "a").await.is_some());
}

#[tokio::test]
async fn test_dependency_invalidation() {
    let cache = manager();
    let academia = ResourceKind::Academia.dependency(42);

    cache
        .set("p", &json!({"plan": "gold"}), SetOptions::new().dependency(&academia))
        .await
        .unwrap();
    cache
        .set("q", &json!({"plan": "silver"}), SetOptions::new().dependency(&academia))
        .await
        .unwrap();
    cache
        .set("r", &json!({"plan": "other"}), SetOptions::new().dependency("academia:7"))
        .await
        .unwrap();

    let event = cache.invalidate_by_dependencies(&["academia:42"]).await;
    assert_eq!(event.len(), 2);

    assert!(get_value(&cache, "p").await.is_none());
    assert!(get_value(&cache, "q").await.is_none());
    assert!(get_value(&cache, "r").await.is_some());
    assert_eq!(cache.dependency_count().await, 1);
}

#[tokio::test]
async fn test_lru_eviction() {
    let cache = CacheManager::new(
        CacheConfig::builder()
            .max_entries(3)
            .cleanup_interval(Duration::ZERO)
            .build(),
    )
    .unwrap();

    // Fill cache to capacity
    for key in ["key1", "key2", "key3"] {
        cache.set(key, &key, SetOptions::new()).await.unwrap();
    }

    // Access key2 and key1 so key3 becomes the least recently used
    assert!(get_value(&cache, "key2").await.is_some());
    assert!(get_value(&cache, "key1").await.is_some());

    let before = cache.metrics().evictions;
    cache.set("key4", &"key4", SetOptions::new()).await.unwrap();
    assert_eq!(cache.metrics().evictions, before + 1);

    // Verify key3 was evicted
    assert!(get_value(&cache, "key3").await.is_none());

    // Others should still be present
    assert!(get_value(&cache, "key1").await.is_some());
    assert!(get_value(&cache, "key2").await.is_some());
    assert!(get_value(&cache, "key4").await.is_some());
}

#[tokio::test]
async fn test_hit_rate_and_clear() {
    let cache = manager();

    cache.set("a", &1, SetOptions::new().tag("t")).await.unwrap();
    get_value(&cache, "a").await;
    get_value(&cache, "a").await;
    get_value(&cache, "a").await;
    get_value(&cache, "missing").await;

    let metrics = cache.metrics();
    assert_eq!(metrics.hits, 3);
    assert_eq!(metrics.misses, 1);
    assert!((metrics.hit_rate - 0.75).abs() < 1e-9);

    cache.clear(None).await.unwrap();
    let metrics = cache.metrics();
    assert_eq!(metrics.hit_rate, 0.0);
    assert_eq!(metrics.hits, 0);
    assert_eq!(metrics.sets, 0);
    assert_eq!(cache.tag_count().await, 0);
    assert!(get_value(&cache, "a").await.is_none());
}

#[tokio::test]
async fn test_clear_single_strategy_resets_indices() {
    let cache = manager();

    cache
        .set("lru", &1, SetOptions::new().tag("t"))
        .await
        .unwrap();
    cache
        .set(
            "mem",
            &2,
            SetOptions::new().tag("t").strategy(CacheStrategy::Memory),
        )
        .await
        .unwrap();

    cache.clear(Some(CacheStrategy::MemoryLru)).await.unwrap();

    assert!(get_value(&cache, "lru").await.is_none());
    let mem: Option<i32> = cache.get("mem", Some(CacheStrategy::Memory)).await.unwrap();
    assert_eq!(mem, Some(2));
    assert_eq!(cache.tag_count().await, 0);
}

#[tokio::test]
async fn test_warm_up_round_trip() {
    let cache = manager();

    let loaded = cache
        .warm_up(vec![
            WarmUpEntry::new("u1", json!({"name": "Ana"})).with_tags(["users"]),
            WarmUpEntry::new("u2", json!({"name": "Bruno"}))
                .with_ttl(Duration::from_secs(5))
                .with_dependencies(["academia:42"]),
        ])
        .await;
    assert_eq!(loaded, 2);

    assert_eq!(get_value(&cache, "u1").await, Some(json!({"name": "Ana"})));
    assert_eq!(get_value(&cache, "u2").await, Some(json!({"name": "Bruno"})));
    assert_eq!(cache.keys_with_tag("users").await, vec!["u1".to_string()]);
}

#[tokio::test]
async fn test_user_scenario() {
    let cache = manager();

    cache
        .set(
            "user:1",
            &json!({"name": "Ana"}),
            SetOptions::new()
                .ttl(Duration::from_millis(1000))
                .tag("users"),
        )
        .await
        .unwrap();
    assert_eq!(get_value(&cache, "user:1").await, Some(json!({"name": "Ana"})));

    cache.invalidate_by_tags(&["users"]).await;
    assert!(get_value(&cache, "user:1").await.is_none());
}

#[tokio::test]
async fn test_sweep_removes_expired_entries() {
    let cache = manager();

    cache
        .set("short", &1, SetOptions::new().ttl(Duration::from_millis(20)).tag("t"))
        .await
        .unwrap();
    cache
        .set(
            "short-mem",
            &1,
            SetOptions::new()
                .ttl(Duration::from_millis(20))
                .dependency("d")
                .strategy(CacheStrategy::Memory),
        )
        .await
        .unwrap();
    cache.set("long", &2, SetOptions::new().tag("t")).await.unwrap();

    tokio::time::sleep(Duration::from_millis(40)).await;

    let event = cache.sweep().await;
    assert!(matches!(event.reason, InvalidationReason::Expired));
    assert!(event.contains("short"));
    assert!(event.contains("short-mem"));
    assert_eq!(event.len(), 2);

    assert_eq!(cache.keys_with_tag("t").await, vec!["long".to_string()]);
    assert_eq!(cache.dependency_count().await, 0);
    assert_eq!(cache.len(Some(CacheStrategy::Memory)).await.unwrap(), 0);
}

#[tokio::test]
async fn test_background_sweeper() {
    let cache = CacheManager::new(
        CacheConfig::builder()
            .cleanup_interval(Duration::from_millis(25))
            .build(),
    )
    .unwrap();
    assert!(cache.is_sweeper_running());
    assert!(!cache.start_sweeper());

    cache
        .set("k", &1, SetOptions::new().ttl(Duration::from_millis(10)).tag("t"))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(cache.len(None).await.unwrap(), 0);
    assert_eq!(cache.tag_count().await, 0);

    assert!(cache.stop_sweeper());
    assert!(!cache.is_sweeper_running());
    assert!(!cache.stop_sweeper());
}

#[tokio::test]
async fn test_concurrent_set_and_invalidate() {
    let cache = Arc::new(manager());

    let writers = (0..50).map(|i| {
        let cache = Arc::clone(&cache);
        tokio::spawn(async move {
            let key = CacheKeyBuilder::new(ResourceKind::User).identifier(i).build();
            cache
                .set(&key, &i, SetOptions::new().tag("users"))
                .await
                .unwrap();
        })
    });
    for result in join_all(writers).await {
        result.unwrap();
    }
    assert_eq!(cache.keys_with_tag("users").await.len(), 50);

    // Interleave more writes with the invalidation
    let rewrite = {
        let cache = Arc::clone(&cache);
        tokio::spawn(async move {
            for i in 50..60 {
                cache
                    .set(&format!("user:{i}"), &i, SetOptions::new().tag("users"))
                    .await
                    .unwrap();
            }
        })
    };
    cache.invalidate_by_tags(&["users"]).await;
    rewrite.await.unwrap();

    // Every key still indexed must be readable, and the reverse
    for key in cache.keys_with_tag("users").await {
        assert!(get_value(&cache, &key).await.is_some(), "{key} indexed but absent");
    }
    let remaining = cache.len(None).await.unwrap();
    assert_eq!(cache.keys_with_tag("users").await.len(), remaining);
}

#[tokio::test]
async fn test_same_key_in_two_strategies() {
    let cache = manager();

    cache.set("k", &1, SetOptions::new().tag("x")).await.unwrap();
    cache
        .set(
            "k",
            &2,
            SetOptions::new().tag("y").strategy(CacheStrategy::Memory),
        )
        .await
        .unwrap();

    assert_eq!(cache.keys_with_tag("x").await, vec!["k".to_string()]);
    assert_eq!(cache.keys_with_tag("y").await, vec!["k".to_string()]);

    let event = cache.invalidate_by_tags(&["x"]).await;
    assert_eq!(event.keys, vec!["k".to_string()]);

    let lru: Option<i32> = cache.get("k", None).await.unwrap();
    assert!(lru.is_none());
    let memory: Option<i32> = cache.get("k", Some(CacheStrategy::Memory)).await.unwrap();
    assert_eq!(memory, Some(2));
    assert_eq!(cache.keys_with_tag("y").await, vec!["k".to_string()]);

    // One label shared by both copies removes both, listed once
    cache
        .set("k", &3, SetOptions::new().tag("y"))
        .await
        .unwrap();
    let event = cache.invalidate_by_tags(&["y"]).await;
    assert_eq!(event.keys, vec!["k".to_string()]);
    assert_eq!(cache.len(None).await.unwrap(), 0);
    assert_eq!(cache.len(Some(CacheStrategy::Memory)).await.unwrap(), 0);
    assert_eq!(cache.tag_count().await, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sweep_racing_set_keeps_fresh_entries() {
    let cache = Arc::new(manager());

    for round in 0..25 {
        let keys: Vec<String> = (0..20).map(|i| format!("r{round}:k{i}")).collect();
        for key in &keys {
            cache
                .set(key, &0, SetOptions::new().ttl(Duration::from_millis(1)).tag("t"))
                .await
                .unwrap();
        }
        tokio::time::sleep(Duration::from_millis(2)).await;

        let sweep = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.sweep().await })
        };
        for key in &keys {
            cache
                .set(key, &round, SetOptions::new().ttl(Duration::from_secs(60)).tag("t"))
                .await
                .unwrap();
        }
        sweep.await.unwrap();

        for key in &keys {
            let value: Option<i32> = cache.get(key, None).await.unwrap();
            assert_eq!(value, Some(round), "{key} lost to the sweep");
        }
    }

    assert_eq!(cache.keys_with_tag("t").await.len(), 500);
}

#[tokio::test]
async fn test_get_or_insert_with_computes_once() {
    let cache = manager();
    let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));

    for _ in 0..3 {
        let calls = Arc::clone(&calls);
        let user: User = cache
            .get_or_insert_with("user:9", SetOptions::new(), || async move {
                calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                User {
                    name: "Carla".to_string(),
                }
            })
            .await
            .unwrap();
        assert_eq!(user.name, "Carla");
    }

    assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_metrics_disabled() {
    let cache = CacheManager::new(
        CacheConfig::builder()
            .enable_metrics(false)
            .cleanup_interval(Duration::ZERO)
            .build(),
    )
    .unwrap();

    cache.set("k", &1, SetOptions::new()).await.unwrap();
    get_value(&cache, "k").await;

    let metrics = cache.metrics();
    assert_eq!(metrics.sets, 0);
    assert_eq!(metrics.hits, 0);
    assert_eq!(metrics.hit_rate, 0.0);
}
