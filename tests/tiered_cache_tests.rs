//! Integration Tests for the Tiered Cache
//!
//! Exercises the coordinator through its public API against real and
//! failing durable stores.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::sleep;
use std::time::Duration;

use async_trait::async_trait;
use tiered_cache::cache::{EvictionPolicy, SetOptions, TieredCache};
use tiered_cache::config::Admission;
use tiered_cache::storage::{DiskUsage, DurableRow, DurableStore, SqliteStore, StorageError};
use tiered_cache::Config;

// == Helper Functions ==

/// String whose JSON encoding is exactly `size` bytes.
fn value_of_size(size: usize) -> String {
    "x".repeat(size - 2)
}

fn recency_config(persist_to_disk: bool) -> Config {
    Config {
        max_memory_bytes: 1000,
        eviction_policy: EvictionPolicy::Recency,
        large_value_fraction: 1.0,
        admission: Admission::Evict,
        persist_to_disk,
        ..Config::default()
    }
}

/// Durable store whose every call fails, counting the attempts.
#[derive(Default)]
struct FailingStore {
    calls: AtomicUsize,
}

impl FailingStore {
    fn fail<T>(&self) -> Result<T, StorageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(StorageError::Backend("disk unavailable".to_string()))
    }
}

#[async_trait]
impl DurableStore for FailingStore {
    async fn upsert(&self, _row: DurableRow) -> Result<(), StorageError> {
        self.fail()
    }

    async fn get(&self, _key: &str) -> Result<Option<DurableRow>, StorageError> {
        self.fail()
    }

    async fn touch_access(&self, _key: &str, _now: u64) -> Result<(), StorageError> {
        self.fail()
    }

    async fn delete(&self, _key: &str) -> Result<bool, StorageError> {
        self.fail()
    }

    async fn delete_expired_before(&self, _now: u64) -> Result<Vec<String>, StorageError> {
        self.fail()
    }

    async fn delete_namespace(&self, _namespace: &str) -> Result<Vec<String>, StorageError> {
        self.fail()
    }

    async fn clear_all(&self) -> Result<(), StorageError> {
        self.fail()
    }

    async fn usage(&self) -> Result<DiskUsage, StorageError> {
        self.fail()
    }
}

/// SQLite store that holds lookups of one key for a while after reading the
/// row, so writes can land while the read is in flight.
struct SlowReadStore {
    inner: SqliteStore,
    slow_key: &'static str,
    delay: Duration,
}

impl SlowReadStore {
    fn new(slow_key: &'static str) -> Self {
        Self {
            inner: SqliteStore::memory().unwrap(),
            slow_key,
            delay: Duration::from_millis(200),
        }
    }
}

#[async_trait]
impl DurableStore for SlowReadStore {
    async fn upsert(&self, row: DurableRow) -> Result<(), StorageError> {
        self.inner.upsert(row).await
    }

    async fn get(&self, key: &str) -> Result<Option<DurableRow>, StorageError> {
        let row = self.inner.get(key).await?;
        if key == self.slow_key {
            tokio::time::sleep(self.delay).await;
        }
        Ok(row)
    }

    async fn touch_access(&self, key: &str, now: u64) -> Result<(), StorageError> {
        self.inner.touch_access(key, now).await
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        self.inner.delete(key).await
    }

    async fn delete_expired_before(&self, now: u64) -> Result<Vec<String>, StorageError> {
        self.inner.delete_expired_before(now).await
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<Vec<String>, StorageError> {
        self.inner.delete_namespace(namespace).await
    }

    async fn clear_all(&self) -> Result<(), StorageError> {
        self.inner.clear_all().await
    }

    async fn usage(&self) -> Result<DiskUsage, StorageError> {
        self.inner.usage().await
    }
}

/// Cache whose memory tier is full of ten 100-byte entries `f0..f9`, with
/// `k` written after them and therefore held only in the durable tier.
async fn full_cache_with_durable_key(k_value: String) -> Arc<TieredCache<String>> {
    let cache: Arc<TieredCache<String>> = Arc::new(TieredCache::with_store(
        Config {
            max_memory_bytes: 1000,
            ..Config::default()
        },
        Some(Arc::new(SlowReadStore::new("k"))),
    ));
    for i in 0..10 {
        cache
            .set(format!("f{}", i), value_of_size(100), None)
            .await
            .unwrap();
    }
    cache.set("k", k_value, None).await.unwrap();
    assert!(!cache.is_resident("k"));
    cache
}

// == Placement Scenarios ==

#[tokio::test]
async fn test_recency_policy_evicts_least_recently_touched() {
    let cache: TieredCache<String> = TieredCache::new(recency_config(false));

    cache.set("a", value_of_size(500), None).await.unwrap();
    cache.set("b", value_of_size(500), None).await.unwrap();
    cache.set("c", value_of_size(500), None).await.unwrap();

    assert_eq!(cache.get("a").await, None);
    assert_eq!(cache.get("b").await, Some(value_of_size(500)));
    assert_eq!(cache.get("c").await, Some(value_of_size(500)));
}

#[tokio::test]
async fn test_eviction_never_exceeds_capacity() {
    let cache: TieredCache<String> = TieredCache::new(recency_config(false));

    for i in 0..50 {
        cache
            .set(format!("key{}", i), value_of_size(90), None)
            .await
            .unwrap();
        assert!(cache.resident_bytes() <= 1000);
    }

    let stats = cache.stats();
    assert_eq!(stats.total_entries, 11);
    assert_eq!(stats.evictions, 39);
    assert_eq!(cache.get("key0").await, None);
    assert!(cache.get("key49").await.is_some());
}

#[tokio::test]
async fn test_eviction_without_persistence_is_a_miss() {
    let cache: TieredCache<String> = TieredCache::new(recency_config(false));

    cache.set("victim", value_of_size(600), None).await.unwrap();
    cache.set("next", value_of_size(600), None).await.unwrap();

    assert!(!cache.is_persistent());
    assert_eq!(cache.get("victim").await, None);
    assert_eq!(cache.stats().misses, 1);
}

// == Expiry ==

#[tokio::test]
async fn test_ttl_scenario() {
    let cache: TieredCache<String> = TieredCache::new(Config {
        persist_to_disk: false,
        ..Config::default()
    });

    cache.set("x", "hello".to_string(), Some(1)).await.unwrap();
    assert_eq!(cache.get("x").await, Some("hello".to_string()));

    sleep(Duration::from_millis(1100));

    assert_eq!(cache.get("x").await, None);
}

#[tokio::test]
async fn test_zero_ttl_is_lazily_expired() {
    let cache: TieredCache<String> = TieredCache::new(Config {
        persist_to_disk: false,
        ..Config::default()
    });

    cache.set("k", "v".to_string(), Some(0)).await.unwrap();
    sleep(Duration::from_millis(5));

    assert!(cache.is_resident("k"));
    assert_eq!(cache.get("k").await, None);
    assert!(!cache.is_resident("k"));
}

// == Durable Tier ==

#[tokio::test]
async fn test_write_through_survives_eviction_and_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        db_path: dir.path().join("cache.db"),
        ..recency_config(true)
    };

    {
        let cache: TieredCache<String> = TieredCache::new(config.clone());
        assert!(cache.is_persistent());

        cache.set("a", value_of_size(500), None).await.unwrap();
        cache.set("b", value_of_size(500), None).await.unwrap();
        cache.set("c", value_of_size(500), None).await.unwrap();
        assert!(!cache.is_resident("a"));

        assert_eq!(cache.get("a").await, Some(value_of_size(500)));
        assert_eq!(cache.stats().durable_hits, 1);
    }

    let reopened: TieredCache<String> = TieredCache::new(config);
    assert!(reopened.is_empty());
    assert_eq!(reopened.get("b").await, Some(value_of_size(500)));
    assert_eq!(reopened.disk_usage().await.unwrap().entries, 3);
}

#[tokio::test]
async fn test_durable_row_expires_with_its_ttl() {
    let store = Arc::new(SqliteStore::memory().unwrap());
    let cache: TieredCache<String> = TieredCache::with_store(
        Config {
            max_memory_bytes: 1000,
            ..Config::default()
        },
        Some(store.clone()),
    );

    // Too large for memory, so it only lives in the durable tier
    cache
        .set("big", value_of_size(300), Some(1))
        .await
        .unwrap();
    assert_eq!(cache.get("big").await, Some(value_of_size(300)));

    sleep(Duration::from_millis(1100));

    assert_eq!(cache.get("big").await, None);
    assert_eq!(store.get("big").await.unwrap(), None);
}

#[tokio::test]
async fn test_durable_init_failure_falls_back_to_memory() {
    let dir = tempfile::tempdir().unwrap();
    let cache: TieredCache<String> = TieredCache::new(Config {
        db_path: dir.path().join("missing").join("cache.db"),
        ..Config::default()
    });

    assert!(!cache.is_persistent());
    cache.set("k", "v".to_string(), None).await.unwrap();
    assert_eq!(cache.get("k").await, Some("v".to_string()));
    assert_eq!(cache.disk_usage().await, None);
}

#[tokio::test]
async fn test_failing_store_does_not_break_operations() {
    let store = Arc::new(FailingStore::default());
    let cache: TieredCache<String> =
        TieredCache::with_store(Config::default(), Some(store.clone()));

    cache.set("k", "v".to_string(), None).await.unwrap();
    assert_eq!(cache.get("k").await, Some("v".to_string()));
    assert_eq!(cache.get("missing").await, None);

    assert!(cache.delete("k").await);
    assert_eq!(cache.invalidate_namespace("ns").await, 0);
    let report = cache.sweep_expired().await;
    assert_eq!(report.durable_removed, 0);
    cache.clear().await;
    assert_eq!(cache.disk_usage().await, None);

    assert!(store.calls.load(Ordering::SeqCst) >= 7);
}

#[tokio::test]
async fn test_namespace_invalidation_spans_tiers() {
    let cache: TieredCache<String> = TieredCache::with_store(
        Config {
            max_memory_bytes: 1000,
            ..Config::default()
        },
        Some(Arc::new(SqliteStore::memory().unwrap())),
    );
    let sessions = SetOptions {
        ttl: Some(600),
        namespace: Some("sessions".to_string()),
    };

    cache
        .set_with_options("small", "s".to_string(), sessions.clone())
        .await
        .unwrap();
    cache
        .set_with_options("large", value_of_size(400), sessions)
        .await
        .unwrap();
    assert!(cache.is_resident("small"));
    assert!(!cache.is_resident("large"));

    assert_eq!(cache.invalidate_namespace("sessions").await, 2);
    assert_eq!(cache.get("small").await, None);
    assert_eq!(cache.get("large").await, None);
}

// == Shared Access ==

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_delete_during_durable_read_is_not_undone() {
    let cache = full_cache_with_durable_key(value_of_size(100)).await;

    let reader = {
        let cache = Arc::clone(&cache);
        tokio::spawn(async move { cache.get("k").await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Freeing room first means only the delete itself can keep `k` out
    assert!(cache.delete("f0").await);
    assert!(cache.delete("k").await);
    reader.await.unwrap();

    assert!(!cache.is_resident("k"));
    assert_eq!(cache.get("k").await, None);
    assert_eq!(cache.stats().promotions, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_overwrite_during_durable_read_keeps_newest_value() {
    let cache = full_cache_with_durable_key("old".to_string()).await;

    let reader = {
        let cache = Arc::clone(&cache);
        tokio::spawn(async move { cache.get("k").await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(cache.delete("f0").await);
    // Too large for memory, so the new value lives only in the durable tier
    cache.set("k", value_of_size(300), None).await.unwrap();
    assert_eq!(reader.await.unwrap(), Some("old".to_string()));

    assert!(!cache.is_resident("k"));
    assert_eq!(cache.get("k").await, Some(value_of_size(300)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_clear_during_durable_read_leaves_cache_empty() {
    let cache = full_cache_with_durable_key(value_of_size(100)).await;

    let reader = {
        let cache = Arc::clone(&cache);
        tokio::spawn(async move { cache.get("k").await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    cache.clear().await;
    reader.await.unwrap();

    assert!(cache.is_empty());
    assert_eq!(cache.get("k").await, None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_writers_keep_accounting_consistent() {
    let cache: Arc<TieredCache<String>> = Arc::new(TieredCache::with_store(
        Config {
            max_memory_bytes: 2_000,
            large_value_fraction: 1.0,
            admission: Admission::Evict,
            ..Config::default()
        },
        Some(Arc::new(SqliteStore::memory().unwrap())),
    ));

    let mut handles = vec![];
    for worker in 0..8 {
        let cache = Arc::clone(&cache);
        handles.push(tokio::spawn(async move {
            for i in 0..25 {
                let key = format!("w{}-{}", worker, i % 5);
                cache.set(key.clone(), value_of_size(100), None).await.unwrap();
                cache.get(&key).await;
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let stats = cache.stats();
    assert!(stats.resident_bytes <= 2_000);
    assert_eq!(stats.resident_bytes, stats.total_entries * 100);
    assert_eq!(stats.hits + stats.misses, 200);
    assert_eq!(cache.disk_usage().await.unwrap().entries, 40);
}
