//! Tiered Cache Module
//!
//! Public-facing coordinator over the memory tier and the durable tier.
//! Reads consult memory first and fall back to the durable store, promoting
//! entries back into memory when the placement rules allow it. Writes go to
//! memory when the placement rules allow it and always through to the
//! durable store when persistence is enabled.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::cache::entry::current_timestamp_ms;
use crate::cache::{
    CacheEntry, CacheEvent, CacheStats, Codec, Counters, EventBus, EvictionEngine, MemoryTier,
    Tier,
};
use crate::config::{Admission, Config};
use crate::error::Result;
use crate::storage::{DiskUsage, DurableRow, DurableStore, SqliteStore};

/// Recorded reads above which a key is always placed in memory.
pub const HOT_KEY_THRESHOLD: u64 = 5;

// == Set Options ==
/// Per-call options for [`TieredCache::set_with_options`].
#[derive(Debug, Clone, Default)]
pub struct SetOptions {
    /// TTL in seconds; the configured default when `None`
    pub ttl: Option<u64>,
    /// Logical grouping tag
    pub namespace: Option<String>,
}

// == Sweep Report ==
/// Entries removed by one expiry sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub memory_removed: usize,
    pub durable_removed: u64,
}

/// Outcome of the placement rules for one value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admit {
    /// Keep out of memory
    Skip,
    /// Fits in the current headroom
    Fit,
    /// Evict until it fits
    EvictToFit,
}

/// State guarded by the single memory-tier lock.
struct Inner<V> {
    tier: MemoryTier<V>,
    counters: Counters,
}

/// Keeps a durable read registered with the memory tier while it runs.
///
/// Dropping it unregisters the read, so it must not outlive a held lock.
struct ReadRegistration<'a, V> {
    inner: &'a Mutex<Inner<V>>,
    key: &'a str,
}

impl<'a, V> ReadRegistration<'a, V> {
    fn begin(inner: &'a Mutex<Inner<V>>, key: &'a str) -> Self {
        inner.lock().tier.begin_read(key);
        Self { inner, key }
    }
}

impl<V> Drop for ReadRegistration<'_, V> {
    fn drop(&mut self) {
        self.inner.lock().tier.end_read(self.key);
    }
}

// == Tiered Cache ==
/// Two-level cache: a bounded in-memory tier over an optional SQLite tier.
///
/// Share it behind an `Arc`; every method takes `&self`.
pub struct TieredCache<V> {
    config: Config,
    inner: Mutex<Inner<V>>,
    durable: Option<Arc<dyn DurableStore>>,
    eviction: EvictionEngine,
    codec: Codec,
    events: EventBus,
}

impl<V> TieredCache<V>
where
    V: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    // == Constructor ==
    /// Creates a cache, opening the SQLite durable tier at `config.db_path`
    /// when persistence is enabled.
    ///
    /// Never fails: if the store cannot be opened the instance runs
    /// memory-only for its whole life.
    pub fn new(config: Config) -> Self {
        let durable: Option<Arc<dyn DurableStore>> = if config.persist_to_disk {
            match SqliteStore::open(&config.db_path) {
                Ok(store) => {
                    info!("Durable tier opened at {}", config.db_path.display());
                    Some(Arc::new(store))
                }
                Err(e) => {
                    warn!(
                        "Durable tier unavailable at {} ({}); continuing memory-only",
                        config.db_path.display(),
                        e
                    );
                    None
                }
            }
        } else {
            None
        };
        Self::with_store(config, durable)
    }

    /// Creates a cache over an already constructed durable store.
    ///
    /// The store is ignored when `config.persist_to_disk` is false.
    pub fn with_store(config: Config, durable: Option<Arc<dyn DurableStore>>) -> Self {
        let durable = if config.persist_to_disk { durable } else { None };
        Self {
            eviction: EvictionEngine::new(config.eviction_policy),
            codec: Codec::new(config.compression),
            inner: Mutex::new(Inner {
                tier: MemoryTier::new(),
                counters: Counters::default(),
            }),
            durable,
            events: EventBus::new(),
            config,
        }
    }

    // == Get ==
    /// Retrieves a value, consulting memory first and the durable tier second.
    ///
    /// Expired entries are never returned. Durable-tier failures are logged
    /// and reported as a miss.
    pub async fn get(&self, key: &str) -> Option<V> {
        let now = current_timestamp_ms();

        {
            let mut inner = self.inner.lock();
            match inner.tier.get(key).map(|entry| entry.is_expired_at(now)) {
                Some(false) => {
                    let value = inner.tier.touch(key, now).map(|entry| entry.value.clone());
                    if let Some(value) = value {
                        inner.counters.record_memory_hit();
                        drop(inner);
                        debug!("Memory hit for key '{}'", key);
                        self.events.publish(CacheEvent::Hit {
                            key: key.to_string(),
                            tier: Tier::Memory,
                        });
                        return Some(value);
                    }
                }
                Some(true) => {
                    inner.tier.forget(key);
                    inner.counters.record_expirations(1);
                    debug!("Key '{}' expired in memory, removed on access", key);
                }
                None => {}
            }
        }

        if let Some(value) = self.get_durable(key, now).await {
            return Some(value);
        }

        self.inner.lock().counters.record_miss();
        debug!("Miss for key '{}'", key);
        self.events.publish(CacheEvent::Miss {
            key: key.to_string(),
        });
        None
    }

    /// Durable-tier half of [`TieredCache::get`], including promotion.
    ///
    /// The read is registered before the lookup; a write to the key that
    /// lands before promotion leaves the fetched row out of memory.
    async fn get_durable(&self, key: &str, now: u64) -> Option<V> {
        let store = self.durable.as_ref()?;
        let _registration = ReadRegistration::begin(&self.inner, key);

        let row = match store.get(key).await {
            Ok(Some(row)) => row,
            Ok(None) => return None,
            Err(e) => {
                warn!("Durable lookup for '{}' failed: {}", key, e);
                return None;
            }
        };

        if row.is_expired_at(now) {
            if let Err(e) = store.delete(key).await {
                warn!("Failed to drop expired durable row '{}': {}", key, e);
            }
            self.forget_history(&[key.to_string()]);
            return None;
        }

        let DurableRow {
            key: row_key,
            value: stored,
            size,
            expires_at,
            created_at,
            last_accessed_at,
            hit_count,
            namespace,
            compressed,
        } = row;

        let value: V = match self
            .codec
            .unpack(stored, compressed)
            .and_then(|bytes| self.codec.decode(&bytes))
        {
            Ok(value) => value,
            Err(e) => {
                warn!("Durable row '{}' could not be decoded: {}", key, e);
                return None;
            }
        };

        if let Err(e) = store.touch_access(key, now).await {
            warn!("Failed to record durable access for '{}': {}", key, e);
        }

        let mut entry = CacheEntry {
            key: row_key,
            value: value.clone(),
            size,
            expires_at,
            created_at,
            last_accessed_at,
            hit_count,
            namespace,
        };
        entry.record_access(now);

        let promoted = {
            let mut inner = self.inner.lock();
            // A concurrent write may have replaced or removed the row meanwhile
            let current = inner.tier.read_is_current(key);
            if current {
                inner.tier.record_access(key);
            }
            let promoted = current
                && !inner.tier.contains_key(key)
                && self.place(&mut inner, entry, now);
            if promoted {
                inner.counters.record_promotion();
            }
            inner.counters.record_durable_hit();
            promoted
        };

        debug!("Durable hit for key '{}' (promoted: {})", key, promoted);
        self.events.publish(CacheEvent::Hit {
            key: key.to_string(),
            tier: Tier::Durable,
        });
        Some(value)
    }

    // == Set ==
    /// Stores a value with an optional TTL in seconds.
    pub async fn set(&self, key: impl Into<String>, value: V, ttl: Option<u64>) -> Result<()> {
        self.set_with_options(
            key,
            value,
            SetOptions {
                ttl,
                namespace: None,
            },
        )
        .await
    }

    /// Stores a value with explicit options.
    ///
    /// Fails only when the value cannot be serialized. Durable write
    /// failures are logged and the memory placement stands.
    pub async fn set_with_options(
        &self,
        key: impl Into<String>,
        value: V,
        options: SetOptions,
    ) -> Result<()> {
        let key = key.into();
        let encoded = self.codec.encode(&value)?;
        let size = encoded.len();
        let now = current_timestamp_ms();
        let ttl = options.ttl.unwrap_or(self.config.default_ttl);

        let entry = CacheEntry::new(key.clone(), value, size, ttl, now)
            .with_namespace(options.namespace);
        let row = self.durable.as_ref().map(|_| DurableRow {
            key: key.clone(),
            value: encoded,
            size,
            expires_at: entry.expires_at,
            created_at: entry.created_at,
            last_accessed_at: entry.last_accessed_at,
            hit_count: entry.hit_count,
            namespace: entry.namespace.clone(),
            compressed: false,
        });

        let created_at = entry.created_at;
        let in_memory = {
            let mut inner = self.inner.lock();
            inner.tier.invalidate_reads(&key);
            let placed = self.place(&mut inner, entry, now);
            inner.counters.record_set();
            placed
        };

        let persisted = match (&self.durable, row) {
            (Some(store), Some(row)) => self.write_through(store.as_ref(), row).await,
            _ => false,
        };
        if persisted && !in_memory {
            // A read that fetched the previous row may have promoted it
            let mut inner = self.inner.lock();
            inner.tier.invalidate_reads(&key);
            inner.tier.remove_if_older(&key, created_at);
        }

        debug!(
            "Set key '{}' ({} bytes, memory: {}, durable: {})",
            key, size, in_memory, persisted
        );
        self.events.publish(CacheEvent::Set {
            key,
            size,
            in_memory,
            persisted,
        });
        Ok(())
    }

    /// Compresses and upserts a row. Returns whether the write landed.
    async fn write_through(&self, store: &dyn DurableStore, mut row: DurableRow) -> bool {
        match self.codec.pack(std::mem::take(&mut row.value)) {
            Ok((bytes, compressed)) => {
                row.value = bytes;
                row.compressed = compressed;
            }
            Err(e) => {
                warn!("Could not prepare '{}' for the durable tier: {}", row.key, e);
                return false;
            }
        }

        let key = row.key.clone();
        match store.upsert(row).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Durable write for '{}' failed: {}", key, e);
                false
            }
        }
    }

    // == Placement ==
    /// Applies the placement rules to a value of `size` bytes.
    ///
    /// Size is checked before frequency, so a large value stays out of
    /// memory however often it is read.
    fn admit(&self, tier: &MemoryTier<V>, key: &str, size: usize) -> Admit {
        let capacity = self.config.max_memory_bytes;
        if size > self.config.max_memory_value_bytes() || size > capacity {
            return Admit::Skip;
        }

        if tier.frequency(key) > HOT_KEY_THRESHOLD || self.config.admission == Admission::Evict {
            return Admit::EvictToFit;
        }

        let reclaimable = tier.get(key).map_or(0, |entry| entry.size);
        let resident = tier.resident_bytes() - reclaimable;
        if resident + size <= capacity {
            Admit::Fit
        } else {
            Admit::Skip
        }
    }

    /// Places an entry in memory according to [`TieredCache::admit`].
    ///
    /// A resident older version is dropped when the new one is kept out.
    /// Without a durable tier, keys that end up stored nowhere lose their
    /// frequency history. Returns whether the entry is now resident.
    fn place(&self, inner: &mut Inner<V>, entry: CacheEntry<V>, now: u64) -> bool {
        let memory_only = self.durable.is_none();
        match self.admit(&inner.tier, &entry.key, entry.size) {
            Admit::Skip => {
                let stale = if memory_only {
                    inner.tier.forget(&entry.key)
                } else {
                    inner.tier.remove(&entry.key)
                };
                if stale.is_some() {
                    debug!("Dropped stale memory copy of '{}'", entry.key);
                }
                false
            }
            Admit::Fit => {
                inner.tier.put(entry);
                true
            }
            Admit::EvictToFit => {
                inner.tier.remove(&entry.key);
                while inner.tier.resident_bytes() + entry.size > self.config.max_memory_bytes {
                    let Some((victim, evicted)) = self.eviction.evict_one(&mut inner.tier, now)
                    else {
                        break;
                    };
                    inner.counters.record_eviction();
                    if memory_only {
                        inner.tier.forget_frequency(&victim.key);
                    }
                    debug!(
                        "Evicted '{}' ({} bytes): {}",
                        victim.key, evicted.size, victim.reason
                    );
                    self.events.publish(CacheEvent::Evict {
                        key: victim.key,
                        policy: self.eviction.policy(),
                        reason: victim.reason,
                    });
                }
                inner.tier.put(entry);
                true
            }
        }
    }

    // == Delete ==
    /// Removes a key from both tiers. Returns true if either held it.
    pub async fn delete(&self, key: &str) -> bool {
        let in_memory = self.inner.lock().tier.forget(key).is_some();

        let in_durable = match &self.durable {
            Some(store) => match store.delete(key).await {
                Ok(removed) => removed,
                Err(e) => {
                    warn!("Durable delete for '{}' failed: {}", key, e);
                    false
                }
            },
            None => false,
        };
        if self.durable.is_some() {
            // Catches a promotion of the row fetched before it was deleted
            self.inner.lock().tier.forget(key);
        }

        let removed = in_memory || in_durable;
        if removed {
            self.inner.lock().counters.record_delete();
            debug!("Deleted key '{}'", key);
            self.events.publish(CacheEvent::Delete {
                key: key.to_string(),
            });
        }
        removed
    }

    // == Invalidate Namespace ==
    /// Removes every entry tagged with `namespace` from both tiers.
    ///
    /// Returns the number of keys removed. With persistence enabled the
    /// durable tier holds every entry, so its count is authoritative.
    pub async fn invalidate_namespace(&self, namespace: &str) -> u64 {
        let removed = {
            let mut inner = self.inner.lock();
            inner.tier.invalidate_all_reads();
            inner.tier.remove_namespace(namespace)
        };
        let memory_removed = removed.len() as u64;

        let durable_removed = match &self.durable {
            Some(store) => match store.delete_namespace(namespace).await {
                Ok(keys) => {
                    {
                        let mut inner = self.inner.lock();
                        inner.tier.invalidate_all_reads();
                        inner.tier.remove_namespace(namespace);
                    }
                    self.forget_history(&keys);
                    keys.len() as u64
                }
                Err(e) => {
                    warn!("Durable namespace invalidation for '{}' failed: {}", namespace, e);
                    0
                }
            },
            None => 0,
        };

        for key in removed {
            self.events.publish(CacheEvent::Delete { key });
        }
        let total = memory_removed.max(durable_removed);
        info!("Invalidated namespace '{}': {} entries", namespace, total);
        total
    }

    // == Clear ==
    /// Empties both tiers and resets memory accounting.
    pub async fn clear(&self) {
        self.inner.lock().tier.clear();

        if let Some(store) = &self.durable {
            if let Err(e) = store.clear_all().await {
                warn!("Durable clear failed: {}", e);
            }
            // Drops anything promoted from rows read before the wipe
            self.inner.lock().tier.clear();
        }

        info!("Cache cleared");
        self.events.publish(CacheEvent::Clear);
    }

    // == Sweep ==
    /// Removes expired entries from memory, then from the durable tier.
    ///
    /// The durable bulk delete runs outside the memory lock; its failures
    /// are logged and counted as zero removals.
    pub async fn sweep_expired(&self) -> SweepReport {
        let now = current_timestamp_ms();

        let memory_removed = {
            let mut inner = self.inner.lock();
            let removed = inner.tier.remove_expired(now).len();
            inner.counters.record_expirations(removed);
            removed
        };

        let durable_removed = match &self.durable {
            Some(store) => match store.delete_expired_before(now).await {
                Ok(keys) => {
                    self.forget_history(&keys);
                    keys.len() as u64
                }
                Err(e) => {
                    warn!("Durable expiry sweep failed: {}", e);
                    0
                }
            },
            None => 0,
        };

        let report = SweepReport {
            memory_removed,
            durable_removed,
        };
        if memory_removed > 0 || durable_removed > 0 {
            info!(
                "Expiry sweep: removed {} memory entries, {} durable rows",
                memory_removed, durable_removed
            );
        } else {
            debug!("Expiry sweep: no expired entries found");
        }
        self.events.publish(CacheEvent::Cleanup {
            memory_removed,
            durable_removed,
        });
        report
    }

    /// Drops frequency history for removed durable keys that are not
    /// resident again.
    fn forget_history(&self, keys: &[String]) {
        if keys.is_empty() {
            return;
        }
        let mut inner = self.inner.lock();
        for key in keys {
            if !inner.tier.contains_key(key) {
                inner.tier.forget_frequency(key);
            }
        }
    }

    // == Stats ==
    /// Point-in-time statistics snapshot.
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats::snapshot(
            &inner.counters,
            inner.tier.len(),
            inner.tier.resident_bytes(),
            self.config.max_memory_bytes,
            self.durable.is_some(),
        )
    }

    /// Durable tier occupancy, or `None` when persistence is off or the
    /// store cannot answer. Exceeding `max_disk_bytes` is only logged.
    pub async fn disk_usage(&self) -> Option<DiskUsage> {
        let store = self.durable.as_ref()?;
        match store.usage().await {
            Ok(usage) => {
                if usage.bytes > self.config.max_disk_bytes {
                    warn!(
                        "Durable tier holds {} bytes, above the advisory limit of {}",
                        usage.bytes, self.config.max_disk_bytes
                    );
                }
                Some(usage)
            }
            Err(e) => {
                warn!("Durable usage query failed: {}", e);
                None
            }
        }
    }

    /// Subscribes to the stream of [`CacheEvent`]s.
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    /// Whether `key` currently has an entry in the memory tier.
    pub fn is_resident(&self, key: &str) -> bool {
        self.inner.lock().tier.contains_key(key)
    }

    pub fn resident_bytes(&self) -> usize {
        self.inner.lock().tier.resident_bytes()
    }

    /// Number of entries resident in memory.
    pub fn len(&self) -> usize {
        self.inner.lock().tier.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().tier.is_empty()
    }

    /// Whether the durable tier is active.
    pub fn is_persistent(&self) -> bool {
        self.durable.is_some()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}
