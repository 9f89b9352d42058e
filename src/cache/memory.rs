//! Memory Tier Module
//!
//! In-process entry map combined with the auxiliary structures the
//! eviction engine needs: an access-order sequence, per-key frequency
//! counters and the resident-bytes accumulator. It also tracks durable
//! reads in flight so that a write landing mid-read blocks promotion of the
//! row that read returns.

use std::collections::HashMap;

use crate::cache::{CacheEntry, RecencyList};

/// Durable reads in flight for one key.
#[derive(Debug, Default)]
struct PendingRead {
    readers: usize,
    /// Set once a write to the key lands while readers are outstanding
    stale: bool,
}

// == Memory Tier ==
/// Canonical in-process store of cache entries.
///
/// Every mutation keeps `resident_bytes` equal to the sum of `size` over the
/// resident entries. Callers serialize access through a single lock.
#[derive(Debug)]
pub struct MemoryTier<V> {
    /// Resident entries by key
    entries: HashMap<String, CacheEntry<V>>,
    /// Access order of resident keys
    recency: RecencyList,
    /// Read/write frequency per key; survives eviction
    frequency: HashMap<String, u64>,
    /// Sum of resident entry sizes
    resident_bytes: usize,
    /// Keys with durable reads in flight
    pending: HashMap<String, PendingRead>,
}

impl<V> MemoryTier<V> {
    // == Constructor ==
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            recency: RecencyList::new(),
            frequency: HashMap::new(),
            resident_bytes: 0,
            pending: HashMap::new(),
        }
    }

    // == Put ==
    /// Inserts an entry, replacing any entry under the same key.
    ///
    /// Resident bytes move by the size delta; the key becomes the most
    /// recently touched and its frequency is incremented.
    ///
    /// Returns the replaced entry, if any.
    pub fn put(&mut self, entry: CacheEntry<V>) -> Option<CacheEntry<V>> {
        let key = entry.key.clone();
        self.resident_bytes += entry.size;

        let replaced = self.entries.insert(key.clone(), entry);
        if let Some(old) = &replaced {
            self.resident_bytes -= old.size;
        }

        self.recency.touch(&key);
        self.record_access(&key);
        replaced
    }

    // == Get ==
    /// Returns the stored entry without touching order or frequency.
    pub fn get(&self, key: &str) -> Option<&CacheEntry<V>> {
        self.entries.get(key)
    }

    // == Touch ==
    /// Records a successful read of a resident key.
    ///
    /// Moves the key to the front of the recency order, bumps its frequency
    /// and updates the entry's access metadata. Returns the entry.
    pub fn touch(&mut self, key: &str, now: u64) -> Option<&CacheEntry<V>> {
        if !self.entries.contains_key(key) {
            return None;
        }
        self.recency.touch(key);
        self.record_access(key);

        let entry = self.entries.get_mut(key)?;
        entry.record_access(now);
        Some(entry)
    }

    // == Record Access ==
    /// Bumps the frequency counter for a key, resident or not.
    pub fn record_access(&mut self, key: &str) {
        *self.frequency.entry(key.to_string()).or_insert(0) += 1;
    }

    /// Drops a key's frequency history without touching residency.
    pub fn forget_frequency(&mut self, key: &str) {
        self.frequency.remove(key);
    }

    /// Recorded frequency of a key (0 if never seen).
    pub fn frequency(&self, key: &str) -> u64 {
        self.frequency.get(key).copied().unwrap_or(0)
    }

    // == Remove ==
    /// Removes a resident entry, keeping its frequency history.
    ///
    /// Used for eviction and for replacing a key that no longer fits.
    pub fn remove(&mut self, key: &str) -> Option<CacheEntry<V>> {
        let entry = self.entries.remove(key)?;
        self.resident_bytes -= entry.size;
        self.recency.remove(key);
        Some(entry)
    }

    // == Forget ==
    /// Removes a key and its frequency history.
    ///
    /// Used when the key itself goes away (delete, expiry, invalidation).
    pub fn forget(&mut self, key: &str) -> Option<CacheEntry<V>> {
        self.frequency.remove(key);
        self.invalidate_reads(key);
        self.remove(key)
    }

    /// Removes a resident entry created before `created_at`, keeping its
    /// frequency history. A copy written at or after that instant stays.
    pub fn remove_if_older(&mut self, key: &str, created_at: u64) -> Option<CacheEntry<V>> {
        if self.entries.get(key)?.created_at < created_at {
            self.remove(key)
        } else {
            None
        }
    }

    // == Pending Reads ==
    /// Registers a durable read of `key` that may end in promotion.
    pub fn begin_read(&mut self, key: &str) {
        self.pending.entry(key.to_string()).or_default().readers += 1;
    }

    /// Unregisters a durable read started with [`MemoryTier::begin_read`].
    pub fn end_read(&mut self, key: &str) {
        if let Some(pending) = self.pending.get_mut(key) {
            pending.readers = pending.readers.saturating_sub(1);
            if pending.readers == 0 {
                self.pending.remove(key);
            }
        }
    }

    /// False once a write to `key` has landed since its reads began.
    pub fn read_is_current(&self, key: &str) -> bool {
        self.pending.get(key).map_or(true, |pending| !pending.stale)
    }

    /// Marks in-flight reads of `key` as stale.
    pub fn invalidate_reads(&mut self, key: &str) {
        if let Some(pending) = self.pending.get_mut(key) {
            pending.stale = true;
        }
    }

    /// Marks every in-flight read as stale.
    pub fn invalidate_all_reads(&mut self) {
        for pending in self.pending.values_mut() {
            pending.stale = true;
        }
    }

    /// Number of keys with durable reads in flight.
    pub fn pending_reads(&self) -> usize {
        self.pending.len()
    }

    // == Remove Expired ==
    /// Removes every entry expired at `now`. Returns the removed keys.
    pub fn remove_expired(&mut self, now: u64) -> Vec<String> {
        let expired: Vec<String> = self
            .entries
            .values()
            .filter(|entry| entry.is_expired_at(now))
            .map(|entry| entry.key.clone())
            .collect();

        for key in &expired {
            self.forget(key);
        }
        expired
    }

    // == Remove Namespace ==
    /// Removes every entry tagged with `namespace`. Returns the removed keys.
    pub fn remove_namespace(&mut self, namespace: &str) -> Vec<String> {
        let tagged: Vec<String> = self
            .entries
            .values()
            .filter(|entry| entry.namespace.as_deref() == Some(namespace))
            .map(|entry| entry.key.clone())
            .collect();

        for key in &tagged {
            self.forget(key);
        }
        tagged
    }

    // == Clear ==
    /// Empties the tier and resets accounting. Reads in flight stay
    /// registered but can no longer promote.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.recency.clear();
        self.frequency.clear();
        self.resident_bytes = 0;
        self.invalidate_all_reads();
    }

    /// Keys from least to most recently touched.
    pub fn keys_by_recency(&self) -> impl Iterator<Item = &str> {
        self.recency.iter_oldest_first()
    }

    pub fn resident_bytes(&self) -> usize {
        self.resident_bytes
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }
}

impl<V> Default for MemoryTier<V> {
    fn default() -> Self {
        Self::new()
    }
}
