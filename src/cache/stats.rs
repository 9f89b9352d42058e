//! Cache Statistics Module
//!
//! Running counters over the life of a cache instance and the point-in-time
//! snapshot built from them. Rates are cumulative, not windowed.

use serde::Serialize;

// == Counters ==
/// Lifetime operation counters, updated under the memory tier lock.
#[derive(Debug, Clone, Copy, Default)]
pub struct Counters {
    pub hits: u64,
    pub memory_hits: u64,
    pub durable_hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub promotions: u64,
    pub sets: u64,
    pub deletes: u64,
}

impl Counters {
    /// Records a hit served from the memory tier.
    pub fn record_memory_hit(&mut self) {
        self.hits += 1;
        self.memory_hits += 1;
    }

    /// Records a hit served from the durable tier.
    pub fn record_durable_hit(&mut self) {
        self.hits += 1;
        self.durable_hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_eviction(&mut self) {
        self.evictions += 1;
    }

    pub fn record_expirations(&mut self, count: usize) {
        self.expirations += count as u64;
    }

    pub fn record_promotion(&mut self) {
        self.promotions += 1;
    }

    pub fn record_set(&mut self) {
        self.sets += 1;
    }

    pub fn record_delete(&mut self) {
        self.deletes += 1;
    }
}

// == Cache Stats ==
/// Point-in-time snapshot of cache state and lifetime counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    /// Number of successful reads (either tier)
    pub hits: u64,
    /// Reads served from the memory tier
    pub memory_hits: u64,
    /// Reads served from the durable tier
    pub durable_hits: u64,
    /// Number of failed reads (not found or expired)
    pub misses: u64,
    /// Entries removed from memory to make room
    pub evictions: u64,
    /// Entries removed from memory because their TTL passed
    pub expirations: u64,
    /// Durable entries copied into memory on read
    pub promotions: u64,
    /// Successful `set` calls
    pub sets: u64,
    /// `delete` calls that removed something
    pub deletes: u64,
    /// Entries currently resident in memory
    pub total_entries: usize,
    /// Bytes currently resident in memory
    pub resident_bytes: usize,
    /// Memory tier capacity
    pub max_memory_bytes: usize,
    /// Whether the durable tier is active
    pub persistent: bool,
}

impl CacheStats {
    // == Constructor ==
    /// Builds a snapshot from counters and the current tier occupancy.
    pub fn snapshot(
        counters: &Counters,
        total_entries: usize,
        resident_bytes: usize,
        max_memory_bytes: usize,
        persistent: bool,
    ) -> Self {
        Self {
            hits: counters.hits,
            memory_hits: counters.memory_hits,
            durable_hits: counters.durable_hits,
            misses: counters.misses,
            evictions: counters.evictions,
            expirations: counters.expirations,
            promotions: counters.promotions,
            sets: counters.sets,
            deletes: counters.deletes,
            total_entries,
            resident_bytes,
            max_memory_bytes,
            persistent,
        }
    }

    // == Hit Rate ==
    /// Returns hits / (hits + misses), or 0.0 if no reads have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    // == Miss Rate ==
    /// Returns misses / (hits + misses), or 0.0 if no reads have been made.
    pub fn miss_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.misses as f64 / total as f64
        }
    }
}
