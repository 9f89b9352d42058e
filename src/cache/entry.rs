//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with absolute expiry
//! and access metadata.

use std::time::{SystemTime, UNIX_EPOCH};

// == Cache Entry ==
/// Represents a single cache entry with value and metadata.
///
/// The value and size are fixed for the lifetime of the entry; only the
/// access metadata (`last_accessed_at`, `hit_count`) changes on reads.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<V> {
    /// Globally unique key
    pub key: String,
    /// The stored value, kept in native form
    pub value: V,
    /// Byte length of the serialized value
    pub size: usize,
    /// Expiration timestamp (Unix milliseconds)
    pub expires_at: u64,
    /// Creation timestamp (Unix milliseconds)
    pub created_at: u64,
    /// Last successful read (Unix milliseconds)
    pub last_accessed_at: u64,
    /// Number of successful reads
    pub hit_count: u64,
    /// Optional logical grouping tag
    pub namespace: Option<String>,
}

impl<V> CacheEntry<V> {
    // == Constructor ==
    /// Creates a new cache entry expiring `ttl_seconds` after `now`.
    ///
    /// # Arguments
    /// * `key` - The key the entry is stored under
    /// * `value` - The value to store
    /// * `size` - Serialized size of the value in bytes
    /// * `ttl_seconds` - Time to live in seconds
    /// * `now` - Current Unix timestamp in milliseconds
    pub fn new(key: String, value: V, size: usize, ttl_seconds: u64, now: u64) -> Self {
        Self {
            key,
            value,
            size,
            expires_at: now.saturating_add(ttl_seconds.saturating_mul(1000)),
            created_at: now,
            last_accessed_at: now,
            hit_count: 0,
            namespace: None,
        }
    }

    /// Tags the entry with a namespace.
    pub fn with_namespace(mut self, namespace: Option<String>) -> Self {
        self.namespace = namespace;
        self
    }

    // == Is Expired ==
    /// Checks if the entry has expired at the given instant.
    ///
    /// An entry is expired once `now >= expires_at`, so a TTL of zero
    /// expires immediately.
    pub fn is_expired_at(&self, now: u64) -> bool {
        now >= self.expires_at
    }

    /// Checks if the entry has expired against the wall clock.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(current_timestamp_ms())
    }

    // == Record Access ==
    /// Updates access metadata after a successful read.
    pub fn record_access(&mut self, now: u64) {
        self.last_accessed_at = now;
        self.hit_count = self.hit_count.saturating_add(1);
    }

    // == Time To Live ==
    /// Returns remaining TTL in milliseconds (0 once expired).
    pub fn ttl_remaining_ms(&self) -> u64 {
        self.expires_at.saturating_sub(current_timestamp_ms())
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
