//! Durable Store Interface
//!
//! The protocol the tiered cache relies on for its persistent tier.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage backend error: {0}")]
    Backend(String),
    #[error("Blocking storage task failed: {0}")]
    Task(String),
}

impl From<rusqlite::Error> for StorageError {
    fn from(e: rusqlite::Error) -> Self {
        StorageError::Backend(e.to_string())
    }
}

impl From<tokio::task::JoinError> for StorageError {
    fn from(e: tokio::task::JoinError) -> Self {
        StorageError::Task(e.to_string())
    }
}

/// One persisted cache entry.
#[derive(Debug, Clone, PartialEq)]
pub struct DurableRow {
    pub key: String,
    /// Serialized value, compressed when `compressed` is set
    pub value: Vec<u8>,
    /// Serialized size before compression
    pub size: usize,
    pub expires_at: u64,
    pub created_at: u64,
    pub last_accessed_at: u64,
    pub hit_count: u64,
    pub namespace: Option<String>,
    pub compressed: bool,
}

impl DurableRow {
    pub fn is_expired_at(&self, now: u64) -> bool {
        now >= self.expires_at
    }
}

/// Row count and logical bytes held by a durable store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiskUsage {
    pub entries: u64,
    pub bytes: u64,
}

#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Inserts or replaces the row for `row.key`.
    async fn upsert(&self, row: DurableRow) -> Result<(), StorageError>;

    async fn get(&self, key: &str) -> Result<Option<DurableRow>, StorageError>;

    /// Increments the hit count and sets `last_accessed_at` to `now`.
    async fn touch_access(&self, key: &str, now: u64) -> Result<(), StorageError>;

    /// Returns true if a row was removed.
    async fn delete(&self, key: &str) -> Result<bool, StorageError>;

    /// Removes every row with `expires_at <= now`. Returns the removed keys.
    async fn delete_expired_before(&self, now: u64) -> Result<Vec<String>, StorageError>;

    /// Removes every row tagged with `namespace`. Returns the removed keys.
    async fn delete_namespace(&self, namespace: &str) -> Result<Vec<String>, StorageError>;

    async fn clear_all(&self) -> Result<(), StorageError>;

    async fn usage(&self) -> Result<DiskUsage, StorageError>;
}
