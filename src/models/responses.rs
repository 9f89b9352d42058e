//! Response DTOs for the cache server API
//!
//! Defines the structure of outgoing HTTP response bodies.

use serde::Serialize;
use serde_json::Value;

use crate::cache::{CacheStats, EvictionPolicy, SweepReport};
use crate::storage::DiskUsage;

/// Response body for the GET operation (GET /get/:key)
#[derive(Debug, Clone, Serialize)]
pub struct GetResponse {
    /// The requested key
    pub key: String,
    /// The stored value
    pub value: Value,
}

impl GetResponse {
    /// Creates a new GetResponse
    pub fn new(key: impl Into<String>, value: Value) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

/// Response body for the SET operation (PUT /set)
#[derive(Debug, Clone, Serialize)]
pub struct SetResponse {
    /// Success message
    pub message: String,
    /// The key that was set
    pub key: String,
}

impl SetResponse {
    /// Creates a new SetResponse
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            message: format!("Key '{}' set successfully", key),
            key,
        }
    }
}

/// Response body for the DELETE operation (DELETE /del/:key)
#[derive(Debug, Clone, Serialize)]
pub struct DeleteResponse {
    /// Success message
    pub message: String,
    /// The key that was deleted
    pub key: String,
}

impl DeleteResponse {
    /// Creates a new DeleteResponse
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            message: format!("Key '{}' deleted successfully", key),
            key,
        }
    }
}

/// Response body for namespace invalidation (DELETE /namespace/:ns)
#[derive(Debug, Clone, Serialize)]
pub struct InvalidateResponse {
    pub namespace: String,
    pub removed: u64,
}

/// Response body for the clear endpoint (POST /clear)
#[derive(Debug, Clone, Serialize)]
pub struct ClearResponse {
    pub message: String,
}

impl ClearResponse {
    pub fn cleared() -> Self {
        Self {
            message: "Cache cleared".to_string(),
        }
    }
}

/// Response body for the sweep endpoint (POST /sweep)
#[derive(Debug, Clone, Serialize)]
pub struct SweepResponse {
    pub memory_removed: usize,
    pub durable_removed: u64,
}

impl From<SweepReport> for SweepResponse {
    fn from(report: SweepReport) -> Self {
        Self {
            memory_removed: report.memory_removed,
            durable_removed: report.durable_removed,
        }
    }
}

/// Response body for the stats endpoint (GET /stats)
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    /// Number of cache hits
    pub hits: u64,
    /// Number of cache misses
    pub misses: u64,
    /// Number of evictions
    pub evictions: u64,
    /// Current number of entries in memory
    pub total_entries: usize,
    /// Bytes resident in memory
    pub resident_bytes: usize,
    /// Memory tier capacity
    pub max_memory_bytes: usize,
    /// Hit rate (hits / (hits + misses))
    pub hit_rate: f64,
    /// Miss rate (misses / (hits + misses))
    pub miss_rate: f64,
    /// Active eviction policy
    pub eviction_policy: EvictionPolicy,
    /// Whether the durable tier is active
    pub persistent: bool,
    /// Durable tier occupancy, when available
    pub disk: Option<DiskUsage>,
}

impl StatsResponse {
    /// Creates a new StatsResponse from a cache statistics snapshot
    pub fn new(stats: &CacheStats, eviction_policy: EvictionPolicy, disk: Option<DiskUsage>) -> Self {
        Self {
            hits: stats.hits,
            misses: stats.misses,
            evictions: stats.evictions,
            total_entries: stats.total_entries,
            resident_bytes: stats.resident_bytes,
            max_memory_bytes: stats.max_memory_bytes,
            hit_rate: stats.hit_rate(),
            miss_rate: stats.miss_rate(),
            eviction_policy,
            persistent: stats.persistent,
            disk,
        }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status ("healthy", or "degraded" when running memory-only
    /// despite persistence being configured)
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self::with_status("healthy")
    }

    pub fn degraded() -> Self {
        Self::with_status("degraded")
    }

    fn with_status(status: &str) -> Self {
        Self {
            status: status.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}
