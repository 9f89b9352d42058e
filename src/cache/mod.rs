//! Cache Module
//!
//! Two-level caching: a bounded in-memory tier with pluggable eviction over
//! a durable SQLite tier, with TTL expiration and tier promotion.

mod codec;
mod entry;
mod events;
mod eviction;
mod memory;
mod recency;
mod stats;
mod tiered;


// Re-export public types
pub use codec::Codec;
pub use entry::{current_timestamp_ms, CacheEntry};
pub use events::{CacheEvent, EventBus, Tier};
pub use eviction::{EvictionEngine, EvictionPolicy, Victim};
pub use memory::MemoryTier;
pub use recency::RecencyList;
pub use stats::{CacheStats, Counters};
pub use tiered::{SetOptions, SweepReport, TieredCache, HOT_KEY_THRESHOLD};

// == Public Constants ==
/// Maximum allowed key length in bytes
pub const MAX_KEY_LENGTH: usize = 256;
