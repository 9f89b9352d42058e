//! Tiered Cache - A two-level key/value cache
//!
//! Bounded in-memory tier with recency, frequency or blended eviction over a
//! durable SQLite tier, with TTL expiration, write-through and promotion.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod storage;
pub mod tasks;

pub use api::AppState;
pub use cache::TieredCache;
pub use config::Config;
pub use tasks::spawn_sweep_task;
