//! Storage Module
//!
//! Durable tier backing the tiered cache.

mod durable;
mod sqlite;

pub use durable::{DiskUsage, DurableRow, DurableStore, StorageError};
pub use sqlite::{SqliteStore, IN_MEMORY_PATH};
