//! Background Tasks Module
//!
//! Contains background tasks that run periodically during cache operation.
//!
//! # Tasks
//! - Expiry Sweep: Removes expired entries from both tiers at configured intervals

mod sweep;

pub use sweep::spawn_sweep_task;
