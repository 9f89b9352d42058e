//! Expiry Sweep Task
//!
//! Background task that periodically removes expired entries from both
//! cache tiers.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::info;

use crate::cache::TieredCache;

/// Spawns a background task that sweeps expired entries on the cache's
/// configured `sweep_interval_ms`.
///
/// Each run removes expired memory entries under the memory lock, then
/// bulk-deletes expired durable rows outside it. Durable failures are
/// logged by the cache and the loop keeps going.
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort the task
/// during graceful shutdown.
///
/// # Example
/// ```ignore
/// let cache = Arc::new(TieredCache::<serde_json::Value>::new(Config::default()));
/// let sweep_handle = spawn_sweep_task(cache.clone());
/// // Later, during shutdown:
/// sweep_handle.abort();
/// ```
pub fn spawn_sweep_task<V>(cache: Arc<TieredCache<V>>) -> JoinHandle<()>
where
    V: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    let interval_ms = cache.config().sweep_interval_ms.max(1);
    let interval = Duration::from_millis(interval_ms);

    tokio::spawn(async move {
        info!(
            "Starting expiry sweep task with interval of {} ms",
            interval_ms
        );

        loop {
            tokio::time::sleep(interval).await;
            cache.sweep_expired().await;
        }
    })
}
