//! Cache Events Module
//!
//! Observable side effects of cache operations, published for logging and
//! metrics collaborators.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::cache::EvictionPolicy;

/// Buffered events per subscriber before the slowest one starts lagging.
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

// == Tier ==
/// Which tier served or received an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Memory,
    Durable,
}

// == Cache Event ==
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum CacheEvent {
    Hit {
        key: String,
        tier: Tier,
    },
    Miss {
        key: String,
    },
    Set {
        key: String,
        size: usize,
        in_memory: bool,
        persisted: bool,
    },
    Delete {
        key: String,
    },
    Evict {
        key: String,
        policy: EvictionPolicy,
        reason: String,
    },
    Cleanup {
        memory_removed: usize,
        durable_removed: u64,
    },
    Clear,
}

// == Event Bus ==
/// Fan-out of [`CacheEvent`]s; publishing never blocks or fails.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CacheEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Publishes an event. Dropped silently when nobody is subscribed.
    pub fn publish(&self, event: CacheEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
