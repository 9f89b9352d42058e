//! Recency Module
//!
//! Tracks the access order of resident keys for recency-based and blended
//! eviction.

use std::collections::{BTreeMap, HashMap};

// == Recency List ==
/// Access-order sequence of resident keys.
///
/// Every touch stamps the key with a fresh sequence number. `order` maps
/// stamps to keys, oldest first; `stamps` maps each key back to its stamp
/// so touch and remove stay logarithmic.
#[derive(Debug, Default)]
pub struct RecencyList {
    order: BTreeMap<u64, String>,
    stamps: HashMap<String, u64>,
    next_stamp: u64,
}

impl RecencyList {
    // == Constructor ==
    /// Creates a new empty recency list.
    pub fn new() -> Self {
        Self::default()
    }

    // == Touch ==
    /// Marks a key as most recently touched.
    ///
    /// An existing occurrence is removed first so every key appears once.
    pub fn touch(&mut self, key: &str) {
        let stamp = self.next_stamp;
        self.next_stamp += 1;

        match self.stamps.get_mut(key) {
            Some(previous) => {
                if let Some(owned) = self.order.remove(previous) {
                    self.order.insert(stamp, owned);
                }
                *previous = stamp;
            }
            None => {
                self.order.insert(stamp, key.to_string());
                self.stamps.insert(key.to_string(), stamp);
            }
        }
    }

    // == Remove ==
    /// Removes a key from the list.
    pub fn remove(&mut self, key: &str) {
        if let Some(stamp) = self.stamps.remove(key) {
            self.order.remove(&stamp);
        }
    }

    // == Oldest ==
    /// Returns the least recently touched key without removing it.
    pub fn oldest(&self) -> Option<&str> {
        self.order.values().next().map(String::as_str)
    }

    // == Iterate ==
    /// Iterates keys from least to most recently touched.
    pub fn iter_oldest_first(&self) -> impl Iterator<Item = &str> {
        self.order.values().map(String::as_str)
    }

    /// Removes every key.
    pub fn clear(&mut self) {
        self.order.clear();
        self.stamps.clear();
    }

    pub fn len(&self) -> usize {
        self.stamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stamps.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.stamps.contains_key(key)
    }
}
