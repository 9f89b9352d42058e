//! Eviction Engine Module
//!
//! Selects which resident key to drop when the memory tier lacks room.
//! Stateless per call: every decision is made from the tier's current
//! recency order, frequency counters and entry metadata.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::cache::{CacheEntry, MemoryTier};

/// Number of least-recently-touched keys the blended policy scores.
pub const BLENDED_SAMPLE_SIZE: usize = 10;
/// Weight of the frequency term in the blended score.
pub const BLENDED_FREQUENCY_WEIGHT: f64 = 0.3;
/// Weight of the recency term in the blended score.
pub const BLENDED_RECENCY_WEIGHT: f64 = 0.7;

// == Eviction Policy ==
/// Victim selection strategy for the memory tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionPolicy {
    /// Least recently touched key
    Recency,
    /// Least frequently used key, ties broken by recency
    Frequency,
    /// Lowest blended frequency/recency score among the oldest keys
    #[default]
    Blended,
}

impl fmt::Display for EvictionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EvictionPolicy::Recency => "recency",
            EvictionPolicy::Frequency => "frequency",
            EvictionPolicy::Blended => "blended",
        };
        f.write_str(name)
    }
}

impl FromStr for EvictionPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "recency" | "lru" => Ok(EvictionPolicy::Recency),
            "frequency" | "lfu" => Ok(EvictionPolicy::Frequency),
            "blended" | "adaptive" => Ok(EvictionPolicy::Blended),
            other => Err(format!("unknown eviction policy '{}'", other)),
        }
    }
}

// == Victim ==
/// A key chosen for eviction and why.
#[derive(Debug, Clone, PartialEq)]
pub struct Victim {
    pub key: String,
    pub reason: String,
}

// == Eviction Engine ==
/// Applies one [`EvictionPolicy`] to a memory tier.
#[derive(Debug, Clone, Copy)]
pub struct EvictionEngine {
    policy: EvictionPolicy,
}

impl EvictionEngine {
    pub fn new(policy: EvictionPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> EvictionPolicy {
        self.policy
    }

    // == Select Victim ==
    /// Picks a victim without removing it. `None` when the tier is empty.
    pub fn select_victim<V>(&self, tier: &MemoryTier<V>, now: u64) -> Option<Victim> {
        match self.policy {
            EvictionPolicy::Recency => {
                let key = tier.keys_by_recency().next()?;
                Some(Victim {
                    key: key.to_string(),
                    reason: "least recently used".to_string(),
                })
            }
            EvictionPolicy::Frequency => {
                // Strict less-than keeps the oldest key among equal frequencies
                let mut best: Option<(&str, u64)> = None;
                for key in tier.keys_by_recency() {
                    let frequency = tier.frequency(key);
                    if best.map_or(true, |(_, min)| frequency < min) {
                        best = Some((key, frequency));
                    }
                }
                let (key, frequency) = best?;
                Some(Victim {
                    key: key.to_string(),
                    reason: format!("lowest frequency ({})", frequency),
                })
            }
            EvictionPolicy::Blended => {
                let mut best: Option<(&str, f64)> = None;
                for key in tier.keys_by_recency().take(BLENDED_SAMPLE_SIZE) {
                    let Some(entry) = tier.get(key) else {
                        continue;
                    };
                    let score = blended_score(tier.frequency(key), entry, now);
                    if best.map_or(true, |(_, min)| score < min) {
                        best = Some((key, score));
                    }
                }
                let (key, score) = best?;
                Some(Victim {
                    key: key.to_string(),
                    reason: format!("lowest blended score ({:.4})", score),
                })
            }
        }
    }

    // == Evict One ==
    /// Removes one victim from the tier.
    ///
    /// Returns the victim and its entry, or `None` when there is nothing
    /// left to evict; callers looping for room must stop on `None`.
    pub fn evict_one<V>(
        &self,
        tier: &mut MemoryTier<V>,
        now: u64,
    ) -> Option<(Victim, CacheEntry<V>)> {
        let victim = self.select_victim(tier, now)?;
        let entry = tier.remove(&victim.key)?;
        Some((victim, entry))
    }
}

/// `frequency * 0.3 + 1 / (idle_ms + 1) * 0.7`; lower scores are evicted first.
pub fn blended_score<V>(frequency: u64, entry: &CacheEntry<V>, now: u64) -> f64 {
    let idle_ms = now.saturating_sub(entry.last_accessed_at) as f64;
    frequency as f64 * BLENDED_FREQUENCY_WEIGHT + (1.0 / (idle_ms + 1.0)) * BLENDED_RECENCY_WEIGHT
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    fn tier_with(keys: &[&str], now: u64) -> MemoryTier<u32> {
        let mut tier = MemoryTier::new();
        for key in keys {
            tier.put(CacheEntry::new(key.to_string(), 0, 1, 3600, now));
        }
        tier
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!("recency".parse::<EvictionPolicy>(), Ok(EvictionPolicy::Recency));
        assert_eq!("LRU".parse::<EvictionPolicy>(), Ok(EvictionPolicy::Recency));
        assert_eq!("lfu".parse::<EvictionPolicy>(), Ok(EvictionPolicy::Frequency));
        assert_eq!("adaptive".parse::<EvictionPolicy>(), Ok(EvictionPolicy::Blended));
        assert!("random".parse::<EvictionPolicy>().is_err());
    }

    #[test]
    fn test_policy_default_and_display() {
        assert_eq!(EvictionPolicy::default(), EvictionPolicy::Blended);
        assert_eq!(EvictionPolicy::Frequency.to_string(), "frequency");
    }

    #[test]
    fn test_empty_tier_has_no_victim() {
        let mut tier: MemoryTier<u32> = MemoryTier::new();
        for policy in [
            EvictionPolicy::Recency,
            EvictionPolicy::Frequency,
            EvictionPolicy::Blended,
        ] {
            let engine = EvictionEngine::new(policy);
            assert!(engine.select_victim(&tier, 0).is_none());
            assert!(engine.evict_one(&mut tier, 0).is_none());
        }
    }

    #[test]
    fn test_recency_evicts_least_recently_touched() {
        let mut tier = tier_with(&["a", "b", "c"], 0);
        tier.touch("a", 10);

        let engine = EvictionEngine::new(EvictionPolicy::Recency);
        let (victim, entry) = engine.evict_one(&mut tier, 20).unwrap();

        assert_eq!(victim.key, "b");
        assert_eq!(entry.key, "b");
        assert_eq!(tier.len(), 2);
        assert_eq!(tier.resident_bytes(), 2);
    }

    #[test]
    fn test_frequency_evicts_least_used() {
        let mut tier = tier_with(&["a", "b", "c"], 0);
        tier.touch("a", 1);
        tier.touch("a", 2);
        tier.touch("b", 3);
        tier.touch("c", 4);
        tier.touch("c", 5);

        let engine = EvictionEngine::new(EvictionPolicy::Frequency);
        let victim = engine.select_victim(&tier, 10).unwrap();

        assert_eq!(victim.key, "b");
        assert!(victim.reason.contains("2"));
    }

    #[test]
    fn test_frequency_ties_break_by_recency() {
        let tier = tier_with(&["a", "b", "c"], 0);

        let engine = EvictionEngine::new(EvictionPolicy::Frequency);
        let victim = engine.select_victim(&tier, 10).unwrap();

        // All at frequency 1; "a" is the oldest
        assert_eq!(victim.key, "a");
    }

    #[test]
    fn test_blended_prefers_stale_infrequent_over_recent() {
        let mut tier = MemoryTier::new();
        tier.put(CacheEntry::new("stale".to_string(), 0u32, 1, 3600, 0));
        tier.put(CacheEntry::new("fresh".to_string(), 0u32, 1, 3600, 999));

        let engine = EvictionEngine::new(EvictionPolicy::Blended);
        let victim = engine.select_victim(&tier, 1_000).unwrap();

        assert_eq!(victim.key, "stale");
        assert!(victim.reason.starts_with("lowest blended score"));
    }

    #[test]
    fn test_blended_spares_frequent_old_key() {
        let mut tier = MemoryTier::new();
        tier.put(CacheEntry::new("hot".to_string(), 0u32, 1, 3600, 0));
        for _ in 0..10 {
            tier.record_access("hot");
        }
        tier.put(CacheEntry::new("cold".to_string(), 0u32, 1, 3600, 500));

        let engine = EvictionEngine::new(EvictionPolicy::Blended);
        let victim = engine.select_victim(&tier, 1_000).unwrap();

        assert_eq!(victim.key, "cold");
    }

    #[test]
    fn test_blended_only_samples_oldest_keys() {
        let mut tier = MemoryTier::new();
        // Eleven keys; the newest one is never sampled even with the lowest score
        for i in 0..BLENDED_SAMPLE_SIZE {
            let key = format!("k{}", i);
            tier.put(CacheEntry::new(key.clone(), 0u32, 1, 3600, 0));
            for _ in 0..5 {
                tier.record_access(&key);
            }
        }
        tier.put(CacheEntry::new("newest".to_string(), 0u32, 1, 3600, 0));

        let engine = EvictionEngine::new(EvictionPolicy::Blended);
        let victim = engine.select_victim(&tier, 1_000).unwrap();

        assert_ne!(victim.key, "newest");
    }

    #[test]
    fn test_blended_score_formula() {
        let entry = CacheEntry::new("k".to_string(), 0u32, 1, 60, 0);
        let score = blended_score(2, &entry, 0);
        assert!((score - (0.6 + 0.7)).abs() < 1e-9);

        let aged = blended_score(2, &entry, 999);
        assert!((aged - (0.6 + 0.7 / 1000.0)).abs() < 1e-9);
    }
}
