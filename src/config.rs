//! Configuration Module
//!
//! Handles loading and managing cache configuration from environment variables.
//! Configuration is fixed for the lifetime of a cache instance.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::cache::EvictionPolicy;

/// 100 MiB
pub const DEFAULT_MAX_MEMORY_BYTES: usize = 100 * 1024 * 1024;
/// 1 GiB
pub const DEFAULT_MAX_DISK_BYTES: u64 = 1024 * 1024 * 1024;

// == Admission ==
/// How a key that is neither large nor frequently read enters memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Admission {
    /// Only when the tier has headroom without evicting
    #[default]
    Headroom,
    /// Evict until the value fits, as for frequently read keys
    Evict,
}

impl FromStr for Admission {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "headroom" => Ok(Admission::Headroom),
            "evict" => Ok(Admission::Evict),
            other => Err(format!("unknown admission mode '{}'", other)),
        }
    }
}

/// Cache configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Memory tier capacity in bytes
    pub max_memory_bytes: usize,
    /// Advisory ceiling for the durable tier; only reported, never enforced
    pub max_disk_bytes: u64,
    /// Default TTL in seconds for entries without explicit TTL
    pub default_ttl: u64,
    /// Victim selection for the memory tier
    pub eviction_policy: EvictionPolicy,
    /// Enables the durable tier
    pub persist_to_disk: bool,
    /// Compresses values written to the durable tier
    pub compression: bool,
    /// Interval between expiry sweeps in milliseconds
    pub sweep_interval_ms: u64,
    /// SQLite database location (`:memory:` for an in-memory database)
    pub db_path: PathBuf,
    /// Values larger than this fraction of `max_memory_bytes` bypass memory
    pub large_value_fraction: f64,
    /// Admission of ordinary keys into the memory tier
    pub admission: Admission,
    /// HTTP server port
    pub server_port: u16,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_MAX_MEMORY_BYTES` - Memory tier capacity (default: 100 MiB)
    /// - `CACHE_MAX_DISK_BYTES` - Advisory durable tier ceiling (default: 1 GiB)
    /// - `CACHE_DEFAULT_TTL` - Default TTL in seconds (default: 3600)
    /// - `CACHE_EVICTION_POLICY` - `recency`, `frequency` or `blended` (default: blended)
    /// - `CACHE_PERSIST_TO_DISK` - Enable the durable tier (default: true)
    /// - `CACHE_COMPRESSION` - Compress durable values (default: true)
    /// - `CACHE_SWEEP_INTERVAL_MS` - Expiry sweep frequency (default: 60000)
    /// - `CACHE_DB_PATH` - SQLite file (default: cache.db)
    /// - `CACHE_LARGE_VALUE_FRACTION` - Memory bypass threshold (default: 0.1)
    /// - `CACHE_ADMISSION` - `headroom` or `evict` (default: headroom)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_memory_bytes: env_or("CACHE_MAX_MEMORY_BYTES", defaults.max_memory_bytes),
            max_disk_bytes: env_or("CACHE_MAX_DISK_BYTES", defaults.max_disk_bytes),
            default_ttl: env_or("CACHE_DEFAULT_TTL", defaults.default_ttl),
            eviction_policy: env_or("CACHE_EVICTION_POLICY", defaults.eviction_policy),
            persist_to_disk: env_or("CACHE_PERSIST_TO_DISK", defaults.persist_to_disk),
            compression: env_or("CACHE_COMPRESSION", defaults.compression),
            sweep_interval_ms: env_or("CACHE_SWEEP_INTERVAL_MS", defaults.sweep_interval_ms),
            db_path: env::var("CACHE_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            large_value_fraction: env_or(
                "CACHE_LARGE_VALUE_FRACTION",
                defaults.large_value_fraction,
            ),
            admission: env_or("CACHE_ADMISSION", defaults.admission),
            server_port: env_or("SERVER_PORT", defaults.server_port),
        }
    }

    /// Largest value, in bytes, that may be placed in the memory tier.
    pub fn max_memory_value_bytes(&self) -> usize {
        (self.max_memory_bytes as f64 * self.large_value_fraction) as usize
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_memory_bytes: DEFAULT_MAX_MEMORY_BYTES,
            max_disk_bytes: DEFAULT_MAX_DISK_BYTES,
            default_ttl: 3600,
            eviction_policy: EvictionPolicy::Blended,
            persist_to_disk: true,
            compression: true,
            sweep_interval_ms: 60_000,
            db_path: PathBuf::from("cache.db"),
            large_value_fraction: 0.1,
            admission: Admission::Headroom,
            server_port: 3000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.max_memory_bytes, 104_857_600);
        assert_eq!(config.max_disk_bytes, 1_073_741_824);
        assert_eq!(config.default_ttl, 3600);
        assert_eq!(config.eviction_policy, EvictionPolicy::Blended);
        assert!(config.persist_to_disk);
        assert!(config.compression);
        assert_eq!(config.sweep_interval_ms, 60_000);
        assert_eq!(config.admission, Admission::Headroom);
        assert_eq!(config.server_port, 3000);
    }

    #[test]
    fn test_max_memory_value_bytes() {
        let config = Config {
            max_memory_bytes: 1000,
            ..Config::default()
        };
        assert_eq!(config.max_memory_value_bytes(), 100);
    }

    #[test]
    fn test_admission_from_str() {
        assert_eq!("evict".parse::<Admission>(), Ok(Admission::Evict));
        assert_eq!("Headroom".parse::<Admission>(), Ok(Admission::Headroom));
        assert!("always".parse::<Admission>().is_err());
    }

    #[test]
    fn test_config_from_env() {
        // Only variables no other test touches
        env::set_var("CACHE_EVICTION_POLICY", "lfu");
        env::set_var("CACHE_SWEEP_INTERVAL_MS", "not-a-number");

        let config = Config::from_env();
        assert_eq!(config.eviction_policy, EvictionPolicy::Frequency);
        assert_eq!(config.sweep_interval_ms, 60_000);

        env::remove_var("CACHE_EVICTION_POLICY");
        env::remove_var("CACHE_SWEEP_INTERVAL_MS");
    }
}
