use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Environment variable providing the remote cache URL when none is configured.
pub const REDIS_URL_ENV: &str = "REDIS_URL";

/// Configuration of the in-process cache tier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LocalCacheConfig {
    /// Maximum number of entries. When full, the entry stored the longest ago is evicted.
    ///
    /// Defaults to `2000`.
    pub max_entries: usize,

    /// How often expired entries are swept out to release their memory.
    ///
    /// Expiry is always checked on read, the sweep only bounds memory usage.
    ///
    /// Defaults to `30m`.
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,
}

impl Default for LocalCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 2000,
            sweep_interval: Duration::from_secs(30 * 60),
        }
    }
}

/// A remote cache that can be shared between signalhub instances.
///
/// The remote tier is preferred for reads whenever it is reachable. When it becomes unavailable,
/// reads and writes go to the local tier only, until a health probe succeeds again.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoteCacheConfig {
    /// Connection URL of a Redis-compatible server, e.g. `redis://127.0.0.1:6379/0`.
    pub url: String,

    /// The timeout for each individual operation, including connecting.
    #[serde(default = "default_op_timeout", with = "humantime_serde")]
    pub op_timeout: Duration,

    /// How often the remote tier is pinged to detect outages and recoveries.
    #[serde(default = "default_probe_interval", with = "humantime_serde")]
    pub probe_interval: Duration,
}

impl RemoteCacheConfig {
    /// Creates a config for `url` with default timeouts.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            op_timeout: default_op_timeout(),
            probe_interval: default_probe_interval(),
        }
    }

    /// The remote cache from the `REDIS_URL` environment variable, if set.
    pub fn from_env() -> Option<Self> {
        match std::env::var(REDIS_URL_ENV) {
            Ok(url) if !url.trim().is_empty() => Some(Self::new(url)),
            _ => None,
        }
    }
}

fn default_op_timeout() -> Duration {
    Duration::from_millis(500)
}

fn default_probe_interval() -> Duration {
    Duration::from_secs(30)
}
