use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use sentry::types::Dsn;
use serde::{Deserialize, Deserializer, de};
use tracing::level_filters::LevelFilter;

use signalhub_sources::ProviderConfig;

use crate::caching::{LocalCacheConfig, RemoteCacheConfig};

/// Controls the log format
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Auto detect (pretty for tty, simplified for other)
    Auto,
    /// With colors
    Pretty,
    /// Simplified log output
    Simplified,
    /// Dump out JSON lines
    Json,
}

/// Controls the logging system.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Logging {
    /// The log level for signalhub.
    #[serde(deserialize_with = "deserialize_level_filter")]
    pub level: LevelFilter,
    /// Controls the log format.
    pub format: LogFormat,
    /// When set to true, backtraces are forced on.
    pub enable_backtraces: bool,
}

impl Default for Logging {
    fn default() -> Self {
        Logging {
            level: LevelFilter::INFO,
            format: LogFormat::Auto,
            enable_backtraces: true,
        }
    }
}

/// Control the metrics.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Metrics {
    /// host/port of statsd instance
    pub statsd: Option<String>,
    /// The prefix that should be added to all metrics.
    pub prefix: String,
    /// A tag name to report the hostname to, for each metric. Defaults to not sending such a tag.
    pub hostname_tag: Option<String>,
    /// A tag name to report the environment to, for each metric. Defaults to not sending such a tag.
    pub environment_tag: Option<String>,
    /// A map containing custom tags and their values.
    ///
    /// These tags will be appended to every metric.
    pub custom_tags: BTreeMap<String, String>,
}

impl Default for Metrics {
    fn default() -> Self {
        Metrics {
            statsd: env::var("STATSD_SERVER").ok(),
            prefix: "signalhub".into(),
            hostname_tag: None,
            environment_tag: None,
            custom_tags: BTreeMap::new(),
        }
    }
}

/// Configuration of both cache tiers and the lifetime of cached values.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct CacheConfigs {
    /// The in-process tier.
    pub local: LocalCacheConfig,

    /// The optional shared remote tier.
    ///
    /// Defaults to the `REDIS_URL` environment variable. Without it, only the local tier is used.
    pub remote: Option<RemoteCacheConfig>,

    /// How long aggregated trending results are reused.
    ///
    /// Defaults to `30m`.
    #[serde(with = "humantime_serde")]
    pub trending_ttl: Duration,

    /// How long computed content analyses are reused.
    ///
    /// Defaults to `2h`.
    #[serde(with = "humantime_serde")]
    pub analysis_ttl: Duration,
}

impl Default for CacheConfigs {
    fn default() -> Self {
        Self {
            local: LocalCacheConfig::default(),
            remote: RemoteCacheConfig::from_env(),
            trending_ttl: Duration::from_secs(30 * 60),
            analysis_ttl: Duration::from_secs(2 * 3600),
        }
    }
}

/// Timeouts and result bounds of the provider aggregation.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AggregationConfig {
    /// Time-box of each individual provider call.
    #[serde(with = "humantime_serde")]
    pub per_provider_timeout: Duration,

    /// The aggregation never waits longer than this for all providers to settle.
    #[serde(with = "humantime_serde")]
    pub overall_deadline: Duration,

    /// Maximum number of items of the cross-provider trending view.
    pub max_results: usize,

    /// Maximum number of items per provider in the cross-provider trending view.
    ///
    /// Keeps a single prolific provider from crowding out all others. `null` disables this.
    pub per_provider_limit: Option<usize>,

    /// Maximum number of items of the single-provider view.
    pub provider_max_results: usize,

    /// Maximum number of items of a cross-provider search.
    pub search_max_results: usize,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            per_provider_timeout: Duration::from_secs(5),
            overall_deadline: Duration::from_secs(8),
            max_results: 50,
            per_provider_limit: Some(3),
            provider_max_results: 20,
            search_max_results: 15,
        }
    }
}

/// Controls when a session is served cached aggregates.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FreshnessConfig {
    /// A session refreshed less than this ago is served from the cache.
    #[serde(with = "humantime_serde")]
    pub session_cache_window: Duration,

    /// Sessions without any request for this long are forgotten.
    #[serde(with = "humantime_serde")]
    pub session_ttl: Duration,

    /// Maximum number of tracked sessions.
    ///
    /// Once reached, new sessions may not be recorded at all. Those are treated as first seen
    /// and aggregate on every request until the registry admits them.
    pub max_sessions: u64,
}

impl Default for FreshnessConfig {
    fn default() -> Self {
        Self {
            session_cache_window: Duration::from_secs(15 * 60),
            session_ttl: Duration::from_secs(24 * 3600),
            max_sessions: 100_000,
        }
    }
}

/// The complete signalhub configuration.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Host and port to bind the HTTP webserver to.
    pub bind: String,

    /// Configuration for internal logging.
    pub logging: Logging,

    /// Configuration for reporting metrics to a statsd instance.
    pub metrics: Metrics,

    /// DSN to report internal errors to
    pub sentry_dsn: Option<Dsn>,

    /// Configuration of the cache tiers.
    pub caches: CacheConfigs,

    /// Provider timeouts and result bounds.
    pub aggregation: AggregationConfig,

    /// Per-session reuse of cached aggregates.
    pub freshness: FreshnessConfig,

    /// The timeout for establishing a connection to a provider.
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// The registered providers, in registration order.
    ///
    /// The order breaks ties when ranking. Defaults to all supported providers, with credentials
    /// taken from the environment.
    pub providers: Vec<ProviderConfig>,

    /// The sample rate for Sentry traces. (0.0 - 1.0, defaults to 0.05)
    pub traces_sample_rate: f32,
}

/// Checks if we are running in docker.
fn is_docker() -> bool {
    if fs::metadata("/.dockerenv").is_ok() {
        return true;
    }

    fs::read_to_string("/proc/self/cgroup")
        .map(|s| s.contains("/docker"))
        .unwrap_or(false)
}

/// Default value for the "bind" configuration.
fn default_bind() -> String {
    if is_docker() {
        // Docker images rely on this service being exposed
        "0.0.0.0:3030".to_owned()
    } else {
        "127.0.0.1:3030".to_owned()
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind: default_bind(),
            logging: Logging::default(),
            metrics: Metrics::default(),
            sentry_dsn: None,
            caches: CacheConfigs::default(),
            aggregation: AggregationConfig::default(),
            freshness: FreshnessConfig::default(),
            connect_timeout: Duration::from_millis(500),
            providers: ProviderConfig::default_set(),
            traces_sample_rate: 0.05,
        }
    }
}

impl Config {
    pub fn get(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_reader(
                fs::File::open(path).context("failed to open configuration file")?,
            ),
            None => Ok(Config::default()),
        }
    }

    fn from_reader(mut reader: impl std::io::Read) -> Result<Self> {
        let mut config = String::new();
        reader
            .read_to_string(&mut config)
            .context("failed reading config file")?;
        // check for empty files explicitly
        if config.trim().is_empty() {
            anyhow::bail!("config file empty");
        }
        serde_yaml::from_str(&config).context("failed to parse config YAML")
    }
}

#[derive(Debug)]
struct LevelFilterVisitor;

impl<'de> de::Visitor<'de> for LevelFilterVisitor {
    type Value = LevelFilter;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> std::fmt::Result {
        write!(
            formatter,
            r#"one of the strings "off", "error", "warn", "info", "debug", or "trace""#
        )
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        match v {
            "off" => Ok(LevelFilter::OFF),
            "error" => Ok(LevelFilter::ERROR),
            "warn" => Ok(LevelFilter::WARN),
            "info" => Ok(LevelFilter::INFO),
            "debug" => Ok(LevelFilter::DEBUG),
            "trace" => Ok(LevelFilter::TRACE),
            _ => Err(de::Error::unknown_variant(
                v,
                &["off", "error", "warn", "info", "debug", "trace"],
            )),
        }
    }
}

fn deserialize_level_filter<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<LevelFilter, D::Error> {
    deserializer.deserialize_str(LevelFilterVisitor)
}
