//! Provides the signalhub services and a way to initialize them.
//!
//! All services share a single [`TieredCache`], created by [`SharedServices::new`] according to
//! the provided [`Config`]. Background maintenance of the cache, like sweeping expired entries
//! and probing the remote tier, runs on the given runtime.

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::aggregation::ResilientAggregator;
use crate::caching::{CacheStore, MemoryStore, RedisStore, TieredCache};
use crate::config::Config;
use crate::freshness::FreshnessPolicy;
use crate::providers::create_adapters;
use crate::utils::http::{self, HttpTimeouts};

mod analysis;
mod trending;

pub use analysis::{AnalysisCache, AnalysisResult, FINGERPRINT_CHARS};
pub use trending::{TrendingResponse, TrendingService};

/// The services shared by all request handlers.
#[derive(Clone, Debug)]
pub struct SharedServices {
    pub trending: TrendingService,
    pub analysis: AnalysisCache,
    pub cache: Arc<TieredCache>,
}

impl SharedServices {
    pub fn new(config: &Config, runtime: tokio::runtime::Handle) -> Result<Self> {
        let local = Arc::new(MemoryStore::new(&config.caches.local));
        local.spawn_sweeper(&runtime, config.caches.local.sweep_interval);

        let remote = match &config.caches.remote {
            Some(remote_config) => {
                let store = RedisStore::open(remote_config)
                    .context("failed to configure remote cache")?;
                tracing::info!("Using remote cache");
                Some(Arc::new(store) as Arc<dyn CacheStore>)
            }
            None => {
                tracing::info!("No remote cache configured, using the local cache only");
                None
            }
        };

        let cache = Arc::new(TieredCache::new(local, remote));
        if let Some(remote_config) = &config.caches.remote {
            cache.spawn_health_probe(&runtime, remote_config.probe_interval);
        }

        let timeouts = HttpTimeouts {
            connect: config.connect_timeout,
            ..Default::default()
        };
        let client = http::create_client(&timeouts).context("failed to create http client")?;

        let providers = create_adapters(&config.providers, &client);
        for provider in &providers {
            if !provider.is_configured() {
                tracing::warn!(
                    provider = %provider.id(),
                    "Provider is missing credentials and will serve fallback data"
                );
            }
        }

        let trending = TrendingService::new(
            providers,
            ResilientAggregator::new(runtime),
            cache.clone(),
            Arc::new(FreshnessPolicy::new(&config.freshness)),
            config.aggregation.clone(),
            config.caches.trending_ttl,
        );
        let analysis = AnalysisCache::new(cache.clone(), config.caches.analysis_ttl);

        Ok(Self {
            trending,
            analysis,
            cache,
        })
    }
}
