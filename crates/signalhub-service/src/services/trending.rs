//! Trending signals across providers, for sessions, single providers and searches.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;

use crate::aggregation::{AggregateOptions, AggregationError, ResilientAggregator, SingleFlightGate};
use crate::caching::{CacheKey, CacheName, TieredCache};
use crate::config::AggregationConfig;
use crate::freshness::{Decision, FreshnessPolicy};
use crate::providers::{ProviderAdapter, ProviderHealth};
use crate::types::{AggregateResult, TrendQuery};

type SharedResult = Result<Arc<AggregateResult>, AggregationError>;

/// An aggregate as served to a caller.
#[derive(Debug, Clone, Serialize)]
pub struct TrendingResponse {
    #[serde(flatten)]
    pub result: Arc<AggregateResult>,
    /// Whether the result was read from the cache rather than aggregated for this request.
    pub cached: bool,
}

/// Serves aggregated trending items.
///
/// Aggregates are cached in the [`TieredCache`], and concurrent aggregations of the same inputs
/// are collapsed into one. For session requests, the [`FreshnessPolicy`] decides whether the
/// cached aggregate may be used.
#[derive(Clone, Debug)]
pub struct TrendingService {
    providers: Arc<[Arc<dyn ProviderAdapter>]>,
    aggregator: ResilientAggregator,
    cache: Arc<TieredCache>,
    gate: Arc<SingleFlightGate<SharedResult>>,
    freshness: Arc<FreshnessPolicy>,
    config: AggregationConfig,
    ttl: Duration,
}

impl TrendingService {
    pub fn new(
        providers: Vec<Arc<dyn ProviderAdapter>>,
        aggregator: ResilientAggregator,
        cache: Arc<TieredCache>,
        freshness: Arc<FreshnessPolicy>,
        config: AggregationConfig,
        ttl: Duration,
    ) -> Self {
        Self {
            providers: providers.into(),
            aggregator,
            cache,
            gate: Arc::new(SingleFlightGate::new("trending")),
            freshness,
            config,
            ttl,
        }
    }

    /// The registered providers, in registration order.
    pub fn providers(&self) -> &[Arc<dyn ProviderAdapter>] {
        &self.providers
    }

    /// The balanced cross-provider view for `session`.
    ///
    /// With `force`, or when the session has not been served within its freshness window, this
    /// aggregates anew. Otherwise the cached aggregate is served.
    pub async fn all(&self, session: &str, force: bool) -> Result<TrendingResponse, AggregationError> {
        let options = AggregateOptions::from_config(
            &self.config,
            self.config.max_results,
            self.config.per_provider_limit,
        );
        let key = self.cache_key(CacheName::Trending, &TrendQuery::trending(), &options, None);

        match self.freshness.decide(session, force) {
            Decision::ServeCached => {
                self.cached_or_aggregate(key, TrendQuery::trending(), options, self.providers.clone())
                    .await
            }
            Decision::Aggregate(reason) => {
                tracing::debug!(reason = reason.as_str(), "Refreshing trending aggregate");
                let result = self
                    .aggregate(key, TrendQuery::trending(), options, self.providers.clone())
                    .await?;
                self.freshness.record_refresh(session);
                Ok(TrendingResponse {
                    result,
                    cached: false,
                })
            }
        }
    }

    /// Aggregates anew for `session`, regardless of its freshness.
    pub async fn refresh(&self, session: &str) -> Result<TrendingResponse, AggregationError> {
        self.all(session, true).await
    }

    /// Forgets the freshness record of `session`. Returns whether it was known.
    pub fn logout(&self, session: &str) -> bool {
        self.freshness.logout(session)
    }

    /// The trending items of a single provider, or `None` if no provider has this id.
    pub async fn provider(
        &self,
        provider_id: &str,
    ) -> Result<Option<TrendingResponse>, AggregationError> {
        let Some(provider) = self
            .providers
            .iter()
            .find(|p| p.id().as_str() == provider_id)
        else {
            return Ok(None);
        };

        let options =
            AggregateOptions::from_config(&self.config, self.config.provider_max_results, None);
        let query = TrendQuery::trending();
        let key = self.cache_key(CacheName::Provider, &query, &options, Some(provider_id));
        let providers: Arc<[_]> = Arc::new([Arc::clone(provider)]);

        self.cached_or_aggregate(key, query, options, providers)
            .await
            .map(Some)
    }

    /// Searches all providers for `terms`.
    pub async fn search(&self, terms: &str) -> Result<TrendingResponse, AggregationError> {
        let terms = terms.trim();
        if terms.is_empty() {
            return Err(AggregationError::PreconditionViolation(
                "search terms must not be empty".into(),
            ));
        }

        let options =
            AggregateOptions::from_config(&self.config, self.config.search_max_results, None);
        let query = TrendQuery::search(terms);
        let key = self.cache_key(CacheName::Search, &query, &options, None);

        self.cached_or_aggregate(key, query, options, self.providers.clone())
            .await
    }

    /// Checks every registered provider concurrently.
    pub async fn health(&self) -> Vec<ProviderHealth> {
        let timeout = self.config.per_provider_timeout;
        join_all(
            self.providers
                .iter()
                .map(|provider| ProviderHealth::check(provider.as_ref(), timeout)),
        )
        .await
    }

    fn cache_key(
        &self,
        name: CacheName,
        query: &TrendQuery,
        options: &AggregateOptions,
        provider: Option<&str>,
    ) -> CacheKey {
        let mut builder = CacheKey::builder(name)
            .param("query", query)
            .param("max_results", options.max_results);
        if let Some(limit) = options.per_provider_limit {
            builder = builder.param("per_provider_limit", limit);
        }
        match provider {
            Some(provider) => builder = builder.param("provider", provider),
            None => {
                for provider in self.providers.iter() {
                    builder = builder.param("provider", provider.id());
                }
            }
        }
        builder.build()
    }

    async fn cached_or_aggregate(
        &self,
        key: CacheKey,
        query: TrendQuery,
        options: AggregateOptions,
        providers: Arc<[Arc<dyn ProviderAdapter>]>,
    ) -> Result<TrendingResponse, AggregationError> {
        if let Some(result) = self.cache.get::<AggregateResult>(&key).await {
            return Ok(TrendingResponse {
                result: Arc::new(result),
                cached: true,
            });
        }

        let result = self.aggregate(key, query, options, providers).await?;
        Ok(TrendingResponse {
            result,
            cached: false,
        })
    }

    /// Aggregates through the gate and caches non-empty results.
    async fn aggregate(
        &self,
        key: CacheKey,
        query: TrendQuery,
        options: AggregateOptions,
        providers: Arc<[Arc<dyn ProviderAdapter>]>,
    ) -> SharedResult {
        let aggregator = self.aggregator.clone();
        let cache = Arc::clone(&self.cache);
        let ttl = self.ttl;
        let storage_key = key.storage_key();

        let work = async move {
            let result = aggregator.aggregate(&providers, &query, &options).await?;
            // an empty aggregate means every provider failed, try again next time
            if !result.items.is_empty() {
                cache.set(&key, &result, ttl).await;
            }
            Ok(Arc::new(result))
        };

        self.gate.run(&storage_key, work).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caching::{LocalCacheConfig, MemoryStore};
    use crate::config::FreshnessConfig;
    use crate::providers::{ProviderError, ProviderStatus};
    use crate::test::{self, ScriptedAdapter};

    fn service(scripted: &[Arc<ScriptedAdapter>]) -> (TrendingService, Arc<TieredCache>) {
        let local = Arc::new(MemoryStore::new(&LocalCacheConfig::default()));
        let cache = Arc::new(TieredCache::new(local, None));
        let service = TrendingService::new(
            test::adapters(scripted),
            ResilientAggregator::new(tokio::runtime::Handle::current()),
            cache.clone(),
            Arc::new(FreshnessPolicy::new(&FreshnessConfig::default())),
            AggregationConfig::default(),
            Duration::from_secs(30 * 60),
        );
        (service, cache)
    }

    fn total_calls(scripted: &[Arc<ScriptedAdapter>]) -> usize {
        scripted.iter().map(|s| s.calls()).sum()
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_freshness() {
        signalhub_test::setup();
        let scripted = [
            Arc::new(ScriptedAdapter::succeeding("a", 5)),
            Arc::new(ScriptedAdapter::succeeding("b", 5)),
        ];
        let (service, _cache) = service(&scripted);

        // populates the shared cache
        let first = service.all("alice", false).await.unwrap();
        assert!(!first.cached);
        assert_eq!(total_calls(&scripted), 2);

        // a new session aggregates even though the cache holds a result
        let other = service.all("bob", false).await.unwrap();
        assert!(!other.cached);
        assert_eq!(total_calls(&scripted), 4);

        // within the window, the cache is used
        let second = service.all("bob", false).await.unwrap();
        assert!(second.cached);
        assert_eq!(total_calls(&scripted), 4);
        assert_eq!(second.result.items, other.result.items);

        // an explicit refresh always aggregates
        let refreshed = service.refresh("bob").await.unwrap();
        assert!(!refreshed.cached);
        assert_eq!(total_calls(&scripted), 6);

        // the window elapsed
        tokio::time::advance(Duration::from_secs(16 * 60)).await;
        let stale = service.all("bob", false).await.unwrap();
        assert!(!stale.cached);
        assert_eq!(total_calls(&scripted), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn test_balanced_view() {
        let scripted = [
            Arc::new(ScriptedAdapter::succeeding("a", 10)),
            Arc::new(ScriptedAdapter::succeeding("b", 10)),
            Arc::new(ScriptedAdapter::unconfigured("c")),
        ];
        let (service, _cache) = service(&scripted);

        let response = service.all("alice", false).await.unwrap();
        for provider in ["a", "b"] {
            let count = response
                .result
                .items
                .iter()
                .filter(|i| i.provider.as_str() == provider)
                .count();
            assert_eq!(count, 3);
        }
        assert_eq!(response.result.items.len(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_sessions_collapse() {
        signalhub_test::setup();
        let scripted = [Arc::new(
            ScriptedAdapter::succeeding("a", 5).with_delay(Duration::from_millis(100)),
        )];
        let (service, _cache) = service(&scripted);

        let requests = (0..10).map(|n| {
            let service = service.clone();
            async move { service.all(&format!("session-{n}"), false).await.unwrap() }
        });
        let responses = join_all(requests).await;

        assert_eq!(scripted[0].calls(), 1);
        assert!(
            responses
                .iter()
                .all(|r| Arc::ptr_eq(&r.result, &responses[0].result))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_result_is_not_cached() {
        let scripted = [Arc::new(ScriptedAdapter::failing(
            "a",
            ProviderError::Unknown("down".into()),
        ))];
        let (service, _cache) = service(&scripted);

        let first = service.search("rust").await.unwrap();
        assert!(first.result.partial);
        assert!(first.result.items.is_empty());

        let second = service.search("rust").await.unwrap();
        assert!(!second.cached);
        assert_eq!(scripted[0].calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_search() {
        let scripted = [
            Arc::new(ScriptedAdapter::succeeding("a", 10)),
            Arc::new(ScriptedAdapter::succeeding("b", 10)),
        ];
        let (service, _cache) = service(&scripted);

        let response = service.search("rust").await.unwrap();
        assert_eq!(response.result.items.len(), 15);
        assert!(!response.cached);

        let response = service.search("  rust ").await.unwrap();
        assert!(response.cached);

        let response = service.search("   ").await;
        assert!(matches!(
            response,
            Err(AggregationError::PreconditionViolation(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_provider() {
        let scripted = [
            Arc::new(ScriptedAdapter::succeeding("a", 30)),
            Arc::new(ScriptedAdapter::succeeding("b", 30)),
        ];
        let (service, _cache) = service(&scripted);

        let response = service.provider("b").await.unwrap().unwrap();
        assert_eq!(response.result.items.len(), 20);
        assert!(
            response
                .result
                .items
                .iter()
                .all(|i| i.provider.as_str() == "b")
        );
        assert_eq!(scripted[0].calls(), 0);

        assert!(service.provider("unknown").await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_keys_are_distinct() {
        let scripted = [Arc::new(ScriptedAdapter::succeeding("a", 3))];
        let (service, cache) = service(&scripted);

        service.all("alice", false).await.unwrap();
        service.provider("a").await.unwrap();
        service.search("rust").await.unwrap();
        service.search("caching").await.unwrap();

        assert_eq!(cache.stats().local.entries, 4);
        assert_eq!(scripted[0].calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_logout() {
        let scripted = [Arc::new(ScriptedAdapter::succeeding("a", 3))];
        let (service, _cache) = service(&scripted);

        service.all("alice", false).await.unwrap();
        assert!(service.all("alice", false).await.unwrap().cached);

        assert!(service.logout("alice"));
        assert!(!service.all("alice", false).await.unwrap().cached);
    }

    #[tokio::test(start_paused = true)]
    async fn test_health() {
        let scripted = [
            Arc::new(ScriptedAdapter::succeeding("a", 3)),
            Arc::new(ScriptedAdapter::failing("b", ProviderError::RateLimited)),
            Arc::new(ScriptedAdapter::unconfigured("c")),
        ];
        let (service, _cache) = service(&scripted);

        let health = service.health().await;

        let statuses: Vec<_> = health.iter().map(|h| (h.id.as_str(), h.status)).collect();
        assert_eq!(
            statuses,
            [
                ("a", ProviderStatus::Available),
                ("b", ProviderStatus::Error),
                ("c", ProviderStatus::NotConfigured),
            ]
        );
        assert!(health[2].latency.is_zero());
    }
}
