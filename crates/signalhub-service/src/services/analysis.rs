use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};

use crate::aggregation::SingleFlightGate;
use crate::caching::{CacheKey, CacheName, TieredCache};

/// Only this many leading characters of the content identify an analysis.
pub const FINGERPRINT_CHARS: usize = 2000;

/// The result of an analysis, shared between all callers that asked for it concurrently.
pub type AnalysisResult = Result<Arc<serde_json::Value>, Arc<anyhow::Error>>;

/// Caches expensive content analyses by a fingerprint of their input.
///
/// An analysis is computed at most once at a time per fingerprint. Successful analyses are
/// cached, failures are not.
#[derive(Clone, Debug)]
pub struct AnalysisCache {
    cache: Arc<TieredCache>,
    gate: Arc<SingleFlightGate<AnalysisResult>>,
    ttl: Duration,
}

impl AnalysisCache {
    pub fn new(cache: Arc<TieredCache>, ttl: Duration) -> Self {
        Self {
            cache,
            gate: Arc::new(SingleFlightGate::new("analysis")),
            ttl,
        }
    }

    /// The cache key of analysing `content` as `kind`.
    pub fn fingerprint(content: &str, kind: &str) -> CacheKey {
        let prefix_end = content
            .char_indices()
            .nth(FINGERPRINT_CHARS)
            .map_or(content.len(), |(index, _)| index);
        let digest = Sha256::digest(&content.as_bytes()[..prefix_end]);

        CacheKey::builder(CacheName::Analysis)
            .param("content", format_args!("{digest:x}"))
            .param("kind", kind)
            .build()
    }

    /// Returns the cached analysis of `content`, or computes it with `compute`.
    pub async fn get_or_compute<F, Fut>(&self, content: &str, kind: &str, compute: F) -> AnalysisResult
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<serde_json::Value>> + Send + 'static,
    {
        let key = Self::fingerprint(content, kind);
        if let Some(analysis) = self.cache.get::<serde_json::Value>(&key).await {
            return Ok(Arc::new(analysis));
        }

        let cache = Arc::clone(&self.cache);
        let ttl = self.ttl;
        let storage_key = key.storage_key();
        let analysis = compute();

        let work = async move {
            let analysis = analysis.await.map_err(|err| {
                tracing::warn!(error = %err, "Content analysis failed");
                Arc::new(err)
            })?;
            cache.set(&key, &analysis, ttl).await;
            Ok(Arc::new(analysis))
        };

        self.gate.run(&storage_key, work).await
    }
}
