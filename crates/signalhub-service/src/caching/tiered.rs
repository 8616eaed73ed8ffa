use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::{CacheError, CacheKey, CacheStore, MemoryStats, MemoryStore};

/// Statistics of the remote tier.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RemoteStats {
    /// The backend name.
    pub backend: &'static str,
    /// Whether the last interaction with the remote tier succeeded.
    pub healthy: bool,
}

/// Statistics of both cache tiers.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CacheStats {
    pub local: MemoryStats,
    pub remote: Option<RemoteStats>,
}

/// A cache composed of an optional shared remote tier and an always-available local tier.
///
/// Reads prefer the remote tier while it is considered healthy, and its answer, including a
/// miss, is final. Any remote error switches to the local tier until a health probe succeeds
/// again. Writes always go to the local tier and, while healthy, to the remote tier as well.
///
/// Keys written or deleted without reaching the remote tier are remembered as diverged. Reads
/// of a diverged key stay local, and the probe replays the local state of every diverged key
/// onto the remote tier before declaring it healthy again, so an outage never resurrects a
/// value that was overwritten or deleted in the meantime.
///
/// Errors are transparently hidden, either a cache item is available or it is not.
#[derive(Debug)]
pub struct TieredCache {
    local: Arc<MemoryStore>,
    remote: Option<Arc<dyn CacheStore>>,
    remote_healthy: AtomicBool,
    diverged: Mutex<Diverged>,
}

/// Writes the remote tier has missed.
#[derive(Debug, Default)]
struct Diverged {
    /// A [`TieredCache::clear`] did not reach the remote tier.
    cleared: bool,
    keys: HashSet<CacheKey>,
}

impl Diverged {
    fn is_empty(&self) -> bool {
        !self.cleared && self.keys.is_empty()
    }

    fn merge(&mut self, other: Diverged) {
        self.cleared |= other.cleared;
        self.keys.extend(other.keys);
    }
}

impl TieredCache {
    pub fn new(local: Arc<MemoryStore>, remote: Option<Arc<dyn CacheStore>>) -> Self {
        Self {
            local,
            remote,
            remote_healthy: AtomicBool::new(true),
            diverged: Mutex::default(),
        }
    }

    /// Whether reads and writes currently go to the remote tier.
    pub fn is_remote_healthy(&self) -> bool {
        self.remote.is_some() && self.remote_healthy.load(Ordering::Relaxed)
    }

    fn healthy_remote(&self) -> Option<&Arc<dyn CacheStore>> {
        self.remote
            .as_ref()
            .filter(|_| self.remote_healthy.load(Ordering::Relaxed))
    }

    fn diverged(&self) -> std::sync::MutexGuard<'_, Diverged> {
        self.diverged.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_diverged(&self, key: &CacheKey) -> bool {
        let diverged = self.diverged();
        diverged.cleared || diverged.keys.contains(key)
    }

    /// Records the outcome of a remote write or delete of `key`.
    ///
    /// `None` means the remote tier was skipped.
    fn track_remote_write(
        &self,
        remote: &dyn CacheStore,
        key: &CacheKey,
        result: Option<Result<(), CacheError>>,
    ) {
        match result {
            Some(Ok(())) => {
                let mut diverged = self.diverged();
                // a pending clear would still wipe this write on reconciliation
                if diverged.cleared {
                    diverged.keys.insert(key.clone());
                } else {
                    diverged.keys.remove(key);
                }
            }
            Some(Err(err)) => {
                self.mark_unhealthy(remote, &err);
                self.diverged().keys.insert(key.clone());
            }
            None => {
                self.diverged().keys.insert(key.clone());
            }
        }
    }

    /// Replays the local state of all diverged keys onto the remote tier.
    ///
    /// On failure, whatever was not replayed stays diverged.
    async fn reconcile(&self, remote: &dyn CacheStore) -> Result<(), CacheError> {
        loop {
            let pending = std::mem::take(&mut *self.diverged());
            if pending.is_empty() {
                return Ok(());
            }
            let count = pending.keys.len();
            if let Err(err) = self.replay(remote, &pending).await {
                self.diverged().merge(pending);
                return Err(err);
            }
            metric!(
                counter("caches.remote.reconciled") += count as i64,
                "backend" => remote.name(),
            );
            tracing::debug!(backend = remote.name(), count, "Reconciled remote cache");
        }
    }

    async fn replay(&self, remote: &dyn CacheStore, pending: &Diverged) -> Result<(), CacheError> {
        if pending.cleared {
            remote.clear().await?;
        }
        for key in &pending.keys {
            match self.local.get_with_ttl(key) {
                Some((value, ttl)) => remote.set(key, value, ttl).await?,
                None => remote.delete(key).await?,
            }
        }
        Ok(())
    }

    fn mark_unhealthy(&self, remote: &dyn CacheStore, err: &CacheError) {
        metric!(
            counter("caches.remote.error") += 1,
            "backend" => remote.name(),
            "errdetails" => err.as_tag(),
        );
        if self.remote_healthy.swap(false, Ordering::Relaxed) {
            metric!(counter("caches.remote.unhealthy") += 1, "backend" => remote.name());
            tracing::warn!(
                backend = remote.name(),
                error = %err,
                "Remote cache unavailable, falling back to local cache"
            );
        }
    }

    fn mark_healthy(&self, remote: &dyn CacheStore) {
        if !self.remote_healthy.swap(true, Ordering::Relaxed) {
            metric!(counter("caches.remote.recovered") += 1, "backend" => remote.name());
            tracing::info!(backend = remote.name(), "Remote cache recovered");
        }
    }

    /// Pings the remote tier and updates its health accordingly.
    ///
    /// A reachable remote tier only counts as healthy once all diverged keys are reconciled.
    /// Returns the resulting health, or `false` without a remote tier.
    pub async fn probe_remote(&self) -> bool {
        let Some(remote) = &self.remote else {
            return false;
        };
        let result = match remote.ping().await {
            Ok(()) => self.reconcile(remote.as_ref()).await,
            Err(err) => Err(err),
        };
        match result {
            Ok(()) => self.mark_healthy(remote.as_ref()),
            Err(err) => self.mark_unhealthy(remote.as_ref(), &err),
        }
        self.is_remote_healthy()
    }

    /// Spawns a task calling [`probe_remote`](Self::probe_remote) every `interval`.
    ///
    /// Does nothing without a remote tier. The task ends once the cache is dropped.
    pub fn spawn_health_probe(
        self: &Arc<Self>,
        runtime: &tokio::runtime::Handle,
        interval: Duration,
    ) -> Option<tokio::task::JoinHandle<()>> {
        self.remote.as_ref()?;
        let cache = Arc::downgrade(self);
        Some(runtime.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(cache) = cache.upgrade() else {
                    break;
                };
                cache.probe_remote().await;
            }
        }))
    }

    /// Looks up the raw value stored under `key`.
    pub async fn get_raw(&self, key: &CacheKey) -> Option<Bytes> {
        metric!(counter("caches.access") += 1, "cache" => key.name().as_ref());

        let remote = self
            .healthy_remote()
            .filter(|_| !self.is_diverged(key));
        if let Some(remote) = remote {
            match remote.get(key).await {
                Ok(value) => {
                    self.record_lookup(key, "remote", value.is_some());
                    return value;
                }
                Err(err) => self.mark_unhealthy(remote.as_ref(), &err),
            }
        }

        match self.local.get(key).await {
            Ok(value) => {
                self.record_lookup(key, "local", value.is_some());
                value
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed reading local cache");
                None
            }
        }
    }

    fn record_lookup(&self, key: &CacheKey, tier: &str, hit: bool) {
        metric!(
            counter("caches.lookup") += 1,
            "cache" => key.name().as_ref(),
            "tier" => tier,
            "hit" => if hit { "true" } else { "false" },
        );
    }

    /// Stores a raw value. Never fails, remote errors only affect the remote health.
    pub async fn set_raw(&self, key: &CacheKey, value: Bytes, ttl: Duration) {
        if let Err(err) = self.local.set(key, value.clone(), ttl).await {
            tracing::error!(error = %err, "Failed writing local cache");
        }
        if let Some(remote) = &self.remote {
            let result = match self.healthy_remote() {
                Some(_) => Some(remote.set(key, value, ttl).await),
                None => None,
            };
            self.track_remote_write(remote.as_ref(), key, result);
        }
    }

    /// Looks up and decodes a JSON value. Undecodable entries count as misses.
    pub async fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let raw = self.get_raw(key).await?;
        match serde_json::from_slice(&raw) {
            Ok(value) => Some(value),
            Err(err) => {
                metric!(counter("caches.malformed") += 1, "cache" => key.name().as_ref());
                tracing::warn!(error = %err, key = %key, "Discarding malformed cache entry");
                None
            }
        }
    }

    /// Encodes `value` as JSON and stores it.
    pub async fn set<T: Serialize>(&self, key: &CacheKey, value: &T, ttl: Duration) {
        match serde_json::to_vec(value) {
            Ok(raw) => self.set_raw(key, raw.into(), ttl).await,
            Err(err) => {
                tracing::error!(error = %err, key = %key, "Failed to serialize cache entry");
            }
        }
    }

    /// Removes `key` from both tiers, best-effort.
    pub async fn delete(&self, key: &CacheKey) {
        let _ = self.local.delete(key).await;
        if let Some(remote) = &self.remote {
            let result = match self.healthy_remote() {
                Some(_) => Some(remote.delete(key).await),
                None => None,
            };
            self.track_remote_write(remote.as_ref(), key, result);
        }
    }

    /// Removes everything from both tiers, best-effort.
    pub async fn clear(&self) {
        let _ = self.local.clear().await;
        let Some(remote) = &self.remote else {
            return;
        };
        let reached = match self.healthy_remote() {
            Some(_) => match remote.clear().await {
                Ok(()) => true,
                Err(err) => {
                    self.mark_unhealthy(remote.as_ref(), &err);
                    false
                }
            },
            None => false,
        };
        let mut diverged = self.diverged();
        // a clear supersedes every earlier write
        diverged.keys.clear();
        diverged.cleared = !reached;
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            local: self.local.stats(),
            remote: self.remote.as_ref().map(|remote| RemoteStats {
                backend: remote.name(),
                healthy: self.remote_healthy.load(Ordering::Relaxed),
            }),
        }
    }
}
