use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use super::{CacheError, CacheKey};

/// A key/value store with per-entry TTL.
///
/// Every tier of the [`TieredCache`](super::TieredCache) implements this, and all of them share
/// the same contract:
///
/// - `get` returns `Ok(None)` for keys that were never set or whose TTL has elapsed. Expiry is
///   checked at read time, a stale entry is never returned.
/// - `set` replaces the entry as a whole.
/// - Failing to reach the backend is [`CacheError::Unavailable`], exceeding the operation
///   timeout is [`CacheError::Timeout`].
#[async_trait]
pub trait CacheStore: Send + Sync + fmt::Debug {
    /// The backend name used in logs and metrics.
    fn name(&self) -> &'static str;

    /// Looks up the raw value of `key`.
    async fn get(&self, key: &CacheKey) -> Result<Option<Bytes>, CacheError>;

    /// Stores `value` under `key` for `ttl`.
    async fn set(&self, key: &CacheKey, value: Bytes, ttl: Duration) -> Result<(), CacheError>;

    /// Removes `key`, if present.
    async fn delete(&self, key: &CacheKey) -> Result<(), CacheError>;

    /// Removes all entries.
    async fn clear(&self) -> Result<(), CacheError>;

    /// A lightweight check whether the backend is reachable.
    async fn ping(&self) -> Result<(), CacheError>;
}
