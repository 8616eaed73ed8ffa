//! # Caching infrastructure
//!
//! Aggregating signals from upstream providers is slow and subject to rate limits, and content
//! analyses are expensive to compute. Both are therefore cached.
//!
//! ## Cache Layers
//!
//! - A local in-process tier ([`MemoryStore`]), size-bounded and always available.
//! - An optional remote tier ([`RedisStore`]) shared between instances.
//!
//! The [`TieredCache`] composes the two. A read goes to the remote tier first, unless the remote
//! tier is currently considered unhealthy, in which case only the local tier is used. A write
//! goes to the local tier and, best-effort, to the remote tier. Remote outages and recoveries
//! are logged once per transition. A background probe pings the remote tier to detect recovery.
//!
//! Keys written or deleted while the remote tier was unreachable are remembered, and the probe
//! replays their local state onto the remote tier before it serves reads again.
//!
//! Every entry carries a TTL, and stale entries are never returned. Values are JSON encoded.
//!
//! Request coalescing, so that concurrent misses for the same key only compute once, is done
//! one level up by the [`SingleFlightGate`](crate::aggregation::SingleFlightGate).
//!
//! ### Metrics
//!
//! Each of these is tagged with the `cache` name of the accessed key:
//!
//! - `caches.access`: All accesses.
//! - `caches.lookup`: Accesses per `tier` and whether they were a `hit`.
//! - `caches.malformed`: Entries that could not be decoded.
//!
//! The remote tier additionally reports `caches.remote.error`, `caches.remote.unhealthy`,
//! `caches.remote.recovered` and `caches.remote.reconciled`.

mod cache_error;
mod cache_key;
mod config;
mod memory;
mod redis_store;
mod store;
mod tiered;

#[cfg(test)]
mod tests;

pub use cache_error::CacheError;
pub use cache_key::{CacheKey, CacheKeyBuilder, CacheName};
pub use config::*;
pub use memory::{MemoryStats, MemoryStore};
pub use redis_store::RedisStore;
pub use store::CacheStore;
pub use tiered::{CacheStats, RemoteStats, TieredCache};
