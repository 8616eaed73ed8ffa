//! The resilient aggregation and caching core of signalhub.
//!
//! The building blocks are layered bottom up:
//!
//! - [`caching`]: key/value stores with TTL and the [`TieredCache`](caching::TieredCache)
//!   combining a shared remote tier with an always-available local tier.
//! - [`providers`]: adapters for the upstream signal providers.
//! - [`aggregation`]: concurrent fan-out to providers, ranking, and request coalescing.
//! - [`freshness`]: the per-session policy deciding when cached results may be reused.
//! - [`services`]: the services wiring all of the above together.

#[macro_use]
pub mod metrics;

pub mod aggregation;
pub mod caching;
pub mod config;
pub mod freshness;
pub mod logging;
pub mod providers;
pub mod services;
pub mod types;
pub mod utils;
