use std::time::Duration;

use thiserror::Error;

/// An error that happens when talking to one of the cache tiers.
///
/// A cache miss is never an error. These errors are recovered by the
/// [`TieredCache`](super::TieredCache) and never escape it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// The backend could not be reached, or the connection was lost.
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
    /// The backend did not answer within the configured operation timeout.
    #[error("cache operation timed out after {0:?}")]
    Timeout(Duration),
    /// The backend answered, but the entry or response could not be understood.
    #[error("malformed cache entry: {0}")]
    Malformed(String),
}

impl CacheError {
    /// A short, stable name for metrics tags.
    pub fn as_tag(&self) -> &'static str {
        match self {
            Self::Unavailable(_) => "unavailable",
            Self::Timeout(_) => "timeout",
            Self::Malformed(_) => "malformed",
        }
    }
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        match err.kind() {
            redis::ErrorKind::TypeError => Self::Malformed(err.to_string()),
            _ => Self::Unavailable(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed(err.to_string())
    }
}
