//! Data types flowing from the providers to the callers.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use signalhub_sources::ProviderId;

/// What to ask the providers for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrendQuery {
    /// Search terms. Without them, providers return what is currently trending.
    pub search: Option<String>,
}

impl TrendQuery {
    /// A query for whatever is trending right now.
    pub fn trending() -> Self {
        Self::default()
    }

    /// A query searching for `terms`.
    pub fn search(terms: impl Into<String>) -> Self {
        Self {
            search: Some(terms.into()),
        }
    }
}

impl fmt::Display for TrendQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.search {
            Some(terms) => write!(f, "search:{terms}"),
            None => f.write_str("trending"),
        }
    }
}

/// One piece of content from a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedItem {
    /// The identifier. Provider-local when fetched, `<provider>:<id>` after merging.
    pub id: String,
    /// The provider this item came from.
    pub provider: ProviderId,
    pub title: String,
    pub summary: String,
    pub url: Option<String>,
    /// Provider-local popularity until normalized, `0..=100` afterwards.
    pub score: f64,
    /// Human-readable origin, e.g. a subreddit or news outlet.
    pub source: String,
    pub fetched_at: DateTime<Utc>,
    /// Raw engagement count, such as comments, views or upvotes.
    pub engagement: u64,
    pub keywords: Vec<String>,
    /// Marks placeholder items of providers that could not be invoked.
    #[serde(default)]
    pub fallback: bool,
}

/// Why a provider did not deliver items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    /// Credentials were rejected.
    Unauthenticated,
    /// The provider throttled us.
    RateLimited,
    /// The provider did not answer within the per-provider timeout.
    Timeout,
    /// The provider was still running when the overall deadline elapsed.
    DeadlineExceeded,
    /// Anything else, like connection errors, 5xx responses or unexpected payloads.
    Unknown,
}

impl AsRef<str> for ProviderErrorKind {
    fn as_ref(&self) -> &str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::RateLimited => "rate_limited",
            Self::Timeout => "timeout",
            Self::DeadlineExceeded => "deadline_exceeded",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_ref())
    }
}

/// The outcome of one provider within one aggregation attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderResult {
    pub provider_id: ProviderId,
    pub items: Vec<RankedItem>,
    pub succeeded: bool,
    pub error_kind: Option<ProviderErrorKind>,
    pub latency: Duration,
    /// Whether `items` are placeholders because the provider is not configured.
    pub fallback: bool,
}

impl ProviderResult {
    pub fn success(provider_id: ProviderId, items: Vec<RankedItem>, latency: Duration) -> Self {
        Self {
            provider_id,
            items,
            succeeded: true,
            error_kind: None,
            latency,
            fallback: false,
        }
    }

    pub fn failure(provider_id: ProviderId, kind: ProviderErrorKind, latency: Duration) -> Self {
        Self {
            provider_id,
            items: vec![],
            succeeded: false,
            error_kind: Some(kind),
            latency,
            fallback: false,
        }
    }

    pub fn fallback(provider_id: ProviderId, items: Vec<RankedItem>) -> Self {
        Self {
            provider_id,
            items,
            succeeded: false,
            error_kind: None,
            latency: Duration::ZERO,
            fallback: true,
        }
    }
}

/// A provider that failed during an aggregation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderFailure {
    pub provider: ProviderId,
    pub kind: ProviderErrorKind,
}

/// The merged, ranked and bounded result of one aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateResult {
    /// Sorted by normalized score, descending.
    pub items: Vec<RankedItem>,
    pub produced_at: DateTime<Utc>,
    /// Set when any provider failed, or when no item was produced at all.
    pub partial: bool,
    pub succeeded_providers: Vec<ProviderId>,
    pub failed_providers: Vec<ProviderFailure>,
    /// Providers that contributed placeholder items because they are not configured.
    pub fallback_providers: Vec<ProviderId>,
}
