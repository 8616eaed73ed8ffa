//! Adapters for the upstream signal providers.
//!
//! Every provider is wrapped in a [`ProviderAdapter`], which normalizes the provider's payloads
//! into [`RankedItem`]s and classifies its failures as [`ProviderError`]s.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use thiserror::Error;

use signalhub_sources::{ProviderConfig, ProviderId};

use crate::types::{ProviderErrorKind, ProviderResult, RankedItem, TrendQuery};
use crate::utils::futures::{m, measure};
use crate::utils::http::is_auth_failure;

mod fallback;
mod hackernews;
mod newsapi;
mod reddit;
mod youtube;

pub use fallback::FALLBACK_SOURCE;
pub use hackernews::HackerNewsAdapter;
pub use newsapi::NewsApiAdapter;
pub use reddit::RedditAdapter;
pub use youtube::YoutubeAdapter;

/// An error fetching items from a provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// The provider rejected our credentials.
    #[error("authentication failed: {0}")]
    Unauthenticated(String),
    /// The provider throttled us.
    #[error("rate limited")]
    RateLimited,
    /// The call did not finish within its timeout.
    #[error("timed out")]
    Timeout,
    /// The call was still running when the overall aggregation deadline elapsed.
    #[error("aggregation deadline exceeded")]
    DeadlineExceeded,
    /// Any other failure.
    #[error("{0}")]
    Unknown(String),
}

impl ProviderError {
    pub fn kind(&self) -> ProviderErrorKind {
        match self {
            Self::Unauthenticated(_) => ProviderErrorKind::Unauthenticated,
            Self::RateLimited => ProviderErrorKind::RateLimited,
            Self::Timeout => ProviderErrorKind::Timeout,
            Self::DeadlineExceeded => ProviderErrorKind::DeadlineExceeded,
            Self::Unknown(_) => ProviderErrorKind::Unknown,
        }
    }

    /// Classifies an unsuccessful HTTP status.
    pub fn from_status(status: StatusCode) -> Self {
        if is_auth_failure(status) {
            Self::Unauthenticated(status.to_string())
        } else if status == StatusCode::TOO_MANY_REQUESTS {
            Self::RateLimited
        } else {
            Self::Unknown(format!("unexpected status {status}"))
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if let Some(status) = err.status() {
            Self::from_status(status)
        } else if err.is_decode() {
            Self::Unknown(format!("unexpected payload: {err}"))
        } else {
            Self::Unknown(err.to_string())
        }
    }
}

impl From<url::ParseError> for ProviderError {
    fn from(err: url::ParseError) -> Self {
        Self::Unknown(format!("invalid provider url: {err}"))
    }
}

/// Turns unsuccessful responses into errors.
pub(crate) fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(ProviderError::from_status(status))
    }
}

/// A uniform interface to one upstream provider.
#[async_trait]
pub trait ProviderAdapter: Send + Sync + fmt::Debug {
    /// The stable identifier of this provider.
    fn id(&self) -> &ProviderId;

    /// The provider type, as used in configuration.
    fn type_name(&self) -> &'static str;

    /// Whether all credentials required to call the provider are present.
    ///
    /// Unconfigured providers are never invoked, they contribute their
    /// [`fallback`](Self::fallback) items instead.
    fn is_configured(&self) -> bool;

    /// Fetches and normalizes items. Scores are provider-local.
    async fn fetch_items(&self, query: &TrendQuery) -> Result<Vec<RankedItem>, ProviderError>;

    /// A small set of clearly labeled placeholder items.
    fn fallback(&self, query: &TrendQuery) -> Vec<RankedItem>;

    /// Fetches items, time-boxed by `timeout`.
    ///
    /// A call that does not finish in time is dropped, which cancels the underlying request,
    /// and is reported as [`ProviderErrorKind::Timeout`]. This never fails, errors are part of
    /// the returned [`ProviderResult`].
    async fn fetch(&self, query: &TrendQuery, timeout: Duration) -> ProviderResult {
        let start = Instant::now();
        let request = tokio::time::timeout(timeout, self.fetch_items(query));
        let result = measure(self.id().as_str(), m::timed_result, request).await;
        let latency = start.elapsed();

        metric!(
            timer("providers.fetch.duration") = latency,
            "provider" => self.type_name(),
        );

        let result = match result {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout),
        };

        match result {
            Ok(items) => {
                metric!(
                    counter("providers.fetch") += 1,
                    "provider" => self.type_name(),
                    "status" => "ok",
                );
                tracing::debug!(provider = %self.id(), items = items.len(), "Provider fetch succeeded");
                ProviderResult::success(self.id().clone(), items, latency)
            }
            Err(err) => {
                let kind = err.kind();
                metric!(
                    counter("providers.fetch") += 1,
                    "provider" => self.type_name(),
                    "status" => "error",
                    "errdetails" => kind.as_ref(),
                );
                tracing::warn!(provider = %self.id(), error = %err, "Provider fetch failed");
                ProviderResult::failure(self.id().clone(), kind, latency)
            }
        }
    }
}

/// Creates the adapters for the configured providers, preserving their order.
pub fn create_adapters(
    configs: &[ProviderConfig],
    client: &reqwest::Client,
) -> Vec<Arc<dyn ProviderAdapter>> {
    configs
        .iter()
        .map(|config| -> Arc<dyn ProviderAdapter> {
            match config {
                ProviderConfig::Hackernews(cfg) => {
                    Arc::new(HackerNewsAdapter::new(cfg.clone(), client.clone()))
                }
                ProviderConfig::Newsapi(cfg) => {
                    Arc::new(NewsApiAdapter::new(cfg.clone(), client.clone()))
                }
                ProviderConfig::Reddit(cfg) => {
                    Arc::new(RedditAdapter::new(cfg.clone(), client.clone()))
                }
                ProviderConfig::Youtube(cfg) => {
                    Arc::new(YoutubeAdapter::new(cfg.clone(), client.clone()))
                }
            }
        })
        .collect()
}

/// Availability of a provider, as reported by a health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderStatus {
    /// The provider answered successfully.
    Available,
    /// Credentials are missing, the provider serves placeholders.
    NotConfigured,
    /// The provider is configured but the check failed.
    Error,
}

/// The health of one registered provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderHealth {
    pub id: ProviderId,
    #[serde(rename = "type")]
    pub ty: &'static str,
    pub status: ProviderStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ProviderErrorKind>,
    #[serde(with = "humantime_serde")]
    pub latency: Duration,
}

impl ProviderHealth {
    /// Checks the provider by fetching its trending items.
    pub async fn check(adapter: &dyn ProviderAdapter, timeout: Duration) -> Self {
        let id = adapter.id().clone();
        let ty = adapter.type_name();
        if !adapter.is_configured() {
            return Self {
                id,
                ty,
                status: ProviderStatus::NotConfigured,
                error: None,
                latency: Duration::ZERO,
            };
        }
        let result = adapter.fetch(&TrendQuery::trending(), timeout).await;
        Self {
            id,
            ty,
            status: if result.succeeded {
                ProviderStatus::Available
            } else {
                ProviderStatus::Error
            },
            error: result.error_kind,
            latency: result.latency,
        }
    }
}
