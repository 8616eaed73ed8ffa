//! Concurrent fan-out to providers and merging of their results.
//!
//! The [`ResilientAggregator`] invokes all registered providers in parallel, bounded by a
//! per-provider timeout and an overall deadline. Provider failures never fail an aggregation,
//! they are reported within the [`AggregateResult`] instead.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use thiserror::Error;
use tokio::time::Instant;

use crate::config::AggregationConfig;
use crate::providers::ProviderAdapter;
use crate::types::{
    AggregateResult, ProviderErrorKind, ProviderFailure, ProviderResult, RankedItem, TrendQuery,
};
use crate::utils::futures::CancelOnDrop;

mod rank;
mod single_flight;

pub use rank::{MAX_SCORE, rank};
pub use single_flight::SingleFlightGate;

/// Errors that fail an aggregation as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AggregationError {
    /// There is no provider to aggregate from.
    #[error("no providers configured")]
    NoProvidersConfigured,
    /// The aggregation was requested with invalid options.
    #[error("invalid aggregation options: {0}")]
    PreconditionViolation(String),
}

/// Bounds of a single aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregateOptions {
    /// Time box of every individual provider call.
    pub per_provider_timeout: Duration,
    /// Providers still running after this are abandoned.
    pub overall_deadline: Duration,
    /// Upper bound of returned items.
    pub max_results: usize,
    /// If set, at most this many items of every provider are returned.
    pub per_provider_limit: Option<usize>,
}

impl AggregateOptions {
    /// Options from the configured timeouts with the given result bounds.
    pub fn from_config(
        config: &AggregationConfig,
        max_results: usize,
        per_provider_limit: Option<usize>,
    ) -> Self {
        Self {
            per_provider_timeout: config.per_provider_timeout,
            overall_deadline: config.overall_deadline,
            max_results,
            per_provider_limit,
        }
    }

    fn validate(&self) -> Result<(), AggregationError> {
        if self.max_results == 0 {
            return Err(AggregationError::PreconditionViolation(
                "max_results must be at least 1".into(),
            ));
        }
        if self.per_provider_limit == Some(0) {
            return Err(AggregationError::PreconditionViolation(
                "per_provider_limit must be at least 1".into(),
            ));
        }
        if self.per_provider_timeout.is_zero() || self.overall_deadline.is_zero() {
            return Err(AggregationError::PreconditionViolation(
                "timeouts must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Fans out a query to providers and merges their items into one ranked list.
#[derive(Clone, Debug)]
pub struct ResilientAggregator {
    runtime: tokio::runtime::Handle,
}

impl ResilientAggregator {
    /// Creates an aggregator spawning provider calls onto `runtime`.
    pub fn new(runtime: tokio::runtime::Handle) -> Self {
        Self { runtime }
    }

    /// Aggregates `query` over `providers`.
    ///
    /// Configured providers are called concurrently, unconfigured ones contribute their
    /// placeholders. The items are deduplicated in registration order, ranked, and bounded as
    /// described by `options`. This only fails for invalid inputs.
    #[tracing::instrument(skip_all, fields(query = %query, providers = providers.len()))]
    pub async fn aggregate(
        &self,
        providers: &[Arc<dyn ProviderAdapter>],
        query: &TrendQuery,
        options: &AggregateOptions,
    ) -> Result<AggregateResult, AggregationError> {
        if providers.is_empty() {
            return Err(AggregationError::NoProvidersConfigured);
        }
        options.validate()?;

        let outcomes = self.collect(providers, query, options).await;
        let result = merge(outcomes, options);

        metric!(
            counter("aggregation.results") += 1,
            "partial" => if result.partial { "true" } else { "false" },
        );
        metric!(histogram("aggregation.items") = result.items.len() as u64);
        metric!(
            histogram("aggregation.failed_providers") = result.failed_providers.len() as u64
        );
        tracing::debug!(
            items = result.items.len(),
            succeeded = result.succeeded_providers.len(),
            failed = result.failed_providers.len(),
            fallback = result.fallback_providers.len(),
            "Aggregation finished"
        );

        Ok(result)
    }

    /// Runs all providers and returns their outcomes in registration order.
    async fn collect(
        &self,
        providers: &[Arc<dyn ProviderAdapter>],
        query: &TrendQuery,
        options: &AggregateOptions,
    ) -> Vec<ProviderResult> {
        let start = Instant::now();
        let deadline = start + options.overall_deadline;

        let mut outcomes: Vec<Option<ProviderResult>> = vec![None; providers.len()];
        let mut pending = FuturesUnordered::new();

        for (index, provider) in providers.iter().enumerate() {
            if !provider.is_configured() {
                tracing::trace!(provider = %provider.id(), "Using fallback of unconfigured provider");
                outcomes[index] = Some(ProviderResult::fallback(
                    provider.id().clone(),
                    provider.fallback(query),
                ));
                continue;
            }

            let task = {
                let provider = Arc::clone(provider);
                let query = query.clone();
                let timeout = options.per_provider_timeout;
                CancelOnDrop::new(
                    self.runtime
                        .spawn(async move { provider.fetch(&query, timeout).await }),
                )
            };
            pending.push(async move { (index, task.await) });
        }

        loop {
            match tokio::time::timeout_at(deadline, pending.next()).await {
                Ok(Some((index, Ok(result)))) => outcomes[index] = Some(result),
                Ok(Some((index, Err(error)))) => {
                    let provider = &providers[index];
                    tracing::error!(
                        provider = %provider.id(),
                        error = &error as &dyn std::error::Error,
                        "Provider task failed"
                    );
                    outcomes[index] = Some(ProviderResult::failure(
                        provider.id().clone(),
                        ProviderErrorKind::Unknown,
                        start.elapsed(),
                    ));
                }
                Ok(None) => break,
                Err(_) => {
                    tracing::warn!(
                        outstanding = pending.len(),
                        "Aggregation deadline exceeded, abandoning providers"
                    );
                    break;
                }
            }
        }
        // aborts the tasks of providers which are still running
        drop(pending);

        providers
            .iter()
            .zip(outcomes)
            .map(|(provider, outcome)| {
                outcome.unwrap_or_else(|| {
                    metric!(
                        counter("providers.fetch") += 1,
                        "provider" => provider.type_name(),
                        "status" => "error",
                        "errdetails" => ProviderErrorKind::DeadlineExceeded.as_ref(),
                    );
                    ProviderResult::failure(
                        provider.id().clone(),
                        ProviderErrorKind::DeadlineExceeded,
                        start.elapsed(),
                    )
                })
            })
            .collect()
    }
}

/// Merges provider outcomes, given in registration order, into the final result.
fn merge(outcomes: Vec<ProviderResult>, options: &AggregateOptions) -> AggregateResult {
    let mut succeeded_providers = vec![];
    let mut failed_providers = vec![];
    let mut fallback_providers = vec![];
    let mut candidates: Vec<RankedItem> = vec![];

    for outcome in outcomes {
        if outcome.fallback {
            fallback_providers.push(outcome.provider_id);
            candidates.extend(outcome.items.into_iter().map(|mut item| {
                item.fallback = true;
                item
            }));
        } else if outcome.succeeded {
            succeeded_providers.push(outcome.provider_id);
            candidates.extend(outcome.items);
        } else {
            failed_providers.push(ProviderFailure {
                provider: outcome.provider_id,
                kind: outcome.error_kind.unwrap_or(ProviderErrorKind::Unknown),
            });
        }
    }

    let items = rank(
        dedup(candidates),
        options.max_results,
        options.per_provider_limit,
    );
    let partial = !failed_providers.is_empty() || items.is_empty();

    AggregateResult {
        items,
        produced_at: Utc::now(),
        partial,
        succeeded_providers,
        failed_providers,
        fallback_providers,
    }
}

/// Drops repeated `(provider, id)` pairs, keeping the first, and qualifies the ids.
///
/// Qualified ids have the form `<provider>:<id>`, which makes them unique across providers.
fn dedup(items: Vec<RankedItem>) -> Vec<RankedItem> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert((item.provider.clone(), item.id.clone())))
        .map(|mut item| {
            item.id = format!("{}:{}", item.provider, item.id);
            item
        })
        .collect()
}

#[cfg(test)]
mod tests;
