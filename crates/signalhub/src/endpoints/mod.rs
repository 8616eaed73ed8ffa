use axum::Router;
use axum::routing::{delete, get, post};
use sentry::integrations::tower::{NewSentryLayer, SentryHttpLayer};
use signalhub_service::metric;
use signalhub_service::services::SharedServices;
use tower::ServiceBuilder;

mod cache;
mod error;
mod metrics;
mod trending;

pub use error::ResponseError;
use metrics::MetricsLayer;

use cache::cache_stats;
use trending::{logout, trending_all, trending_provider, trending_providers, trending_refresh, trending_search};

pub async fn healthcheck() -> &'static str {
    metric!(counter("healthcheck") += 1);
    "ok"
}

pub fn create_app(services: SharedServices) -> Router {
    // The layers here go "top to bottom" according to the reading order here.
    let layer = ServiceBuilder::new()
        .layer(NewSentryLayer::new_from_top())
        .layer(SentryHttpLayer::new().enable_transaction())
        .layer(MetricsLayer);
    Router::new()
        .route("/trending/all", get(trending_all))
        .route("/trending/refresh", post(trending_refresh))
        .route("/trending/search", get(trending_search))
        .route("/trending/providers", get(trending_providers))
        .route("/trending/session", delete(logout))
        .route("/trending/:provider", get(trending_provider))
        .route("/cache/stats", get(cache_stats))
        .with_state(services)
        .layer(layer)
        // the healthcheck is last, as it will bypass all the middlewares
        .route("/healthcheck", get(healthcheck))
}
