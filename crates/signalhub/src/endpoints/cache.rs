use axum::Json;
use axum::extract::State;
use signalhub_service::caching::CacheStats;
use signalhub_service::services::SharedServices;

pub async fn cache_stats(State(services): State<SharedServices>) -> Json<CacheStats> {
    Json(services.cache.stats())
}
