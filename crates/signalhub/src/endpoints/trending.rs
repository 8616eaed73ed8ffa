use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use signalhub_service::providers::ProviderHealth;
use signalhub_service::services::SharedServices;

use super::ResponseError;

/// The request header identifying a session.
pub const SESSION_HEADER: &str = "x-session-id";

const MAX_SESSION_LEN: usize = 128;

/// The session of the request, if it carries a usable one.
fn session_id(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(SESSION_HEADER)?.to_str().ok()?.trim();
    if value.is_empty() || value.len() > MAX_SESSION_LEN {
        return None;
    }
    Some(value.to_owned())
}

/// The session of the request, or a new one.
///
/// New sessions are announced to the client in the response header.
fn session_or_new(headers: &HeaderMap) -> String {
    session_id(headers).unwrap_or_else(|| {
        let session = uuid::Uuid::new_v4().to_string();
        tracing::trace!(%session, "Starting new session");
        session
    })
}

fn with_session(session: String, body: impl IntoResponse) -> Response {
    ([(SESSION_HEADER, session)], body).into_response()
}

pub async fn trending_all(
    State(services): State<SharedServices>,
    headers: HeaderMap,
) -> Result<Response, ResponseError> {
    let session = session_or_new(&headers);
    let response = services.trending.all(&session, false).await?;
    Ok(with_session(session, Json(response)))
}

pub async fn trending_refresh(
    State(services): State<SharedServices>,
    headers: HeaderMap,
) -> Result<Response, ResponseError> {
    let session = session_or_new(&headers);
    let response = services.trending.refresh(&session).await?;
    Ok(with_session(session, Json(response)))
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    q: String,
}

pub async fn trending_search(
    State(services): State<SharedServices>,
    Query(params): Query<SearchParams>,
) -> Result<Response, ResponseError> {
    let response = services.trending.search(&params.q).await?;
    Ok(Json(response).into_response())
}

pub async fn trending_provider(
    State(services): State<SharedServices>,
    Path(provider): Path<String>,
) -> Result<Response, ResponseError> {
    match services.trending.provider(&provider).await? {
        Some(response) => Ok(Json(response).into_response()),
        None => Err((StatusCode::NOT_FOUND, "unknown provider").into()),
    }
}

#[derive(Debug, Serialize)]
pub struct ProvidersReport {
    providers: Vec<ProviderHealth>,
}

pub async fn trending_providers(State(services): State<SharedServices>) -> Json<ProvidersReport> {
    Json(ProvidersReport {
        providers: services.trending.health().await,
    })
}

#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    /// Whether the session was known.
    found: bool,
}

pub async fn logout(
    State(services): State<SharedServices>,
    headers: HeaderMap,
) -> Result<Json<LogoutResponse>, ResponseError> {
    let session = session_id(&headers)
        .ok_or((StatusCode::BAD_REQUEST, "missing session header"))?;
    Ok(Json(LogoutResponse {
        found: services.trending.logout(&session),
    }))
}
