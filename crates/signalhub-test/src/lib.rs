//! Helpers for testing the web server and service.
//!
//! When writing tests, keep the following points in mind:
//!
//!  - In every test, call [`setup`]. This will set up the logger so that all console output
//!    is captured by the test runner.
//!
//!  - When using [`ProviderServer`], make sure that the server is held until all requests to
//!    it have been made. The server stops serving once dropped, and requests to it will fail.
//!    Assign it to a variable: `let server = ProviderServer::new();`.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::extract::{self, Query, Request};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::fmt;
use url::Url;

use signalhub_sources::{
    CommonProviderConfig, HackerNewsProviderConfig, NewsApiProviderConfig, ProviderConfig,
    ProviderId, RedditProviderConfig, Secret, YoutubeProviderConfig,
};

pub use tempfile::TempDir;

/// The API key accepted by the mock NewsAPI and YouTube endpoints.
pub const VALID_API_KEY: &str = "valid-api-key";
/// The YouTube API key for which the mock reports an exhausted quota.
pub const EXHAUSTED_API_KEY: &str = "exhausted-api-key";
/// The Reddit client id accepted by the mock token endpoint.
pub const VALID_CLIENT_ID: &str = "valid-client-id";

const ACCESS_TOKEN: &str = "mock-access-token";

/// Setup the test environment.
///
///  - Initializes logs: The logger captures logs from the signalhub crates and the requests
///    received by the mock provider server. It mutes all other logs (such as hyper or reqwest).
pub fn setup() {
    fmt()
        .with_env_filter(EnvFilter::new(
            "signalhub=trace,signalhub_service=trace,signalhub_sources=trace,tower_http=debug",
        ))
        .with_target(false)
        .pretty()
        .with_test_writer()
        .try_init()
        .ok();
}

/// Creates a temporary directory.
///
/// The directory is deleted when the [`TempDir`] instance is dropped. Use it as a guard to
/// automatically clean up after tests.
pub fn tempdir() -> TempDir {
    TempDir::new().unwrap()
}

/// A test server that binds to a random port and serves a web app.
///
/// This server requires a `tokio` runtime and is supposed to be run in a `tokio::test`. It
/// automatically stops serving when dropped.
#[derive(Debug)]
pub struct Server {
    pub handle: tokio::task::JoinHandle<()>,
    pub socket: SocketAddr,
}

impl Server {
    /// Serves `router` on an ephemeral port of the loopback interface.
    pub fn with_router(router: Router) -> Self {
        let listener = std::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).unwrap();
        listener.set_nonblocking(true).unwrap();
        let socket = listener.local_addr().unwrap();
        let listener = tokio::net::TcpListener::from_std(listener).unwrap();

        let handle = tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Self { handle, socket }
    }

    /// Returns the socket address that this server listens on.
    pub fn addr(&self) -> SocketAddr {
        self.socket
    }

    /// Returns the port that this server listens on.
    pub fn port(&self) -> u16 {
        self.addr().port()
    }

    /// Returns a full URL pointing to the given path.
    ///
    /// This URL uses `localhost` as hostname.
    pub fn url(&self, path: &str) -> Url {
        let path = path.trim_start_matches('/');
        format!("http://localhost:{}/{}", self.port(), path)
            .parse()
            .unwrap()
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// How a group of mock provider routes behaves.
///
/// Every provider is mounted below each of these path prefixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// Serves canned payloads.
    Ok,
    /// Waits for a long time before answering.
    Slow,
    /// Answers `429 Too Many Requests`.
    RateLimited,
    /// Answers `500 Internal Server Error`.
    Broken,
}

impl Behavior {
    fn prefix(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Slow => "slow",
            Self::RateLimited => "ratelimited",
            Self::Broken => "broken",
        }
    }

    async fn apply(self) -> Option<Response> {
        match self {
            Self::Ok => None,
            Self::Slow => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                None
            }
            Self::RateLimited => Some(StatusCode::TOO_MANY_REQUESTS.into_response()),
            Self::Broken => Some(StatusCode::INTERNAL_SERVER_ERROR.into_response()),
        }
    }
}

fn hackernews_payload(query: &BTreeMap<String, String>) -> Value {
    let prefix = match query.get("query") {
        Some(terms) => format!("{terms}: "),
        None => String::new(),
    };
    json!({
        "hits": [
            {"objectID": "101", "title": format!("{prefix}Show HN: A tiny cache"), "url": "https://example.com/cache", "author": "alice", "points": 300, "num_comments": 120},
            {"objectID": "102", "title": format!("{prefix}Ask HN: Favorite crates?"), "url": null, "author": "bob", "points": 150, "num_comments": 80},
            {"objectID": "103", "title": format!("{prefix}Rust in production"), "url": "https://example.com/rust", "author": "carol", "points": 50, "num_comments": 5},
            {"objectID": "104", "title": null, "url": null, "author": "dave", "points": 10, "num_comments": 0}
        ]
    })
}

fn newsapi_payload() -> Value {
    json!({
        "status": "ok",
        "totalResults": 2,
        "articles": [
            {"source": {"id": null, "name": "Business Daily"}, "title": "Markets rally", "description": "Stocks are up.", "url": "https://news.example.com/rally", "publishedAt": "2024-05-01T10:00:00Z"},
            {"source": {"id": null, "name": "Tech Wire"}, "title": "Startup raises round", "description": null, "url": "https://news.example.com/round", "publishedAt": "2024-05-01T09:00:00Z"}
        ]
    })
}

fn reddit_payload(subreddit: &str) -> Value {
    json!({
        "kind": "Listing",
        "data": {
            "children": [
                {"kind": "t3", "data": {"id": format!("{subreddit}1"), "title": format!("Weekly thread in r/{subreddit}"), "selftext": "", "permalink": format!("/r/{subreddit}/comments/{subreddit}1/"), "subreddit": subreddit, "score": 5, "num_comments": 3, "created_utc": 1714550400.0, "stickied": true}},
                {"kind": "t3", "data": {"id": format!("{subreddit}2"), "title": format!("Big news in r/{subreddit}"), "selftext": "Details inside", "permalink": format!("/r/{subreddit}/comments/{subreddit}2/"), "subreddit": subreddit, "score": 900, "num_comments": 200, "created_utc": 1714550400.0, "stickied": false}},
                {"kind": "t3", "data": {"id": format!("{subreddit}3"), "title": format!("Question for r/{subreddit}"), "selftext": "", "permalink": format!("/r/{subreddit}/comments/{subreddit}3/"), "subreddit": subreddit, "score": 40, "num_comments": 12, "created_utc": 1714550400.0, "stickied": false}}
            ]
        }
    })
}

fn youtube_payload(search: bool) -> Value {
    if search {
        json!({
            "items": [
                {"id": {"kind": "youtube#video", "videoId": "s1"}, "snippet": {"title": "Search hit one", "description": "", "channelTitle": "Channel A"}},
                {"id": {"kind": "youtube#video", "videoId": "s2"}, "snippet": {"title": "Search hit two", "description": "", "channelTitle": "Channel B"}}
            ]
        })
    } else {
        json!({
            "items": [
                {"id": "v1", "snippet": {"title": "Viral video", "description": "Watch this", "channelTitle": "Channel A"}, "statistics": {"viewCount": "1000000", "likeCount": "5000", "commentCount": "300"}},
                {"id": "v2", "snippet": {"title": "Quiet video", "description": "", "channelTitle": "Channel B"}, "statistics": {"viewCount": "1000", "likeCount": "10", "commentCount": "1"}}
            ]
        })
    }
}

fn quota_exceeded() -> Response {
    let body = json!({"error": {"code": 403, "errors": [{"reason": "quotaExceeded"}]}});
    (StatusCode::FORBIDDEN, axum::Json(body)).into_response()
}

fn provider_routes(behavior: Behavior) -> Router {
    Router::new()
        .route(
            "/hackernews/search",
            get(move |Query(query): Query<BTreeMap<String, String>>| async move {
                if let Some(response) = behavior.apply().await {
                    return response;
                }
                axum::Json(hackernews_payload(&query)).into_response()
            }),
        )
        .route(
            "/newsapi/*endpoint",
            get(move |headers: HeaderMap| async move {
                if let Some(response) = behavior.apply().await {
                    return response;
                }
                let key = headers.get("x-api-key").and_then(|v| v.to_str().ok());
                if key != Some(VALID_API_KEY) {
                    let body = json!({"status": "error", "code": "apiKeyInvalid"});
                    return (StatusCode::UNAUTHORIZED, axum::Json(body)).into_response();
                }
                axum::Json(newsapi_payload()).into_response()
            }),
        )
        .route(
            "/reddit/auth",
            post(move |headers: HeaderMap| async move {
                // `Basic base64(valid-client-id:...)` starts with the encoded client id
                let authorized = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .is_some_and(|v| v.starts_with("Basic dmFsaWQtY2xpZW50LWlk"));
                if !authorized {
                    return StatusCode::UNAUTHORIZED.into_response();
                }
                axum::Json(json!({"access_token": ACCESS_TOKEN, "token_type": "bearer", "expires_in": 3600}))
                    .into_response()
            }),
        )
        .route(
            "/reddit/api/r/:subreddit/hot",
            get(
                move |extract::Path(subreddit): extract::Path<String>, headers: HeaderMap| async move {
                    if let Some(response) = behavior.apply().await {
                        return response;
                    }
                    if !has_bearer(&headers) {
                        return StatusCode::UNAUTHORIZED.into_response();
                    }
                    axum::Json(reddit_payload(&subreddit)).into_response()
                },
            ),
        )
        .route(
            "/reddit/api/search",
            get(move |headers: HeaderMap| async move {
                if let Some(response) = behavior.apply().await {
                    return response;
                }
                if !has_bearer(&headers) {
                    return StatusCode::UNAUTHORIZED.into_response();
                }
                axum::Json(reddit_payload("search")).into_response()
            }),
        )
        .route(
            "/youtube/:endpoint",
            get(
                move |extract::Path(endpoint): extract::Path<String>,
                      Query(query): Query<BTreeMap<String, String>>| async move {
                    if let Some(response) = behavior.apply().await {
                        return response;
                    }
                    match query.get("key").map(String::as_str) {
                        Some(VALID_API_KEY) => {}
                        Some(EXHAUSTED_API_KEY) => return quota_exceeded(),
                        _ => return StatusCode::BAD_REQUEST.into_response(),
                    }
                    axum::Json(youtube_payload(endpoint == "search")).into_response()
                },
            ),
        )
}

fn has_bearer(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {ACCESS_TOKEN}"))
}

/// A mock server speaking the APIs of all supported providers.
///
/// Every request is counted by its path, see [`hits`](Self::hits).
#[derive(Debug)]
pub struct ProviderServer {
    server: Server,
    hits: Arc<Mutex<BTreeMap<String, usize>>>,
}

impl ProviderServer {
    pub fn new() -> Self {
        let hits = Arc::new(Mutex::new(BTreeMap::new()));

        let hitcounter = {
            let hits = hits.clone();
            move |request: Request, next: Next| {
                let hits = hits.clone();
                async move {
                    {
                        let mut hits = hits.lock().unwrap();
                        *hits.entry(request.uri().path().to_owned()).or_default() += 1;
                    }
                    next.run(request).await
                }
            }
        };

        let mut router = Router::new();
        for behavior in [
            Behavior::Ok,
            Behavior::Slow,
            Behavior::RateLimited,
            Behavior::Broken,
        ] {
            router = router.nest(&format!("/{}", behavior.prefix()), provider_routes(behavior));
        }
        let router = router
            .layer(middleware::from_fn(hitcounter))
            .layer(TraceLayer::new_for_http());

        Self {
            server: Server::with_router(router),
            hits,
        }
    }

    /// The base URL of a provider with the given behavior.
    pub fn provider_url(&self, behavior: Behavior, provider: &str) -> Url {
        self.server
            .url(&format!("{}/{provider}/", behavior.prefix()))
    }

    /// Number of requests made to `path`, e.g. `/ok/hackernews/search`.
    pub fn hits(&self, path: &str) -> usize {
        self.hits.lock().unwrap().get(path).copied().unwrap_or(0)
    }

    /// Total number of requests made to this server.
    pub fn total_hits(&self) -> usize {
        self.hits.lock().unwrap().values().sum()
    }

    /// A Hacker News provider.
    pub fn hackernews(&self, id: &str, behavior: Behavior) -> ProviderConfig {
        ProviderConfig::Hackernews(Arc::new(HackerNewsProviderConfig {
            id: ProviderId::new(id),
            url: self.provider_url(behavior, "hackernews"),
            common: common(),
        }))
    }

    /// A NewsAPI provider. Only [`VALID_API_KEY`] is accepted.
    pub fn newsapi(&self, id: &str, behavior: Behavior, api_key: Option<&str>) -> ProviderConfig {
        ProviderConfig::Newsapi(Arc::new(NewsApiProviderConfig {
            id: ProviderId::new(id),
            url: self.provider_url(behavior, "newsapi"),
            api_key: Some(Secret(api_key.unwrap_or_default().to_owned())),
            category: "business".into(),
            country: "us".into(),
            common: common(),
        }))
    }

    /// A Reddit provider for two subreddits. Only [`VALID_CLIENT_ID`] is accepted.
    pub fn reddit(&self, id: &str, behavior: Behavior, client_id: Option<&str>) -> ProviderConfig {
        let base = self.provider_url(behavior, "reddit");
        ProviderConfig::Reddit(Arc::new(RedditProviderConfig {
            id: ProviderId::new(id),
            url: base.join("api/").unwrap(),
            auth_url: base.join("auth").unwrap(),
            client_id: Some(Secret(client_id.unwrap_or_default().to_owned())),
            client_secret: Some(Secret::from("client-secret")),
            subreddits: vec!["rust".into(), "startups".into()],
            common: common(),
        }))
    }

    /// A YouTube provider.
    pub fn youtube(&self, id: &str, behavior: Behavior, api_key: Option<&str>) -> ProviderConfig {
        ProviderConfig::Youtube(Arc::new(YoutubeProviderConfig {
            id: ProviderId::new(id),
            url: self.provider_url(behavior, "youtube"),
            api_key: Some(Secret(api_key.unwrap_or_default().to_owned())),
            region_code: "US".into(),
            common: common(),
        }))
    }
}

impl Default for ProviderServer {
    fn default() -> Self {
        Self::new()
    }
}

fn common() -> CommonProviderConfig {
    CommonProviderConfig {
        limit: 10,
        keywords: vec!["test".into()],
    }
}
