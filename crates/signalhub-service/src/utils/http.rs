use std::time::Duration;

use reqwest::StatusCode;

/// Timeouts applied to every HTTP request of the provider clients.
#[derive(Copy, Clone, Debug)]
pub struct HttpTimeouts {
    /// The timeout for establishing a connection.
    pub connect: Duration,
    /// Upper bound for one complete request, including reading the body.
    pub request: Duration,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_millis(500),
            request: Duration::from_secs(10),
        }
    }
}

/// The `User-Agent` sent to providers. Reddit in particular rejects generic agents.
pub const USER_AGENT: &str = concat!("signalhub/", env!("CARGO_PKG_VERSION"));

/// Creates a [`reqwest::Client`] for talking to providers.
///
/// The per-provider timeouts of the aggregator are usually shorter than `timeouts.request`.
/// The client timeout only guards requests made outside of an aggregation.
pub fn create_client(timeouts: &HttpTimeouts) -> reqwest::Result<reqwest::Client> {
    reqwest::ClientBuilder::new()
        .gzip(true)
        .user_agent(USER_AGENT)
        .connect_timeout(timeouts.connect)
        .timeout(timeouts.request)
        .pool_idle_timeout(Duration::from_secs(30))
        .build()
}

/// Whether the status means the credentials were missing, wrong or lack permissions.
pub fn is_auth_failure(status: StatusCode) -> bool {
    status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN
}
