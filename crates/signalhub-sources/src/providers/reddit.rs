use serde::{Deserialize, Serialize};
use url::Url;

use crate::{CommonProviderConfig, ProviderId, Secret};

/// Environment variable consulted when no `client_id` is configured.
pub const REDDIT_CLIENT_ID_ENV: &str = "REDDIT_CLIENT_ID";
/// Environment variable consulted when no `client_secret` is configured.
pub const REDDIT_CLIENT_SECRET_ENV: &str = "REDDIT_CLIENT_SECRET";

/// Configuration for the Reddit provider.
///
/// Uses the OAuth2 client credentials flow, both `client_id` and `client_secret` are
/// required for the provider to be considered configured.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RedditProviderConfig {
    /// Unique provider identifier.
    #[serde(default = "default_id")]
    pub id: ProviderId,

    /// Base URL of the authenticated Reddit API.
    #[serde(default = "default_url")]
    pub url: Url,

    /// URL of the OAuth2 token endpoint.
    #[serde(default = "default_auth_url")]
    pub auth_url: Url,

    /// OAuth client id. Falls back to `REDDIT_CLIENT_ID`.
    #[serde(default)]
    pub client_id: Option<Secret>,

    /// OAuth client secret. Falls back to `REDDIT_CLIENT_SECRET`.
    #[serde(default)]
    pub client_secret: Option<Secret>,

    /// Subreddits whose hot posts are merged.
    #[serde(default = "default_subreddits")]
    pub subreddits: Vec<String>,

    /// Configuration common to all providers.
    #[serde(flatten)]
    pub common: CommonProviderConfig,
}

/// Resolved OAuth client credentials for Reddit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RedditCredentials {
    /// The OAuth client id.
    pub client_id: Secret,
    /// The OAuth client secret.
    pub client_secret: Secret,
}

impl RedditProviderConfig {
    /// The client credentials from the config or the environment.
    pub fn credentials(&self) -> Option<RedditCredentials> {
        let client_id = Secret::resolve(self.client_id.as_ref(), REDDIT_CLIENT_ID_ENV)?;
        let client_secret = Secret::resolve(self.client_secret.as_ref(), REDDIT_CLIENT_SECRET_ENV)?;
        Some(RedditCredentials {
            client_id,
            client_secret,
        })
    }
}

fn default_id() -> ProviderId {
    ProviderId::new("reddit")
}

fn default_url() -> Url {
    Url::parse("https://oauth.reddit.com/").unwrap()
}

fn default_auth_url() -> Url {
    Url::parse("https://www.reddit.com/api/v1/access_token").unwrap()
}

fn default_subreddits() -> Vec<String> {
    [
        "marketing",
        "business",
        "entrepreneur",
        "socialmedia",
        "digitalmarketing",
        "startups",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl Default for RedditProviderConfig {
    fn default() -> Self {
        Self {
            id: default_id(),
            url: default_url(),
            auth_url: default_auth_url(),
            client_id: None,
            client_secret: None,
            subreddits: default_subreddits(),
            common: Default::default(),
        }
    }
}
