use serde::{Deserialize, Serialize};
use url::Url;

use crate::{CommonProviderConfig, ProviderId, Secret};

/// Environment variable consulted when no `api_key` is configured.
pub const NEWS_API_KEY_ENV: &str = "NEWS_API_KEY";

/// Configuration for the NewsAPI provider.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct NewsApiProviderConfig {
    /// Unique provider identifier.
    #[serde(default = "default_id")]
    pub id: ProviderId,

    /// Base URL of the NewsAPI v2 endpoints.
    #[serde(default = "default_url")]
    pub url: Url,

    /// The API key. Falls back to `NEWS_API_KEY`.
    #[serde(default)]
    pub api_key: Option<Secret>,

    /// Headline category to query.
    #[serde(default = "default_category")]
    pub category: String,

    /// Two-letter country code to query.
    #[serde(default = "default_country")]
    pub country: String,

    /// Configuration common to all providers.
    #[serde(flatten)]
    pub common: CommonProviderConfig,
}

impl NewsApiProviderConfig {
    /// The API key from the config or the environment.
    pub fn api_key(&self) -> Option<Secret> {
        Secret::resolve(self.api_key.as_ref(), NEWS_API_KEY_ENV)
    }
}

fn default_id() -> ProviderId {
    ProviderId::new("news")
}

fn default_url() -> Url {
    Url::parse("https://newsapi.org/v2/").unwrap()
}

fn default_category() -> String {
    "business".into()
}

fn default_country() -> String {
    "us".into()
}

impl Default for NewsApiProviderConfig {
    fn default() -> Self {
        Self {
            id: default_id(),
            url: default_url(),
            api_key: None,
            category: default_category(),
            country: default_country(),
            common: Default::default(),
        }
    }
}
