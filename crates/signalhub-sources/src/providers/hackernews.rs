use serde::{Deserialize, Serialize};
use url::Url;

use crate::{CommonProviderConfig, ProviderId};

/// Configuration for the Hacker News provider.
///
/// Hacker News needs no credentials, so this provider is always configured.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct HackerNewsProviderConfig {
    /// Unique provider identifier.
    #[serde(default = "default_id")]
    pub id: ProviderId,

    /// Base URL of the Algolia Hacker News API.
    #[serde(default = "default_url")]
    pub url: Url,

    /// Configuration common to all providers.
    #[serde(flatten)]
    pub common: CommonProviderConfig,
}

fn default_id() -> ProviderId {
    ProviderId::new("hackernews")
}

fn default_url() -> Url {
    Url::parse("https://hn.algolia.com/api/v1/").unwrap()
}

impl Default for HackerNewsProviderConfig {
    fn default() -> Self {
        Self {
            id: default_id(),
            url: default_url(),
            common: Default::default(),
        }
    }
}
