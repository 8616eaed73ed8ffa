use serde::{Deserialize, Serialize};
use url::Url;

use crate::{CommonProviderConfig, ProviderId, Secret};

/// Environment variable consulted when no `api_key` is configured.
pub const YOUTUBE_API_KEY_ENV: &str = "YOUTUBE_API_KEY";

/// Configuration for the YouTube Data API provider.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct YoutubeProviderConfig {
    /// Unique provider identifier.
    #[serde(default = "default_id")]
    pub id: ProviderId,

    /// Base URL of the YouTube Data API v3.
    #[serde(default = "default_url")]
    pub url: Url,

    /// The API key. Falls back to `YOUTUBE_API_KEY`.
    #[serde(default)]
    pub api_key: Option<Secret>,

    /// Region whose chart of most popular videos is queried.
    #[serde(default = "default_region_code")]
    pub region_code: String,

    /// Configuration common to all providers.
    #[serde(flatten)]
    pub common: CommonProviderConfig,
}

impl YoutubeProviderConfig {
    /// The API key from the config or the environment.
    pub fn api_key(&self) -> Option<Secret> {
        Secret::resolve(self.api_key.as_ref(), YOUTUBE_API_KEY_ENV)
    }
}

fn default_id() -> ProviderId {
    ProviderId::new("youtube")
}

fn default_url() -> Url {
    Url::parse("https://www.googleapis.com/youtube/v3/").unwrap()
}

fn default_region_code() -> String {
    "US".into()
}

impl Default for YoutubeProviderConfig {
    fn default() -> Self {
        Self {
            id: default_id(),
            url: default_url(),
            api_key: None,
            region_code: default_region_code(),
            common: Default::default(),
        }
    }
}
