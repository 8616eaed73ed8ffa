//! Provider configuration types.

use serde::{Deserialize, Serialize};

use crate::ProviderId;

mod hackernews;
mod newsapi;
mod reddit;
mod youtube;

pub use hackernews::*;
pub use newsapi::*;
pub use reddit::*;
pub use youtube::*;

/// Configuration for an upstream signal provider.
///
/// Providers deliver trending items from one external service. Their configuration is a
/// combination of the location of the service plus any required credentials. A provider
/// without credentials is still registered, it just serves its fallback placeholders.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// Hacker News front page via the Algolia search API.
    Hackernews(std::sync::Arc<HackerNewsProviderConfig>),
    /// Business headlines from NewsAPI.
    Newsapi(std::sync::Arc<NewsApiProviderConfig>),
    /// Hot posts of a set of subreddits.
    Reddit(std::sync::Arc<RedditProviderConfig>),
    /// Most popular videos from the YouTube Data API.
    Youtube(std::sync::Arc<YoutubeProviderConfig>),
}

impl ProviderConfig {
    /// The unique identifier of this provider.
    pub fn id(&self) -> &ProviderId {
        match self {
            Self::Hackernews(x) => &x.id,
            Self::Newsapi(x) => &x.id,
            Self::Reddit(x) => &x.id,
            Self::Youtube(x) => &x.id,
        }
    }

    /// Name of this provider type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Hackernews(..) => "hackernews",
            Self::Newsapi(..) => "newsapi",
            Self::Reddit(..) => "reddit",
            Self::Youtube(..) => "youtube",
        }
    }

    /// Settings shared by all provider types.
    pub fn common(&self) -> &CommonProviderConfig {
        match self {
            Self::Hackernews(x) => &x.common,
            Self::Newsapi(x) => &x.common,
            Self::Reddit(x) => &x.common,
            Self::Youtube(x) => &x.common,
        }
    }

    /// The providers registered when the configuration does not list any.
    ///
    /// Credentials for these are picked up from the environment.
    pub fn default_set() -> Vec<ProviderConfig> {
        vec![
            Self::Hackernews(Default::default()),
            Self::Newsapi(Default::default()),
            Self::Reddit(Default::default()),
            Self::Youtube(Default::default()),
        ]
    }
}

/// Common parameters for all providers.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct CommonProviderConfig {
    /// How many items to request from the provider per fetch.
    pub limit: usize,

    /// Keywords attached to every item of this provider.
    pub keywords: Vec<String>,
}

impl Default for CommonProviderConfig {
    fn default() -> Self {
        Self {
            limit: 10,
            keywords: vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Secret;

    #[test]
    fn test_provider_list() {
        let text = r#"
          - type: hackernews
          - id: headlines
            type: newsapi
            api_key: the-key
            keywords: [news, business]
          - type: youtube
            url: http://127.0.0.1:1234/youtube/
                  "#;
        let providers: Vec<ProviderConfig> = serde_yaml::from_str(text).unwrap();
        let ids: Vec<_> = providers.iter().map(|p| p.id().as_str()).collect();
        assert_eq!(ids, ["hackernews", "headlines", "youtube"]);

        let types: Vec<_> = providers.iter().map(|p| p.type_name()).collect();
        assert_eq!(types, ["hackernews", "newsapi", "youtube"]);

        assert_eq!(providers[0].common().limit, 10);
        assert_eq!(providers[1].common().keywords, ["news", "business"]);

        match &providers[1] {
            ProviderConfig::Newsapi(cfg) => {
                assert_eq!(cfg.api_key(), Some(Secret::from("the-key")));
                assert_eq!(cfg.country, "us");
            }
            _ => unreachable!(),
        }
        match &providers[2] {
            ProviderConfig::Youtube(cfg) => {
                assert_eq!(cfg.url.as_str(), "http://127.0.0.1:1234/youtube/");
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_unknown_provider_type() {
        let text = "- type: myspace\n";
        let result: Result<Vec<ProviderConfig>, _> = serde_yaml::from_str(text);
        assert!(result.is_err());
    }

    #[test]
    fn test_default_set() {
        let ids: Vec<_> = ProviderConfig::default_set()
            .iter()
            .map(|p| p.id().to_string())
            .collect();
        assert_eq!(ids, ["hackernews", "news", "reddit", "youtube"]);
    }

    #[test]
    fn test_secret_is_redacted() {
        let cfg = NewsApiProviderConfig {
            api_key: Some(Secret::from("super-secret")),
            ..Default::default()
        };
        let debug = format!("{cfg:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("***"));
    }
}
