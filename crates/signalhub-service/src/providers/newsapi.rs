use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;

use signalhub_sources::{NewsApiProviderConfig, ProviderId, Secret};

use super::{ProviderAdapter, ProviderError, check_status, fallback};
use crate::types::{RankedItem, TrendQuery};

#[derive(Debug, Deserialize)]
struct ArticlesResponse {
    #[serde(default)]
    articles: Vec<Article>,
}

#[derive(Debug, Deserialize)]
struct Article {
    source: ArticleSource,
    title: Option<String>,
    description: Option<String>,
    url: String,
}

#[derive(Debug, Deserialize)]
struct ArticleSource {
    name: Option<String>,
}

/// Business headlines and article search via NewsAPI.
#[derive(Debug)]
pub struct NewsApiAdapter {
    config: Arc<NewsApiProviderConfig>,
    client: reqwest::Client,
    api_key: Option<Secret>,
}

impl NewsApiAdapter {
    pub fn new(config: Arc<NewsApiProviderConfig>, client: reqwest::Client) -> Self {
        let api_key = config.api_key();
        Self {
            config,
            client,
            api_key,
        }
    }
}

#[async_trait]
impl ProviderAdapter for NewsApiAdapter {
    fn id(&self) -> &ProviderId {
        &self.config.id
    }

    fn type_name(&self) -> &'static str {
        "newsapi"
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn fetch_items(&self, query: &TrendQuery) -> Result<Vec<RankedItem>, ProviderError> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| ProviderError::Unauthenticated("missing api key".into()))?;
        let limit = self.config.common.limit;

        let mut url = match &query.search {
            Some(_) => self.config.url.join("everything")?,
            None => self.config.url.join("top-headlines")?,
        };
        {
            let mut params = url.query_pairs_mut();
            match &query.search {
                Some(terms) => params
                    .append_pair("q", terms)
                    .append_pair("sortBy", "popularity")
                    .append_pair("language", "en"),
                None => params
                    .append_pair("category", &self.config.category)
                    .append_pair("country", &self.config.country),
            };
            params.append_pair("pageSize", &limit.to_string());
        }

        let response = self
            .client
            .get(url)
            .header("X-Api-Key", api_key.expose())
            .send()
            .await?;
        let response: ArticlesResponse = check_status(response)?.json().await?;

        // NewsAPI has no popularity figures, the order of the response is the ranking
        let count = response.articles.len();
        let items = response
            .articles
            .into_iter()
            .enumerate()
            .filter_map(|(index, article)| {
                let title = article.title.filter(|t| !t.is_empty() && t != "[Removed]")?;
                let mut keywords = self.config.common.keywords.clone();
                keywords.extend(["news".to_owned(), self.config.category.clone()]);
                Some(RankedItem {
                    id: article.url.clone(),
                    provider: self.config.id.clone(),
                    title,
                    summary: article.description.unwrap_or_default(),
                    url: Some(article.url),
                    score: (count - index) as f64,
                    source: article.source.name.unwrap_or_else(|| "NewsAPI".into()),
                    fetched_at: Utc::now(),
                    engagement: 0,
                    keywords,
                    fallback: false,
                })
            })
            .collect();
        Ok(items)
    }

    fn fallback(&self, _query: &TrendQuery) -> Vec<RankedItem> {
        fallback::placeholder(
            &self.config.id,
            "NewsAPI Integration Ready",
            "Configure NewsAPI key to fetch trending business news and market insights",
            "https://newsapi.org/register",
            &["news", "api", "business", "market", "trends"],
        )
    }
}
