use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;

use signalhub_sources::{HackerNewsProviderConfig, ProviderId};

use super::{ProviderAdapter, ProviderError, check_status, fallback};
use crate::types::{RankedItem, TrendQuery};

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(rename = "objectID")]
    object_id: String,
    title: Option<String>,
    url: Option<String>,
    author: Option<String>,
    #[serde(default)]
    points: Option<u64>,
    #[serde(default)]
    num_comments: Option<u64>,
}

/// Front page stories and story search via the Algolia Hacker News API.
#[derive(Debug)]
pub struct HackerNewsAdapter {
    config: Arc<HackerNewsProviderConfig>,
    client: reqwest::Client,
}

impl HackerNewsAdapter {
    pub fn new(config: Arc<HackerNewsProviderConfig>, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    fn normalize(&self, hit: Hit) -> Option<RankedItem> {
        // comments and polls show up without a title
        let title = hit.title.filter(|t| !t.is_empty())?;
        let points = hit.points.unwrap_or(0);
        let comments = hit.num_comments.unwrap_or(0);
        let url = hit.url.unwrap_or_else(|| {
            format!("https://news.ycombinator.com/item?id={}", hit.object_id)
        });

        let mut keywords = self.config.common.keywords.clone();
        keywords.push("hackernews".into());

        Some(RankedItem {
            id: hit.object_id,
            provider: self.config.id.clone(),
            title,
            summary: format!(
                "{points} points and {comments} comments, posted by {}",
                hit.author.as_deref().unwrap_or("unknown")
            ),
            url: Some(url),
            score: points as f64,
            source: "Hacker News".into(),
            fetched_at: Utc::now(),
            engagement: points + comments,
            keywords,
            fallback: false,
        })
    }
}

#[async_trait]
impl ProviderAdapter for HackerNewsAdapter {
    fn id(&self) -> &ProviderId {
        &self.config.id
    }

    fn type_name(&self) -> &'static str {
        "hackernews"
    }

    fn is_configured(&self) -> bool {
        true
    }

    async fn fetch_items(&self, query: &TrendQuery) -> Result<Vec<RankedItem>, ProviderError> {
        let mut url = self.config.url.join("search")?;
        {
            let mut params = url.query_pairs_mut();
            match &query.search {
                Some(terms) => params.append_pair("query", terms).append_pair("tags", "story"),
                None => params.append_pair("tags", "front_page"),
            };
            params.append_pair("hitsPerPage", &self.config.common.limit.to_string());
        }

        tracing::trace!(%url, "Fetching Hacker News stories");
        let response = check_status(self.client.get(url).send().await?)?;
        let response: SearchResponse = response.json().await?;

        Ok(response
            .hits
            .into_iter()
            .filter_map(|hit| self.normalize(hit))
            .collect())
    }

    fn fallback(&self, _query: &TrendQuery) -> Vec<RankedItem> {
        fallback::placeholder(
            &self.config.id,
            "Hacker News Temporarily Unreachable",
            "Hacker News stories will show up here once the Algolia API is reachable again",
            "https://news.ycombinator.com",
            &["hackernews", "technology", "startups"],
        )
    }
}
