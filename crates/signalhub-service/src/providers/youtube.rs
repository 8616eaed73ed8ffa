use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::StatusCode;
use serde::Deserialize;

use signalhub_sources::{ProviderId, Secret, YoutubeProviderConfig};

use super::{ProviderAdapter, ProviderError, fallback};
use crate::types::{RankedItem, TrendQuery};

#[derive(Debug, Deserialize)]
struct VideoList<Id> {
    #[serde(default = "Vec::new")]
    items: Vec<Video<Id>>,
}

#[derive(Debug, Deserialize)]
struct Video<Id> {
    id: Id,
    snippet: Snippet,
    statistics: Option<Statistics>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchId {
    video_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snippet {
    title: String,
    #[serde(default)]
    description: String,
    channel_title: Option<String>,
}

/// Counts are transmitted as strings.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Statistics {
    view_count: Option<String>,
    like_count: Option<String>,
    comment_count: Option<String>,
}

fn parse_count(count: Option<&String>) -> u64 {
    count.and_then(|c| c.parse().ok()).unwrap_or(0)
}

/// Most popular videos and video search via the YouTube Data API.
#[derive(Debug)]
pub struct YoutubeAdapter {
    config: Arc<YoutubeProviderConfig>,
    client: reqwest::Client,
    api_key: Option<Secret>,
}

impl YoutubeAdapter {
    pub fn new(config: Arc<YoutubeProviderConfig>, client: reqwest::Client) -> Self {
        let api_key = config.api_key();
        Self {
            config,
            client,
            api_key,
        }
    }

    /// YouTube reports exhausted quotas as `403`, with the reason in the body.
    async fn check_response(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ProviderError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::FORBIDDEN {
            let body = response.text().await.unwrap_or_default();
            if body.contains("quotaExceeded") || body.contains("rateLimitExceeded") {
                return Err(ProviderError::RateLimited);
            }
        }
        Err(ProviderError::from_status(status))
    }

    fn normalize(
        &self,
        video_id: String,
        snippet: Snippet,
        statistics: Option<Statistics>,
        rank_score: f64,
    ) -> RankedItem {
        let (views, engagement) = match &statistics {
            Some(stats) => {
                let views = parse_count(stats.view_count.as_ref());
                let likes = parse_count(stats.like_count.as_ref());
                let comments = parse_count(stats.comment_count.as_ref());
                (Some(views), likes + comments)
            }
            None => (None, 0),
        };
        let mut keywords = self.config.common.keywords.clone();
        keywords.push("youtube".into());

        RankedItem {
            url: Some(format!("https://www.youtube.com/watch?v={video_id}")),
            id: video_id,
            provider: self.config.id.clone(),
            title: snippet.title,
            summary: snippet.description.chars().take(280).collect(),
            score: views.map_or(rank_score, |v| v as f64),
            source: snippet.channel_title.unwrap_or_else(|| "YouTube".into()),
            fetched_at: Utc::now(),
            engagement,
            keywords,
            fallback: false,
        }
    }
}

#[async_trait]
impl ProviderAdapter for YoutubeAdapter {
    fn id(&self) -> &ProviderId {
        &self.config.id
    }

    fn type_name(&self) -> &'static str {
        "youtube"
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn fetch_items(&self, query: &TrendQuery) -> Result<Vec<RankedItem>, ProviderError> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| ProviderError::Unauthenticated("missing api key".into()))?;
        let limit = self.config.common.limit.to_string();

        match &query.search {
            None => {
                let mut url = self.config.url.join("videos")?;
                url.query_pairs_mut()
                    .append_pair("part", "snippet,statistics")
                    .append_pair("chart", "mostPopular")
                    .append_pair("regionCode", &self.config.region_code)
                    .append_pair("maxResults", &limit)
                    .append_pair("key", api_key.expose());

                let response = Self::check_response(self.client.get(url).send().await?).await?;
                let videos: VideoList<String> = response.json().await?;
                Ok(videos
                    .items
                    .into_iter()
                    .map(|v| self.normalize(v.id, v.snippet, v.statistics, 0.0))
                    .collect())
            }
            Some(terms) => {
                let mut url = self.config.url.join("search")?;
                url.query_pairs_mut()
                    .append_pair("part", "snippet")
                    .append_pair("q", terms)
                    .append_pair("type", "video")
                    .append_pair("order", "viewCount")
                    .append_pair("maxResults", &limit)
                    .append_pair("key", api_key.expose());

                let response = Self::check_response(self.client.get(url).send().await?).await?;
                let videos: VideoList<SearchId> = response.json().await?;
                // search results carry no statistics, they are ordered by views though
                let count = videos.items.len();
                Ok(videos
                    .items
                    .into_iter()
                    .enumerate()
                    .map(|(index, v)| {
                        self.normalize(v.id.video_id, v.snippet, None, (count - index) as f64)
                    })
                    .collect())
            }
        }
    }

    fn fallback(&self, _query: &TrendQuery) -> Vec<RankedItem> {
        fallback::placeholder(
            &self.config.id,
            "YouTube Data API Integration Ready",
            "Configure YouTube API key to fetch trending business and marketing videos",
            "https://console.cloud.google.com/apis/library/youtube.googleapis.com",
            &["youtube", "api", "setup", "business", "marketing"],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_list_without_items() {
        let search: VideoList<SearchId> =
            serde_json::from_str(r#"{"kind": "youtube#searchListResponse"}"#).unwrap();
        assert!(search.items.is_empty());

        let popular: VideoList<String> = serde_json::from_str("{}").unwrap();
        assert!(popular.items.is_empty());
    }
}
