use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use futures::future::try_join_all;
use serde::Deserialize;

use signalhub_sources::{ProviderId, RedditCredentials, RedditProviderConfig};

use super::{ProviderAdapter, ProviderError, check_status, fallback};
use crate::types::{RankedItem, TrendQuery};

/// Tokens are refreshed this long before Reddit considers them expired.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// An OAuth access token along with its expiry.
#[derive(Debug, Clone)]
struct RedditToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl RedditToken {
    fn is_expired(&self) -> bool {
        self.expires_at < Utc::now()
    }
}

/// Caches the application-only OAuth token, keyed by client id.
type RedditTokenCache = moka::future::Cache<String, Result<RedditToken, ProviderError>>;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    children: Vec<Thing>,
}

#[derive(Debug, Deserialize)]
struct Thing {
    data: Post,
}

#[derive(Debug, Deserialize)]
struct Post {
    id: String,
    title: String,
    #[serde(default)]
    selftext: String,
    permalink: String,
    subreddit: String,
    #[serde(default)]
    score: i64,
    #[serde(default)]
    num_comments: u64,
    created_utc: Option<f64>,
    #[serde(default)]
    stickied: bool,
}

/// Hot posts of a set of subreddits, and post search, via the authenticated Reddit API.
#[derive(Debug)]
pub struct RedditAdapter {
    config: Arc<RedditProviderConfig>,
    client: reqwest::Client,
    credentials: Option<RedditCredentials>,
    token_cache: RedditTokenCache,
}

impl RedditAdapter {
    pub fn new(config: Arc<RedditProviderConfig>, client: reqwest::Client) -> Self {
        let credentials = config.credentials();
        Self {
            config,
            client,
            credentials,
            token_cache: RedditTokenCache::builder().max_capacity(4).build(),
        }
    }

    async fn request_token(
        &self,
        credentials: &RedditCredentials,
    ) -> Result<RedditToken, ProviderError> {
        metric!(counter("providers.reddit.token.computation") += 1);
        let response = self
            .client
            .post(self.config.auth_url.clone())
            .basic_auth(
                credentials.client_id.expose(),
                Some(credentials.client_secret.expose()),
            )
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;
        let token: TokenResponse = check_status(response)?.json().await?;

        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_EXPIRY_MARGIN);
        let expires_at = Utc::now()
            + chrono::Duration::from_std(lifetime).unwrap_or_else(|_| chrono::Duration::zero());
        tracing::debug!(%expires_at, "Got new Reddit access token");
        Ok(RedditToken {
            access_token: token.access_token,
            expires_at,
        })
    }

    /// Resolves a valid access token.
    ///
    /// If the cache contains a valid token, then this token is returned. Otherwise, a new token is
    /// requested from Reddit and stored in the cache. Failures are not reused.
    async fn get_token(&self, credentials: &RedditCredentials) -> Result<String, ProviderError> {
        metric!(counter("providers.reddit.token.access") += 1);
        let init = Box::pin(self.request_token(credentials));
        let replace_if =
            |entry: &Result<RedditToken, ProviderError>| entry.as_ref().map_or(true, |t| t.is_expired());

        self.token_cache
            .entry_by_ref(credentials.client_id.expose())
            .or_insert_with_if(init, replace_if)
            .await
            .into_value()
            .map(|token| token.access_token)
    }

    async fn fetch_listing(&self, url: url::Url, token: &str) -> Result<Vec<Post>, ProviderError> {
        let response = self.client.get(url).bearer_auth(token).send().await?;
        let listing: Listing = check_status(response)?.json().await?;
        Ok(listing.data.children.into_iter().map(|t| t.data).collect())
    }

    fn normalize(&self, post: Post) -> RankedItem {
        let fetched_at = Utc::now();
        let mut keywords = self.config.common.keywords.clone();
        keywords.extend(["reddit".to_owned(), post.subreddit.to_lowercase()]);
        let summary = match post.created_utc.and_then(|ts| Utc.timestamp_opt(ts as i64, 0).single()) {
            Some(created) if post.selftext.is_empty() => {
                format!("Posted in r/{} on {}", post.subreddit, created.format("%Y-%m-%d"))
            }
            _ => post.selftext.chars().take(280).collect(),
        };

        RankedItem {
            id: post.id,
            provider: self.config.id.clone(),
            title: post.title,
            summary,
            url: Some(format!("https://www.reddit.com{}", post.permalink)),
            score: post.score.max(0) as f64,
            source: format!("r/{}", post.subreddit),
            fetched_at,
            engagement: post.score.max(0) as u64 + post.num_comments,
            keywords,
            fallback: false,
        }
    }
}

#[async_trait]
impl ProviderAdapter for RedditAdapter {
    fn id(&self) -> &ProviderId {
        &self.config.id
    }

    fn type_name(&self) -> &'static str {
        "reddit"
    }

    fn is_configured(&self) -> bool {
        self.credentials.is_some()
    }

    async fn fetch_items(&self, query: &TrendQuery) -> Result<Vec<RankedItem>, ProviderError> {
        let credentials = self
            .credentials
            .as_ref()
            .ok_or_else(|| ProviderError::Unauthenticated("missing client credentials".into()))?;
        let token = self.get_token(credentials).await?;
        let limit = self.config.common.limit.to_string();

        let mut urls = vec![];
        match &query.search {
            Some(terms) => {
                let mut url = self.config.url.join("search")?;
                url.query_pairs_mut()
                    .append_pair("q", terms)
                    .append_pair("sort", "hot")
                    .append_pair("type", "link")
                    .append_pair("limit", &limit);
                urls.push(url);
            }
            None => {
                for subreddit in &self.config.subreddits {
                    let mut url = self.config.url.join(&format!("r/{subreddit}/hot"))?;
                    url.query_pairs_mut().append_pair("limit", &limit);
                    urls.push(url);
                }
            }
        }

        let listings = try_join_all(urls.into_iter().map(|url| self.fetch_listing(url, &token)))
            .await
            .inspect_err(|err| {
                if matches!(err, ProviderError::Unauthenticated(_)) {
                    // the token may have been revoked, request a new one next time
                    self.token_cache.invalidate_all();
                }
            })?;

        Ok(listings
            .into_iter()
            .flatten()
            .filter(|post| !post.stickied)
            .map(|post| self.normalize(post))
            .collect())
    }

    fn fallback(&self, _query: &TrendQuery) -> Vec<RankedItem> {
        fallback::placeholder(
            &self.config.id,
            "Reddit API Authentication Required",
            "Configure Reddit API credentials to fetch real trending data",
            "https://www.reddit.com/prefs/apps",
            &["reddit", "api", "setup"],
        )
    }
}
