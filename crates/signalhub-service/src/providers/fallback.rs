use chrono::Utc;

use signalhub_sources::ProviderId;

use crate::types::RankedItem;

/// The `source` of every placeholder item.
pub const FALLBACK_SOURCE: &str = "Fallback Data";

/// Builds the single placeholder item an unconfigured provider contributes.
pub(super) fn placeholder(
    provider: &ProviderId,
    title: &str,
    summary: &str,
    url: &str,
    keywords: &[&str],
) -> Vec<RankedItem> {
    vec![RankedItem {
        id: format!("{provider}-fallback-1"),
        provider: provider.clone(),
        title: title.to_owned(),
        summary: summary.to_owned(),
        url: Some(url.to_owned()),
        score: 1.0,
        source: FALLBACK_SOURCE.to_owned(),
        fetched_at: Utc::now(),
        engagement: 0,
        keywords: keywords.iter().map(|k| (*k).to_owned()).collect(),
        fallback: true,
    }]
}
