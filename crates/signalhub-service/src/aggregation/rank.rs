use std::collections::HashMap;

use signalhub_sources::ProviderId;

use crate::types::RankedItem;

/// The upper bound of normalized scores.
pub const MAX_SCORE: f64 = 100.0;

/// Maps the provider-local scores of every provider onto `0..=MAX_SCORE`.
///
/// Scores are min-max normalized per provider. When all items of a provider share the same
/// score, they all map to [`MAX_SCORE`]. Placeholder items always score `0`.
pub fn normalize_scores(items: &mut [RankedItem]) {
    let mut ranges: HashMap<ProviderId, (f64, f64)> = HashMap::new();
    for item in items.iter().filter(|item| !item.fallback) {
        let score = sanitize(item.score);
        ranges
            .entry(item.provider.clone())
            .and_modify(|(min, max)| {
                *min = min.min(score);
                *max = max.max(score);
            })
            .or_insert((score, score));
    }

    for item in items.iter_mut() {
        if item.fallback {
            item.score = 0.0;
            continue;
        }
        let score = sanitize(item.score);
        item.score = match ranges.get(&item.provider) {
            Some(&(min, max)) if max > min => (score - min) / (max - min) * MAX_SCORE,
            _ => MAX_SCORE,
        };
    }
}

fn sanitize(score: f64) -> f64 {
    if score.is_finite() { score } else { 0.0 }
}

/// Sorts by normalized score, descending.
///
/// Ties are broken by `fetched_at`, most recent first. The sort is stable, so remaining ties keep
/// the order they were passed in, which is the registration order of their providers.
pub fn sort_items(items: &mut [RankedItem]) {
    items.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| b.fetched_at.cmp(&a.fetched_at))
    });
}

/// Keeps at most `limit` items of every provider, preserving the order.
pub fn limit_per_provider(items: &mut Vec<RankedItem>, limit: usize) {
    let mut taken: HashMap<ProviderId, usize> = HashMap::new();
    items.retain(|item| {
        let count = taken.entry(item.provider.clone()).or_default();
        *count += 1;
        *count <= limit
    });
}

/// Normalizes, sorts and bounds the candidates.
pub fn rank(
    mut items: Vec<RankedItem>,
    max_results: usize,
    per_provider_limit: Option<usize>,
) -> Vec<RankedItem> {
    normalize_scores(&mut items);
    sort_items(&mut items);
    if let Some(limit) = per_provider_limit {
        limit_per_provider(&mut items, limit);
    }
    items.truncate(max_results);
    items
}
