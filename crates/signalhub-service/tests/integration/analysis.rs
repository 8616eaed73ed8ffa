use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::json;

use crate::setup_services;

#[tokio::test]
async fn test_analysis_shares_cache() {
    let services = setup_services(vec![], |_| {});
    let computations = Arc::new(AtomicUsize::new(0));

    let analyze = || {
        let computations = computations.clone();
        move || async move {
            computations.fetch_add(1, Ordering::Relaxed);
            Ok(json!({"sentiment": "positive"}))
        }
    };

    let first = services
        .analysis
        .get_or_compute("Markets rally", "sentiment", analyze())
        .await
        .unwrap();
    let second = services
        .analysis
        .get_or_compute("Markets rally", "sentiment", analyze())
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(computations.load(Ordering::Relaxed), 1);
    assert_eq!(services.cache.stats().local.entries, 1);
}
