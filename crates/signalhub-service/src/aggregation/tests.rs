use std::time::Duration;

use signalhub_sources::ProviderId;

use super::*;
use crate::providers::ProviderError;
use crate::test::{self, ScriptedAdapter};

fn options(max_results: usize) -> AggregateOptions {
    AggregateOptions {
        per_provider_timeout: Duration::from_secs(5),
        overall_deadline: Duration::from_secs(8),
        max_results,
        per_provider_limit: None,
    }
}

fn aggregator() -> ResilientAggregator {
    ResilientAggregator::new(tokio::runtime::Handle::current())
}

fn ids(result: &AggregateResult) -> Vec<&str> {
    result.items.iter().map(|i| i.id.as_str()).collect()
}

#[tokio::test(start_paused = true)]
async fn test_partial_failure() {
    signalhub_test::setup();
    let scripted = [
        Arc::new(ScriptedAdapter::succeeding("a", 3)),
        Arc::new(ScriptedAdapter::failing("b", ProviderError::RateLimited)),
        Arc::new(ScriptedAdapter::succeeding("c", 3)),
        Arc::new(
            ScriptedAdapter::succeeding("d", 3).with_delay(Duration::from_secs(60)),
        ),
        Arc::new(ScriptedAdapter::succeeding("e", 3)),
    ];
    let providers = test::adapters(&scripted);

    let result = aggregator()
        .aggregate(&providers, &TrendQuery::trending(), &options(50))
        .await
        .unwrap();

    assert!(result.partial);
    assert_eq!(result.items.len(), 9);
    assert_eq!(
        result.succeeded_providers,
        [ProviderId::new("a"), ProviderId::new("c"), ProviderId::new("e")]
    );
    assert_eq!(
        result.failed_providers,
        [
            ProviderFailure {
                provider: ProviderId::new("b"),
                kind: ProviderErrorKind::RateLimited,
            },
            ProviderFailure {
                provider: ProviderId::new("d"),
                kind: ProviderErrorKind::Timeout,
            },
        ]
    );
    assert!(result.fallback_providers.is_empty());
    assert!(
        result
            .items
            .iter()
            .all(|i| ["a", "c", "e"].contains(&i.provider.as_str()))
    );
}

#[tokio::test(start_paused = true)]
async fn test_zero_survivors() {
    signalhub_test::setup();
    let scripted = [
        Arc::new(ScriptedAdapter::failing(
            "a",
            ProviderError::Unauthenticated("401 Unauthorized".into()),
        )),
        Arc::new(ScriptedAdapter::failing("b", ProviderError::Unknown("boom".into()))),
    ];
    let providers = test::adapters(&scripted);

    let result = aggregator()
        .aggregate(&providers, &TrendQuery::trending(), &options(50))
        .await
        .unwrap();

    assert!(result.items.is_empty());
    assert!(result.partial);
    assert!(result.succeeded_providers.is_empty());
    assert_eq!(result.failed_providers.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_empty_result_is_partial() {
    let scripted = [Arc::new(ScriptedAdapter::succeeding("a", 0))];
    let providers = test::adapters(&scripted);

    let result = aggregator()
        .aggregate(&providers, &TrendQuery::trending(), &options(50))
        .await
        .unwrap();

    assert!(result.items.is_empty());
    assert!(result.partial);
    assert!(result.failed_providers.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_hard_failures() {
    let result = aggregator()
        .aggregate(&[], &TrendQuery::trending(), &options(50))
        .await;
    assert_eq!(result, Err(AggregationError::NoProvidersConfigured));

    let scripted = [Arc::new(ScriptedAdapter::succeeding("a", 3))];
    let providers = test::adapters(&scripted);
    let result = aggregator()
        .aggregate(&providers, &TrendQuery::trending(), &options(0))
        .await;
    assert!(matches!(
        result,
        Err(AggregationError::PreconditionViolation(_))
    ));
    assert_eq!(scripted[0].calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_dedup_first_wins() {
    signalhub_test::setup();
    let mut first = test::item("shared", "dup", 10.0);
    first.title = "first".into();
    let mut second = test::item("shared", "dup", 10.0);
    second.title = "second".into();

    let scripted = [
        Arc::new(ScriptedAdapter::with_items(
            "shared",
            vec![first, test::item("shared", "other", 5.0)],
        )),
        Arc::new(ScriptedAdapter::with_items("shared", vec![second])),
        Arc::new(ScriptedAdapter::with_items(
            "distinct",
            vec![test::item("distinct", "dup", 10.0)],
        )),
    ];
    let providers = test::adapters(&scripted);

    for _ in 0..3 {
        let result = aggregator()
            .aggregate(&providers, &TrendQuery::trending(), &options(50))
            .await
            .unwrap();

        let titles: Vec<_> = result
            .items
            .iter()
            .map(|i| (i.id.as_str(), i.title.as_str()))
            .collect();
        assert_eq!(
            titles,
            [
                ("shared:dup", "first"),
                ("distinct:dup", "distinct item dup"),
                ("shared:other", "shared item other"),
            ]
        );
    }
}

#[tokio::test(start_paused = true)]
async fn test_unconfigured_contributes_fallback() {
    signalhub_test::setup();
    let scripted = [
        Arc::new(ScriptedAdapter::succeeding("a", 2)),
        Arc::new(ScriptedAdapter::unconfigured("b")),
    ];
    let providers = test::adapters(&scripted);

    let result = aggregator()
        .aggregate(&providers, &TrendQuery::trending(), &options(50))
        .await
        .unwrap();

    assert_eq!(scripted[1].calls(), 0);
    assert!(!result.partial);
    assert_eq!(result.fallback_providers, [ProviderId::new("b")]);
    assert_eq!(ids(&result), ["a:item0", "a:item1", "b:fallback-1"]);

    let placeholder = &result.items[2];
    assert!(placeholder.fallback);
    assert_eq!(placeholder.score, 0.0);
    assert_eq!(placeholder.source, crate::providers::FALLBACK_SOURCE);
}

#[tokio::test(start_paused = true)]
async fn test_deadline_cancels_outstanding() {
    signalhub_test::setup();
    let scripted = [
        Arc::new(ScriptedAdapter::succeeding("fast", 2)),
        Arc::new(ScriptedAdapter::succeeding("slow", 2).with_delay(Duration::from_secs(3))),
    ];
    let providers = test::adapters(&scripted);
    let options = AggregateOptions {
        per_provider_timeout: Duration::from_secs(5),
        overall_deadline: Duration::from_secs(1),
        max_results: 50,
        per_provider_limit: None,
    };

    let start = Instant::now();
    let result = aggregator()
        .aggregate(&providers, &TrendQuery::trending(), &options)
        .await
        .unwrap();
    assert!(start.elapsed() < Duration::from_secs(2));

    assert!(result.partial);
    assert_eq!(ids(&result), ["fast:item0", "fast:item1"]);
    assert_eq!(
        result.failed_providers,
        [ProviderFailure {
            provider: ProviderId::new("slow"),
            kind: ProviderErrorKind::DeadlineExceeded,
        }]
    );

    // the abandoned call never finishes
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(scripted[1].calls(), 1);
    assert_eq!(scripted[1].completions(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_bounded_output() {
    let scripted: Vec<_> = ["a", "b", "c", "d"]
        .into_iter()
        .map(|id| Arc::new(ScriptedAdapter::succeeding(id, 25)))
        .collect();
    let providers = test::adapters(&scripted);

    let result = aggregator()
        .aggregate(&providers, &TrendQuery::trending(), &options(20))
        .await
        .unwrap();

    assert_eq!(result.items.len(), 20);
    assert!(
        result
            .items
            .windows(2)
            .all(|w| w[0].score >= w[1].score)
    );
    assert_eq!(result.items[0].score, MAX_SCORE);
    // equal scores keep the registration order of their providers
    assert_eq!(&ids(&result)[..4], ["a:item0", "b:item0", "c:item0", "d:item0"]);
}

#[tokio::test(start_paused = true)]
async fn test_balanced_view() {
    let scripted = [
        Arc::new(ScriptedAdapter::succeeding("a", 10)),
        Arc::new(ScriptedAdapter::succeeding("b", 10)),
    ];
    let providers = test::adapters(&scripted);
    let options = AggregateOptions {
        per_provider_limit: Some(3),
        ..options(50)
    };

    let result = aggregator()
        .aggregate(&providers, &TrendQuery::trending(), &options)
        .await
        .unwrap();

    assert_eq!(
        ids(&result),
        ["a:item0", "b:item0", "a:item1", "b:item1", "a:item2", "b:item2"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_result_snapshot() {
    let scripted = [
        Arc::new(ScriptedAdapter::succeeding("a", 2)),
        Arc::new(ScriptedAdapter::failing("b", ProviderError::Timeout)),
        Arc::new(ScriptedAdapter::unconfigured("c")),
    ];
    let providers = test::adapters(&scripted);

    let result = aggregator()
        .aggregate(&providers, &TrendQuery::trending(), &options(50))
        .await
        .unwrap();

    insta::assert_yaml_snapshot!(result, {
        ".produced_at" => "[produced_at]",
        ".items[].score" => "[score]",
    }, @r###"
    items:
      - id: "a:item0"
        provider: a
        title: a item item0
        summary: ""
        url: "https://a.example.com/item0"
        score: "[score]"
        source: a
        fetched_at: "2023-11-14T22:13:20Z"
        engagement: 0
        keywords: []
        fallback: false
      - id: "a:item1"
        provider: a
        title: a item item1
        summary: ""
        url: "https://a.example.com/item1"
        score: "[score]"
        source: a
        fetched_at: "2023-11-14T22:13:20Z"
        engagement: 0
        keywords: []
        fallback: false
      - id: "c:fallback-1"
        provider: c
        title: c is not configured
        summary: ""
        url: "https://c.example.com/fallback-1"
        score: "[score]"
        source: Fallback Data
        fetched_at: "2023-11-14T22:13:20Z"
        engagement: 0
        keywords: []
        fallback: true
    produced_at: "[produced_at]"
    partial: true
    succeeded_providers:
      - a
    failed_providers:
      - provider: b
        kind: timeout
    fallback_providers:
      - c
    "###);
}
