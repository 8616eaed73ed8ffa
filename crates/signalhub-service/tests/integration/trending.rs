use std::time::Duration;

use futures::future::join_all;
use signalhub_service::providers::ProviderStatus;
use signalhub_service::types::ProviderErrorKind;

use crate::{Behavior, EXHAUSTED_API_KEY, ProviderServer, all_providers, setup_services};

#[tokio::test]
async fn test_all_providers() {
    let server = ProviderServer::new();
    let services = setup_services(all_providers(&server), |_| {});

    let response = services.trending.all("alice", false).await.unwrap();
    let result = &response.result;
    assert!(!response.cached);
    assert!(!result.partial);
    assert_eq!(result.succeeded_providers.len(), 4);
    assert!(result.failed_providers.is_empty());

    // hackernews 3, news 2, reddit 3 of 4, youtube 2
    assert_eq!(result.items.len(), 10);
    for item in &result.items {
        assert!(item.id.starts_with(&format!("{}:", item.provider)));
        assert!((0.0..=100.0).contains(&item.score));
    }
    assert!(
        result
            .items
            .windows(2)
            .all(|pair| pair[0].score >= pair[1].score)
    );
    assert!(
        result
            .items
            .iter()
            .any(|item| item.id == "reddit:rust2" && item.score == 100.0)
    );

    let hits = server.total_hits();
    let response = services.trending.all("alice", false).await.unwrap();
    assert!(response.cached);
    assert_eq!(server.total_hits(), hits);
}

#[tokio::test]
async fn test_failing_providers() {
    let server = ProviderServer::new();
    let providers = vec![
        server.hackernews("hackernews", Behavior::Ok),
        server.hackernews("slow", Behavior::Slow),
        server.hackernews("throttled", Behavior::RateLimited),
        server.hackernews("broken", Behavior::Broken),
        server.newsapi("news", Behavior::Ok, Some("wrong-key")),
        server.youtube("youtube", Behavior::Ok, Some(EXHAUSTED_API_KEY)),
    ];
    let services = setup_services(providers, |config| {
        config.aggregation.per_provider_timeout = Duration::from_millis(200);
        config.aggregation.overall_deadline = Duration::from_secs(2);
    });

    let response = services.trending.all("alice", false).await.unwrap();
    let result = &response.result;
    assert!(result.partial);
    assert_eq!(result.succeeded_providers.len(), 1);
    assert_eq!(result.succeeded_providers[0].as_str(), "hackernews");
    assert_eq!(result.items.len(), 3);

    let mut failures: Vec<_> = result
        .failed_providers
        .iter()
        .map(|failure| (failure.provider.as_str(), failure.kind))
        .collect();
    failures.sort_by_key(|(provider, _)| *provider);
    assert_eq!(
        failures,
        [
            ("broken", ProviderErrorKind::Unknown),
            ("news", ProviderErrorKind::Unauthenticated),
            ("slow", ProviderErrorKind::Timeout),
            ("throttled", ProviderErrorKind::RateLimited),
            ("youtube", ProviderErrorKind::RateLimited),
        ]
    );
}

#[tokio::test]
async fn test_unconfigured_provider() {
    let server = ProviderServer::new();
    let providers = vec![
        server.hackernews("hackernews", Behavior::Ok),
        server.newsapi("news", Behavior::Ok, None),
    ];
    let services = setup_services(providers, |_| {});

    let response = services.trending.all("alice", false).await.unwrap();
    let result = &response.result;
    assert!(!result.partial);
    assert_eq!(result.fallback_providers.len(), 1);
    assert_eq!(result.fallback_providers[0].as_str(), "news");

    let fallback: Vec<_> = result.items.iter().filter(|item| item.fallback).collect();
    assert_eq!(fallback.len(), 1);
    assert_eq!(fallback[0].score, 0.0);
    assert_eq!(fallback[0].id, "news:news-fallback-1");

    assert_eq!(server.hits("/ok/newsapi/top-headlines"), 0);
}

#[tokio::test]
async fn test_search() {
    let server = ProviderServer::new();
    let services = setup_services(all_providers(&server), |_| {});

    let response = services.trending.search("  rust ").await.unwrap();
    let result = &response.result;
    assert!(!result.partial);
    // hackernews 3, news 2, reddit 2, youtube 2
    assert_eq!(result.items.len(), 9);
    assert!(
        result
            .items
            .iter()
            .filter(|item| item.provider.as_str() == "hackernews")
            .all(|item| item.title.starts_with("rust: "))
    );
    assert_eq!(server.hits("/ok/newsapi/everything"), 1);
    assert_eq!(server.hits("/ok/youtube/search"), 1);

    let response = services.trending.search("rust").await.unwrap();
    assert!(response.cached);
    assert_eq!(server.hits("/ok/hackernews/search"), 1);
}

#[tokio::test]
async fn test_concurrent_sessions() {
    let server = ProviderServer::new();
    let services = setup_services(vec![server.hackernews("hackernews", Behavior::Ok)], |_| {});

    let sessions: Vec<_> = (0..10).map(|i| format!("session-{i}")).collect();
    let responses = join_all(
        sessions
            .iter()
            .map(|session| services.trending.all(session, false)),
    )
    .await;

    for response in responses {
        assert_eq!(response.unwrap().result.items.len(), 3);
    }
    assert_eq!(server.hits("/ok/hackernews/search"), 1);
}

#[tokio::test]
async fn test_single_provider() {
    let server = ProviderServer::new();
    let services = setup_services(all_providers(&server), |_| {});

    let response = services.trending.provider("reddit").await.unwrap().unwrap();
    let mut ids: Vec<_> = response.result.items.iter().map(|i| i.id.as_str()).collect();
    ids.sort();
    assert_eq!(
        ids,
        [
            "reddit:rust2",
            "reddit:rust3",
            "reddit:startups2",
            "reddit:startups3"
        ]
    );
    assert_eq!(server.hits("/ok/hackernews/search"), 0);

    assert!(services.trending.provider("unknown").await.unwrap().is_none());
}

#[tokio::test]
async fn test_health() {
    let server = ProviderServer::new();
    let providers = vec![
        server.hackernews("hackernews", Behavior::Ok),
        server.hackernews("broken", Behavior::Broken),
        server.youtube("youtube", Behavior::Ok, None),
    ];
    let services = setup_services(providers, |_| {});

    let health: Vec<_> = services
        .trending
        .health()
        .await
        .into_iter()
        .map(|health| (health.id.to_string(), health.status, health.error))
        .collect();
    assert_eq!(
        health,
        [
            ("hackernews".to_owned(), ProviderStatus::Available, None),
            (
                "broken".to_owned(),
                ProviderStatus::Error,
                Some(ProviderErrorKind::Unknown)
            ),
            ("youtube".to_owned(), ProviderStatus::NotConfigured, None),
        ]
    );
}
