use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::*;

/// A remote tier that can be switched off.
#[derive(Debug)]
struct FlakyStore {
    inner: MemoryStore,
    down: AtomicBool,
}

impl FlakyStore {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryStore::new(&LocalCacheConfig::default()),
            down: AtomicBool::new(false),
        })
    }

    fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), CacheError> {
        if self.down.load(Ordering::SeqCst) {
            Err(CacheError::Unavailable("connection refused".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CacheStore for FlakyStore {
    fn name(&self) -> &'static str {
        "flaky"
    }

    async fn get(&self, key: &CacheKey) -> Result<Option<Bytes>, CacheError> {
        self.check()?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &CacheKey, value: Bytes, ttl: Duration) -> Result<(), CacheError> {
        self.check()?;
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, key: &CacheKey) -> Result<(), CacheError> {
        self.check()?;
        self.inner.delete(key).await
    }

    async fn clear(&self) -> Result<(), CacheError> {
        self.check()?;
        self.inner.clear().await
    }

    async fn ping(&self) -> Result<(), CacheError> {
        self.check()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Payload {
    title: String,
    score: u32,
}

fn payload() -> Payload {
    Payload {
        title: "Rust 2024 is out".into(),
        score: 42,
    }
}

fn local_store(max_entries: usize) -> Arc<MemoryStore> {
    Arc::new(MemoryStore::new(&LocalCacheConfig {
        max_entries,
        ..Default::default()
    }))
}

const HOUR: Duration = Duration::from_secs(3600);

#[tokio::test]
async fn test_memory_round_trip() {
    signalhub_test::setup();
    let store = local_store(10);
    let key = CacheKey::for_testing("round-trip");

    assert_eq!(store.get(&key).await.unwrap(), None);
    store.set(&key, Bytes::from_static(b"v1"), HOUR).await.unwrap();
    assert_eq!(store.get(&key).await.unwrap(), Some(Bytes::from_static(b"v1")));

    store.set(&key, Bytes::from_static(b"v2"), HOUR).await.unwrap();
    assert_eq!(store.get(&key).await.unwrap(), Some(Bytes::from_static(b"v2")));

    store.delete(&key).await.unwrap();
    assert_eq!(store.get(&key).await.unwrap(), None);
}

#[tokio::test(start_paused = true)]
async fn test_memory_expiry() {
    signalhub_test::setup();
    let store = local_store(10);
    let key = CacheKey::for_testing("expiry");

    store
        .set(&key, Bytes::from_static(b"short"), Duration::from_millis(50))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(40)).await;
    assert!(store.get(&key).await.unwrap().is_some());

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(store.get(&key).await.unwrap(), None);
}

#[tokio::test(start_paused = true)]
async fn test_memory_evicts_oldest() {
    signalhub_test::setup();
    let store = local_store(3);
    let keys: Vec<_> = (0..4)
        .map(|i| CacheKey::for_testing(format!("key-{i}")))
        .collect();

    for key in &keys[..3] {
        store.set(key, Bytes::from_static(b"x"), HOUR).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    // overwriting an existing key never evicts
    store
        .set(&keys[1], Bytes::from_static(b"y"), HOUR)
        .await
        .unwrap();
    assert_eq!(store.stats().entries, 3);

    store.set(&keys[3], Bytes::from_static(b"z"), HOUR).await.unwrap();
    assert_eq!(store.stats().entries, 3);
    assert_eq!(store.get(&keys[0]).await.unwrap(), None);
    assert_eq!(
        store.get(&keys[3]).await.unwrap(),
        Some(Bytes::from_static(b"z"))
    );
    assert!(store.get(&keys[1]).await.unwrap().is_some());
}

#[tokio::test(start_paused = true)]
async fn test_memory_sweep() {
    signalhub_test::setup();
    let store = local_store(10);
    let short = CacheKey::for_testing("short");
    let long = CacheKey::for_testing("long");

    store
        .set(&short, Bytes::from_static(b"x"), Duration::from_secs(1))
        .await
        .unwrap();
    store.set(&long, Bytes::from_static(b"x"), HOUR).await.unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;

    assert_eq!(store.sweep(), 1);
    assert_eq!(store.stats().entries, 1);
}

#[tokio::test(start_paused = true)]
async fn test_memory_sweeper_task() {
    signalhub_test::setup();
    let store = local_store(10);
    let key = CacheKey::for_testing("swept");
    store
        .set(&key, Bytes::from_static(b"x"), Duration::from_secs(1))
        .await
        .unwrap();

    let handle = store.spawn_sweeper(&tokio::runtime::Handle::current(), Duration::from_secs(60));
    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(store.stats().entries, 0);

    drop(store);
    tokio::time::sleep(Duration::from_secs(61)).await;
    assert!(handle.is_finished());
}

#[tokio::test]
async fn test_tiered_typed_round_trip() {
    signalhub_test::setup();
    let remote = FlakyStore::new();
    let cache = TieredCache::new(local_store(10), Some(remote.clone() as Arc<dyn CacheStore>));
    let key = CacheKey::for_testing("typed");

    assert_eq!(cache.get::<Payload>(&key).await, None);
    cache.set(&key, &payload(), HOUR).await;
    assert_eq!(cache.get::<Payload>(&key).await, Some(payload()));

    // written through to the remote tier
    assert!(remote.inner.get(&key).await.unwrap().is_some());
}

#[tokio::test]
async fn test_tiered_remote_answer_is_final() {
    signalhub_test::setup();
    let local = local_store(10);
    let remote = FlakyStore::new();
    let cache = TieredCache::new(local.clone(), Some(remote.clone() as Arc<dyn CacheStore>));
    let key = CacheKey::for_testing("remote-miss");

    local.set(&key, Bytes::from_static(b"\"local\""), HOUR).await.unwrap();
    assert_eq!(cache.get::<String>(&key).await, None);
}

#[tokio::test]
async fn test_tiered_falls_back_on_remote_outage() {
    signalhub_test::setup();
    let remote = FlakyStore::new();
    let cache = TieredCache::new(local_store(10), Some(remote.clone() as Arc<dyn CacheStore>));
    let key = CacheKey::for_testing("outage");

    cache.set(&key, &payload(), HOUR).await;
    remote.set_down(true);

    assert_eq!(cache.get::<Payload>(&key).await, Some(payload()));
    assert!(!cache.is_remote_healthy());

    let other = CacheKey::for_testing("outage-2");
    cache.set(&other, &payload(), HOUR).await;
    assert_eq!(cache.get::<Payload>(&other).await, Some(payload()));
}

#[tokio::test]
async fn test_tiered_overwrite_during_outage_survives_recovery() {
    signalhub_test::setup();
    let remote = FlakyStore::new();
    let cache = TieredCache::new(local_store(10), Some(remote.clone() as Arc<dyn CacheStore>));
    let key = CacheKey::for_testing("overwritten");

    cache.set(&key, &"v1", HOUR).await;
    remote.set_down(true);
    assert_eq!(cache.get::<String>(&key).await.as_deref(), Some("v1"));
    cache.set(&key, &"v2", HOUR).await;

    remote.set_down(false);
    assert!(cache.probe_remote().await);
    assert_eq!(cache.get::<String>(&key).await.as_deref(), Some("v2"));
    assert_eq!(
        remote.inner.get(&key).await.unwrap(),
        Some(Bytes::from_static(b"\"v2\""))
    );
}

#[tokio::test]
async fn test_tiered_delete_during_outage_survives_recovery() {
    signalhub_test::setup();
    let remote = FlakyStore::new();
    let cache = TieredCache::new(local_store(10), Some(remote.clone() as Arc<dyn CacheStore>));
    let key = CacheKey::for_testing("deleted");

    cache.set(&key, &"v1", HOUR).await;
    remote.set_down(true);
    cache.delete(&key).await;
    assert!(!cache.is_remote_healthy());

    remote.set_down(false);
    assert!(cache.probe_remote().await);
    assert_eq!(cache.get::<String>(&key).await, None);
    assert_eq!(remote.inner.get(&key).await.unwrap(), None);
}

#[tokio::test]
async fn test_tiered_clear_during_outage_survives_recovery() {
    signalhub_test::setup();
    let remote = FlakyStore::new();
    let cache = TieredCache::new(local_store(10), Some(remote.clone() as Arc<dyn CacheStore>));
    let old = CacheKey::for_testing("before-clear");
    let new = CacheKey::for_testing("after-clear");

    cache.set(&old, &"v1", HOUR).await;
    remote.set_down(true);
    cache.clear().await;
    cache.set(&new, &"v2", HOUR).await;

    remote.set_down(false);
    assert!(cache.probe_remote().await);
    assert_eq!(cache.get::<String>(&old).await, None);
    assert_eq!(cache.get::<String>(&new).await.as_deref(), Some("v2"));
}

#[tokio::test]
async fn test_tiered_probe_recovers() {
    signalhub_test::setup();
    let remote = FlakyStore::new();
    let cache = TieredCache::new(local_store(10), Some(remote.clone() as Arc<dyn CacheStore>));

    remote.set_down(true);
    assert!(!cache.probe_remote().await);
    assert!(!cache.is_remote_healthy());

    remote.set_down(false);
    assert!(cache.probe_remote().await);
    assert!(cache.is_remote_healthy());

    let key = CacheKey::for_testing("recovered");
    cache.set(&key, &payload(), HOUR).await;
    assert!(remote.inner.get(&key).await.unwrap().is_some());
}

#[tokio::test(start_paused = true)]
async fn test_tiered_background_probe() {
    signalhub_test::setup();
    let remote = FlakyStore::new();
    let cache = Arc::new(TieredCache::new(local_store(10), Some(remote.clone() as Arc<dyn CacheStore>)));
    let runtime = tokio::runtime::Handle::current();
    cache
        .spawn_health_probe(&runtime, Duration::from_secs(5))
        .unwrap();

    remote.set_down(true);
    tokio::time::sleep(Duration::from_secs(6)).await;
    assert!(!cache.is_remote_healthy());

    remote.set_down(false);
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(cache.is_remote_healthy());
}

#[tokio::test]
async fn test_tiered_without_remote() {
    signalhub_test::setup();
    let cache = Arc::new(TieredCache::new(local_store(10), None));
    let key = CacheKey::for_testing("local-only");

    cache.set(&key, &payload(), HOUR).await;
    assert_eq!(cache.get::<Payload>(&key).await, Some(payload()));
    assert!(!cache.probe_remote().await);
    assert!(
        cache
            .spawn_health_probe(&tokio::runtime::Handle::current(), HOUR)
            .is_none()
    );

    cache.clear().await;
    assert_eq!(cache.get::<Payload>(&key).await, None);
}

#[tokio::test]
async fn test_tiered_malformed_is_miss() {
    signalhub_test::setup();
    let local = local_store(10);
    let cache = TieredCache::new(local.clone(), None);
    let key = CacheKey::for_testing("malformed");

    local
        .set(&key, Bytes::from_static(b"{not json"), HOUR)
        .await
        .unwrap();
    assert_eq!(cache.get::<Payload>(&key).await, None);
}

#[tokio::test]
async fn test_tiered_stats() {
    signalhub_test::setup();
    let remote = FlakyStore::new();
    let cache = TieredCache::new(local_store(2000), Some(remote.clone() as Arc<dyn CacheStore>));
    cache
        .set(&CacheKey::for_testing("a"), &payload(), HOUR)
        .await;
    remote.set_down(true);
    cache.probe_remote().await;

    insta::assert_yaml_snapshot!(cache.stats(), @r###"
    local:
      entries: 1
      max_entries: 2000
    remote:
      backend: flaky
      healthy: false
    "###);
}
