use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use tokio::time::Instant;

use super::{CacheError, CacheKey, CacheStore, LocalCacheConfig};

#[derive(Debug)]
struct Entry {
    value: Bytes,
    stored_at: Instant,
    ttl: Duration,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) > self.ttl
    }
}

/// Statistics of the in-process tier.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct MemoryStats {
    /// Number of entries currently held, including ones not yet swept.
    pub entries: usize,
    /// The configured capacity.
    pub max_entries: usize,
}

/// The in-process cache tier.
///
/// A size-bounded map: when a new key is inserted into a full store, expired entries are
/// dropped first, then the entry with the oldest `stored_at`. Overwriting an existing key never
/// evicts anything.
#[derive(Debug)]
pub struct MemoryStore {
    entries: Mutex<HashMap<CacheKey, Entry>>,
    max_entries: usize,
}

impl MemoryStore {
    pub fn new(config: &LocalCacheConfig) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_entries: config.max_entries.max(1),
        }
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<CacheKey, Entry>> {
        // entries are replaced whole, a panic can not leave one half-written
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Removes all expired entries, returning how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before - entries.len();
        if removed > 0 {
            tracing::debug!(removed, "Swept expired entries from memory cache");
            metric!(counter("caches.memory.swept") += removed as i64);
        }
        metric!(gauge("caches.memory.entries") = entries.len() as u64);
        removed
    }

    /// Spawns a task periodically calling [`sweep`](Self::sweep).
    ///
    /// The task holds a weak reference only, and ends once the store is dropped.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        runtime: &tokio::runtime::Handle,
        interval: Duration,
    ) -> tokio::task::JoinHandle<()> {
        let store = Arc::downgrade(self);
        runtime.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // the first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match store.upgrade() {
                    Some(store) => {
                        store.sweep();
                    }
                    None => break,
                }
            }
        })
    }

    pub fn stats(&self) -> MemoryStats {
        MemoryStats {
            entries: self.entries().len(),
            max_entries: self.max_entries,
        }
    }

    /// Looks up `key` together with the time it has left to live.
    pub(super) fn get_with_ttl(&self, key: &CacheKey) -> Option<(Bytes, Duration)> {
        let now = Instant::now();
        let entries = self.entries();
        let entry = entries.get(key).filter(|entry| !entry.is_expired(now))?;
        let remaining = entry
            .ttl
            .saturating_sub(now.saturating_duration_since(entry.stored_at));
        (!remaining.is_zero()).then(|| (entry.value.clone(), remaining))
    }

    fn make_room(&self, entries: &mut HashMap<CacheKey, Entry>, now: Instant) {
        if entries.len() < self.max_entries {
            return;
        }
        entries.retain(|_, entry| !entry.is_expired(now));

        while entries.len() >= self.max_entries {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.stored_at)
                .map(|(key, _)| key.clone());
            let Some(oldest) = oldest else {
                break;
            };
            entries.remove(&oldest);
            metric!(counter("caches.memory.evicted") += 1);
        }
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &CacheKey) -> Result<Option<Bytes>, CacheError> {
        let now = Instant::now();
        let mut entries = self.entries();
        match entries.get(key) {
            Some(entry) if entry.is_expired(now) => {
                entries.remove(key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.value.clone())),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &CacheKey, value: Bytes, ttl: Duration) -> Result<(), CacheError> {
        let now = Instant::now();
        let mut entries = self.entries();
        if !entries.contains_key(key) {
            self.make_room(&mut entries, now);
        }
        entries.insert(
            key.clone(),
            Entry {
                value,
                stored_at: now,
                ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> Result<(), CacheError> {
        self.entries().remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        self.entries().clear();
        Ok(())
    }

    async fn ping(&self) -> Result<(), CacheError> {
        Ok(())
    }
}
