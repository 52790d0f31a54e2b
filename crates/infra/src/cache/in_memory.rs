use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use super::{CacheError, CacheStore};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn remaining(&self, now: Instant) -> Option<Duration> {
        self.expires_at
            .checked_duration_since(now)
            .filter(|d| !d.is_zero())
    }
}

/// In-memory TTL cache for tests/dev and single-instance deployments.
///
/// Expiry uses `tokio::time`, so tests can pause and advance the clock.
/// Expired entries are dropped lazily on write.
#[derive(Debug, Default)]
pub struct InMemoryCacheStore {
    inner: RwLock<HashMap<String, Entry>>,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries still live.
    pub fn live_entries(&self) -> usize {
        let now = Instant::now();
        self.inner
            .read()
            .map(|map| map.values().filter(|e| e.remaining(now).is_some()).count())
            .unwrap_or(0)
    }
}

fn poisoned<T>(_: T) -> CacheError {
    CacheError::Command("in-memory cache lock poisoned".to_string())
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = Instant::now();
        let map = self.inner.read().map_err(poisoned)?;
        Ok(map
            .get(key)
            .filter(|e| e.remaining(now).is_some())
            .map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let now = Instant::now();
        let mut map = self.inner.write().map_err(poisoned)?;
        map.retain(|_, e| e.remaining(now).is_some());

        if ttl.is_zero() {
            map.remove(key);
            return Ok(());
        }

        map.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let now = Instant::now();
        let mut map = self.inner.write().map_err(poisoned)?;
        Ok(map.remove(key).is_some_and(|e| e.remaining(now).is_some()))
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, CacheError> {
        let now = Instant::now();
        let map = self.inner.read().map_err(poisoned)?;
        Ok(map.get(key).and_then(|e| e.remaining(now)))
    }
}
