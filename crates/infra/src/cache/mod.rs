//! Key-value cache contract (sessions and resolved permission sets).
//!
//! The cache store exclusively owns its entries. Callers perform single point
//! operations and never hold values beyond one check; concurrent writers to
//! the same key resolve as last-write-wins.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

mod in_memory;
#[cfg(feature = "redis")]
mod redis;

pub use in_memory::InMemoryCacheStore;
#[cfg(feature = "redis")]
pub use self::redis::RedisCacheStore;

#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    #[error("cache connection error: {0}")]
    Connection(String),

    #[error("cache command error: {0}")]
    Command(String),
}

/// Key-value store with per-entry expiry.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Read a live entry.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Write (replace) an entry that expires after `ttl`.
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;

    /// Remove an entry. Returns whether a live entry existed.
    async fn delete(&self, key: &str) -> Result<bool, CacheError>;

    /// Remaining time-to-live.
    ///
    /// `None` when the entry is absent, already expired, or has no expiry at
    /// all: none of those count as live.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, CacheError>;
}

#[async_trait]
impl<S> CacheStore for Arc<S>
where
    S: CacheStore + ?Sized,
{
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        (**self).set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        (**self).delete(key).await
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, CacheError> {
        (**self).ttl(key).await
    }
}
