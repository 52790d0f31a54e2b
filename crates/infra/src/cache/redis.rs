//! Redis-backed cache store (optional).
//!
//! Uses one multiplexed async connection shared by all requests. TTLs are
//! written and read with millisecond precision (`PSETEX` / `PTTL`).

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;

use super::{CacheError, CacheStore};

#[derive(Clone)]
pub struct RedisCacheStore {
    conn: MultiplexedConnection,
}

impl core::fmt::Debug for RedisCacheStore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RedisCacheStore").finish_non_exhaustive()
    }
}

impl RedisCacheStore {
    /// Connect to Redis (e.g. "redis://localhost:6379").
    pub async fn connect(redis_url: impl AsRef<str>) -> Result<Self, CacheError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| CacheError::Connection(e.to_string()))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| CacheError::Connection(e.to_string()))?;
        Ok(Self { conn })
    }
}

fn command_error(e: redis::RedisError) -> CacheError {
    if e.is_connection_dropped() || e.is_io_error() || e.is_timeout() {
        CacheError::Connection(e.to_string())
    } else {
        CacheError::Command(e.to_string())
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.conn.clone();
        redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(command_error)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);

        if millis == 0 {
            let _: i64 = redis::cmd("DEL")
                .arg(key)
                .query_async(&mut conn)
                .await
                .map_err(command_error)?;
            return Ok(());
        }

        redis::cmd("PSETEX")
            .arg(key)
            .arg(millis)
            .arg(value)
            .query_async(&mut conn)
            .await
            .map_err(command_error)
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.conn.clone();
        let removed: i64 = redis::cmd("DEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(command_error)?;
        Ok(removed > 0)
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, CacheError> {
        let mut conn = self.conn.clone();
        // -2: absent, -1: no expiry.
        let millis: i64 = redis::cmd("PTTL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(command_error)?;

        Ok(u64::try_from(millis)
            .ok()
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis))
    }
}
