//! Redis-backed implementation of the short-TTL cache and distributed-lock primitive.
//!
//! One [`RedisCache`] wraps a multiplexed connection manager and is cheap to clone; every
//! component that needs a lock or a cached value borrows a clone rather than reaching for a
//! process-wide singleton.

use std::time::Duration;

use log::info;
use redis::{aio::ConnectionManager, AsyncCommands};

use crate::traits::{CacheError, KeyValueCache};

#[derive(Clone)]
pub struct RedisCache {
    manager: ConnectionManager,
}

impl RedisCache {
    /// Opens a connection and verifies it with a PING. Fails fast when the store is unreachable.
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(url).map_err(|e| CacheError::Transport(e.to_string()))?;
        let manager = ConnectionManager::new(client).await.map_err(|e| CacheError::Transport(e.to_string()))?;
        let cache = Self { manager };
        cache.ping().await?;
        info!("🔑️ Connected to the cache store");
        Ok(cache)
    }

    pub async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.manager.clone();
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map_err(|e| CacheError::Transport(e.to_string()))?;
        Ok(())
    }
}

impl KeyValueCache for RedisCache {
    async fn get_value(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.manager.clone();
        let value: Option<String> = conn.get(key).await.map_err(|e| CacheError::Transport(e.to_string()))?;
        Ok(value)
    }

    async fn set_value(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.manager.clone();
        let _: () = conn
            .set_ex(key, value, ttl.as_secs())
            .await
            .map_err(|e| CacheError::Transport(e.to_string()))?;
        Ok(())
    }

    async fn delete_value(&self, key: &str) -> Result<u64, CacheError> {
        let mut conn = self.manager.clone();
        let removed: u64 = conn.del(key).await.map_err(|e| CacheError::Transport(e.to_string()))?;
        Ok(removed)
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, CacheError> {
        let mut conn = self.manager.clone();
        // SET NX EX in a single round trip keeps the lock acquisition atomic.
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs())
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::Transport(e.to_string()))?;
        Ok(reply.is_some())
    }

    async fn increment(&self, key: &str) -> Result<i64, CacheError> {
        let mut conn = self.manager.clone();
        let count: i64 = conn.incr(key, 1).await.map_err(|e| CacheError::Transport(e.to_string()))?;
        Ok(count)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.manager.clone();
        let _: bool = conn
            .expire(key, ttl.as_secs() as i64)
            .await
            .map_err(|e| CacheError::Transport(e.to_string()))?;
        Ok(())
    }
}

/// Builds a redis connection URL from the configured parts.
pub fn redis_url(host: &str, port: u16, password: Option<&str>, db: i64) -> String {
    match password {
        Some(p) if !p.is_empty() => format!("redis://:{p}@{host}:{port}/{db}"),
        _ => format!("redis://{host}:{port}/{db}"),
    }
}

/// A fixed-window rate limiter over the cache counter primitives. Returns `true` while the caller
/// is within `limit` calls for the current window.
pub async fn within_rate_limit<C: KeyValueCache>(
    cache: &C,
    key: &str,
    limit: i64,
    window: Duration,
) -> Result<bool, CacheError> {
    let count = cache.increment(key).await?;
    if count == 1 {
        // First hit opens the window.
        cache.expire(key, window).await?;
    }
    Ok(count <= limit)
}
