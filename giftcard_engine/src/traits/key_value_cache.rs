use std::time::Duration;

use thiserror::Error;

/// Short-TTL key-value storage plus the atomic set-if-absent primitive the distributed locks are
/// built on.
///
/// Locks are always TTL-bounded: a crashed holder releases automatically when the TTL lapses, and
/// callers must tolerate losing a lock before their work completes — work that outlives the TTL is
/// unsafe under this scheme.
#[allow(async_fn_in_trait)]
pub trait KeyValueCache {
    async fn get_value(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set_value(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    /// Returns the number of keys actually removed. Deleting an absent key is not an error.
    async fn delete_value(&self, key: &str) -> Result<u64, CacheError>;

    /// Atomic `SET NX EX`. Returns `false` when another holder owns the key.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, CacheError>;

    /// Increments a counter key, returning the new value. Used for rate-limit windows.
    async fn increment(&self, key: &str) -> Result<i64, CacheError>;

    /// Sets or refreshes the TTL on an existing key.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), CacheError>;
}

#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("Cache transport error: {0}")]
    Transport(String),
}
