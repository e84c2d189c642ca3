use async_trait::async_trait;
use chrono::Duration;

use crate::Result;

/// A string key/value cache with per-entry time-to-live.
///
/// Expired entries must never be returned by `get`, whether or not the
/// backend has physically removed them yet.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Stores `value` under `key`, replacing any previous value and TTL.
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()>;

    /// Returns the live value for `key`.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Removes `key`. Removing an absent key succeeds.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Resets the TTL of a live entry. Returns false if the key is absent.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool>;
}
