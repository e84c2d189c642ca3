use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use common::{Clock, SystemClock};
use tokio::sync::RwLock;

use crate::{CacheBackend, Result, SessionStoreError};

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    expires_at: DateTime<Utc>,
}

/// In-memory cache backend.
///
/// Entries are evicted lazily on access. Time comes from the injected
/// [`Clock`] so tests can expire entries without waiting.
#[derive(Clone)]
pub struct InMemoryCache {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
    clock: Arc<dyn Clock>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryCache {
    /// Creates an empty cache driven by the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates an empty cache driven by `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            clock,
            unavailable: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Makes every subsequent operation fail, simulating an outage.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Returns the number of physically stored entries, live or not.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Returns true if `key` is physically stored, ignoring expiry.
    pub async fn contains_raw(&self, key: &str) -> bool {
        self.entries.read().await.contains_key(key)
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SessionStoreError::Unavailable(
                "in-memory cache marked unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheBackend for InMemoryCache {
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        self.check_available()?;
        let expires_at = self.clock.now() + ttl;
        self.entries
            .write()
            .await
            .insert(key.to_string(), CacheEntry { value, expires_at });
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.check_available()?;
        let now = self.clock.now();

        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                None => return Ok(None),
                Some(entry) if entry.expires_at > now => return Ok(Some(entry.value.clone())),
                Some(_) => {}
            }
        }

        // Expired: evict under the write lock, re-checking in case it was refreshed.
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get(key) {
            if entry.expires_at > now {
                return Ok(Some(entry.value.clone()));
            }
            entries.remove(key);
        }
        Ok(None)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.check_available()?;
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        self.check_available()?;
        let now = self.clock.now();
        let mut entries = self.entries.write().await;

        match entries.get_mut(key) {
            Some(entry) if entry.expires_at > now => {
                entry.expires_at = now + ttl;
                Ok(true)
            }
            Some(_) => {
                entries.remove(key);
                Ok(false)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::ManualClock;

    fn cache() -> (InMemoryCache, ManualClock) {
        let clock = ManualClock::default();
        (InMemoryCache::with_clock(Arc::new(clock.clone())), clock)
    }

    #[tokio::test]
    async fn set_and_get() {
        let (cache, _) = cache();
        cache
            .set("k", "v".to_string(), Duration::minutes(1))
            .await
            .unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some("v".to_string()));
        assert_eq!(cache.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn expired_entries_are_evicted_on_read() {
        let (cache, clock) = cache();
        cache
            .set("k", "v".to_string(), Duration::minutes(30))
            .await
            .unwrap();

        clock.advance(Duration::minutes(30));

        assert_eq!(cache.get("k").await.unwrap(), None);
        assert!(!cache.contains_raw("k").await);
    }

    #[tokio::test]
    async fn expire_extends_live_entries_only() {
        let (cache, clock) = cache();
        cache
            .set("k", "v".to_string(), Duration::minutes(10))
            .await
            .unwrap();

        clock.advance(Duration::minutes(9));
        assert!(cache.expire("k", Duration::minutes(10)).await.unwrap());

        clock.advance(Duration::minutes(9));
        assert_eq!(cache.get("k").await.unwrap(), Some("v".to_string()));

        clock.advance(Duration::minutes(2));
        assert!(!cache.expire("k", Duration::minutes(10)).await.unwrap());
        assert!(!cache.expire("missing", Duration::minutes(10)).await.unwrap());
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let (cache, _) = cache();
        cache
            .set("k", "v".to_string(), Duration::minutes(1))
            .await
            .unwrap();
        cache.delete("k").await.unwrap();
        cache.delete("k").await.unwrap();
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn unavailable_cache_fails_every_operation() {
        let (cache, _) = cache();
        cache.set_unavailable(true);

        assert!(matches!(
            cache.get("k").await,
            Err(SessionStoreError::Unavailable(_))
        ));
        assert!(
            cache
                .set("k", "v".to_string(), Duration::minutes(1))
                .await
                .is_err()
        );

        cache.set_unavailable(false);
        assert!(cache.get("k").await.unwrap().is_none());
    }
}
