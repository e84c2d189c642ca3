use std::sync::Arc;

use common::{Clock, SessionId};
use domain::{ConfirmOutcome, WizardSession};

use crate::keys::{idempotency_key, idempotency_ttl, result_key, session_key};
use crate::{CacheBackend, Result, SessionStoreError};

/// Typed access to wizard sessions and idempotency records in a cache.
///
/// Every read re-checks the session's own `expires_at` against the clock,
/// so a session the cache still holds (TTL/clock skew) is reported absent
/// and removed.
#[derive(Clone)]
pub struct SessionStore<B: CacheBackend> {
    backend: B,
    clock: Arc<dyn Clock>,
}

impl<B: CacheBackend> SessionStore<B> {
    pub fn new(backend: B, clock: Arc<dyn Clock>) -> Self {
        Self { backend, clock }
    }

    /// Returns the underlying cache backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Serializes and stores the session.
    ///
    /// The cache TTL runs out at the session's `expires_at`, so re-saving
    /// after a decision does not extend its life.
    #[tracing::instrument(skip(self, session), fields(session_id = %session.id()))]
    pub async fn save(&self, session: &WizardSession) -> Result<()> {
        let payload = serde_json::to_string(session)?;
        let ttl = session.remaining_ttl(self.clock.now());
        self.backend
            .set(&session_key(session.id()), payload, ttl)
            .await
    }

    /// Loads a live session.
    #[tracing::instrument(skip(self))]
    pub async fn get(&self, id: SessionId) -> Result<Option<WizardSession>> {
        let key = session_key(id);
        let Some(payload) = self.backend.get(&key).await? else {
            return Ok(None);
        };

        let session: WizardSession = serde_json::from_str(&payload)?;
        if session.is_expired(self.clock.now()) {
            tracing::debug!(%id, expires_at = %session.expires_at(), "evicting expired session");
            self.backend.delete(&key).await?;
            return Ok(None);
        }

        Ok(Some(session))
    }

    /// Removes a session. Removing an absent session succeeds.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, id: SessionId) -> Result<()> {
        self.backend.delete(&session_key(id)).await
    }

    /// Re-aligns the cache TTL of a live session with its `expires_at`.
    ///
    /// This only repairs the cache entry, for example after it was written
    /// with a longer TTL; it never keeps a session alive past `expires_at`.
    /// Returns false if the session is absent or expired.
    #[tracing::instrument(skip(self))]
    pub async fn extend_ttl(&self, id: SessionId) -> Result<bool> {
        let Some(session) = self.get(id).await? else {
            return Ok(false);
        };
        let ttl = session.remaining_ttl(self.clock.now());
        self.backend.expire(&session_key(id), ttl).await
    }

    /// Records that a confirm request carrying `key` completed `session_id`.
    #[tracing::instrument(skip(self))]
    pub async fn save_idempotency_key(&self, key: &str, session_id: SessionId) -> Result<()> {
        self.backend
            .set(&idempotency_key(key), session_id.to_string(), idempotency_ttl())
            .await
    }

    /// Returns the session completed under `key`, if any.
    #[tracing::instrument(skip(self))]
    pub async fn get_idempotency_key(&self, key: &str) -> Result<Option<SessionId>> {
        let cache_key = idempotency_key(key);
        match self.backend.get(&cache_key).await? {
            Some(value) => value
                .parse::<SessionId>()
                .map(Some)
                .map_err(|e| SessionStoreError::CorruptEntry {
                    key: cache_key,
                    reason: e.to_string(),
                }),
            None => Ok(None),
        }
    }

    /// Caches the outcome of a completed confirm for replay.
    #[tracing::instrument(skip(self, outcome), fields(session_id = %outcome.session_id))]
    pub async fn save_result(&self, outcome: &ConfirmOutcome) -> Result<()> {
        let payload = serde_json::to_string(outcome)?;
        self.backend
            .set(&result_key(outcome.session_id), payload, idempotency_ttl())
            .await
    }

    /// Returns the cached outcome of a completed confirm.
    #[tracing::instrument(skip(self))]
    pub async fn get_result(&self, session_id: SessionId) -> Result<Option<ConfirmOutcome>> {
        match self.backend.get(&result_key(session_id)).await? {
            Some(payload) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }
}
