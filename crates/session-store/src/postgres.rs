use async_trait::async_trait;
use chrono::{Duration, Utc};
use sqlx::PgPool;

use crate::{CacheBackend, Result};

/// PostgreSQL-backed cache using the `wizard_cache` table.
///
/// Expiry is enforced in every query through `expires_at`; expired rows are
/// physically removed by [`PostgresCache::purge_expired`] or when a key is
/// overwritten.
#[derive(Clone)]
pub struct PostgresCache {
    pool: PgPool,
}

impl PostgresCache {
    /// Creates a new PostgreSQL cache backend.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Deletes every expired row. Returns the number of rows removed.
    #[tracing::instrument(skip(self))]
    pub async fn purge_expired(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM wizard_cache WHERE expires_at <= $1")
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl CacheBackend for PostgresCache {
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO wizard_cache (key, value, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (key) DO UPDATE SET
                value = EXCLUDED.value,
                expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now() + ttl)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> = sqlx::query_scalar(
            "SELECT value FROM wizard_cache WHERE key = $1 AND expires_at > $2",
        )
        .bind(key)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        Ok(value)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM wizard_cache WHERE key = $1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE wizard_cache SET expires_at = $2 WHERE key = $1 AND expires_at > $3",
        )
        .bind(key)
        .bind(now + ttl)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
