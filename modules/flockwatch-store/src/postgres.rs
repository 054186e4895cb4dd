use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;

use crate::error::Result;
use crate::kv::{expiry, KeyValueStore};

/// Postgres-backed store. One row per key; an expired row is invisible to
/// reads and reclaimable by `put_if_absent`, so correctness never depends
/// on `purge_expired` running.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPool::connect(url).await?;
        Ok(Self { pool })
    }

    /// Create the backing table if it does not exist.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS flockwatch_kv (
                key        TEXT        PRIMARY KEY,
                value      BYTEA       NOT NULL,
                expires_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Drop expired rows. Housekeeping for operators on a cron.
    pub async fn purge_expired(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM flockwatch_kv WHERE expires_at <= now()")
            .execute(&self.pool)
            .await?;
        let purged = result.rows_affected();
        if purged > 0 {
            debug!(purged, "Purged expired store rows");
        }
        Ok(purged)
    }
}

#[async_trait]
impl KeyValueStore for PostgresStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let row = sqlx::query_as::<_, (Vec<u8>,)>(
            "SELECT value FROM flockwatch_kv WHERE key = $1 AND expires_at > now()",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(value,)| value))
    }

    async fn put(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO flockwatch_kv (key, value, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (key) DO UPDATE
            SET value = EXCLUDED.value, expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(expiry(ttl))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn put_if_absent(&self, key: &str, value: &[u8], ttl: Duration) -> Result<bool> {
        // The conditional upsert claims the key in one statement: a fresh
        // insert or a takeover of an expired row counts as a win, a live
        // row leaves rows_affected at zero.
        let result = sqlx::query(
            r#"
            INSERT INTO flockwatch_kv (key, value, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (key) DO UPDATE
            SET value = EXCLUDED.value, expires_at = EXCLUDED.expires_at
            WHERE flockwatch_kv.expires_at <= now()
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(expiry(ttl))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM flockwatch_kv WHERE key = $1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let rows = sqlx::query_as::<_, (String,)>(
            "SELECT key FROM flockwatch_kv WHERE key LIKE $1 AND expires_at > now()",
        )
        .bind(format!("{prefix}%"))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(key,)| key).collect())
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
