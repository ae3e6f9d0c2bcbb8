//! Durable KV backed by the relational store. Same contract as `MemoryKv`;
//! survives process restart, which is what boot recovery builds on.

use super::{KvError, KvResult, KvStore};
use crate::db::DbPool;
use async_trait::async_trait;
use std::time::Duration;

pub struct SqliteKv {
    pool: DbPool,
}

impl SqliteKv {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn now_ms() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

fn db_err(e: sqlx::Error) -> KvError {
    KvError(e.to_string())
}

#[async_trait]
impl KvStore for SqliteKv {
    async fn get(&self, key: &str) -> KvResult<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT value FROM kv WHERE key = ? AND (expires_at IS NULL OR expires_at > ?)",
        )
        .bind(key)
        .bind(Self::now_ms())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.map(|(v,)| v))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> KvResult<()> {
        let expires_at = ttl.map(|t| Self::now_ms() + t.as_millis() as i64);
        sqlx::query(
            "INSERT INTO kv (key, value, expires_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at",
        )
        .bind(key)
        .bind(value)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> KvResult<bool> {
        let now = Self::now_ms();
        let expires_at = now + ttl.as_millis() as i64;
        // A single guarded upsert keeps this atomic under sqlite's writer
        // lock: the update half only fires when the existing row is expired.
        let result = sqlx::query(
            "INSERT INTO kv (key, value, expires_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at
             WHERE kv.expires_at IS NOT NULL AND kv.expires_at <= ?",
        )
        .bind(key)
        .bind(value)
        .bind(expires_at)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, key: &str) -> KvResult<()> {
        sqlx::query("DELETE FROM kv WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn keys_with_prefix(&self, prefix: &str) -> KvResult<Vec<String>> {
        // Escape LIKE wildcards so a literal prefix scan stays literal.
        let pattern = format!(
            "{}%",
            prefix.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
        );
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT key FROM kv WHERE key LIKE ? ESCAPE '\\' AND (expires_at IS NULL OR expires_at > ?)",
        )
        .bind(pattern)
        .bind(Self::now_ms())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.into_iter().map(|(k,)| k).collect())
    }
}
