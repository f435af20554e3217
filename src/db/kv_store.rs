use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;

use crate::db::models::KvRow;
use crate::db::KvStore;
use crate::error::Result;

/// `KvStore` over the SQLite `kv_store` table.
#[derive(Clone)]
pub struct SqliteKvStore {
    pool: sqlx::SqlitePool,
}

impl SqliteKvStore {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl KvStore for SqliteKvStore {
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let row = sqlx::query_as::<_, KvRow>(
            "SELECT value FROM kv_store WHERE key = ?",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| r.value))
    }

    async fn save(&self, key: &str, value: &[u8]) -> Result<()> {
        let updated_at = now_ms() as i64;
        sqlx::query(
            r#"
            INSERT INTO kv_store (key, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM kv_store WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
