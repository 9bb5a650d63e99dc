//! Token usage accounting (ambient addition: per-model usage history for
//! the Model Router's `GetStats` and future cost reporting).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::database::sqlite::SqlitePool;
use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UsageRecord {
    pub id: i64,
    pub model: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub source: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct UsageStore {
    pool: SqlitePool,
}

impl UsageStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn record(&self, model: &str, input_tokens: u32, output_tokens: u32, source: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO usage_records (model, input_tokens, output_tokens, source) VALUES (?, ?, ?, ?)",
        )
        .bind(model)
        .bind(input_tokens as i64)
        .bind(output_tokens as i64)
        .bind(source)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn total_tokens_for_model(&self, model: &str) -> Result<i64> {
        let row: (Option<i64>,) = sqlx::query_as(
            "SELECT SUM(input_tokens + output_tokens) FROM usage_records WHERE model = ?",
        )
        .bind(model)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0.unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SqliteConfig;
    use crate::database::sqlite::{open_pool, run_migrations};

    #[tokio::test]
    async fn test_record_and_sum() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("usage.db");
        let config = SqliteConfig {
            path: path.to_string_lossy().to_string(),
            ..Default::default()
        };
        let pool = open_pool(&config).await.unwrap();
        run_migrations(&pool).await.unwrap();
        let store = UsageStore::new(pool);

        store.record("m1", 10, 20, "run").await.unwrap();
        store.record("m1", 5, 5, "run").await.unwrap();

        assert_eq!(store.total_tokens_for_model("m1").await.unwrap(), 40);
    }
}
