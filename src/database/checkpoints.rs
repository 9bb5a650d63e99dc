//! Checkpoint/archive records (spec §3 `CheckpointRecord`): a labeled blob
//! snapshot per conversation, exposed via the introspection HTTP surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::database::sqlite::SqlitePool;
use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CheckpointRecord {
    pub id: i64,
    pub conversation_id: String,
    pub label: String,
    pub blob: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct CheckpointStore {
    pool: SqlitePool,
}

impl CheckpointStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, conversation_id: &str, label: &str, blob: &str) -> Result<CheckpointRecord> {
        let id = sqlx::query(
            "INSERT INTO checkpoints (conversation_id, label, blob) VALUES (?, ?, ?)",
        )
        .bind(conversation_id)
        .bind(label)
        .bind(blob)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        self.get(id)
            .await?
            .ok_or_else(|| crate::error::Error::Internal("checkpoint vanished after insert".into()))
    }

    pub async fn get(&self, id: i64) -> Result<Option<CheckpointRecord>> {
        let row: Option<CheckpointRecord> = sqlx::query_as("SELECT * FROM checkpoints WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// Most recent checkpoints for a conversation, newest first.
    pub async fn list_for_conversation(&self, conversation_id: &str, limit: i64) -> Result<Vec<CheckpointRecord>> {
        let rows: Vec<CheckpointRecord> = sqlx::query_as(
            r#"
            SELECT * FROM checkpoints
            WHERE conversation_id = ?
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(conversation_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SqliteConfig;
    use crate::database::sqlite::{open_pool, run_migrations};

    async fn test_store() -> CheckpointStore {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoints.db");
        std::mem::forget(dir);
        let config = SqliteConfig {
            path: path.to_string_lossy().to_string(),
            ..Default::default()
        };
        let pool = open_pool(&config).await.unwrap();
        run_migrations(&pool).await.unwrap();
        CheckpointStore::new(pool)
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = test_store().await;
        let record = store.create("c1", "pre-compact", "{}").await.unwrap();
        let fetched = store.get(record.id).await.unwrap().unwrap();
        assert_eq!(fetched.label, "pre-compact");
    }

    #[tokio::test]
    async fn test_list_for_conversation_orders_newest_first() {
        let store = test_store().await;
        store.create("c1", "first", "{}").await.unwrap();
        store.create("c1", "second", "{}").await.unwrap();
        let list = store.list_for_conversation("c1", 10).await.unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].label, "second");
    }
}
