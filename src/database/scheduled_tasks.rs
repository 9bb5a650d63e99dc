//! Scheduled task bridge storage (spec §4.4 "Scheduled task bridge"): cron-like
//! wakes distinct from the user-facing todo tracker in `database::tasks`.
//!
//! A task has a name, a payload kind (`wake | webhook | ...`), and a data map;
//! `next_run_at` drives the schedule bridge's poll loop.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::database::sqlite::SqlitePool;
use crate::error::Result;

/// A persisted scheduled task.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ScheduledTaskRow {
    pub id: String,
    pub name: String,
    pub payload_kind: String,
    pub data: String,
    pub next_run_at: DateTime<Utc>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ScheduledTaskRow {
    pub fn data_json(&self) -> serde_json::Value {
        serde_json::from_str(&self.data).unwrap_or_else(|_| serde_json::json!({}))
    }
}

/// A new scheduled task to persist; `id` is assigned if absent.
#[derive(Debug, Clone)]
pub struct NewScheduledTask {
    pub id: Option<String>,
    pub name: String,
    pub payload_kind: String,
    pub data: serde_json::Value,
    pub next_run_at: DateTime<Utc>,
}

/// Store for scheduled task records.
#[derive(Clone)]
pub struct ScheduledTaskStore {
    pool: SqlitePool,
}

impl ScheduledTaskStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, task: NewScheduledTask) -> Result<ScheduledTaskRow> {
        let id = task.id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let data_json = serde_json::to_string(&task.data)?;

        sqlx::query(
            r#"
            INSERT INTO scheduled_tasks (id, name, payload_kind, data, next_run_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&task.name)
        .bind(&task.payload_kind)
        .bind(data_json)
        .bind(task.next_run_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        self.get(&id)
            .await?
            .ok_or_else(|| crate::error::Error::Internal("scheduled task vanished after insert".into()))
    }

    pub async fn get(&self, id: &str) -> Result<Option<ScheduledTaskRow>> {
        let row: Option<ScheduledTaskRow> = sqlx::query_as("SELECT * FROM scheduled_tasks WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// Every task whose `next_run_at` has elapsed, oldest due first.
    pub async fn due(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledTaskRow>> {
        let rows: Vec<ScheduledTaskRow> = sqlx::query_as(
            r#"
            SELECT * FROM scheduled_tasks
            WHERE next_run_at <= ?
            ORDER BY next_run_at ASC
            "#,
        )
        .bind(now.to_rfc3339())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Record that a task ran, advancing its next run time.
    pub async fn mark_ran(&self, id: &str, next_run_at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE scheduled_tasks SET last_run_at = ?, next_run_at = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(next_run_at.to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM scheduled_tasks WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SqliteConfig;
    use crate::database::sqlite::{open_pool, run_migrations};
    use chrono::Duration as ChronoDuration;

    async fn test_store() -> ScheduledTaskStore {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sched.db");
        std::mem::forget(dir);
        let config = SqliteConfig {
            path: path.to_string_lossy().to_string(),
            ..Default::default()
        };
        let pool = open_pool(&config).await.unwrap();
        run_migrations(&pool).await.unwrap();
        ScheduledTaskStore::new(pool)
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = test_store().await;
        let task = store
            .create(NewScheduledTask {
                id: Some("t1".into()),
                name: "self_reflection".into(),
                payload_kind: "wake".into(),
                data: serde_json::json!({"message": "Reflect."}),
                next_run_at: Utc::now() - ChronoDuration::seconds(1),
            })
            .await
            .unwrap();
        assert_eq!(task.name, "self_reflection");
    }

    #[tokio::test]
    async fn test_due_returns_only_elapsed() {
        let store = test_store().await;
        store
            .create(NewScheduledTask {
                id: Some("past".into()),
                name: "a".into(),
                payload_kind: "wake".into(),
                data: serde_json::json!({}),
                next_run_at: Utc::now() - ChronoDuration::minutes(5),
            })
            .await
            .unwrap();
        store
            .create(NewScheduledTask {
                id: Some("future".into()),
                name: "b".into(),
                payload_kind: "wake".into(),
                data: serde_json::json!({}),
                next_run_at: Utc::now() + ChronoDuration::hours(1),
            })
            .await
            .unwrap();

        let due = store.due(Utc::now()).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, "past");
    }

    #[tokio::test]
    async fn test_mark_ran_advances_next_run() {
        let store = test_store().await;
        store
            .create(NewScheduledTask {
                id: Some("t1".into()),
                name: "a".into(),
                payload_kind: "wake".into(),
                data: serde_json::json!({}),
                next_run_at: Utc::now() - ChronoDuration::seconds(1),
            })
            .await
            .unwrap();

        let next = Utc::now() + ChronoDuration::hours(1);
        store.mark_ran("t1", next).await.unwrap();

        assert!(store.due(Utc::now()).await.unwrap().is_empty());
    }
}
