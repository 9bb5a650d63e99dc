//! Agent task storage and lifecycle management (scheduled-task bridge, spec §4.4).
//!
//! Tracks tasks created from user requests with status lifecycle:
//! pending → processing → finish/fail/cancel/stop. Retargeted from the
//! teacher's PostgreSQL `agent_tasks` table to SQLite.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::database::sqlite::SqlitePool;
use crate::error::Result;

/// Task status enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Finish,
    Fail,
    Cancel,
    Stop,
}

impl TaskStatus {
    pub fn as_str(&self) -> &str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Finish => "finish",
            TaskStatus::Fail => "fail",
            TaskStatus::Cancel => "cancel",
            TaskStatus::Stop => "stop",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "processing" => TaskStatus::Processing,
            "finish" => TaskStatus::Finish,
            "fail" => TaskStatus::Fail,
            "cancel" => TaskStatus::Cancel,
            "stop" => TaskStatus::Stop,
            _ => TaskStatus::Pending,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Finish | TaskStatus::Fail | TaskStatus::Cancel | TaskStatus::Stop
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An agent task
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AgentTask {
    #[sqlx(try_from = "String")]
    pub id: Uuid,
    pub user_id: String,
    pub chat_id: Option<i64>,
    pub title: String,
    pub description: String,
    pub status: String,
    pub priority: i32,
    pub result: Option<String>,
    pub error_message: Option<String>,
    #[sqlx(json)]
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl AgentTask {
    pub fn status_enum(&self) -> TaskStatus {
        TaskStatus::from_str(&self.status)
    }
}

/// Task store backed by SQLite
#[derive(Clone)]
pub struct TaskStore {
    pool: SqlitePool,
}

impl TaskStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a new task
    pub async fn create(
        &self,
        user_id: &str,
        chat_id: Option<i64>,
        title: &str,
        description: &str,
        priority: i32,
    ) -> Result<AgentTask> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO agent_tasks (id, user_id, chat_id, title, description, priority)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(user_id)
        .bind(chat_id)
        .bind(title)
        .bind(description)
        .bind(priority)
        .execute(&self.pool)
        .await?;

        self.get(id)
            .await?
            .ok_or_else(|| crate::error::Error::Internal("task vanished after insert".into()))
    }

    /// Get a task by ID
    pub async fn get(&self, id: Uuid) -> Result<Option<AgentTask>> {
        let task: Option<AgentTask> = sqlx::query_as("SELECT * FROM agent_tasks WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        Ok(task)
    }

    /// Get the next pending task (ordered by priority desc, created_at asc).
    pub async fn next_pending(&self) -> Result<Option<AgentTask>> {
        let task: Option<AgentTask> = sqlx::query_as(
            r#"
            SELECT * FROM agent_tasks
            WHERE status = 'pending'
            ORDER BY priority DESC, created_at ASC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(task)
    }

    /// Transition a task to processing
    pub async fn start_processing(&self, id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE agent_tasks
            SET status = 'processing', started_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now'),
                updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Mark a task as finished with optional result
    pub async fn finish(&self, id: Uuid, result: Option<&str>) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE agent_tasks
            SET status = 'finish', result = ?, completed_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now'),
                updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
            WHERE id = ?
            "#,
        )
        .bind(result)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Mark a task as failed with error message
    pub async fn fail(&self, id: Uuid, error: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE agent_tasks
            SET status = 'fail', error_message = ?, completed_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now'),
                updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
            WHERE id = ?
            "#,
        )
        .bind(error)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Cancel a task
    pub async fn cancel(&self, id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE agent_tasks
            SET status = 'cancel', completed_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now'),
                updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Stop a task
    pub async fn stop(&self, id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE agent_tasks
            SET status = 'stop', completed_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now'),
                updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Get tasks by user_id with optional status filter
    pub async fn get_by_user(
        &self,
        user_id: &str,
        status: Option<TaskStatus>,
        limit: i64,
    ) -> Result<Vec<AgentTask>> {
        let status_filter = status.map(|s| s.as_str().to_string());
        let tasks: Vec<AgentTask> = sqlx::query_as(
            r#"
            SELECT * FROM agent_tasks
            WHERE user_id = ?
              AND (? IS NULL OR status = ?)
            ORDER BY created_at DESC
            LIMIT ?
            "#,
        )
        .bind(user_id)
        .bind(status_filter.clone())
        .bind(status_filter)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(tasks)
    }

    /// Count pending tasks
    pub async fn count_pending(&self) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM agent_tasks WHERE status = 'pending'")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SqliteConfig;
    use crate::database::sqlite::{open_pool, run_migrations};

    async fn test_store() -> TaskStore {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.db");
        std::mem::forget(dir);
        let config = SqliteConfig {
            path: path.to_string_lossy().to_string(),
            ..Default::default()
        };
        let pool = open_pool(&config).await.unwrap();
        run_migrations(&pool).await.unwrap();
        TaskStore::new(pool)
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = test_store().await;
        let task = store.create("alice", Some(42), "buy milk", "2%", 0).await.unwrap();
        assert_eq!(task.status, "pending");

        let fetched = store.get(task.id).await.unwrap().unwrap();
        assert_eq!(fetched.title, "buy milk");
    }

    #[tokio::test]
    async fn test_finish_marks_terminal() {
        let store = test_store().await;
        let task = store.create("alice", None, "t", "d", 0).await.unwrap();
        store.finish(task.id, Some("done")).await.unwrap();

        let fetched = store.get(task.id).await.unwrap().unwrap();
        assert!(fetched.status_enum().is_terminal());
        assert_eq!(fetched.result.as_deref(), Some("done"));
    }

    #[tokio::test]
    async fn test_get_by_user_filters_by_status() {
        let store = test_store().await;
        let t1 = store.create("bob", None, "a", "d", 0).await.unwrap();
        let _t2 = store.create("bob", None, "b", "d", 0).await.unwrap();
        store.finish(t1.id, None).await.unwrap();

        let pending = store.get_by_user("bob", Some(TaskStatus::Pending), 10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].title, "b");
    }
}
