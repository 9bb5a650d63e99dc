//! Durable conversation log (spec §3 `StoredMessage`, §6 persistent state).
//!
//! Backs `agent::ConversationManager` so chat history survives restarts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::agent::{AssistantToolCall, Message, Role};
use crate::database::sqlite::SqlitePool;
use crate::error::Result;

/// One persisted turn of a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StoredMessage {
    pub id: i64,
    pub conversation_id: String,
    pub role: String,
    pub content: String,
    pub tool_call_id: Option<String>,
    pub tool_calls: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl StoredMessage {
    pub fn into_message(self) -> Message {
        let role = match self.role.as_str() {
            "system" => Role::System,
            "user" => Role::User,
            "tool" => Role::Tool,
            _ => Role::Assistant,
        };
        let tool_calls: Option<Vec<AssistantToolCall>> = self
            .tool_calls
            .and_then(|s| serde_json::from_str(&s).ok());
        Message {
            role,
            content: self.content,
            name: None,
            tool_call_id: self.tool_call_id,
            tool_calls,
        }
    }
}

/// SQLite-backed conversation history store.
#[derive(Clone)]
pub struct ConversationStore {
    pool: SqlitePool,
}

impl ConversationStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Append one message to a conversation's log.
    pub async fn append(&self, conversation_id: &str, message: &Message) -> Result<()> {
        let tool_calls_json = message
            .tool_calls
            .as_ref()
            .map(|tc| serde_json::to_string(tc))
            .transpose()?;

        sqlx::query(
            r#"
            INSERT INTO conversations (conversation_id, role, content, tool_call_id, tool_calls)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(conversation_id)
        .bind(message.role.to_string())
        .bind(&message.content)
        .bind(&message.tool_call_id)
        .bind(tool_calls_json)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Load the most recent `limit` messages for a conversation, oldest first.
    pub async fn recent(&self, conversation_id: &str, limit: i64) -> Result<Vec<Message>> {
        let mut rows: Vec<StoredMessage> = sqlx::query_as(
            r#"
            SELECT * FROM conversations
            WHERE conversation_id = ?
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(conversation_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.reverse();
        Ok(rows.into_iter().map(StoredMessage::into_message).collect())
    }

    /// Every distinct conversation id with at least one logged message.
    pub async fn list_ids(&self) -> Result<Vec<String>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT DISTINCT conversation_id FROM conversations ORDER BY conversation_id")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Delete a conversation's entire log (used by the Compact hook after archiving).
    pub async fn clear(&self, conversation_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM conversations WHERE conversation_id = ?")
            .bind(conversation_id)
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

    async fn test_store() -> ConversationStore {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conv.db");
        std::mem::forget(dir);
        let config = SqliteConfig {
            path: path.to_string_lossy().to_string(),
            ..Default::default()
        };
        let pool = open_pool(&config).await.unwrap();
        run_migrations(&pool).await.unwrap();
        ConversationStore::new(pool)
    }

    #[tokio::test]
    async fn test_append_and_recent_preserves_order() {
        let store = test_store().await;
        store.append("c1", &Message::user("hi")).await.unwrap();
        store.append("c1", &Message::assistant("hello")).await.unwrap();

        let msgs = store.recent("c1", 10).await.unwrap();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].content, "hi");
        assert_eq!(msgs[1].content, "hello");
    }

    #[tokio::test]
    async fn test_list_ids_returns_distinct_conversations() {
        let store = test_store().await;
        store.append("c1", &Message::user("hi")).await.unwrap();
        store.append("c1", &Message::user("again")).await.unwrap();
        store.append("c2", &Message::user("hello")).await.unwrap();
        let mut ids = store.list_ids().await.unwrap();
        ids.sort();
        assert_eq!(ids, vec!["c1".to_string(), "c2".to_string()]);
    }

    #[tokio::test]
    async fn test_clear_removes_all() {
        let store = test_store().await;
        store.append("c2", &Message::user("x")).await.unwrap();
        store.clear("c2").await.unwrap();
        assert!(store.recent("c2", 10).await.unwrap().is_empty());
    }
}
