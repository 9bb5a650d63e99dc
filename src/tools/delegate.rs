//! Delegation tool (spec §4.1 "Gated iteration") — the one avenue an
//! orchestrator-mode Run has for getting work done while iteration gating
//! restricts its visible tools to the configured gated list: hand the
//! sub-task to a background worker instead of executing it inline.

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use crate::database::TaskStore;
use crate::error::{Error, Result};
use crate::tools::traits::{Tool, ToolResult};

pub struct DelegateTool {
    store: TaskStore,
}

impl DelegateTool {
    pub fn new(store: TaskStore) -> Self {
        DelegateTool { store }
    }
}

#[async_trait]
impl Tool for DelegateTool {
    fn name(&self) -> &str {
        "delegate"
    }

    fn description(&self) -> &str {
        "Hand a sub-task off to a background worker instead of doing it yourself. Use this when you're restricted to an orchestrator-only path."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "title": {
                    "type": "string",
                    "description": "Short title for the delegated sub-task"
                },
                "description": {
                    "type": "string",
                    "description": "What the sub-task should accomplish"
                },
                "priority": {
                    "type": "integer",
                    "description": "Priority level: 0 (normal), 1 (high), 2 (urgent). Default: 0"
                }
            },
            "required": ["title", "description"]
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let user_id = args.get("_user_id").and_then(|v| v.as_str()).unwrap_or("unknown");
        let chat_id = args.get("_chat_id").and_then(|v| v.as_i64());

        let title = args
            .get("title")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::InvalidInput("Missing 'title' parameter".into()))?;

        let description = args
            .get("description")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::InvalidInput("Missing 'description' parameter".into()))?;

        let priority = args.get("priority").and_then(|v| v.as_i64()).unwrap_or(0) as i32;

        let task = self.store.create(user_id, chat_id, title, description, priority).await?;
        info!("Delegated sub-task: {} (id={})", title, task.id);

        Ok(ToolResult::success(format!(
            "Delegated to background worker.\nID: {}\nTitle: {}\nPriority: {}",
            task.id, task.title, task.priority
        )))
    }
}
