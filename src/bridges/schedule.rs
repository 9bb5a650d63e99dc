//! Scheduled task bridge (spec §4.4 "Scheduled task bridge"): polls
//! `ScheduledTaskStore::due` and dispatches each due task as an agent Run,
//! with well-known task names driving extra context-injection paths
//! (periodic self-reflection, email polling).
//!
//! Grounded in the same poll-loop shape as `bridges::state`/`bridges::chat`,
//! generalized to pull due work from the database rather than an external
//! stream.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, warn};

use crate::agent::{self, OpenRouterClient, PromptTemplate, Request, RunContext};
use crate::agent::context::EgoNotes;
use crate::agent::prompts::SELF_REFLECTION_PROMPT;
use crate::database::{ScheduledTaskRow, ScheduledTaskStore};
use crate::error::Result;
use crate::router::{ModelRouter, RouterRequest};
use crate::tools::ToolRegistry;

/// Well-known task name for the periodic self-reflection wake.
pub const TASK_SELF_REFLECTION: &str = "self_reflection";
/// Well-known task name for the email-polling wake.
pub const TASK_EMAIL_POLL: &str = "email_poll";

/// Default interval between runs of a task that doesn't specify its own
/// `interval_secs` in its data map.
const DEFAULT_INTERVAL_SECS: i64 = 3600;

/// Narrow mailbox-check collaboration interface for the email-polling task:
/// whether new mail has arrived since the last check. Avoids spending an
/// LLM call on an empty cycle.
#[async_trait]
pub trait MailboxChecker: Send + Sync {
    async fn has_new_messages(&self) -> Result<bool>;
}

/// Poll-loop bridge driving due `ScheduledTaskStore` rows into agent Runs.
pub struct ScheduleBridge {
    store: ScheduledTaskStore,
    llm_client: Arc<OpenRouterClient>,
    router: Arc<ModelRouter>,
    tools: Arc<ToolRegistry>,
    ego_notes: EgoNotes,
    mailbox: Option<Arc<dyn MailboxChecker>>,
    poll_interval: Duration,
    gated_tools: Vec<String>,
}

impl ScheduleBridge {
    pub fn new(
        store: ScheduledTaskStore,
        llm_client: Arc<OpenRouterClient>,
        router: Arc<ModelRouter>,
        tools: Arc<ToolRegistry>,
        ego_notes: EgoNotes,
    ) -> Self {
        ScheduleBridge {
            store,
            llm_client,
            router,
            tools,
            ego_notes,
            mailbox: None,
            poll_interval: Duration::from_secs(30),
            gated_tools: Vec::new(),
        }
    }

    pub fn with_mailbox_checker(mut self, checker: Arc<dyn MailboxChecker>) -> Self {
        self.mailbox = Some(checker);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Configure the iteration-gated tool list applied to Runs this bridge
    /// dispatches (spec §4.1 "Gated iteration"), when delegation gating is
    /// not disabled by the Run's hints.
    pub fn with_gated_tools(mut self, gated_tools: Vec<String>) -> Self {
        self.gated_tools = gated_tools;
        self
    }

    /// Run the poll loop until cancelled.
    pub async fn run_forever(&self) {
        loop {
            if let Err(e) = self.tick().await {
                warn!("schedule bridge: tick error: {}", e);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Process every currently-due task once.
    pub async fn tick(&self) -> Result<()> {
        let due = self.store.due(Utc::now()).await?;
        for task in due {
            self.dispatch(&task).await;
            let interval = task
                .data_json()
                .get("interval_secs")
                .and_then(|v| v.as_i64())
                .unwrap_or(DEFAULT_INTERVAL_SECS);
            let next_run_at = Utc::now() + chrono::Duration::seconds(interval.max(1));
            self.store.mark_ran(&task.id, next_run_at).await?;
        }
        Ok(())
    }

    async fn dispatch(&self, task: &ScheduledTaskRow) {
        match task.payload_kind.as_str() {
            "wake" => {
                if let Err(e) = self.dispatch_wake(task).await {
                    warn!("schedule bridge: wake task {} failed: {}", task.name, e);
                }
            }
            other => {
                warn!("schedule bridge: unsupported payload kind {} for task {}", other, task.name);
            }
        }
    }

    async fn dispatch_wake(&self, task: &ScheduledTaskRow) -> Result<()> {
        let data = task.data_json();

        if task.name == TASK_EMAIL_POLL {
            let has_new = match &self.mailbox {
                Some(checker) => checker.has_new_messages().await?,
                None => false,
            };
            if !has_new {
                info!("schedule bridge: email poll found nothing new, skipping agent Run");
                return Ok(());
            }
        }

        let message = if task.name == TASK_SELF_REFLECTION {
            let template = PromptTemplate::new("self_reflection", SELF_REFLECTION_PROMPT)?;
            let notes = self.ego_notes.read();
            template.render(&serde_json::json!({ "notes": notes }))?
        } else {
            data.get("message")
                .and_then(|v| v.as_str())
                .map(String::from)
                .unwrap_or_else(|| format!("Scheduled wake: {}", task.name))
        };

        let mut hints = std::collections::HashMap::new();
        hints.insert("source".to_string(), "schedule".to_string());
        hints.insert("scheduled_task".to_string(), task.name.clone());
        if let Some(local_only) = data.get("local_only").and_then(|v| v.as_str()) {
            hints.insert("local_only".to_string(), local_only.to_string());
        }
        if let Some(quality_floor) = data.get("quality_floor").and_then(|v| v.as_str()) {
            hints.insert("quality_floor".to_string(), quality_floor.to_string());
        }

        let conversation_id = format!("scheduled-{}", task.name);
        let request = Request {
            messages: vec![crate::agent::Message::user(message.clone())],
            conversation_id: Some(conversation_id.clone()),
            preferred_model: data.get("model").and_then(|v| v.as_str()).map(String::from),
            hints,
            exclude_tools: vec![],
        };

        let router_request = RouterRequest::new(&message);
        let (routed_model, _decision) = self.router.route(&task.name, &router_request);
        let model = request.preferred_model.clone().unwrap_or(routed_model);
        let mut run_ctx = RunContext::new(model, Duration::from_secs(300), Duration::from_secs(30));
        run_ctx.configured_gated_tools = self.gated_tools.clone();

        let llm_client = self.llm_client.clone();
        let tools = self.tools.clone();
        let task_name = task.name.clone();

        tokio::spawn(async move {
            match agent::run(request, run_ctx, &llm_client, &tools, None, &agent::NoOpCallback).await {
                Ok(response) => info!(
                    "schedule bridge: task {} wake Run completed: {} chars",
                    task_name,
                    response.content.len()
                ),
                Err(e) => warn!("schedule bridge: task {} wake Run failed: {}", task_name, e),
            }
        });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FailoverConfig, OpenRouterConfig, SqliteConfig};
    use crate::database::sqlite::{open_pool, run_migrations};
    use crate::database::scheduled_tasks::NewScheduledTask;
    use secrecy::SecretString;

    struct AlwaysNewMailbox;
    #[async_trait]
    impl MailboxChecker for AlwaysNewMailbox {
        async fn has_new_messages(&self) -> Result<bool> {
            Ok(true)
        }
    }

    struct NeverNewMailbox;
    #[async_trait]
    impl MailboxChecker for NeverNewMailbox {
        async fn has_new_messages(&self) -> Result<bool> {
            Ok(false)
        }
    }

    async fn test_bridge() -> (ScheduleBridge, ScheduledTaskStore) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schedule.db");
        std::mem::forget(dir);
        let sqlite_config = SqliteConfig {
            path: path.to_string_lossy().to_string(),
            ..Default::default()
        };
        let pool = open_pool(&sqlite_config).await.unwrap();
        run_migrations(&pool).await.unwrap();
        let store = ScheduledTaskStore::new(pool);

        let llm_config = OpenRouterConfig {
            api_key: SecretString::from("k".to_string()),
            default_model: "local/model".to_string(),
            site_url: None,
            site_name: None,
            base_url: "http://localhost".to_string(),
            timeout_secs: 5,
            max_retries: 1,
        };
        let client = Arc::new(OpenRouterClient::new(llm_config).unwrap());
        let router = Arc::new(ModelRouter::new(vec![], true, 64, FailoverConfig::default()));
        let tools = Arc::new(ToolRegistry::new());
        let notes_dir = tempfile::tempdir().unwrap();
        let ego_notes = EgoNotes::new(notes_dir.path().join("notes.md"));
        std::mem::forget(notes_dir);

        let bridge = ScheduleBridge::new(store.clone(), client, router, tools, ego_notes);
        (bridge, store)
    }

    #[tokio::test]
    async fn test_unsupported_payload_kind_is_skipped() {
        let (bridge, store) = test_bridge().await;
        let task = store
            .create(NewScheduledTask {
                id: Some("t1".into()),
                name: "unknown_kind".into(),
                payload_kind: "webhook".into(),
                data: serde_json::json!({}),
                next_run_at: Utc::now() - chrono::Duration::seconds(1),
            })
            .await
            .unwrap();
        bridge.dispatch(&task).await;
    }

    #[tokio::test]
    async fn test_email_poll_skips_when_no_new_mail() {
        let (bridge, store) = test_bridge().await;
        let bridge = bridge.with_mailbox_checker(Arc::new(NeverNewMailbox));
        let task = store
            .create(NewScheduledTask {
                id: Some("t2".into()),
                name: TASK_EMAIL_POLL.into(),
                payload_kind: "wake".into(),
                data: serde_json::json!({}),
                next_run_at: Utc::now() - chrono::Duration::seconds(1),
            })
            .await
            .unwrap();
        bridge.dispatch_wake(&task).await.unwrap();
    }

    #[tokio::test]
    async fn test_email_poll_dispatches_when_new_mail() {
        let (bridge, store) = test_bridge().await;
        let bridge = bridge.with_mailbox_checker(Arc::new(AlwaysNewMailbox));
        let task = store
            .create(NewScheduledTask {
                id: Some("t3".into()),
                name: TASK_EMAIL_POLL.into(),
                payload_kind: "wake".into(),
                data: serde_json::json!({}),
                next_run_at: Utc::now() - chrono::Duration::seconds(1),
            })
            .await
            .unwrap();
        bridge.dispatch_wake(&task).await.unwrap();
    }

    #[tokio::test]
    async fn test_tick_advances_next_run_at() {
        let (bridge, store) = test_bridge().await;
        store
            .create(NewScheduledTask {
                id: Some("t4".into()),
                name: "generic".into(),
                payload_kind: "wake".into(),
                data: serde_json::json!({"interval_secs": 120}),
                next_run_at: Utc::now() - chrono::Duration::seconds(1),
            })
            .await
            .unwrap();
        bridge.tick().await.unwrap();
        let due = store.due(Utc::now()).await.unwrap();
        assert!(due.is_empty());
    }
}
