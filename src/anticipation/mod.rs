//! Anticipation Engine (spec §4.3): wires the persisted `AnticipationStore`
//! to a smart-home state-change stream and launches agent Runs when stored
//! conditions match.

mod state_watcher;

pub use state_watcher::{HttpStateWatcher, MockStateWatcher, StateWatcher};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use crate::agent::{self, OpenRouterClient, Request, RunContext};
use crate::config::AnticipationConfig;
use crate::database::anticipation::{AnticipationStore, WakeContext};
use crate::error::Result;
use crate::router::ModelRouter;
use crate::tools::ToolRegistry;

const UNAVAILABLE: &str = "unavailable";

/// The sentinel string used by the smart-home platform for connectivity blips.
pub fn is_unavailable(state: &str) -> bool {
    state == UNAVAILABLE
}

/// Wires a `StateWatcher` stream to the `AnticipationStore` and the agent loop.
pub struct WakeBridge<W: StateWatcher> {
    watcher: Arc<W>,
    store: AnticipationStore,
    config: AnticipationConfig,
    llm_client: Arc<OpenRouterClient>,
    router: Arc<ModelRouter>,
    tools: Arc<ToolRegistry>,
}

impl<W: StateWatcher> WakeBridge<W> {
    pub fn new(
        watcher: Arc<W>,
        store: AnticipationStore,
        config: AnticipationConfig,
        llm_client: Arc<OpenRouterClient>,
        router: Arc<ModelRouter>,
        tools: Arc<ToolRegistry>,
    ) -> Self {
        WakeBridge {
            watcher,
            store,
            config,
            llm_client,
            router,
            tools,
        }
    }

    /// Handle one `(entity_id, old_state, new_state)` transition (spec §4.3
    /// steps 1-6).
    pub async fn handle_state_change(&self, entity_id: &str, old_state: &str, new_state: &str) -> Result<()> {
        if old_state == new_state {
            return Ok(());
        }
        if is_unavailable(old_state) || is_unavailable(new_state) {
            return Ok(());
        }

        let ctx = WakeContext {
            time: Utc::now(),
            event_type: Some("state_change".to_string()),
            entity_id: Some(entity_id.to_string()),
            entity_state: Some(new_state.to_string()),
            zone: None,
            zone_action: None,
        };

        let matched = self.store.matching(&ctx).await?;

        for anticipation in matched {
            if self
                .store
                .on_cooldown(&anticipation.id, self.config.default_cooldown_secs)
                .await?
            {
                info!("Anticipation {} on cooldown, skipping", anticipation.id);
                continue;
            }

            self.store.mark_fired(&anticipation.id).await?;

            let companion_states = self.fetch_companion_states(&anticipation.companion_entities()).await;
            let message = format_wake_message(
                &anticipation.description,
                &anticipation.context,
                old_state,
                new_state,
                &companion_states,
                anticipation.recurring,
            );

            self.dispatch_wake_run(&anticipation.id, &anticipation.channel, message, anticipation.recurring)
                .await?;

            if !anticipation.recurring {
                self.store.resolve(&anticipation.id).await?;
            }
        }

        Ok(())
    }

    async fn fetch_companion_states(&self, entities: &[String]) -> HashMap<String, String> {
        let mut states = HashMap::new();
        for entity in entities {
            let fetch = tokio::time::timeout(
                Duration::from_secs(self.config.companion_fetch_secs),
                self.watcher.get_state(entity),
            )
            .await;
            let value = match fetch {
                Ok(Ok(state)) => state,
                _ => "(fetch failed)".to_string(),
            };
            states.insert(entity.clone(), value);
        }
        states
    }

    async fn dispatch_wake_run(
        &self,
        anticipation_id: &str,
        channel: &str,
        message: String,
        recurring: bool,
    ) -> Result<()> {
        let mut hints = HashMap::new();
        hints.insert("source".to_string(), "anticipation".to_string());
        hints.insert("mission".to_string(), "anticipation".to_string());
        hints.insert("anticipation_id".to_string(), anticipation_id.to_string());
        hints.insert("quality_floor".to_string(), self.config.wake_quality_floor.to_string());
        hints.insert("local_only".to_string(), "true".to_string());
        hints.insert("delegation_gating".to_string(), "disabled".to_string());

        let request = Request {
            messages: vec![crate::agent::Message::user(message)],
            conversation_id: Some(format!("anticipation-{}", anticipation_id)),
            preferred_model: None,
            hints,
            exclude_tools: if recurring {
                vec!["resolve_anticipation".to_string(), "cancel_anticipation".to_string()]
            } else {
                vec![]
            },
        };

        let router_request = crate::router::RouterRequest::new(&request.messages.last().map(|m| m.content.clone()).unwrap_or_default())
            .with_hint("local_only", "true")
            .with_hint("quality_floor", self.config.wake_quality_floor.to_string());
        let (model, _decision) = self.router.route(anticipation_id, &router_request);

        let run_ctx = RunContext::new(
            model,
            Duration::from_secs(self.config.wake_timeout_secs),
            Duration::from_secs(30),
        );

        let llm_client = self.llm_client.clone();
        let tools = self.tools.clone();
        let channel = channel.to_string();
        let anticipation_id = anticipation_id.to_string();

        tokio::spawn(async move {
            let outcome = agent::run(request, run_ctx, &llm_client, &tools, None, &agent::NoOpCallback).await;
            match outcome {
                Ok(response) => info!(
                    "Anticipation {} wake Run completed on channel {}: {} chars",
                    anticipation_id,
                    channel,
                    response.content.len()
                ),
                Err(e) => warn!("Anticipation {} wake Run failed: {}", anticipation_id, e),
            }
        });

        Ok(())
    }
}

fn format_wake_message(
    description: &str,
    context: &str,
    old_state: &str,
    new_state: &str,
    companion_states: &HashMap<String, String>,
    recurring: bool,
) -> String {
    let mut msg = format!("{}\n\nChange: {} -> {}", description, old_state, new_state);
    if !context.is_empty() {
        msg.push_str(&format!("\n\nContext: {}", context));
    }
    if !companion_states.is_empty() {
        msg.push_str("\n\nCompanion states:");
        for (entity, state) in companion_states {
            msg.push_str(&format!("\n- {}: {}", entity, state));
        }
    }
    if recurring {
        msg.push_str("\n\n(This is a recurring anticipation.)");
    }
    msg
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FailoverConfig, OpenRouterConfig};
    use crate::database::anticipation::{NewAnticipation, Trigger};
    use crate::database::sqlite::{open_pool, run_migrations};
    use secrecy::SecretString;

    async fn test_bridge() -> WakeBridge<MockStateWatcher> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wake.db");
        std::mem::forget(dir);
        let sqlite_config = crate::config::SqliteConfig {
            path: path.to_string_lossy().to_string(),
            ..Default::default()
        };
        let pool = open_pool(&sqlite_config).await.unwrap();
        run_migrations(&pool).await.unwrap();
        let store = AnticipationStore::new(pool);

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
        let watcher = Arc::new(MockStateWatcher::default());

        WakeBridge::new(watcher, store, AnticipationConfig::default(), client, router, tools)
    }

    #[tokio::test]
    async fn test_noop_transition_is_dropped() {
        let bridge = test_bridge().await;
        bridge.handle_state_change("binary_sensor.front_door", "on", "on").await.unwrap();
        // No anticipations were created, so no assertion beyond "doesn't error".
    }

    #[tokio::test]
    async fn test_unavailable_sentinel_is_dropped() {
        let bridge = test_bridge().await;
        bridge
            .handle_state_change("binary_sensor.front_door", "unavailable", "on")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_cooldown_suppresses_repeat_fire() {
        let bridge = test_bridge().await;
        bridge
            .store
            .create(NewAnticipation {
                id: Some("a1".into()),
                description: "Door opened".into(),
                context: "Check who's home.".into(),
                trigger: Trigger {
                    entity_id: Some("binary_sensor.front_door".into()),
                    entity_state: Some("on".into()),
                    event_type: Some("state_change".into()),
                    ..Default::default()
                },
                companion_entities: vec![],
                wake_message: String::new(),
                channel: "telegram".into(),
                cooldown_secs: 3600,
                recurring: true,
                expires_at: None,
            })
            .await
            .unwrap();

        bridge.handle_state_change("binary_sensor.front_door", "off", "on").await.unwrap();
        assert!(bridge.store.on_cooldown("a1", 3600).await.unwrap());

        bridge.handle_state_change("binary_sensor.front_door", "off", "on").await.unwrap();
        // Second fire should be suppressed; recurring record stays active.
        let active = bridge.store.active().await.unwrap();
        assert_eq!(active.len(), 1);
    }
}
