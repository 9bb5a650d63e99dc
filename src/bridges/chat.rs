//! Chat poll loop bridge (spec §4.4): long-polls an inbound transport,
//! admits messages per sender, dispatches agent Runs, and routes replies
//! back — unless the model already sent one itself via the reply tool.
//!
//! The transport is a narrow collaboration interface (spec §9 "capability
//! interfaces per collaboration edge"), following the teacher's
//! `Channel`/`LlmProvider` trait-per-collaborator pattern. The production
//! implementation wraps `teloxide::Bot`; tests use an in-memory mock.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::agent::{self, CapabilityContext, OpenRouterClient, Persona, Request, RunContext};
use crate::bridges::{already_replied_via_tool, conversation_id_for, RateLimiter};
use crate::config::CapabilityTagConfig;
use crate::database::ConversationStore;
use crate::error::Result;
use crate::router::{ModelRouter, RouterRequest};
use crate::tools::ToolRegistry;

/// Assembled context-chain inputs shared by every Run a `ChatBridge` drives,
/// seeded once from config at construction (spec §4.1 Assemble step).
pub struct ChatContext {
    pub persona: Persona,
    pub capability_tags: Vec<CapabilityTagConfig>,
    pub talents_dir: PathBuf,
    pub channel_pins: Vec<String>,
    pub history_limit: i64,
    /// Iteration-gated tool list applied when delegation gating is not
    /// disabled by the Run's hints (spec §4.1 "Gated iteration").
    pub iteration_gated_tools: Vec<String>,
}

impl Default for ChatContext {
    fn default() -> Self {
        ChatContext {
            persona: Persona::default(),
            capability_tags: Vec::new(),
            talents_dir: PathBuf::from("talents"),
            channel_pins: Vec::new(),
            history_limit: 20,
            iteration_gated_tools: Vec::new(),
        }
    }
}

/// One inbound chat message, transport-agnostic.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub sender: String,
    pub chat_id: i64,
    pub text: String,
}

/// Narrow chat-transport collaboration interface.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Long-poll for the next inbound message. `Ok(None)` means "poll
    /// succeeded, nothing new" (not an error).
    async fn receive_next(&self) -> Result<Option<IncomingMessage>>;

    /// Best-effort read-receipt acknowledgement after accepting a message.
    async fn acknowledge(&self, _chat_id: i64) -> Result<()> {
        Ok(())
    }

    /// Send a reply back over the same channel.
    async fn send(&self, chat_id: i64, text: &str) -> Result<()>;
}

/// Poll-loop bridge wiring a `ChatTransport` to the agent loop.
pub struct ChatBridge<T: ChatTransport> {
    transport: Arc<T>,
    limiter: RateLimiter,
    reply_tool_name: String,
    llm_client: Arc<OpenRouterClient>,
    router: Arc<ModelRouter>,
    tools: Arc<ToolRegistry>,
    source: String,
    conversations: Option<Arc<ConversationStore>>,
    context: ChatContext,
}

impl<T: ChatTransport> ChatBridge<T> {
    pub fn new(
        transport: Arc<T>,
        per_minute_cap: u32,
        reply_tool_name: impl Into<String>,
        llm_client: Arc<OpenRouterClient>,
        router: Arc<ModelRouter>,
        tools: Arc<ToolRegistry>,
        source: impl Into<String>,
    ) -> Self {
        ChatBridge {
            transport,
            limiter: RateLimiter::new(per_minute_cap),
            reply_tool_name: reply_tool_name.into(),
            llm_client,
            router,
            tools,
            source: source.into(),
            conversations: None,
            context: ChatContext::default(),
        }
    }

    /// Attach durable conversation history, persisted across Runs.
    pub fn with_conversation_store(mut self, store: Arc<ConversationStore>) -> Self {
        self.conversations = Some(store);
        self
    }

    /// Attach the context-provider chain inputs (persona, capability tags,
    /// talents directory, this channel's pinned tags).
    pub fn with_context(mut self, context: ChatContext) -> Self {
        self.context = context;
        self
    }

    /// Run the poll loop until cancelled. Exponential backoff on transport
    /// error starting at 5s, capped at 60s, reset on any successful poll.
    /// Evict stale rate-limiter entries (spec §5 "a periodic sweep every
    /// 10 min"), meant to be called from an external timer.
    pub fn sweep_rate_limiter(&self) {
        self.limiter.sweep();
    }

    pub async fn run_forever(&self) {
        let mut backoff = Duration::from_secs(5);
        loop {
            match self.transport.receive_next().await {
                Ok(Some(msg)) => {
                    backoff = Duration::from_secs(5);
                    let _ = self.transport.acknowledge(msg.chat_id).await;
                    if let Err(e) = self.handle_message(msg).await {
                        warn!("chat bridge: error handling message: {}", e);
                    }
                }
                Ok(None) => {
                    backoff = Duration::from_secs(5);
                }
                Err(e) => {
                    warn!("chat bridge: transport error: {}", e);
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(Duration::from_secs(60));
                }
            }
        }
    }

    async fn handle_message(&self, msg: IncomingMessage) -> Result<()> {
        if !self.limiter.admit(&msg.sender) {
            info!("chat bridge: dropping message from {} (rate limited)", msg.sender);
            return Ok(());
        }

        let conversation_id = conversation_id_for(&self.source, &msg.sender);

        let mut hints = HashMap::new();
        hints.insert("source".to_string(), self.source.clone());
        hints.insert("sender".to_string(), msg.sender.clone());

        let capability_ctx = CapabilityContext::new(&self.context.capability_tags);
        let active_tags = capability_ctx.seed_active_tags(&self.context.channel_pins);
        let capability_block = capability_ctx.render(&active_tags, &self.context.talents_dir);

        let history = match &self.conversations {
            Some(store) => store
                .recent(&conversation_id, self.context.history_limit)
                .await
                .unwrap_or_else(|e| {
                    warn!("chat bridge: failed to load history: {}", e);
                    Vec::new()
                }),
            None => Vec::new(),
        };

        let system_prompt = agent::build_system_prompt(
            &self.context.persona,
            Some(&format!("Channel: {}", self.source)),
            &capability_block,
            "",
            None,
        );

        let user_message = crate::agent::Message::user(msg.text.clone());
        let mut messages = vec![crate::agent::Message::system(system_prompt)];
        messages.extend(history);
        messages.push(user_message.clone());

        let request = Request {
            messages,
            conversation_id: Some(conversation_id.clone()),
            preferred_model: None,
            hints,
            exclude_tools: vec![],
        };

        let router_request = RouterRequest::new(&msg.text);
        let (model, _decision) = self.router.route(&msg.sender, &router_request);
        let mut run_ctx = RunContext::new(model, Duration::from_secs(300), Duration::from_secs(30));
        run_ctx.pinned_tags = self.context.channel_pins.iter().cloned().collect();
        run_ctx.active_tags = active_tags;
        run_ctx.configured_gated_tools = self.context.iteration_gated_tools.clone();

        let response = agent::run(request, run_ctx, &self.llm_client, &self.tools, None, &agent::NoOpCallback).await?;

        if let Some(store) = &self.conversations {
            if let Err(e) = store.append(&conversation_id, &user_message).await {
                warn!("chat bridge: failed to persist user message: {}", e);
            }
            for appended in &response.appended_messages {
                if let Err(e) = store.append(&conversation_id, appended).await {
                    warn!("chat bridge: failed to persist appended message: {}", e);
                }
            }
        }

        if already_replied_via_tool(&response.tool_calls, &self.reply_tool_name) {
            return Ok(());
        }

        self.transport.send(msg.chat_id, &response.content).await
    }
}

/// In-memory mock transport for tests: a fixed inbound queue, sent replies
/// captured for assertions.
#[derive(Default)]
pub struct MockChatTransport {
    inbound: std::sync::Mutex<Vec<IncomingMessage>>,
    pub sent: std::sync::Mutex<Vec<(i64, String)>>,
}

impl MockChatTransport {
    pub fn with_inbound(messages: Vec<IncomingMessage>) -> Self {
        MockChatTransport {
            inbound: std::sync::Mutex::new(messages),
            sent: std::sync::Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ChatTransport for MockChatTransport {
    async fn receive_next(&self) -> Result<Option<IncomingMessage>> {
        Ok(self.inbound.lock().unwrap().pop())
    }

    async fn send(&self, chat_id: i64, text: &str) -> Result<()> {
        self.sent.lock().unwrap().push((chat_id, text.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FailoverConfig;

    #[test]
    fn test_conversation_id_stable_per_sender() {
        assert_eq!(conversation_id_for("telegram", "u1"), conversation_id_for("telegram", "u1"));
    }

    #[tokio::test]
    async fn test_admission_rejects_over_cap() {
        let limiter = RateLimiter::new(1);
        assert!(limiter.admit("alice"));
        assert!(!limiter.admit("alice"));
    }

    #[test]
    fn test_router_is_reachable_with_empty_models() {
        let router = ModelRouter::new(vec![], true, 16, FailoverConfig::default());
        let (model, _) = router.route("r1", &RouterRequest::new("hi"));
        assert_eq!(model, "");
    }
}
