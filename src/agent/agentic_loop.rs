//! Agent Loop (spec §4.1) — the iterative tool-calling state machine that
//! drives one LLM request (a `Run`) to completion.
//!
//! Grounded in the teacher's `agent/agentic_loop.rs` ReAct loop, generalized
//! with: the nudge/deferred-text recovery path, capability-tag-gated tool
//! visibility, per-Run and per-tool deadlines, and the stuck-loop guard from
//! `agent/loop_guard.rs`.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::agent::loop_guard::LoopGuard;
use crate::agent::types::*;
use crate::agent::OpenRouterClient;
use crate::error::Result;
use crate::tools::{ToolCall, ToolRegistry};

/// The nudge injected when the model stops mid-turn without replying.
pub const NUDGE_MESSAGE: &str = "Please respond.";

// ---------------------------------------------------------------------------
// Request / Response (spec §3 Data model)
// ---------------------------------------------------------------------------

/// One trigger's worth of work for the loop to execute.
#[derive(Debug, Clone, Default)]
pub struct Request {
    /// Ordered chat turns preceding this Run (system/user/assistant/tool).
    pub messages: Vec<Message>,
    /// Stable conversation identifier, enabling history reuse across Runs.
    pub conversation_id: Option<String>,
    /// Explicit model override; falls back to router selection when absent.
    pub preferred_model: Option<String>,
    /// Routing/behavior hints (`source`, `quality_floor`, `local_only`, ...).
    pub hints: HashMap<String, String>,
    /// Tool names hidden from this Run regardless of capability tags.
    pub exclude_tools: Vec<String>,
}

/// How a Run terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    MaxIterations,
    Error,
}

impl std::fmt::Display for FinishReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FinishReason::Stop => "stop",
            FinishReason::MaxIterations => "max_iterations",
            FinishReason::Error => "error",
        };
        write!(f, "{}", s)
    }
}

/// A Run's outcome.
#[derive(Debug, Clone)]
pub struct Response {
    pub content: String,
    pub model: String,
    pub finish_reason: FinishReason,
    pub input_tokens: u32,
    pub output_tokens: u32,
    /// Tool name -> invocation count, used by bridges to detect a
    /// self-delivered reply (spec §4.4).
    pub tool_calls: HashMap<String, u32>,
    /// Messages appended to the conversation by this Run (assistant + tool
    /// turns), for the caller to persist.
    pub appended_messages: Vec<Message>,
}

// ---------------------------------------------------------------------------
// Run context: capability tags, tool gating, deadlines
// ---------------------------------------------------------------------------

/// Per-Run execution context: everything the Request itself doesn't carry.
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Active capability tags for this Run (seeded from always-active tags
    /// plus the originating channel's pinned tags).
    pub active_tags: HashSet<String>,
    /// Tags that were channel-pinned and therefore cannot be dropped.
    pub pinned_tags: HashSet<String>,
    /// Bypass tag-based filtering entirely (`Request.SkipTagFilter`).
    pub skip_tag_filter: bool,
    /// Tool names the delegation-gating hint restricts visibility to, when enabled.
    pub gated_tools: Option<Vec<String>>,
    /// The configured iteration-gated tool list (`agent.iteration_gated_tools`),
    /// resolved into `gated_tools` by `run()` once the request's
    /// `delegation_gating` hint and the registry are known.
    pub configured_gated_tools: Vec<String>,
    /// Wall-clock budget for the whole Run.
    pub deadline: Instant,
    /// Wall-clock budget per individual tool call.
    pub tool_deadline: Duration,
    /// Bound on LLM round-trips.
    pub max_iterations: u32,
    /// Message returned when the loop cannot recover.
    pub fallback_message: String,
    pub model: String,
}

impl RunContext {
    pub fn new(model: impl Into<String>, run_timeout: Duration, tool_timeout: Duration) -> Self {
        RunContext {
            active_tags: HashSet::new(),
            pinned_tags: HashSet::new(),
            skip_tag_filter: false,
            gated_tools: None,
            configured_gated_tools: Vec::new(),
            deadline: Instant::now() + run_timeout,
            tool_deadline: tool_timeout,
            max_iterations: 5,
            fallback_message:
                "I'm having trouble forming a response right now. Please try again.".to_string(),
            model: model.into(),
        }
    }
}

/// Error returned when the model tries to drop a channel-pinned capability tag.
#[derive(Debug, Clone)]
pub struct ChannelPinnedError(pub String);

impl RunContext {
    /// Apply a `drop_capability` / `activate_capability` request surfaced via
    /// tool metadata. Returns an error mentioning "channel-pinned" if the
    /// requested drop targets a pinned tag (spec §5).
    fn apply_capability_change(&mut self, tool_name: &str, metadata: &serde_json::Value) -> Option<ChannelPinnedError> {
        if tool_name == "drop_capability" {
            if let Some(tag) = metadata.get("drop_capability").and_then(|v| v.as_str()) {
                if self.pinned_tags.contains(tag) {
                    return Some(ChannelPinnedError(tag.to_string()));
                }
                self.active_tags.remove(tag);
            }
        } else if tool_name == "activate_capability" {
            if let Some(tag) = metadata.get("activate_capability").and_then(|v| v.as_str()) {
                self.active_tags.insert(tag.to_string());
            }
        }
        None
    }
}

/// Resolve `gated_tools` / `skip_tag_filter` from the Request's hints and the
/// configured iteration-gated tool list (spec §4.1 "Tool visibility
/// computation"): delegation gating activates when the `delegation_gating`
/// hint is anything other than `"disabled"`, the registry has a `delegate`
/// tool, and a non-empty gated list is configured.
fn resolve_run_context(ctx: &mut RunContext, request: &Request, tools: &ToolRegistry) {
    let gating_disabled = request.hints.get("delegation_gating").map(|v| v.as_str()) == Some("disabled");
    if !gating_disabled && tools.get("delegate").is_some() && !ctx.configured_gated_tools.is_empty() {
        ctx.gated_tools = Some(ctx.configured_gated_tools.clone());
    }

    if request.hints.get("skip_tag_filter").map(|v| v.as_str()) == Some("true") {
        ctx.skip_tag_filter = true;
    }
}

// ---------------------------------------------------------------------------
// Streaming events
// ---------------------------------------------------------------------------

/// Event emitted during a Run when streaming is requested.
#[derive(Debug, Clone)]
pub enum LoopEvent {
    Token(String),
    ToolCallStart { name: String },
    ToolCallDone { name: String, success: bool },
}

/// Receives streaming events as they occur; a no-op sink if the caller
/// doesn't want streaming.
#[async_trait]
pub trait LoopCallback: Send + Sync {
    async fn on_event(&self, _event: LoopEvent) {}
}

/// Default no-op callback.
pub struct NoOpCallback;
#[async_trait]
impl LoopCallback for NoOpCallback {}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

/// Drive one Request through the agent loop to a Response.
///
/// `llm_client` issues the opaque Chat calls; `fallback_model`, if set, is
/// tried once when the primary model call errors (the "failover hook").
pub async fn run<C: LoopCallback>(
    request: Request,
    mut ctx: RunContext,
    llm_client: &OpenRouterClient,
    tools: &ToolRegistry,
    fallback_model: Option<&str>,
    callback: &C,
) -> Result<Response> {
    resolve_run_context(&mut ctx, &request, tools);

    let mut messages = request.messages;
    let mut loop_guard = LoopGuard::default();
    let mut tool_call_counts: HashMap<String, u32> = HashMap::new();
    let mut appended_messages: Vec<Message> = Vec::new();
    let mut total_input_tokens = 0u32;
    let mut total_output_tokens = 0u32;
    let mut deferred_text: Option<String> = None;
    let mut executed_tool_iteration = false;
    let mut awaiting_nudge_reply = false;

    let mut current_model = ctx.model.clone();

    let mut iteration: u32 = 0;
    loop {
        iteration += 1;
        if iteration > ctx.max_iterations {
            let content = if !deferred_text.as_deref().unwrap_or("").is_empty() {
                deferred_text.unwrap_or_default()
            } else {
                ctx.fallback_message.clone()
            };
            return Ok(Response {
                content,
                model: current_model,
                finish_reason: FinishReason::MaxIterations,
                input_tokens: total_input_tokens,
                output_tokens: total_output_tokens,
                tool_calls: tool_call_counts,
                appended_messages,
            });
        }

        if Instant::now() >= ctx.deadline {
            return Ok(Response {
                content: ctx.fallback_message.clone(),
                model: current_model,
                finish_reason: FinishReason::MaxIterations,
                input_tokens: total_input_tokens,
                output_tokens: total_output_tokens,
                tool_calls: tool_call_counts,
                appended_messages,
            });
        }

        let visible = tools.visible_tool_names(
            &ctx.active_tags,
            &request.exclude_tools,
            ctx.skip_tag_filter,
            ctx.gated_tools.as_deref(),
        );
        let definitions = tools.definitions_for(&visible);

        let call_result = if definitions.is_empty() {
            llm_client
                .chat_with_model(&current_model, messages.clone(), GenerationOptions::balanced())
                .await
        } else {
            llm_client
                .chat_with_tools(
                    &current_model,
                    messages.clone(),
                    definitions.clone(),
                    GenerationOptions::balanced(),
                )
                .await
        };

        let response = match call_result {
            Ok(resp) => resp,
            Err(e) => {
                if let Some(fallback) = fallback_model {
                    if fallback != current_model {
                        warn!("LLM call failed on {}, failing over to {}: {}", current_model, fallback, e);
                        current_model = fallback.to_string();
                        iteration -= 1;
                        continue;
                    }
                }
                return Err(e);
            }
        };

        if let Some(ref usage) = response.usage {
            total_input_tokens += usage.prompt_tokens;
            total_output_tokens += usage.completion_tokens;
        }

        let choice = match response.choices.first() {
            Some(c) => c,
            None => {
                return Ok(Response {
                    content: ctx.fallback_message.clone(),
                    model: current_model,
                    finish_reason: FinishReason::Error,
                    input_tokens: total_input_tokens,
                    output_tokens: total_output_tokens,
                    tool_calls: tool_call_counts,
                    appended_messages,
                });
            }
        };

        let has_tool_calls = choice
            .message
            .tool_calls
            .as_ref()
            .map(|tc| !tc.is_empty())
            .unwrap_or(false);
        let content_empty = choice.message.content.trim().is_empty();

        // --- tool calls ------------------------------------------------
        if has_tool_calls {
            let tool_calls_list = choice.message.tool_calls.clone().unwrap();

            let assistant_text = choice.message.content.clone();
            if !assistant_text.is_empty() {
                deferred_text = Some(assistant_text);
            }

            let mut stripped = choice.message.clone();
            stripped.content = String::new();
            messages.push(stripped.clone());
            appended_messages.push(stripped);

            for tc in tool_calls_list.iter() {
                let tool_name = &tc.function.name;
                *tool_call_counts.entry(tool_name.clone()).or_insert(0) += 1;

                callback
                    .on_event(LoopEvent::ToolCallStart {
                        name: tool_name.clone(),
                    })
                    .await;

                if !visible.contains(tool_name) {
                    let result = format!("tool {} is not available", tool_name);
                    let msg = Message::tool(&tc.id, &result);
                    messages.push(msg.clone());
                    appended_messages.push(msg);
                    callback
                        .on_event(LoopEvent::ToolCallDone {
                            name: tool_name.clone(),
                            success: false,
                        })
                        .await;
                    continue;
                }

                let args: serde_json::Value =
                    serde_json::from_str(&tc.function.arguments).unwrap_or_else(|_| serde_json::json!({}));

                let call = ToolCall {
                    id: tc.id.clone(),
                    name: tool_name.clone(),
                    arguments: args,
                };

                let exec = tokio::time::timeout(ctx.tool_deadline, tools.execute(&call)).await;

                let (result_content, success, metadata) = match exec {
                    Ok(Ok(r)) => {
                        let success = r.success;
                        let metadata = r.metadata.clone();
                        (r.to_string(), success, metadata)
                    }
                    Ok(Err(e)) => (format!("Tool error: {}", e), false, None),
                    Err(_) => (
                        format!("Tool {} timed out after {:?}", tool_name, ctx.tool_deadline),
                        false,
                        None,
                    ),
                };

                if let Some(meta) = &metadata {
                    if let Some(err) = ctx.apply_capability_change(tool_name, meta) {
                        let msg = Message::tool(
                            &tc.id,
                            format!(
                                "cannot drop capability '{}': channel-pinned",
                                err.0
                            ),
                        );
                        messages.push(msg.clone());
                        appended_messages.push(msg);
                        callback
                            .on_event(LoopEvent::ToolCallDone {
                                name: tool_name.clone(),
                                success: false,
                            })
                            .await;
                        continue;
                    }
                }

                let msg = Message::tool(&tc.id, &result_content);
                messages.push(msg.clone());
                appended_messages.push(msg);

                if let Some(hint) = loop_guard.record(tool_name, &tc.function.arguments, &result_content) {
                    let nudge = Message::system(&hint);
                    messages.push(nudge.clone());
                    appended_messages.push(nudge);
                }

                callback
                    .on_event(LoopEvent::ToolCallDone {
                        name: tool_name.clone(),
                        success,
                    })
                    .await;
            }

            executed_tool_iteration = true;
            awaiting_nudge_reply = false;
            continue;
        }

        // --- non-empty text, no tool calls: final response --------------
        if !content_empty {
            let content = choice.message.content.clone();
            let assistant_msg = Message::assistant(&content);
            messages.push(assistant_msg.clone());
            appended_messages.push(assistant_msg);

            return Ok(Response {
                content,
                model: current_model,
                finish_reason: FinishReason::Stop,
                input_tokens: total_input_tokens,
                output_tokens: total_output_tokens,
                tool_calls: tool_call_counts,
                appended_messages,
            });
        }

        // --- empty text, no tool calls ----------------------------------
        if awaiting_nudge_reply {
            let content = deferred_text.clone().unwrap_or_else(|| ctx.fallback_message.clone());
            return Ok(Response {
                content,
                model: current_model,
                finish_reason: FinishReason::Stop,
                input_tokens: total_input_tokens,
                output_tokens: total_output_tokens,
                tool_calls: tool_call_counts,
                appended_messages,
            });
        }

        if executed_tool_iteration {
            if deferred_text.as_deref().map(|t| !t.is_empty()).unwrap_or(false) {
                debug!("Empty response after a tool-call iteration, retaining deferred text");
                return Ok(Response {
                    content: deferred_text.unwrap_or_default(),
                    model: current_model,
                    finish_reason: FinishReason::Stop,
                    input_tokens: total_input_tokens,
                    output_tokens: total_output_tokens,
                    tool_calls: tool_call_counts,
                    appended_messages,
                });
            }
            debug!("Empty response after a tool-call iteration, injecting nudge");
            let nudge = Message::user(NUDGE_MESSAGE);
            messages.push(nudge.clone());
            appended_messages.push(nudge);
            awaiting_nudge_reply = true;
            continue;
        }

        // First-iteration empty response: no nudge, return fallback directly.
        info!("First-iteration empty response, returning fallback without nudging");
        return Ok(Response {
            content: ctx.fallback_message.clone(),
            model: current_model,
            finish_reason: FinishReason::Stop,
            input_tokens: total_input_tokens,
            output_tokens: total_output_tokens,
            tool_calls: tool_call_counts,
            appended_messages,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_context_defaults() {
        let ctx = RunContext::new("model-x", Duration::from_secs(300), Duration::from_secs(30));
        assert_eq!(ctx.max_iterations, 5);
        assert_eq!(ctx.model, "model-x");
    }

    #[test]
    fn test_apply_capability_change_rejects_pinned_drop() {
        let mut ctx = RunContext::new("m", Duration::from_secs(1), Duration::from_secs(1));
        ctx.pinned_tags.insert("home".to_string());
        ctx.active_tags.insert("home".to_string());

        let meta = serde_json::json!({"drop_capability": "home"});
        let err = ctx.apply_capability_change("drop_capability", &meta);
        assert!(err.is_some());
        assert!(ctx.active_tags.contains("home"));
    }

    #[test]
    fn test_apply_capability_change_allows_unpinned_drop() {
        let mut ctx = RunContext::new("m", Duration::from_secs(1), Duration::from_secs(1));
        ctx.active_tags.insert("games".to_string());

        let meta = serde_json::json!({"drop_capability": "games"});
        let err = ctx.apply_capability_change("drop_capability", &meta);
        assert!(err.is_none());
        assert!(!ctx.active_tags.contains("games"));
    }

    #[test]
    fn test_finish_reason_display() {
        assert_eq!(FinishReason::Stop.to_string(), "stop");
        assert_eq!(FinishReason::MaxIterations.to_string(), "max_iterations");
    }

    struct StubTool(&'static str);

    #[async_trait]
    impl crate::tools::Tool for StubTool {
        fn name(&self) -> &str {
            self.0
        }
        fn description(&self) -> &str {
            "stub"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        async fn execute(&self, _args: serde_json::Value) -> Result<crate::tools::ToolResult> {
            Ok(crate::tools::ToolResult::success("ok"))
        }
    }

    #[test]
    fn test_resolve_run_context_activates_gating_when_configured_and_delegate_present() {
        let mut registry = ToolRegistry::new();
        registry.register(StubTool("delegate"));

        let mut ctx = RunContext::new("m", Duration::from_secs(1), Duration::from_secs(1));
        ctx.configured_gated_tools = vec!["delegate".to_string(), "home_tool".to_string()];
        let request = Request::default();

        resolve_run_context(&mut ctx, &request, &registry);
        assert_eq!(ctx.gated_tools, Some(vec!["delegate".to_string(), "home_tool".to_string()]));
    }

    #[test]
    fn test_resolve_run_context_disabled_hint_skips_gating() {
        let mut registry = ToolRegistry::new();
        registry.register(StubTool("delegate"));

        let mut ctx = RunContext::new("m", Duration::from_secs(1), Duration::from_secs(1));
        ctx.configured_gated_tools = vec!["delegate".to_string()];
        let mut request = Request::default();
        request.hints.insert("delegation_gating".to_string(), "disabled".to_string());

        resolve_run_context(&mut ctx, &request, &registry);
        assert_eq!(ctx.gated_tools, None);
    }

    #[test]
    fn test_resolve_run_context_no_delegate_tool_skips_gating() {
        let registry = ToolRegistry::new();
        let mut ctx = RunContext::new("m", Duration::from_secs(1), Duration::from_secs(1));
        ctx.configured_gated_tools = vec!["delegate".to_string()];
        let request = Request::default();

        resolve_run_context(&mut ctx, &request, &registry);
        assert_eq!(ctx.gated_tools, None);
    }

    #[test]
    fn test_resolve_run_context_unconfigured_list_skips_gating() {
        let mut registry = ToolRegistry::new();
        registry.register(StubTool("delegate"));
        let mut ctx = RunContext::new("m", Duration::from_secs(1), Duration::from_secs(1));
        let request = Request::default();

        resolve_run_context(&mut ctx, &request, &registry);
        assert_eq!(ctx.gated_tools, None);
    }

    #[test]
    fn test_resolve_run_context_skip_tag_filter_hint() {
        let registry = ToolRegistry::new();
        let mut ctx = RunContext::new("m", Duration::from_secs(1), Duration::from_secs(1));
        let mut request = Request::default();
        request.hints.insert("skip_tag_filter".to_string(), "true".to_string());

        resolve_run_context(&mut ctx, &request, &registry);
        assert!(ctx.skip_tag_filter);
    }

    // --- end-to-end run() tests against a mocked LLM endpoint -------------

    fn test_llm_config(base_url: String) -> crate::config::OpenRouterConfig {
        crate::config::OpenRouterConfig {
            api_key: secrecy::SecretString::from("test-key".to_string()),
            default_model: "m".to_string(),
            site_url: None,
            site_name: None,
            base_url,
            timeout_secs: 30,
            max_retries: 3,
        }
    }

    struct SequencedResponder {
        bodies: Vec<serde_json::Value>,
        captured: std::sync::Mutex<Vec<serde_json::Value>>,
    }

    impl wiremock::Respond for SequencedResponder {
        fn respond(&self, req: &wiremock::Request) -> wiremock::ResponseTemplate {
            let parsed: serde_json::Value = serde_json::from_slice(&req.body).unwrap_or(serde_json::Value::Null);
            let mut captured = self.captured.lock().unwrap();
            let idx = captured.len();
            captured.push(parsed);
            let body = self.bodies.get(idx).or_else(|| self.bodies.last()).unwrap();
            wiremock::ResponseTemplate::new(200).set_body_json(body)
        }
    }

    fn completion_body(content: &str, tool_call: Option<(&str, &str)>, finish_reason: &str) -> serde_json::Value {
        let message = match tool_call {
            Some((id, name)) => serde_json::json!({
                "role": "assistant",
                "content": content,
                "tool_calls": [{"id": id, "type": "function", "function": {"name": name, "arguments": "{}"}}]
            }),
            None => serde_json::json!({"role": "assistant", "content": content}),
        };
        serde_json::json!({
            "id": "gen-1", "object": "chat.completion", "created": 0, "model": "m",
            "choices": [{"index": 0, "message": message, "finish_reason": finish_reason}],
            "usage": {"prompt_tokens": 1, "completion_tokens": 1, "total_tokens": 2}
        })
    }

    #[tokio::test]
    async fn test_deferred_text_retained_without_nudge_on_empty_followup() {
        let server = wiremock::MockServer::start().await;
        let responder = SequencedResponder {
            bodies: vec![
                completion_body("Turning it on.", Some(("call1", "light")), "tool_calls"),
                completion_body("", None, "stop"),
            ],
            captured: std::sync::Mutex::new(Vec::new()),
        };
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path("/chat/completions"))
            .respond_with(responder)
            .mount(&server)
            .await;

        let client = OpenRouterClient::new(test_llm_config(server.uri())).unwrap();
        let mut tools = ToolRegistry::new();
        tools.register(StubTool("light"));

        let request = Request {
            messages: vec![Message::user("turn on the light")],
            ..Default::default()
        };
        let ctx = RunContext::new("m", Duration::from_secs(30), Duration::from_secs(5));

        let response = run(request, ctx, &client, &tools, None, &NoOpCallback).await.unwrap();
        assert_eq!(response.content, "Turning it on.");
        assert_eq!(response.finish_reason, FinishReason::Stop);
    }

    #[tokio::test]
    async fn test_delegation_gating_restricts_tool_visibility_every_iteration() {
        let server = wiremock::MockServer::start().await;
        let responder = SequencedResponder {
            bodies: vec![
                completion_body("", Some(("call1", "delegate")), "tool_calls"),
                completion_body("All done.", None, "stop"),
            ],
            captured: std::sync::Mutex::new(Vec::new()),
        };
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path("/chat/completions"))
            .respond_with(responder)
            .mount(&server)
            .await;

        let client = OpenRouterClient::new(test_llm_config(server.uri())).unwrap();
        let mut tools = ToolRegistry::new();
        tools.register(StubTool("light"));
        tools.register(StubTool("delegate"));

        let request = Request {
            messages: vec![Message::user("do the thing")],
            ..Default::default()
        };
        let mut ctx = RunContext::new("m", Duration::from_secs(30), Duration::from_secs(5));
        ctx.configured_gated_tools = vec!["delegate".to_string()];

        let response = run(request, ctx, &client, &tools, None, &NoOpCallback).await.unwrap();
        assert_eq!(response.content, "All done.");

        // Inspect what was actually sent to the model on both iterations.
        let requests: Vec<serde_json::Value> = server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .map(|r| serde_json::from_slice(&r.body).unwrap())
            .collect();
        assert_eq!(requests.len(), 2);
        for req in &requests {
            let names: Vec<&str> = req["tools"]
                .as_array()
                .unwrap()
                .iter()
                .map(|t| t["function"]["name"].as_str().unwrap())
                .collect();
            assert_eq!(names, vec!["delegate"]);
        }
    }
}
