//! Ollama-compatible dumb-pipe HTTP surface (spec §6 ambient addition):
//! NDJSON request/response shape for clients written against Ollama's API,
//! piping straight through to the same agent loop as the native surface.
//!
//! Because the upstream caller wasn't written against this agent, its
//! requests need cleaning before they reach the loop (spec §6 "Dumb-pipe
//! chat-model compatibility surface"): system messages and tool definitions
//! it injects are stripped (salvaging any embedded location hint first), and
//! JSON-encoded tool-call leakage left over from prior assistant turns is
//! cleaned down to trailing free text. See `sanitize`.

use std::collections::HashMap;
use std::convert::Infallible;
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::stream;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::agent::{self, build_system_prompt, CapabilityContext, Message, Request, RunContext};
use crate::http::SharedRuntime;
use crate::router::RouterRequest;

pub fn router(state: SharedRuntime) -> Router {
    Router::new()
        .route("/api/chat", post(chat))
        .route("/api/tags", get(tags))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct CompatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatBody {
    #[serde(default)]
    model: String,
    messages: Vec<CompatMessage>,
    #[serde(default = "default_stream")]
    stream: bool,
    /// Upstream tool definitions, captured only to be detected and
    /// discarded — the daemon-compat surface never forwards a caller's tool
    /// schema into the agent loop, which has its own registry.
    #[serde(default)]
    tools: Vec<serde_json::Value>,
}

fn default_stream() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Request cleaning (spec §6 "Dumb-pipe chat-model compatibility surface",
// §8 "Daemon-compat request cleaning")
// ---------------------------------------------------------------------------

const AREA_HINT_PREFIX: &str = "You are in area ";

/// Salvage a location hint from an upstream-injected system message, e.g.
/// `"You are in area Office (floor 1)"` -> `Some("Office (floor 1)")`.
fn extract_area_hint(system_content: &str) -> Option<String> {
    system_content.find(AREA_HINT_PREFIX).map(|idx| {
        system_content[idx + AREA_HINT_PREFIX.len()..]
            .trim_end_matches('.')
            .trim()
            .to_string()
    })
}

/// Strip a JSON-encoded tool-call prefix (escaped or unescaped) from a prior
/// assistant turn, reducing it to any trailing free text.
fn clean_tool_call_leakage(content: &str) -> String {
    let unescaped = content.replace("\\\"", "\"").replace("\\n", "\n");
    let candidate = unescaped.trim_start();
    if !(candidate.starts_with('{') || candidate.starts_with('[')) {
        return content.to_string();
    }

    let mut stream = serde_json::Deserializer::from_str(candidate).into_iter::<serde_json::Value>();
    match stream.next() {
        Some(Ok(_)) => candidate[stream.byte_offset()..].trim().to_string(),
        _ => content.to_string(),
    }
}

/// Result of cleaning an upstream request before it enters the agent loop.
struct SanitizedRequest {
    messages: Vec<Message>,
    area_hint: Option<String>,
}

/// Detect and strip system messages and tool definitions injected by the
/// upstream caller (salvaging a location hint first), and clean JSON tool-call
/// leakage out of prior assistant turns.
fn sanitize(body: &ChatBody) -> SanitizedRequest {
    if !body.tools.is_empty() {
        debug!("compat: discarding {} upstream tool definition(s)", body.tools.len());
    }

    let mut area_hint = None;
    let mut messages = Vec::with_capacity(body.messages.len());

    for m in &body.messages {
        match m.role.as_str() {
            "system" => {
                if area_hint.is_none() {
                    area_hint = extract_area_hint(&m.content);
                }
                debug!("compat: stripping upstream system message");
            }
            "assistant" => {
                messages.push(Message::assistant(clean_tool_call_leakage(&m.content)));
            }
            _ => messages.push(Message::user(m.content.clone())),
        }
    }

    SanitizedRequest { messages, area_hint }
}

async fn chat(State(state): State<SharedRuntime>, Json(body): Json<ChatBody>) -> impl IntoResponse {
    let sanitized = sanitize(&body);

    let capability_ctx = CapabilityContext::new(&state.capability_tags);
    let active_tags = capability_ctx.seed_active_tags(&[]);
    let capability_block = capability_ctx.render(&active_tags, &state.talents_dir);
    let channel_context = match &sanitized.area_hint {
        Some(area) => format!("Channel: compat | Area: {}", area),
        None => "Channel: compat".to_string(),
    };
    let system_prompt = build_system_prompt(&state.persona, Some(&channel_context), &capability_block, "", None);

    let last_user = sanitized
        .messages
        .iter()
        .rev()
        .find(|m| matches!(m.role, crate::agent::Role::User))
        .map(|m| m.content.clone())
        .unwrap_or_default();

    let mut hints = HashMap::new();
    hints.insert("source".to_string(), "compat".to_string());
    if let Some(area) = &sanitized.area_hint {
        hints.insert("area".to_string(), area.clone());
    }

    let mut full_messages = vec![Message::system(system_prompt)];
    full_messages.extend(sanitized.messages);

    let request = Request {
        messages: full_messages,
        conversation_id: None,
        preferred_model: if body.model.is_empty() { None } else { Some(body.model.clone()) },
        hints,
        exclude_tools: vec![],
    };

    let router_request = RouterRequest::new(&last_user);
    let (routed_model, _decision) = state.router.route("compat", &router_request);
    let chosen_model = request.preferred_model.clone().unwrap_or(routed_model);
    let mut run_ctx = RunContext::new(chosen_model, Duration::from_secs(300), Duration::from_secs(30));
    run_ctx.active_tags = active_tags;
    run_ctx.configured_gated_tools = state.config.agent.iteration_gated_tools.clone();

    let outcome = agent::run(request, run_ctx, &state.llm_client, &state.tools, None, &agent::NoOpCallback).await;

    let response = match outcome {
        Ok(r) => r,
        Err(e) => {
            return (axum::http::StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
        }
    };

    if !body.stream {
        return Json(json!({
            "model": response.model,
            "message": {"role": "assistant", "content": response.content},
            "done": true,
        }))
        .into_response();
    }

    // Tool-call iterations already buffer inside the agent loop (one-shot
    // `run_one_shot`-style call), so intermediate JSON never reaches the
    // stream; we only need to shape the output as role -> content -> stats.
    let role_line = serde_json::to_string(&json!({
        "model": response.model,
        "message": {"role": "assistant", "content": ""},
        "done": false,
    }))
    .unwrap_or_default();
    let content_line = serde_json::to_string(&json!({
        "model": response.model,
        "message": {"role": "assistant", "content": response.content},
        "done": false,
    }))
    .unwrap_or_default();
    let done_line = serde_json::to_string(&json!({
        "model": response.model,
        "message": {"role": "assistant", "content": ""},
        "done": true,
        "prompt_eval_count": response.input_tokens,
        "eval_count": response.output_tokens,
    }))
    .unwrap_or_default();

    let lines = vec![format!("{}\n", role_line), format!("{}\n", content_line), format!("{}\n", done_line)];
    let body = Body::from_stream(stream::iter(lines.into_iter().map(Ok::<_, Infallible>)));

    axum::http::Response::builder()
        .header("content-type", "application/x-ndjson")
        .body(body)
        .unwrap()
        .into_response()
}

async fn tags(State(state): State<SharedRuntime>) -> impl IntoResponse {
    let models: Vec<_> = state
        .config
        .router
        .models
        .iter()
        .map(|m| json!({ "name": m.name, "model": m.name }))
        .collect();
    Json(json!({ "models": models }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_area_hint() {
        let hint = extract_area_hint("You are in area Office (floor 1).");
        assert_eq!(hint.as_deref(), Some("Office (floor 1)"));
    }

    #[test]
    fn test_extract_area_hint_absent() {
        assert_eq!(extract_area_hint("Be a helpful assistant."), None);
    }

    #[test]
    fn test_clean_tool_call_leakage_strips_unescaped_json_prefix() {
        let content = r#"{"tool_calls":[{"name":"turn_on_light"}]}Here's your answer."#;
        assert_eq!(clean_tool_call_leakage(content), "Here's your answer.");
    }

    #[test]
    fn test_clean_tool_call_leakage_strips_escaped_json_prefix() {
        let content = r#"{\"tool_calls\":[{\"name\":\"turn_on_light\"}]}\nAll set."#;
        assert_eq!(clean_tool_call_leakage(content), "All set.");
    }

    #[test]
    fn test_clean_tool_call_leakage_leaves_plain_text_alone() {
        let content = "Just a normal reply.";
        assert_eq!(clean_tool_call_leakage(content), content);
    }

    #[test]
    fn test_clean_tool_call_leakage_empty_remainder() {
        let content = r#"{"tool_calls":[]}"#;
        assert_eq!(clean_tool_call_leakage(content), "");
    }

    #[test]
    fn test_sanitize_strips_system_and_salvages_area() {
        let body = ChatBody {
            model: String::new(),
            messages: vec![
                CompatMessage {
                    role: "system".to_string(),
                    content: "You are in area Office (floor 1).".to_string(),
                },
                CompatMessage {
                    role: "assistant".to_string(),
                    content: r#"{"tool_calls":[{"name":"x"}]}Done."#.to_string(),
                },
                CompatMessage {
                    role: "user".to_string(),
                    content: "Turn on the lights.".to_string(),
                },
            ],
            stream: false,
            tools: vec![json!({"type": "function", "function": {"name": "turn_on_light"}})],
        };

        let sanitized = sanitize(&body);
        assert_eq!(sanitized.area_hint.as_deref(), Some("Office (floor 1)"));
        assert_eq!(sanitized.messages.len(), 2);
        assert!(!sanitized
            .messages
            .iter()
            .any(|m| matches!(m.role, crate::agent::Role::System)));
        assert_eq!(sanitized.messages[0].content, "Done.");
    }
}
