//! Native chat-completions HTTP surface (spec §6).

use std::collections::HashMap;
use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::stream;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::agent::{self, build_system_prompt, CapabilityContext, Message, Request, RunContext};
use crate::http::SharedRuntime;
use crate::router::RouterRequest;

pub fn router(state: SharedRuntime) -> Router {
    Router::new()
        .route("/v1/chat/completions", post(chat_completions))
        .route("/v1/chat", post(simple_chat))
        .route("/v1/models", get(list_models))
        .route("/v1/router/stats", get(router_stats))
        .route("/v1/router/audit", get(router_audit))
        .route("/v1/router/explain/{request_id}", get(router_explain))
        .route("/v1/conversations", get(list_conversations))
        .route("/v1/conversations/{id}", get(get_conversation))
        .route("/v1/tools/stats", get(tool_stats))
        .route("/v1/checkpoint/{conversation_id}", get(list_checkpoints).post(create_checkpoint))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct ChatCompletionsBody {
    #[serde(default)]
    model: String,
    messages: Vec<WireMessage>,
    #[serde(default)]
    stream: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
struct WireMessage {
    role: String,
    content: String,
}

impl WireMessage {
    fn into_message(self) -> Message {
        match self.role.as_str() {
            "system" => Message::system(self.content),
            "assistant" => Message::assistant(self.content),
            _ => Message::user(self.content),
        }
    }
}

async fn run_one_shot(state: &SharedRuntime, model: Option<String>, messages: Vec<Message>) -> crate::error::Result<agent::Response> {
    let capability_ctx = CapabilityContext::new(&state.capability_tags);
    let active_tags = capability_ctx.seed_active_tags(&[]);
    let capability_block = capability_ctx.render(&active_tags, &state.talents_dir);
    let system_prompt = build_system_prompt(&state.persona, Some("Channel: http"), &capability_block, "", None);

    let last_user = messages
        .iter()
        .rev()
        .find(|m| matches!(m.role, crate::agent::Role::User))
        .map(|m| m.content.clone())
        .unwrap_or_default();

    let mut hints = HashMap::new();
    hints.insert("source".to_string(), "http".to_string());

    let mut full_messages = vec![Message::system(system_prompt)];
    full_messages.extend(messages);

    let request = Request {
        messages: full_messages,
        conversation_id: None,
        preferred_model: model,
        hints,
        exclude_tools: vec![],
    };

    let router_request = RouterRequest::new(&last_user);
    let (routed_model, _decision) = state.router.route("http", &router_request);
    let chosen_model = request.preferred_model.clone().filter(|m| !m.is_empty()).unwrap_or(routed_model);
    let mut run_ctx = RunContext::new(chosen_model, Duration::from_secs(300), Duration::from_secs(30));
    run_ctx.active_tags = active_tags;
    run_ctx.configured_gated_tools = state.config.agent.iteration_gated_tools.clone();

    agent::run(request, run_ctx, &state.llm_client, &state.tools, None, &agent::NoOpCallback).await
}

async fn chat_completions(
    State(state): State<SharedRuntime>,
    Json(body): Json<ChatCompletionsBody>,
) -> impl IntoResponse {
    let messages: Vec<Message> = body.messages.into_iter().map(WireMessage::into_message).collect();
    let model = if body.model.is_empty() { None } else { Some(body.model) };

    if !body.stream {
        return match run_one_shot(&state, model, messages).await {
            Ok(response) => Json(json!({
                "id": uuid::Uuid::new_v4().to_string(),
                "object": "chat.completion",
                "model": response.model,
                "choices": [{
                    "index": 0,
                    "message": {"role": "assistant", "content": response.content},
                    "finish_reason": response.finish_reason.to_string(),
                }],
                "usage": {
                    "prompt_tokens": response.input_tokens,
                    "completion_tokens": response.output_tokens,
                    "total_tokens": response.input_tokens + response.output_tokens,
                }
            }))
            .into_response(),
            Err(e) => (axum::http::StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
        };
    }

    let outcome = run_one_shot(&state, model, messages).await;
    let events: Vec<crate::error::Result<Event>> = match outcome {
        Ok(response) => vec![
            Ok(Event::default().data(json!({"choices": [{"delta": {"role": "assistant"}}]}).to_string())),
            Ok(Event::default().data(json!({"choices": [{"delta": {"content": response.content}}]}).to_string())),
            Ok(Event::default().data("[DONE]")),
        ],
        Err(e) => vec![Ok(Event::default().data(json!({"error": e.to_string()}).to_string()))],
    };
    let stream = stream::iter(events.into_iter().map(|e| Ok::<Event, Infallible>(e.unwrap())));
    Sse::new(stream).keep_alive(KeepAlive::default()).into_response()
}

#[derive(Debug, Deserialize)]
struct SimpleChatBody {
    message: String,
    conversation_id: Option<String>,
}

async fn simple_chat(State(state): State<SharedRuntime>, Json(body): Json<SimpleChatBody>) -> impl IntoResponse {
    let conversation_id = body
        .conversation_id
        .unwrap_or_else(|| crate::bridges::conversation_id_for("http", &uuid::Uuid::new_v4().to_string()));

    let history = state.conversations.recent(&conversation_id, 20).await.unwrap_or_default();
    let user_message = Message::user(body.message.clone());
    let mut messages = history;
    messages.push(user_message.clone());

    match run_one_shot(&state, None, messages).await {
        Ok(response) => {
            let _ = state.conversations.append(&conversation_id, &user_message).await;
            for appended in &response.appended_messages {
                let _ = state.conversations.append(&conversation_id, appended).await;
            }
            Json(json!({
                "response": response.content,
                "model": response.model,
                "conversation_id": conversation_id,
                "tool_calls": response.tool_calls,
            }))
            .into_response()
        }
        Err(e) => (axum::http::StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

async fn list_models(State(state): State<SharedRuntime>) -> impl IntoResponse {
    Json(json!({ "data": state.config.router.models }))
}

async fn router_stats(State(state): State<SharedRuntime>) -> impl IntoResponse {
    let stats = state.router.get_stats();
    Json(json!({
        "configured_models": stats.configured_models,
        "decisions_recorded": stats.decisions_recorded,
        "models_on_cooldown": stats.models_on_cooldown,
    }))
}

#[derive(Debug, Deserialize)]
struct AuditQuery {
    limit: Option<usize>,
}

async fn router_audit(State(state): State<SharedRuntime>, Query(q): Query<AuditQuery>) -> impl IntoResponse {
    let log = state.router.get_audit_log(q.limit.unwrap_or(50));
    Json(json!({ "decisions": log.iter().map(|d| json!({
        "request_id": d.request_id,
        "chosen_model": d.chosen_model,
        "timestamp": d.timestamp,
    })).collect::<Vec<_>>() }))
}

async fn router_explain(State(state): State<SharedRuntime>, Path(request_id): Path<String>) -> impl IntoResponse {
    match state.router.explain(&request_id) {
        Some(decision) => Json(json!({
            "request_id": decision.request_id,
            "chosen_model": decision.chosen_model,
            "candidate_score_map": decision.candidate_score_map,
            "rules_matched": decision.rules_matched,
        }))
        .into_response(),
        None => (axum::http::StatusCode::NOT_FOUND, "no such routing decision").into_response(),
    }
}

async fn list_conversations(State(state): State<SharedRuntime>) -> impl IntoResponse {
    match state.conversations.list_ids().await {
        Ok(ids) => Json(json!({ "conversations": ids })).into_response(),
        Err(e) => (axum::http::StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

async fn get_conversation(State(state): State<SharedRuntime>, Path(id): Path<String>) -> impl IntoResponse {
    match state.conversations.recent(&id, 200).await {
        Ok(messages) => Json(json!({ "conversation_id": id, "messages": messages })).into_response(),
        Err(e) => (axum::http::StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

async fn tool_stats(State(state): State<SharedRuntime>) -> impl IntoResponse {
    Json(json!({ "count": state.tools.count(), "names": state.tools.names() }))
}

#[derive(Debug, Deserialize)]
struct CheckpointQuery {
    limit: Option<i64>,
}

async fn list_checkpoints(
    State(state): State<SharedRuntime>,
    Path(conversation_id): Path<String>,
    Query(q): Query<CheckpointQuery>,
) -> impl IntoResponse {
    match state.checkpoints.list_for_conversation(&conversation_id, q.limit.unwrap_or(20)).await {
        Ok(records) => Json(json!({ "checkpoints": records })).into_response(),
        Err(e) => (axum::http::StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct CreateCheckpointBody {
    label: String,
    blob: String,
}

async fn create_checkpoint(
    State(state): State<SharedRuntime>,
    Path(conversation_id): Path<String>,
    Json(body): Json<CreateCheckpointBody>,
) -> impl IntoResponse {
    match state.checkpoints.create(&conversation_id, &body.label, &body.blob).await {
        Ok(record) => Json(record).into_response(),
        Err(e) => (axum::http::StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}
