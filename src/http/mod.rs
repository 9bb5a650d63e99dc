//! HTTP surfaces (spec §6 "External interfaces"): the native chat-completions
//! API with SSE streaming and the Ollama-compatible dumb-pipe surface.
//!
//! Grounded in the teacher's `bin/streaming_webhook_gateway.rs` (SSE +
//! `stream::unfold` + `KeepAlive`) and `bin/gateway.rs` (`AppState`
//! conventions), retargeted from the Telegram-only gateway onto a
//! generic HTTP entry point that drives the same agent loop.

pub mod compat;
pub mod native;

use std::sync::Arc;

use crate::runtime::Runtime;

/// Shared application state handed to every HTTP handler.
pub type SharedRuntime = Arc<Runtime>;
