//! Agent module - LLM logic, prompt engineering, and the agent loop
//!
//! This module handles all AI-related functionality:
//! - OpenRouter API client for multi-model LLM access
//! - Message handling and conversation management
//! - Prompt templates and the default persona
//! - The tool-calling agent loop (`agentic_loop`) and its stuck-loop guard
//!
//! Tool implementations live in `crate::tools`. Model selection lives in
//! `crate::router`.

mod agentic_loop;
mod client;
pub mod context;
mod conversation;
mod loop_guard;
pub mod prompts;
pub(crate) mod types;

pub use agentic_loop::{
    run, FinishReason, LoopCallback, LoopEvent, NoOpCallback, Request, Response, RunContext,
};
pub use client::OpenRouterClient;
pub use context::{build_system_prompt, CapabilityContext, EgoNotes};
pub use conversation::{Conversation, ConversationManager};
pub use loop_guard::LoopGuard;
pub use prompts::{Persona, PromptTemplate};
pub use types::*;
