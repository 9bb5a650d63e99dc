//! # Hearth
//!
//! An autonomous household assistant that drives an LLM agent loop from
//! chat messages, smart-home state changes, and scheduled triggers.
//!
//! ## Architecture
//!
//! - **Agent** (`agent`): the tool-calling loop, OpenRouter client, conversation
//!   history, and persona prompts
//! - **Router** (`router`): picks a model per Run from capability/cost/quality
//!   scoring, with cooldown-based failover
//! - **Tools** (`tools`): the tool registry and built-in tools (file access,
//!   channel replies, capability-tag control, scheduled tasks)
//! - **Configuration** (`config`): layered defaults/file/env configuration
//! - **Database** (`database`): SQLite-backed persistence for conversations,
//!   anticipations, scheduled tasks, and usage records
//! - **Anticipation** (`anticipation`): the proactive-wake engine
//! - **Bridges** (`bridges`): the chat, state, and scheduled-task trigger sources
//! - **Bus** (`bus`): the non-blocking event bus connecting bridges to the loop
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use hearth::config::load_config;
//! use hearth::Result;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = load_config()?;
//!     let _ = config;
//!     Ok(())
//! }
//! ```

pub mod agent;

#[path = "config/mod.rs"]
pub mod config;

pub mod anticipation;
pub mod bridges;
pub mod bus;
pub mod database;
pub mod error;
pub mod http;
pub mod router;
pub mod runtime;
pub mod tools;

pub use error::{Error, Result};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const NAME: &str = env!("CARGO_PKG_NAME");
