//! Tools module - modular tool system for agent capabilities
//!
//! Each tool is a self-contained module that implements the `Tool` trait.
//! Tools are registered into a `ToolRegistry` and made available to the LLM
//! for function calling. Capability tags gate tool visibility per Run; see
//! `ToolRegistry::visible_tool_names`.
//!
//! ## Built-in tools
//!
//! - **read_file** / **write_file**: workspace file access
//! - **send_message_to_user**: explicit channel reply (spec §4.4 reply tool)
//! - **drop_capability** / **activate_capability**: per-Run tag control (spec §5)
//! - **task_create** / **task_list** / **task_update**: scheduled-task-bridge task management
//! - **delegate**: hand a sub-task to a background worker under iteration gating (spec §4.1)
//!
//! ## Adding a new tool
//!
//! 1. Create a new file in `src/tools/` (e.g., `my_tool.rs`)
//! 2. Implement the `Tool` trait
//! 3. Add `mod my_tool;` and `pub use` in this file
//! 4. Register it where the tool registry is built (`bin/cli.rs`)

mod capability;
mod delegate;
mod read_file;
mod registry;
mod reply;
mod task;
mod traits;
mod write_file;

// Core trait and types
pub use traits::{Tool, ToolCall, ToolResult};

// Registry
pub use registry::ToolRegistry;

// Built-in tools
pub use capability::{ActivateCapabilityTool, DropCapabilityTool};
pub use delegate::DelegateTool;
pub use read_file::ReadFileTool;
pub use reply::SendMessageToUserTool;
pub use task::{TaskCreateTool, TaskListTool, TaskUpdateTool};
pub use write_file::WriteFileTool;
