//! Capability tag control tools.
//!
//! These tools don't mutate state themselves: the agent loop owns the
//! per-Run active-tag set, so the tool only validates its argument and
//! reports the requested change via `ToolResult::metadata`. The loop reads
//! that metadata after execution, applies the change (rejecting drops of
//! channel-pinned tags per spec §5), and records the outcome.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::tools::traits::{Tool, ToolResult};

/// Requests that a capability tag be deactivated for the remainder of this Run.
pub struct DropCapabilityTool;

#[async_trait]
impl Tool for DropCapabilityTool {
    fn name(&self) -> &str {
        "drop_capability"
    }

    fn description(&self) -> &str {
        "Deactivate a capability tag you no longer need for this conversation, hiding its tools from you. Channel-pinned tags cannot be dropped."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "tag": { "type": "string", "description": "Name of the capability tag to drop" }
            },
            "required": ["tag"]
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let tag = args
            .get("tag")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::InvalidInput("Missing 'tag' parameter".into()))?;

        Ok(ToolResult::success_with_metadata(
            format!("Requested drop of capability tag '{}'.", tag),
            serde_json::json!({ "drop_capability": tag }),
        ))
    }
}

/// Requests that a capability tag be activated for the remainder of this Run.
pub struct ActivateCapabilityTool;

#[async_trait]
impl Tool for ActivateCapabilityTool {
    fn name(&self) -> &str {
        "activate_capability"
    }

    fn description(&self) -> &str {
        "Activate a capability tag to reveal its tools for the remainder of this conversation."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "tag": { "type": "string", "description": "Name of the capability tag to activate" }
            },
            "required": ["tag"]
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let tag = args
            .get("tag")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::InvalidInput("Missing 'tag' parameter".into()))?;

        Ok(ToolResult::success_with_metadata(
            format!("Requested activation of capability tag '{}'.", tag),
            serde_json::json!({ "activate_capability": tag }),
        ))
    }
}
