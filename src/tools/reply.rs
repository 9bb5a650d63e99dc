//! Reply tool - lets the model send its response itself instead of letting
//! the bridge forward the Run's returned text.
//!
//! Bridges check `Response.tool_calls` for an invocation of the channel's
//! configured `reply_tool_name` (spec §4.4) and skip their own send when
//! present, to avoid a duplicate message.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::tools::traits::{Tool, ToolResult};

/// Sends a message directly to the user on the originating channel.
pub struct SendMessageToUserTool;

#[async_trait]
impl Tool for SendMessageToUserTool {
    fn name(&self) -> &str {
        "send_message_to_user"
    }

    fn description(&self) -> &str {
        "Send a message directly to the user on the current channel. Use this instead of (or in addition to) your final response text when you want to be explicit about what was sent."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "message": {
                    "type": "string",
                    "description": "The message text to send to the user"
                }
            },
            "required": ["message"]
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let message = args
            .get("message")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::InvalidInput("Missing 'message' parameter".into()))?;

        Ok(ToolResult::success_with_metadata(
            "Message sent.",
            serde_json::json!({ "sent_message": message }),
        ))
    }
}
