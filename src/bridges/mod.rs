//! Trigger Bridges (spec §4.4): converts external event streams into agent
//! Runs and routes responses back.
//!
//! Every bridge shares: a stable per-sender conversation id, sliding-window
//! per-sender admission control, and self-reply-tool detection so the
//! bridge never double-sends when the model already replied via a tool.

mod admission;
mod chat;
mod schedule;
mod state;
mod telegram;

pub use admission::RateLimiter;
pub use chat::{ChatBridge, ChatContext, ChatTransport, IncomingMessage};
pub use schedule::ScheduleBridge;
pub use state::{PollingStateChangeStream, StateBridge, StateChangeStream};
pub use telegram::TelegramTransport;

/// Build a stable `conversation_id` for an external addressable sender:
/// `chat-<sanitized-sender>` where sanitization keeps alphanumerics only.
pub fn conversation_id_for(source: &str, sender: &str) -> String {
    let sanitized: String = sender.chars().filter(|c| c.is_alphanumeric()).collect();
    format!("{}-{}", source, sanitized)
}

/// Whether the Response already sent itself via a reply tool (matching
/// suffix `reply_tool_name`), in which case the bridge must skip its own send.
pub fn already_replied_via_tool(tool_calls: &std::collections::HashMap<String, u32>, reply_tool_name: &str) -> bool {
    tool_calls.get(reply_tool_name).copied().unwrap_or(0) > 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversation_id_sanitizes_sender() {
        assert_eq!(conversation_id_for("chat", "user@42!"), "chat-user42");
    }

    #[test]
    fn test_already_replied_detects_reply_tool() {
        let mut calls = std::collections::HashMap::new();
        calls.insert("send_message_to_user".to_string(), 1);
        assert!(already_replied_via_tool(&calls, "send_message_to_user"));
        assert!(!already_replied_via_tool(&calls, "other_tool"));
    }
}
