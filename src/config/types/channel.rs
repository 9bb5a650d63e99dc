//! Trigger-bridge configuration types
//!
//! Configuration for the chat bridge (Telegram) and the admission-control /
//! capability-tag-pinning settings shared by every bridge.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// All bridge configurations
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelsConfig {
    /// Telegram chat bridge configuration
    pub telegram: Option<TelegramConfig>,
    /// Smart-home platform configuration (state-change subscription source)
    pub smart_home: Option<SmartHomeConfig>,
}

/// Smart-home platform configuration: a Home-Assistant-like REST state API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmartHomeConfig {
    pub base_url: String,
    #[serde(skip_serializing)]
    pub token: SecretString,
    /// Entities polled for state transitions
    #[serde(default)]
    pub watched_entities: Vec<String>,
    /// Poll interval in seconds
    #[serde(default = "default_state_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

fn default_state_poll_interval_secs() -> u64 {
    10
}

/// Telegram bot configuration (the concrete chat trigger bridge)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Bot token
    #[serde(skip_serializing)]
    pub bot_token: SecretString,
    /// Allowed user IDs (empty = allow all)
    #[serde(default)]
    pub allow_from: Vec<i64>,
    /// Per-minute admission cap for the sliding-window rate limiter (0 disables)
    #[serde(default = "default_rate_limit_per_minute")]
    pub rate_limit_per_minute: u32,
    /// Tool name whose invocation counts as "the model already replied"
    #[serde(default = "default_reply_tool_name")]
    pub reply_tool_name: String,
    /// Tool access configuration
    #[serde(default)]
    pub tools: ToolAccessConfig,
    /// Capability tags pinned active for every Run originating on this channel
    #[serde(default)]
    pub pinned_tags: Vec<String>,
}

fn default_rate_limit_per_minute() -> u32 {
    10
}

fn default_reply_tool_name() -> String {
    "send_message_to_user".to_string()
}

/// Tool access configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolAccessConfig {
    /// Allowed tools (whitelist)
    #[serde(default)]
    pub allow: Vec<String>,
    /// Denied tools (blacklist)
    #[serde(default)]
    pub deny: Vec<String>,
}

/// A configured capability tag (spec §3 "Capability tag")
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityTagConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub context_files: Vec<String>,
    #[serde(default)]
    pub always_active: bool,
}

/// Named capability tags plus channel -> tag pinning map
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CapabilitiesConfig {
    #[serde(default)]
    pub tags: Vec<CapabilityTagConfig>,
    /// channel name -> tag names pinned active for Runs from that channel
    #[serde(default)]
    pub channel_pins: HashMap<String, Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_reply_tool_name() {
        assert_eq!(default_reply_tool_name(), "send_message_to_user");
    }

    #[test]
    fn test_tool_access_default() {
        let access = ToolAccessConfig::default();
        assert!(access.allow.is_empty());
        assert!(access.deny.is_empty());
    }
}
