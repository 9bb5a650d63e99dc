//! Configuration types module

pub mod channel;
pub mod provider;
pub mod storage;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Agent configuration
    #[serde(default)]
    pub agent: AgentConfig,

    /// Provider configuration (OpenRouter, etc.)
    #[serde(default)]
    pub provider: provider::ProviderConfig,

    /// Bridge configurations (chat/state/schedule)
    #[serde(default)]
    pub channels: channel::ChannelsConfig,

    /// Capability tags and channel pinning
    #[serde(default)]
    pub capabilities: channel::CapabilitiesConfig,

    /// Model router configuration
    #[serde(default)]
    pub router: RouterConfig,

    /// Anticipation engine configuration
    #[serde(default)]
    pub anticipation: AnticipationConfig,

    /// Storage configuration
    #[serde(default)]
    pub storage: storage::StorageConfig,

    /// HTTP gateway configuration (native + compat surfaces)
    #[serde(default)]
    pub gateway: GatewayConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            agent: AgentConfig::default(),
            provider: provider::ProviderConfig::default(),
            channels: channel::ChannelsConfig::default(),
            capabilities: channel::CapabilitiesConfig::default(),
            router: RouterConfig::default(),
            anticipation: AnticipationConfig::default(),
            storage: storage::StorageConfig::default(),
            gateway: GatewayConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables and files
    pub fn from_env() -> crate::error::Result<Self> {
        crate::config::load_config()
    }
}

/// Agent-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Default model to use
    #[serde(default = "default_model")]
    pub model: String,
    /// Agent workspace directory
    #[serde(default = "default_workspace")]
    pub workspace: PathBuf,
    /// Persona / soul file (persona.md)
    pub system_prompt_file: Option<PathBuf>,
    /// Maximum context tokens
    #[serde(default = "default_max_context")]
    pub max_context_tokens: u32,
    /// Maximum tool-calling iterations per Run (spec §4.1)
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Per-Run timeout in seconds (spec §4.1 default 5 min)
    #[serde(default = "default_run_timeout_secs")]
    pub run_timeout_secs: u64,
    /// Per-tool-call timeout in seconds
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
    /// Fixed fallback message returned when the loop cannot recover
    #[serde(default = "default_fallback_message")]
    pub fallback_message: String,
    /// Fraction of the model's context window that triggers compaction
    #[serde(default = "default_compaction_trigger_ratio")]
    pub compaction_trigger_ratio: f32,
    /// Number of most-recent messages preserved by compaction
    #[serde(default = "default_keep_recent")]
    pub keep_recent: usize,
    /// Tool names a Run is restricted to on every iteration (not just the
    /// first) when delegation gating is active (spec §4.1 "Gated iteration").
    /// Empty (the default) means delegation gating never activates,
    /// regardless of the `delegation_gating` hint.
    #[serde(default)]
    pub iteration_gated_tools: Vec<String>,
    /// Enable verbose output
    #[serde(default)]
    pub verbose: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        AgentConfig {
            model: default_model(),
            workspace: default_workspace(),
            system_prompt_file: None,
            max_context_tokens: default_max_context(),
            max_iterations: default_max_iterations(),
            run_timeout_secs: default_run_timeout_secs(),
            tool_timeout_secs: default_tool_timeout_secs(),
            fallback_message: default_fallback_message(),
            compaction_trigger_ratio: default_compaction_trigger_ratio(),
            keep_recent: default_keep_recent(),
            iteration_gated_tools: Vec::new(),
            verbose: false,
        }
    }
}

fn default_model() -> String {
    "anthropic/claude-sonnet-4".to_string()
}

fn default_workspace() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".hearth").join("workspace"))
        .unwrap_or_else(|| PathBuf::from("./workspace"))
}

fn default_max_context() -> u32 {
    200_000
}

fn default_max_iterations() -> u32 {
    5
}

fn default_run_timeout_secs() -> u64 {
    300
}

fn default_tool_timeout_secs() -> u64 {
    30
}

fn default_fallback_message() -> String {
    "I'm having trouble forming a response right now. Please try again.".to_string()
}

fn default_compaction_trigger_ratio() -> f32 {
    0.8
}

fn default_keep_recent() -> usize {
    20
}

/// Model router configuration (spec §4.2)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Configured model fleet
    #[serde(default)]
    pub models: Vec<ModelDescriptorConfig>,
    /// Prefer free/local models when no explicit opt-out hint is present
    #[serde(default)]
    pub local_first: bool,
    /// Size of the bounded routing-decision audit ring
    #[serde(default = "default_audit_ring_size")]
    pub audit_ring_size: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        RouterConfig {
            models: Vec::new(),
            local_first: false,
            audit_ring_size: default_audit_ring_size(),
        }
    }
}

fn default_audit_ring_size() -> usize {
    500
}

/// A configured model entry, mirroring the Model descriptor (spec §3)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDescriptorConfig {
    pub name: String,
    #[serde(default = "default_provider_name")]
    pub provider: String,
    #[serde(default = "default_true")]
    pub supports_tools: bool,
    #[serde(default = "default_speed")]
    pub speed: u8,
    #[serde(default = "default_quality")]
    pub quality: u8,
    #[serde(default)]
    pub cost_tier: u8,
    #[serde(default = "default_context_window")]
    pub context_window: u32,
}

fn default_provider_name() -> String {
    "openrouter".to_string()
}

fn default_speed() -> u8 {
    5
}

fn default_quality() -> u8 {
    5
}

fn default_context_window() -> u32 {
    128_000
}

/// Anticipation engine configuration (spec §4.3)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnticipationConfig {
    /// Global default cooldown in seconds, used when a record has no override
    #[serde(default = "default_cooldown_secs")]
    pub default_cooldown_secs: i64,
    /// Deadline for a wake-triggered Run, in seconds
    #[serde(default = "default_wake_timeout_secs")]
    pub wake_timeout_secs: u64,
    /// Deadline for best-effort companion-entity state fetches, in seconds
    #[serde(default = "default_companion_fetch_secs")]
    pub companion_fetch_secs: u64,
    /// Quality floor applied to wake Runs
    #[serde(default = "default_wake_quality_floor")]
    pub wake_quality_floor: u8,
}

impl Default for AnticipationConfig {
    fn default() -> Self {
        AnticipationConfig {
            default_cooldown_secs: default_cooldown_secs(),
            wake_timeout_secs: default_wake_timeout_secs(),
            companion_fetch_secs: default_companion_fetch_secs(),
            wake_quality_floor: default_wake_quality_floor(),
        }
    }
}

fn default_cooldown_secs() -> i64 {
    3600
}

fn default_wake_timeout_secs() -> u64 {
    300
}

fn default_companion_fetch_secs() -> u64 {
    10
}

fn default_wake_quality_floor() -> u8 {
    5
}

/// HTTP gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Native chat-completions port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Dumb-pipe compat port (Ollama-compatible)
    #[serde(default = "default_compat_port")]
    pub compat_port: u16,
    /// Bind address
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Authentication configuration
    #[serde(default)]
    pub auth: AuthConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        GatewayConfig {
            port: default_port(),
            compat_port: default_compat_port(),
            bind: default_bind(),
            auth: AuthConfig::default(),
        }
    }
}

fn default_port() -> u16 {
    18789
}

fn default_compat_port() -> u16 {
    11434
}

fn default_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_true() -> bool {
    true
}

/// Authentication configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Authentication mode
    #[serde(default)]
    pub mode: AuthMode,
    /// Shared password (for password mode)
    pub password: Option<String>,
    /// Allowed tokens
    #[serde(default)]
    pub tokens: Vec<String>,
}

/// Authentication mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// No authentication (local only)
    #[default]
    None,
    /// Password authentication
    Password,
    /// Token-based authentication
    Token,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.agent.model, "anthropic/claude-sonnet-4");
        assert_eq!(config.gateway.port, 18789);
        assert_eq!(config.agent.max_iterations, 5);
    }

    #[test]
    fn test_anticipation_config_default() {
        let config = AnticipationConfig::default();
        assert_eq!(config.default_cooldown_secs, 3600);
        assert_eq!(config.wake_timeout_secs, 300);
    }
}
