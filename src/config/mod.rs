//! Configuration module - Modular configuration management
//!
//! - types/mod.rs: Core configuration types (Config, AgentConfig, RouterConfig, ...)
//! - types/provider.rs: LLM provider configuration
//! - types/channel.rs: Bridge + capability-tag configuration
//! - types/storage.rs: SQLite storage configuration
//! - io.rs: Configuration loading and saving
//! - validation.rs: Configuration validation
//! - paths.rs: Configuration file paths

mod io;
mod paths;
mod types;
mod validation;

// Re-export core config types
pub use types::{
    AgentConfig, AnticipationConfig, AuthConfig, AuthMode, Config, GatewayConfig,
    ModelDescriptorConfig, RouterConfig,
};

// Re-export channel types
pub use types::channel::{
    CapabilitiesConfig, CapabilityTagConfig, ChannelsConfig, SmartHomeConfig, TelegramConfig, ToolAccessConfig,
};

// Re-export provider types
pub use types::provider::{
    AnthropicConfig, FailoverConfig, OpenAIConfig, OpenRouterConfig, ProviderConfig,
};

// Re-export storage types
pub use types::storage::{SqliteConfig, StorageConfig};

// Re-export IO and utilities
pub use io::{load_config, load_config_from_env, load_config_from_path, save_config, ConfigSnapshot};
pub use paths::{config_dir, config_path, state_dir, workspace_dir};
pub use validation::{validate_config, ConfigValidationResult};
