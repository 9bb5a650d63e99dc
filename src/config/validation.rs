//! Configuration validation
//!
//! Validates configuration and reports issues.

use super::types::Config;

/// Result of configuration validation
#[derive(Debug, Clone)]
pub struct ConfigValidationResult {
    /// Whether the config is valid
    pub valid: bool,
    /// Validation errors (critical)
    pub errors: Vec<ValidationIssue>,
    /// Validation warnings (non-critical)
    pub warnings: Vec<ValidationIssue>,
}

impl ConfigValidationResult {
    /// Create a valid result
    pub fn valid() -> Self {
        ConfigValidationResult {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Add an error
    pub fn with_error(mut self, issue: ValidationIssue) -> Self {
        self.valid = false;
        self.errors.push(issue);
        self
    }

    /// Add a warning
    pub fn with_warning(mut self, issue: ValidationIssue) -> Self {
        self.warnings.push(issue);
        self
    }
}

/// A validation issue
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// Path to the config field
    pub path: String,
    /// Issue message
    pub message: String,
    /// Suggested fix
    pub suggestion: Option<String>,
}

impl ValidationIssue {
    /// Create a new issue
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        ValidationIssue {
            path: path.into(),
            message: message.into(),
            suggestion: None,
        }
    }

    /// Add a suggestion
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

/// Validate the configuration
pub fn validate_config(config: &Config) -> ConfigValidationResult {
    let mut result = ConfigValidationResult::valid();

    result = validate_provider_config(config, result);
    result = validate_channel_config(config, result);
    result = validate_storage_config(config, result);
    result = validate_router_config(config, result);

    result
}

fn validate_provider_config(
    config: &Config,
    mut result: ConfigValidationResult,
) -> ConfigValidationResult {
    let has_provider = config.provider.openrouter.is_some()
        || config.provider.anthropic.is_some()
        || config.provider.openai.is_some()
        || !config.provider.custom.is_empty();

    if !has_provider {
        result = result.with_warning(
            ValidationIssue::new(
                "provider",
                "No LLM provider configured. The agent will not be able to generate responses.",
            )
            .with_suggestion(
                "Set OPENROUTER_API_KEY environment variable or configure provider.openrouter in config",
            ),
        );
    }

    result
}

fn validate_channel_config(
    config: &Config,
    mut result: ConfigValidationResult,
) -> ConfigValidationResult {
    if config.channels.telegram.is_none() {
        result = result.with_warning(
            ValidationIssue::new(
                "channels",
                "No chat trigger bridge configured. The agent will only be reachable via scheduled tasks and state triggers.",
            )
            .with_suggestion("Configure channels.telegram to enable the chat bridge"),
        );
    }

    if let Some(telegram) = &config.channels.telegram {
        if telegram.allow_from.is_empty() {
            result = result.with_warning(
                ValidationIssue::new(
                    "channels.telegram.allow_from",
                    "Telegram bridge has no allow-list; every sender will be admitted.",
                )
                .with_suggestion("List the Telegram user IDs allowed to talk to the agent"),
            );
        }
    }

    result
}

fn validate_storage_config(
    config: &Config,
    mut result: ConfigValidationResult,
) -> ConfigValidationResult {
    if config.storage.sqlite.path.trim().is_empty() {
        result = result.with_error(ValidationIssue::new(
            "storage.sqlite.path",
            "SQLite database path must not be empty",
        ));
    }

    if config.storage.sqlite.max_connections == 0 {
        result = result.with_error(ValidationIssue::new(
            "storage.sqlite.max_connections",
            "max_connections must be at least 1",
        ));
    }

    result
}

fn validate_router_config(
    config: &Config,
    mut result: ConfigValidationResult,
) -> ConfigValidationResult {
    if config.router.models.is_empty() {
        result = result.with_warning(
            ValidationIssue::new(
                "router.models",
                "No models configured in the router fleet; falling back to agent.model for every Run.",
            )
            .with_suggestion("Add entries to router.models to enable cost/quality-aware routing"),
        );
    }

    for model in &config.router.models {
        if model.name.trim().is_empty() {
            result = result.with_error(ValidationIssue::new(
                "router.models[].name",
                "Model descriptor name must not be empty",
            ));
        }
        if !(1..=10).contains(&model.speed) {
            result = result.with_warning(ValidationIssue::new(
                format!("router.models.{}.speed", model.name),
                "speed is expected to be on a 1-10 scale",
            ));
        }
        if !(1..=10).contains(&model.quality) {
            result = result.with_warning(ValidationIssue::new(
                format!("router.models.{}.quality", model.name),
                "quality is expected to be on a 1-10 scale",
            ));
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_default_config() {
        let config = Config::default();
        let result = validate_config(&config);

        // Default config should have warnings but no errors
        assert!(result.errors.is_empty());
    }

    #[test]
    fn test_validate_empty_sqlite_path_is_error() {
        let mut config = Config::default();
        config.storage.sqlite.path = String::new();
        let result = validate_config(&config);
        assert!(!result.valid);
    }
}
