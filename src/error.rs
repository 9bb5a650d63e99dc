//! Error types for Hearth

use thiserror::Error;

/// Result type alias using Hearth's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Hearth
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// LLM provider error (OpenRouter and compatible backends)
    #[error("LLM provider error: {0}")]
    Provider(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Telegram bot error
    #[error("Telegram error: {0}")]
    Telegram(String),

    /// Smart-home platform error
    #[error("Smart-home platform error: {0}")]
    StateWatcher(String),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Environment variable error
    #[error("Environment error: {0}")]
    Env(#[from] std::env::VarError),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Unauthorized access
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Rate limit exceeded
    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    /// Timeout error
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Admission-control rejection (rate-limit, cooldown, unknown channel).
    /// Bridges log and drop these; they never reach the caller as a fault.
    #[error("Admission rejected: {0}")]
    Admission(String),

    /// A requested tool is absent from the visible set for this iteration
    #[error("tool '{0}' is not available")]
    ToolNotAvailable(String),

    /// Attempt to drop a capability tag that was activated via channel pinning
    #[error("cannot drop capability '{0}': channel-pinned")]
    ChannelPinned(String),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Transient-external errors that the failover hook should retry once.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Http(_) | Error::Provider(_) | Error::RateLimit(_) | Error::Timeout(_)
        )
    }

    /// Errors caused by the caller rather than the environment.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidInput(_) | Error::NotFound(_) | Error::Unauthorized(_)
        )
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}
