//! Storage configuration types
//!
//! Hearth persists everything in a single SQLite file: conversations,
//! anticipations, cooldowns, scheduled tasks, usage records, and
//! archive/checkpoint blobs (spec §6 "Persistent state layout").

use serde::{Deserialize, Serialize};

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite configuration
    #[serde(default)]
    pub sqlite: SqliteConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            sqlite: SqliteConfig::default(),
        }
    }
}

/// SQLite configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqliteConfig {
    /// Database file path
    #[serde(default = "default_sqlite_path")]
    pub path: String,
    /// Enable WAL mode (write-ahead journaling)
    #[serde(default = "default_true")]
    pub wal_mode: bool,
    /// Busy timeout in milliseconds
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,
    /// Maximum connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        SqliteConfig {
            path: default_sqlite_path(),
            wal_mode: true,
            busy_timeout_ms: default_busy_timeout(),
            max_connections: default_max_connections(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_sqlite_path() -> String {
    dirs::data_dir()
        .map(|d| d.join("hearth").join("hearth.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("hearth.db"))
        .to_string_lossy()
        .to_string()
}

fn default_busy_timeout() -> u64 {
    5000
}

fn default_max_connections() -> u32 {
    5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlite_config_default() {
        let config = SqliteConfig::default();
        assert!(config.wal_mode);
        assert_eq!(config.busy_timeout_ms, 5000);
    }
}
