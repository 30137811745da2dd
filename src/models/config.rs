//! Application configuration structures.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// HTTP client and retry behavior settings
    #[serde(default)]
    pub client: ClientConfig,

    /// Migration behavior settings
    #[serde(default)]
    pub migration: MigrationConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration, falling back to defaults when the file is
    /// missing or unreadable.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        if !path.as_ref().exists() {
            return Self::default();
        }
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.client.user_agent.trim().is_empty() {
            return Err(AppError::validation("client.user_agent is empty"));
        }
        if self.client.timeout_secs == 0 {
            return Err(AppError::validation("client.timeout_secs must be > 0"));
        }
        if self.client.max_attempts == 0 {
            return Err(AppError::validation("client.max_attempts must be > 0"));
        }
        if self.migration.collection_color.is_empty() {
            return Err(AppError::validation("migration.collection_color is empty"));
        }
        Ok(())
    }
}

/// HTTP client and retry behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Minimum delay between outgoing requests in milliseconds
    #[serde(default = "defaults::request_delay")]
    pub request_delay_ms: u64,

    /// Attempt count for non-rate-limit failures
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: u32,

    /// Exponential backoff base in milliseconds
    #[serde(default = "defaults::backoff_base")]
    pub backoff_base_ms: u64,

    /// Exponential backoff cap in milliseconds
    #[serde(default = "defaults::backoff_cap")]
    pub backoff_cap_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            request_delay_ms: defaults::request_delay(),
            max_attempts: defaults::max_attempts(),
            backoff_base_ms: defaults::backoff_base(),
            backoff_cap_ms: defaults::backoff_cap(),
        }
    }
}

/// Migration behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Description for a newly created collection
    #[serde(default = "defaults::collection_description")]
    pub collection_description: String,

    /// Hex color for a newly created collection
    #[serde(default = "defaults::collection_color")]
    pub collection_color: String,

    /// Overall run deadline in seconds; checked between documents
    #[serde(default)]
    pub run_timeout_secs: Option<u64>,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            collection_description: defaults::collection_description(),
            collection_color: defaults::collection_color(),
            run_timeout_secs: None,
        }
    }
}

mod defaults {
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; docport/0.1)".into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn request_delay() -> u64 {
        100
    }
    pub fn max_attempts() -> u32 {
        3
    }
    pub fn backoff_base() -> u64 {
        500
    }
    pub fn backoff_cap() -> u64 {
        8_000
    }
    pub fn collection_description() -> String {
        "Migrated from Docmost export".into()
    }
    pub fn collection_color() -> String {
        "#4E5C6E".into()
    }
}
