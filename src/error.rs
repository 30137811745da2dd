// src/error.rs

//! Unified error handling for the migration application.

use std::fmt;

use thiserror::Error;

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
///
/// `Archive` and `Structure` are fatal and abort the run; `Api` and
/// `AttachmentTooLarge` are recorded per item and the run continues.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// ZIP archive could not be read
    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Export archive is unreadable or not a recognizable Docmost export
    #[error("Archive error: {0}")]
    Archive(String),

    /// Document hierarchy is invalid (parent cycle)
    #[error("Structure error: {0}")]
    Structure(String),

    /// Outline API call failed after retries were exhausted
    #[error("API error for {context}: {message}")]
    Api {
        context: String,
        message: String,
        status: Option<u16>,
    },

    /// Attachment exceeds the configured upload size limit
    #[error("Attachment {name} ({size} bytes) exceeds maximum upload size ({max} bytes)")]
    AttachmentTooLarge { name: String, size: u64, max: u64 },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

impl AppError {
    /// Create an archive error.
    pub fn archive(message: impl Into<String>) -> Self {
        Self::Archive(message.into())
    }

    /// Create a structure error.
    pub fn structure(message: impl Into<String>) -> Self {
        Self::Structure(message.into())
    }

    /// Create an API error with the identity of the failing operation.
    pub fn api(context: impl Into<String>, message: impl fmt::Display, status: Option<u16>) -> Self {
        Self::Api {
            context: context.into(),
            message: message.to_string(),
            status,
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// True when the error should abort the entire run rather than be
    /// recorded against a single item.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Api { .. } | Self::AttachmentTooLarge { .. })
    }
}
