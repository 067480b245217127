//! Error types and handling.

use thiserror::Error;

use crate::config::ConfigError;
use crate::fp::FpError;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Fingerprint module exchange failed
    #[error("Fingerprint module error: {0}")]
    Fingerprint(#[from] FpError),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON output error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Result type alias for AppError
pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    /// Create a validation error with message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// True when the module ran out of time waiting for a finger or a reply.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Fingerprint(e) if e.is_timeout())
    }
}
