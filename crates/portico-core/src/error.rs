//! Error types for Portico Core.

use thiserror::Error;

/// Core errors that can occur while parsing configuration-level data.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("invalid access rules for route {route}: {message}")]
    InvalidAccessRules { route: String, message: String },

    #[error("invalid session id")]
    InvalidSessionId,
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
