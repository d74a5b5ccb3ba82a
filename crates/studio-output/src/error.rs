//! Error types for the output module.

use thiserror::Error;

/// Errors that can occur while configuring output pipelines.
#[derive(Debug, Error)]
pub enum OutputError {
    /// Invalid publish URL.
    #[error("Invalid publish URL: {0}")]
    InvalidUrl(String),

    /// Invalid encoder settings.
    #[error("Invalid output settings: {0}")]
    InvalidSettings(String),

    /// Malformed raw encoder option string.
    #[error("Invalid encoder option '{0}'")]
    InvalidOption(String),

    /// Output not registered.
    #[error("Output not found: {0}")]
    NotFound(String),

    /// Output already registered.
    #[error("Output already exists: {0}")]
    AlreadyExists(String),
}
