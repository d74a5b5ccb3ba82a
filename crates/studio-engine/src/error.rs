//! Error types for studio operations.

use serde::Serialize;
use thiserror::Error;

use studio_audio::AudioError;
use studio_output::OutputError;

use crate::engine::EngineError;

/// Classification of a [`StudioError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    InvalidState,
    InvalidArgument,
    EngineFailure,
    CaptureFailed,
}

/// Errors returned by studio operations.
#[derive(Debug, Clone, Error)]
pub enum StudioError {
    /// The referenced entity does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// An entity with this id already exists.
    #[error("{kind} already exists: {id}")]
    AlreadyExists { kind: &'static str, id: String },

    /// Operation not allowed in the current session state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Malformed input.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The engine failed to carry out a request.
    #[error("Engine failure: {0}")]
    EngineFailure(String),

    /// A frame could not be captured.
    #[error("Capture failed: {0}")]
    CaptureFailed(String),
}

impl StudioError {
    pub(crate) fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub(crate) fn exists(kind: &'static str, id: impl Into<String>) -> Self {
        Self::AlreadyExists {
            kind,
            id: id.into(),
        }
    }

    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Self::InvalidState(_) => ErrorKind::InvalidState,
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::EngineFailure(_) => ErrorKind::EngineFailure,
            Self::CaptureFailed(_) => ErrorKind::CaptureFailed,
        }
    }
}

impl From<AudioError> for StudioError {
    fn from(err: AudioError) -> Self {
        match &err {
            AudioError::InputNotFound(id) => Self::not_found("source", id.clone()),
            AudioError::InputExists(id) => Self::exists("source", id.clone()),
            AudioError::FeedClosed => Self::InvalidState(err.to_string()),
            AudioError::InvalidVolume(_) => Self::InvalidArgument(err.to_string()),
        }
    }
}

impl From<OutputError> for StudioError {
    fn from(err: OutputError) -> Self {
        match &err {
            OutputError::NotFound(id) => Self::not_found("output", id.clone()),
            OutputError::AlreadyExists(id) => Self::exists("output", id.clone()),
            _ => Self::InvalidArgument(err.to_string()),
        }
    }
}

impl From<EngineError> for StudioError {
    fn from(err: EngineError) -> Self {
        Self::EngineFailure(err.to_string())
    }
}

/// Result type for studio operations.
pub type StudioResult<T> = Result<T, StudioError>;
