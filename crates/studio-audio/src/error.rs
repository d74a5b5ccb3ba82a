//! Error types for the audio module.

use thiserror::Error;

/// Errors that can occur during mixer operations.
#[derive(Debug, Error)]
pub enum AudioError {
    /// Volume outside of 0.0 - 1.0 or not finite.
    #[error("Invalid volume: {0}")]
    InvalidVolume(f32),

    /// No mixer input registered for the source.
    #[error("Mixer input not found: {0}")]
    InputNotFound(String),

    /// A mixer input is already registered for the source.
    #[error("Mixer input already registered: {0}")]
    InputExists(String),

    /// Meter feed has been closed.
    #[error("Meter feed closed")]
    FeedClosed,
}
