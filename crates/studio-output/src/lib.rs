//! Encode and publish pipeline configuration and health.
//!
//! This crate validates output settings, resolves them into encoder
//! configurations, and tracks the identity and health of every running
//! encode and publish pipeline. Encoding and publishing themselves are
//! done by the engine.

mod config;
mod connection;
mod error;
mod pipeline;
mod stats;

pub use config::{
    parse_encoder_options, resolve, validate_server, AudioEncoderConfig, EncoderConfig,
    H264Profile, VideoEncoderConfig, MAX_AUDIO_BITRATE_KBPS, MAX_VIDEO_BITRATE_KBPS, PRESETS,
    TUNES,
};
pub use connection::ReconnectPolicy;
pub use error::OutputError;
pub use pipeline::{OutputController, OutputStatus, PipelineId, PipelineStart};
pub use stats::{OutputStats, StatsCollector, StatsReport};

/// Result type for output operations.
pub type OutputResult<T> = Result<T, OutputError>;

/// Maximum reconnection attempts made by the engine.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Base reconnect delay in milliseconds.
pub const BASE_RECONNECT_DELAY_MS: u64 = 1000;
