//! Boundary between the studio and the rendering/encoding engine.
//!
//! The studio drives the engine with [`Directive`]s and receives
//! [`EngineNotice`]s back on a channel handed over at startup. Engine
//! implementations own decoding, compositing, encoding and publishing.

use std::time::Duration;

use bytes::Bytes;
use crossbeam_channel::Sender;
use thiserror::Error;

use studio_audio::MixerDirective;
use studio_ipc::{
    AudioSettings, Dsk, MediaState, Overlay, OutputBinding, PipelineHealth, SourceKey,
    SourceSettings, TransitionType, VideoSettings, VolumeLevels, WindowHandle,
};
use studio_output::{PipelineId, PipelineStart, StatsReport};

use crate::capture::CaptureId;
use crate::overlay::LayerRect;
use crate::scene::SceneMix;

/// Errors reported by an engine.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// The engine has not been initialized or was released.
    #[error("engine not initialized")]
    NotInitialized,

    /// The directive referenced something the engine does not know.
    #[error("unknown {kind}: {id}")]
    Unknown { kind: &'static str, id: String },

    /// The engine could not carry out the request.
    #[error("{0}")]
    Failed(String),
}

/// Result type for engine calls.
pub type EngineResult<T> = Result<T, EngineError>;

/// Imperative request sent to the engine.
#[derive(Debug, Clone)]
pub enum Directive {
    /// Create a source and begin decoding it.
    OpenSource {
        key: SourceKey,
        settings: SourceSettings,
    },

    /// Point an existing source at a new locator.
    SetSourceUrl { key: SourceKey, url: String },

    /// Re-open a source keeping its identity and settings.
    RestartSource { key: SourceKey },

    /// Blend from the visual state `from` to scene `to`.
    Transition {
        from: SceneMix,
        to: String,
        transition: TransitionType,
        duration: Duration,
    },

    /// Replace the overlay layer. Bottom first.
    SetOverlays { stack: Vec<Overlay> },

    /// Add a downstream key above everything else.
    AddDsk { dsk: Dsk, rect: LayerRect },

    /// Audio routing change.
    Mixer(MixerDirective),

    /// Start an encode and publish pipeline.
    StartOutput(PipelineStart),

    /// Stop a pipeline instance.
    StopOutput {
        binding: OutputBinding,
        pipeline: PipelineId,
    },

    /// Create a preview surface inside a host window.
    BindDisplay {
        name: String,
        parent: WindowHandle,
        source: SourceKey,
        scale_factor: u32,
    },

    /// Reposition a preview surface. Size is in physical pixels.
    MoveDisplay {
        name: String,
        x: i32,
        y: i32,
        width: u32,
        height: u32,
    },

    /// Release a preview surface.
    UnbindDisplay { name: String },

    /// Encode the next frame of a source as a still image.
    Capture { request: CaptureId, source: SourceKey },
}

impl Directive {
    /// Directive name for logging and failure events.
    pub fn name(&self) -> &'static str {
        match self {
            Self::OpenSource { .. } => "openSource",
            Self::SetSourceUrl { .. } => "setSourceUrl",
            Self::RestartSource { .. } => "restartSource",
            Self::Transition { .. } => "transition",
            Self::SetOverlays { .. } => "setOverlays",
            Self::AddDsk { .. } => "addDsk",
            Self::Mixer(MixerDirective::SetGain { .. }) => "setGain",
            Self::Mixer(MixerDirective::SetMonitor { .. }) => "setMonitor",
            Self::Mixer(MixerDirective::SetProgramMonitor(_)) => "setProgramMonitor",
            Self::StartOutput(_) => "startOutput",
            Self::StopOutput { .. } => "stopOutput",
            Self::BindDisplay { .. } => "bindDisplay",
            Self::MoveDisplay { .. } => "moveDisplay",
            Self::UnbindDisplay { .. } => "unbindDisplay",
            Self::Capture { .. } => "capture",
        }
    }
}

impl From<MixerDirective> for Directive {
    fn from(directive: MixerDirective) -> Self {
        Self::Mixer(directive)
    }
}

/// Asynchronous report from the engine.
#[derive(Debug, Clone)]
pub enum EngineNotice {
    /// Audio levels of one source for one metering period.
    VolumeLevels(VolumeLevels),

    /// Answer to a [`Directive::Capture`].
    FrameCaptured {
        request: CaptureId,
        result: Result<Bytes, String>,
    },

    /// A pipeline changed health.
    OutputHealth {
        binding: OutputBinding,
        pipeline: PipelineId,
        health: PipelineHealth,
    },

    /// Cumulative counters of a pipeline.
    OutputStats {
        binding: OutputBinding,
        pipeline: PipelineId,
        report: StatsReport,
    },

    /// A source changed playback state.
    MediaState { key: SourceKey, state: MediaState },
}

/// A rendering and encoding engine driven by the studio.
///
/// Startup calls `init_video` then `init_audio`; a failure in a later phase
/// releases the earlier ones in reverse order. `execute` is only called from
/// the studio's dispatcher thread and may block.
pub trait RenderEngine: Send + Sync {
    /// Engine name for logging.
    fn name(&self) -> &str;

    /// Reset the video pipeline. Notices are sent on `notices` from now on.
    fn init_video(&self, video: &VideoSettings, notices: Sender<EngineNotice>) -> EngineResult<()>;

    /// Reset the audio pipeline.
    fn init_audio(&self, audio: &AudioSettings) -> EngineResult<()>;

    /// Carry out a directive.
    fn execute(&self, directive: Directive) -> EngineResult<()>;

    /// Release the audio pipeline.
    fn release_audio(&self);

    /// Release the video pipeline and stop sending notices.
    fn release_video(&self);
}
