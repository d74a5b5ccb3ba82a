//! Typed host<->studio messages for the production studio.
//!
//! This crate defines the settings, records, commands, and events shared
//! between the host process and the studio session.

mod commands;
mod events;
mod overlay;
mod state;
mod types;

pub use commands::StudioCommand;
pub use events::StudioEvent;
pub use overlay::{
    Align, CgImage, CgItem, CgOverlay, CgText, Dsk, ItemRect, Overlay, OverlayStatus,
    OverlayView, Position,
};
pub use state::{SessionState, StartupPhase};
pub use types::{
    AudioSettings, AudioView, MediaState, OutputBinding, OutputSettings, PipelineHealth,
    RateControl, Settings, SourceKey, SourceSettings, SourceType, SourceView, TransitionType,
    UpdateAudioRequest, UpdateSourceSettings, VideoSettings, VolumeLevels, WindowHandle,
};

/// Channel capacity for commands (host → studio).
pub const COMMAND_CHANNEL_CAPACITY: usize = 64;

/// Channel capacity for events (studio → host).
pub const EVENT_CHANNEL_CAPACITY: usize = 256;
