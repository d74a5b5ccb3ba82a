//! Events sent from the studio to the host.

use serde::{Deserialize, Serialize};

use crate::state::SessionState;
use crate::types::{MediaState, OutputBinding, PipelineHealth, TransitionType};

/// Events that the studio sends to the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StudioEvent {
    /// Session state has changed.
    StateChanged {
        /// Previous state.
        previous: Box<SessionState>,

        /// Current state.
        current: Box<SessionState>,
    },

    /// The program started transitioning to a new scene.
    SceneSwitched {
        from: Option<String>,
        to: String,
        transition: TransitionType,
        duration_ms: u32,
    },

    /// An output pipeline changed health.
    OutputHealth {
        output: OutputBinding,
        generation: u64,
        health: PipelineHealth,
    },

    /// A media source changed playback state.
    MediaStateChanged {
        scene_id: String,
        source_id: String,
        state: MediaState,
    },

    /// The engine rejected or failed a directive after it was accepted.
    DirectiveFailed {
        /// Directive name.
        directive: String,

        /// Error message.
        message: String,
    },
}
