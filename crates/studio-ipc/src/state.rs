//! Session state machine types.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a studio session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// Created, engine not started.
    #[default]
    Idle,

    /// Engine is starting up.
    Starting {
        /// Current startup phase.
        phase: StartupPhase,
    },

    /// Engine is rendering; commands are accepted.
    Running,

    /// Engine is being torn down.
    ShuttingDown,

    /// Engine has been shut down. Terminal.
    ShutDown,

    /// Startup failed; resources were rolled back.
    Error {
        /// Error message.
        message: String,
    },
}

impl SessionState {
    /// Returns true if commands can be applied.
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// Returns true if the session was shut down or is shutting down.
    pub fn is_shut_down(&self) -> bool {
        matches!(self, Self::ShutDown | Self::ShuttingDown)
    }

    /// Returns true if `startup` may be called.
    pub fn can_start(&self) -> bool {
        matches!(self, Self::Idle | Self::Error { .. })
    }

    /// Returns a simple string representation of the state.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Starting { .. } => "Starting",
            Self::Running => "Running",
            Self::ShuttingDown => "ShuttingDown",
            Self::ShutDown => "ShutDown",
            Self::Error { .. } => "Error",
        }
    }
}

/// Startup phases, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StartupPhase {
    /// Resetting the video pipeline.
    InitVideo,

    /// Resetting the audio pipeline.
    InitAudio,

    /// Starting program outputs.
    StartOutputs,
}

impl StartupPhase {
    /// Returns the next phase, if any.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::InitVideo => Some(Self::InitAudio),
            Self::InitAudio => Some(Self::StartOutputs),
            Self::StartOutputs => None,
        }
    }

    /// Returns the previous phase, if any (for rollback).
    pub fn previous(self) -> Option<Self> {
        match self {
            Self::InitVideo => None,
            Self::InitAudio => Some(Self::InitVideo),
            Self::StartOutputs => Some(Self::InitAudio),
        }
    }

    /// Returns the display name for this phase.
    pub fn name(self) -> &'static str {
        match self {
            Self::InitVideo => "Initializing video",
            Self::InitAudio => "Initializing audio",
            Self::StartOutputs => "Starting outputs",
        }
    }
}
