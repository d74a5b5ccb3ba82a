//! Commands sent from the host to the studio.

use serde::{Deserialize, Serialize};

use crate::overlay::{Overlay, Position};
use crate::types::{
    Settings, SourceSettings, TransitionType, UpdateAudioRequest, UpdateSourceSettings,
    WindowHandle,
};

/// Commands that the host can send to a studio session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum StudioCommand {
    /// Start the engine with the given settings.
    Startup { settings: Settings },

    /// Stop all pipelines and release the engine.
    Shutdown,

    AddScene {
        scene_id: String,
    },

    AddSource {
        scene_id: String,
        source_id: String,
        settings: SourceSettings,
    },

    GetSource {
        scene_id: String,
        source_id: String,
    },

    UpdateSource {
        scene_id: String,
        source_id: String,
        request: UpdateSourceSettings,
    },

    RestartSource {
        scene_id: String,
        source_id: String,
    },

    SwitchToScene {
        scene_id: String,
        transition_type: TransitionType,
        transition_ms: u32,
    },

    CreateDisplay {
        name: String,
        parent_window: WindowHandle,
        scale_factor: u32,
        source_id: String,
    },

    DestroyDisplay {
        name: String,
    },

    MoveDisplay {
        name: String,
        x: i32,
        y: i32,
        width: u32,
        height: u32,
    },

    #[serde(rename = "addDSK")]
    AddDsk {
        id: String,
        position: Position,
        url: String,
        left: i32,
        top: i32,
        width: u32,
        height: u32,
    },

    GetAudio,

    UpdateAudio {
        request: UpdateAudioRequest,
    },

    /// Capture one frame of a source into an encoded image.
    Screenshot {
        scene_id: String,
        source_id: String,
    },

    AddOverlay {
        overlay: Overlay,
    },

    RemoveOverlay {
        overlay_id: String,
    },

    UpOverlay {
        overlay_id: String,
    },

    DownOverlay {
        overlay_id: String,
    },

    GetOverlays,

    /// List output pipelines and their health.
    GetOutputs,
}

impl StudioCommand {
    /// Command name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Startup { .. } => "startup",
            Self::Shutdown => "shutdown",
            Self::AddScene { .. } => "addScene",
            Self::AddSource { .. } => "addSource",
            Self::GetSource { .. } => "getSource",
            Self::UpdateSource { .. } => "updateSource",
            Self::RestartSource { .. } => "restartSource",
            Self::SwitchToScene { .. } => "switchToScene",
            Self::CreateDisplay { .. } => "createDisplay",
            Self::DestroyDisplay { .. } => "destroyDisplay",
            Self::MoveDisplay { .. } => "moveDisplay",
            Self::AddDsk { .. } => "addDSK",
            Self::GetAudio => "getAudio",
            Self::UpdateAudio { .. } => "updateAudio",
            Self::Screenshot { .. } => "screenshot",
            Self::AddOverlay { .. } => "addOverlay",
            Self::RemoveOverlay { .. } => "removeOverlay",
            Self::UpOverlay { .. } => "upOverlay",
            Self::DownOverlay { .. } => "downOverlay",
            Self::GetOverlays => "getOverlays",
            Self::GetOutputs => "getOutputs",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_switch_command() {
        let json = r#"{"op":"switchToScene","sceneId":"scene2","transitionType":"cut_transition","transitionMs":1000}"#;
        let command: StudioCommand = serde_json::from_str(json).unwrap();
        match command {
            StudioCommand::SwitchToScene {
                scene_id,
                transition_type,
                transition_ms,
            } => {
                assert_eq!(scene_id, "scene2");
                assert_eq!(transition_type, TransitionType::Cut);
                assert_eq!(transition_ms, 1000);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_add_dsk_command() {
        let json = r#"{"op":"addDSK","id":"dsk1","position":"top-left","url":"","left":100,"top":100,"width":256,"height":256}"#;
        let command: StudioCommand = serde_json::from_str(json).unwrap();
        assert_eq!(command.name(), "addDSK");
        assert!(matches!(
            command,
            StudioCommand::AddDsk {
                position: Position::TopLeft,
                ..
            }
        ));
    }

    #[test]
    fn test_parse_unit_commands() {
        let command: StudioCommand = serde_json::from_str(r#"{"op":"getOverlays"}"#).unwrap();
        assert!(matches!(command, StudioCommand::GetOverlays));
    }
}
