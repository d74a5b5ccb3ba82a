//! Command loop for hosts that drive the studio through messages.

use std::time::Duration;

use bytes::Bytes;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use serde::Serialize;
use tokio::runtime::Runtime;
use tracing::{debug, info, instrument, warn};

use studio_ipc::{AudioView, Dsk, OverlayView, SourceView, StudioCommand};
use studio_output::OutputStatus;

use crate::error::{ErrorKind, StudioError, StudioResult};
use crate::session::Studio;

/// Answer to one [`StudioCommand`].
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "reply", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum CommandReply {
    Done,
    Scene {
        scene_id: String,
    },
    Source {
        source: SourceView,
    },
    Audio {
        audio: AudioView,
    },
    Overlays {
        overlays: Vec<OverlayView>,
    },
    Outputs {
        outputs: Vec<OutputStatus>,
    },
    /// An encoded PNG. The image itself is not serialized.
    Screenshot {
        scene_id: String,
        source_id: String,
        size: usize,
        #[serde(skip)]
        image: Bytes,
    },
    Error {
        kind: ErrorKind,
        message: String,
    },
}

impl CommandReply {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

impl From<StudioError> for CommandReply {
    fn from(err: StudioError) -> Self {
        Self::Error {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Applies commands to a [`Studio`] one at a time, replying to each.
pub struct CommandLoop {
    studio: Studio,
    runtime: Runtime,
}

impl CommandLoop {
    pub fn new(studio: Studio) -> StudioResult<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .map_err(|e| StudioError::EngineFailure(format!("failed to build runtime: {e}")))?;
        Ok(Self { studio, runtime })
    }

    pub fn studio(&self) -> &Studio {
        &self.studio
    }

    /// Run until a `shutdown` command or until `commands` disconnects.
    #[instrument(name = "command_loop", skip_all)]
    pub fn run(&self, commands: Receiver<StudioCommand>, replies: Sender<CommandReply>) {
        info!("Command loop starting");

        loop {
            match commands.recv_timeout(Duration::from_millis(100)) {
                Ok(command) => {
                    let stop = matches!(command, StudioCommand::Shutdown);
                    let reply = self.handle(command);
                    if replies.send(reply).is_err() {
                        warn!("Reply channel closed");
                    }
                    if stop {
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    info!("Command channel disconnected, shutting down");
                    if let Err(e) = self.studio.shutdown() {
                        warn!(error = %e, "Shutdown failed");
                    }
                    break;
                }
            }
        }

        info!("Command loop stopped");
    }

    /// Apply one command.
    pub fn handle(&self, command: StudioCommand) -> CommandReply {
        let name = command.name();
        debug!(command = name, "Handling command");

        match self.apply(command) {
            Ok(reply) => reply,
            Err(e) => {
                warn!(command = name, error = %e, "Command failed");
                e.into()
            }
        }
    }

    fn apply(&self, command: StudioCommand) -> StudioResult<CommandReply> {
        let studio = &self.studio;
        let reply = match command {
            StudioCommand::Startup { settings } => {
                studio.startup(settings)?;
                CommandReply::Done
            }
            StudioCommand::Shutdown => {
                studio.shutdown()?;
                CommandReply::Done
            }
            StudioCommand::AddScene { scene_id } => CommandReply::Scene {
                scene_id: studio.add_scene(&scene_id)?,
            },
            StudioCommand::AddSource {
                scene_id,
                source_id,
                settings,
            } => CommandReply::Source {
                source: studio.add_source(&scene_id, &source_id, settings)?,
            },
            StudioCommand::GetSource {
                scene_id,
                source_id,
            } => CommandReply::Source {
                source: studio.get_source(&scene_id, &source_id)?,
            },
            StudioCommand::UpdateSource {
                scene_id,
                source_id,
                request,
            } => CommandReply::Source {
                source: studio.update_source(&scene_id, &source_id, request)?,
            },
            StudioCommand::RestartSource {
                scene_id,
                source_id,
            } => {
                studio.restart_source(&scene_id, &source_id)?;
                CommandReply::Done
            }
            StudioCommand::SwitchToScene {
                scene_id,
                transition_type,
                transition_ms,
            } => {
                studio.switch_to_scene(&scene_id, transition_type, transition_ms)?;
                CommandReply::Done
            }
            StudioCommand::CreateDisplay {
                name,
                parent_window,
                scale_factor,
                source_id,
            } => {
                studio.create_display(&name, parent_window, scale_factor, &source_id)?;
                CommandReply::Done
            }
            StudioCommand::DestroyDisplay { name } => {
                studio.destroy_display(&name)?;
                CommandReply::Done
            }
            StudioCommand::MoveDisplay {
                name,
                x,
                y,
                width,
                height,
            } => {
                studio.move_display(&name, x, y, width, height)?;
                CommandReply::Done
            }
            StudioCommand::AddDsk {
                id,
                position,
                url,
                left,
                top,
                width,
                height,
            } => {
                studio.add_dsk(Dsk {
                    id,
                    position,
                    url,
                    left,
                    top,
                    width,
                    height,
                })?;
                CommandReply::Done
            }
            StudioCommand::GetAudio => CommandReply::Audio {
                audio: studio.get_audio()?,
            },
            StudioCommand::UpdateAudio { request } => CommandReply::Audio {
                audio: studio.update_audio(request)?,
            },
            StudioCommand::Screenshot {
                scene_id,
                source_id,
            } => {
                let ticket = studio.screenshot(&scene_id, &source_id)?;
                let image = self.runtime.block_on(ticket.wait())?;
                CommandReply::Screenshot {
                    scene_id,
                    source_id,
                    size: image.len(),
                    image,
                }
            }
            StudioCommand::AddOverlay { overlay } => {
                studio.add_overlay(overlay)?;
                CommandReply::Done
            }
            StudioCommand::RemoveOverlay { overlay_id } => {
                studio.remove_overlay(&overlay_id)?;
                CommandReply::Done
            }
            StudioCommand::UpOverlay { overlay_id } => {
                studio.up_overlay(&overlay_id)?;
                CommandReply::Done
            }
            StudioCommand::DownOverlay { overlay_id } => {
                studio.down_overlay(&overlay_id)?;
                CommandReply::Done
            }
            StudioCommand::GetOverlays => CommandReply::Overlays {
                overlays: studio.get_overlays()?,
            },
            StudioCommand::GetOutputs => CommandReply::Outputs {
                outputs: studio.outputs()?,
            },
        };
        Ok(reply)
    }
}
