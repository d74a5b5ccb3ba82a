//! Control plane of the production studio.
//!
//! A [`Studio`] owns the scene graph, sources, overlays, downstream keys,
//! audio mixer, outputs and displays of one session, and drives a
//! [`RenderEngine`] that does the actual decoding, compositing and
//! publishing. Host events are delivered on a channel; engine notices
//! flow back through a pump thread.

mod capture;
mod command;
mod dispatch;
mod display;
mod engine;
mod error;
mod headless;
mod options;
mod overlay;
mod pump;
mod registry;
mod scene;
mod session;
mod source;
mod state;

pub use bytes::Bytes;
pub use capture::{CaptureId, CaptureTicket};
pub use command::{CommandLoop, CommandReply};
pub use display::{DisplayBinding, DisplayRect};
pub use engine::{Directive, EngineError, EngineNotice, EngineResult, RenderEngine};
pub use error::{ErrorKind, StudioError, StudioResult};
pub use headless::HeadlessEngine;
pub use options::{StudioOptions, DEFAULT_CAPTURE_TIMEOUT, DEFAULT_NOTICE_TICK};
pub use overlay::{dsk_rect, LayerRect};
pub use scene::{transition_curve, MixLayer, SceneMix, MAX_TRANSITION_MS};
pub use session::{Studio, NOTICE_CHANNEL_CAPACITY};
pub use source::{initial_media_state, source_binding};

use std::sync::Arc;

use crossbeam_channel::Receiver;
use studio_ipc::StudioEvent;

/// Create a studio session backed by the headless engine.
pub fn create_headless_studio(options: StudioOptions) -> (Studio, Arc<HeadlessEngine>, Receiver<StudioEvent>) {
    let engine = Arc::new(HeadlessEngine::new());
    let (studio, events) = Studio::new(engine.clone(), options);
    (studio, engine, events)
}
