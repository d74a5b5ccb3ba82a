//! Delivery of engine notices back into the studio.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError};
use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use studio_ipc::{SourceKey, StudioEvent};

use crate::engine::{Directive, EngineNotice};
use crate::error::{StudioError, StudioResult};
use crate::session::Shared;

/// Thread that applies engine notices and expires stale captures.
pub(crate) struct NoticePump {
    should_stop: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl NoticePump {
    pub fn new() -> Self {
        Self {
            should_stop: Arc::new(AtomicBool::new(false)),
            handle: Mutex::new(None),
        }
    }

    pub fn start(&self, shared: Arc<Shared>, notices: Receiver<EngineNotice>) -> StudioResult<()> {
        let mut handle = self.handle.lock();
        if handle.is_some() {
            return Ok(());
        }
        self.should_stop.store(false, Ordering::SeqCst);
        let should_stop = Arc::clone(&self.should_stop);
        let tick = shared.options.notice_tick;

        let spawned = thread::Builder::new()
            .name("studio-notices".to_string())
            .spawn(move || pump_loop(shared, notices, should_stop, tick))
            .map_err(|e| StudioError::EngineFailure(format!("failed to spawn notice pump: {e}")))?;
        *handle = Some(spawned);
        Ok(())
    }

    pub fn stop(&self) {
        self.should_stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.lock().take() {
            if handle.join().is_err() {
                warn!("Notice pump thread panicked");
            }
        }
    }
}

fn pump_loop(
    shared: Arc<Shared>,
    notices: Receiver<EngineNotice>,
    should_stop: Arc<AtomicBool>,
    tick: Duration,
) {
    info!("Notice pump started");
    let mut handled: u64 = 0;
    let mut last_sweep = Instant::now();

    while !should_stop.load(Ordering::SeqCst) {
        match notices.recv_timeout(tick) {
            Ok(notice) => {
                handled += 1;
                handle_notice(&shared, notice);
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                debug!("Engine closed the notice channel");
                break;
            }
        }

        let now = Instant::now();
        if now.saturating_duration_since(last_sweep) >= tick {
            last_sweep = now;
            let expired = shared.state.write().captures.expire(now);
            if !expired.is_empty() {
                debug!(count = expired.len(), "Expired pending captures");
            }
        }
    }

    info!(handled, "Notice pump stopped");
}

pub(crate) fn handle_notice(shared: &Shared, notice: EngineNotice) {
    match notice {
        EngineNotice::VolumeLevels(levels) => {
            let key = SourceKey::new(levels.scene_id.as_str(), levels.source_id.as_str());
            if !shared.state.read().sources.contains(&key) {
                trace!(source = %key, "Levels for unknown source, dropping");
                return;
            }
            shared.meters.publish(levels);
        }

        EngineNotice::FrameCaptured { request, result } => {
            let resolved = shared.state.write().captures.complete(request, result);
            debug!(capture = %request, waiters = resolved, "Capture answered");
        }

        EngineNotice::OutputHealth {
            binding,
            pipeline,
            health,
        } => {
            let mut state = shared.state.write();
            if let Some(health) = state.outputs.apply_health(&binding, pipeline, health) {
                shared.events.send(StudioEvent::OutputHealth {
                    output: binding,
                    generation: pipeline.0,
                    health,
                });
            }
        }

        EngineNotice::OutputStats {
            binding,
            pipeline,
            report,
        } => {
            shared
                .state
                .write()
                .outputs
                .record_stats(&binding, pipeline, report);
        }

        EngineNotice::MediaState { key, state: media } => {
            let mut state = shared.state.write();
            if !state.sources.contains(&key) {
                trace!(source = %key, "Media state for unknown source, ignoring");
                return;
            }
            let directives = state.mixer.set_media_state(&key, media);
            shared
                .dispatcher
                .submit_all(directives.into_iter().map(Directive::from));
            debug!(source = %key, state = ?media, "Media state changed");
            shared.events.send(StudioEvent::MediaStateChanged {
                scene_id: key.scene_id,
                source_id: key.source_id,
                state: media,
            });
        }
    }
}
