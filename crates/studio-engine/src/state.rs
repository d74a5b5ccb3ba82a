//! Session state and engine startup tracking.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Sender;
use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};

use studio_audio::AudioMixer;
use studio_ipc::{OutputBinding, SessionState, Settings, StartupPhase};
use studio_output::{OutputController, PipelineId, PipelineStart};

use crate::capture::CaptureService;
use crate::display::DisplayManager;
use crate::engine::{Directive, EngineError, EngineNotice, RenderEngine};
use crate::overlay::{DskLayer, OverlayStack};
use crate::registry::LayerIds;
use crate::scene::SceneGraph;
use crate::source::SourceManager;

/// Everything the studio knows, guarded by one lock.
pub(crate) struct StudioState {
    pub session: SessionState,
    pub settings: Settings,
    pub scenes: SceneGraph,
    pub sources: SourceManager,
    pub overlays: OverlayStack,
    pub dsks: DskLayer,
    pub layer_ids: LayerIds,
    pub mixer: AudioMixer,
    pub outputs: OutputController,
    pub displays: DisplayManager,
    pub captures: CaptureService,
}

impl StudioState {
    pub fn new(settings: Settings, capture_timeout: Duration) -> Self {
        let outputs = OutputController::new(settings.video.clone(), settings.audio.clone());
        Self {
            session: SessionState::Idle,
            settings,
            scenes: SceneGraph::new(),
            sources: SourceManager::new(),
            overlays: OverlayStack::new(),
            dsks: DskLayer::new(),
            layer_ids: LayerIds::new(),
            mixer: AudioMixer::new(),
            outputs,
            displays: DisplayManager::new(),
            captures: CaptureService::new(capture_timeout),
        }
    }

    /// Replace every registry with an empty one for `settings`, keeping the
    /// session state.
    pub fn reset(&mut self, settings: Settings, outputs: OutputController, capture_timeout: Duration) {
        let session = std::mem::take(&mut self.session);
        *self = Self {
            outputs,
            ..Self::new(settings, capture_timeout)
        };
        self.session = session;
    }
}

/// A program output the engine refused to start.
#[derive(Debug, Clone)]
pub(crate) struct OutputFailure {
    pub binding: OutputBinding,
    pub pipeline: PipelineId,
    pub error: EngineError,
}

/// Brings the engine up phase by phase and tears it down in reverse.
pub(crate) struct EngineResources {
    engine: Arc<dyn RenderEngine>,
    current_phase: Mutex<Option<StartupPhase>>,
}

impl EngineResources {
    pub fn new(engine: Arc<dyn RenderEngine>) -> Self {
        Self {
            engine,
            current_phase: Mutex::new(None),
        }
    }

    /// Run every startup phase. On failure the phase that failed is
    /// returned and nothing is rolled back yet.
    ///
    /// A program output that fails to start does not fail the startup; it
    /// is returned so its health can be reported.
    #[instrument(name = "init_engine", skip_all, fields(engine = self.engine.name()))]
    pub fn initialize(
        &self,
        settings: &Settings,
        notices: Sender<EngineNotice>,
        outputs: &[PipelineStart],
        mut on_phase: impl FnMut(StartupPhase),
    ) -> Result<Vec<OutputFailure>, (StartupPhase, EngineError)> {
        let mut phase = StartupPhase::InitVideo;
        let mut notices = Some(notices);
        let mut failures = Vec::new();

        loop {
            *self.current_phase.lock() = Some(phase);
            on_phase(phase);
            info!("Initializing phase: {}", phase.name());

            let result = match phase {
                StartupPhase::InitVideo => match notices.take() {
                    Some(notices) => self.engine.init_video(&settings.video, notices),
                    None => Err(EngineError::NotInitialized),
                },
                StartupPhase::InitAudio => self.engine.init_audio(&settings.audio),
                StartupPhase::StartOutputs => {
                    failures = self.start_outputs(outputs);
                    Ok(())
                }
            };
            result.map_err(|e| (phase, e))?;

            match phase.next() {
                Some(next) => phase = next,
                None => break,
            }
        }

        Ok(failures)
    }

    fn start_outputs(&self, outputs: &[PipelineStart]) -> Vec<OutputFailure> {
        let failures: Vec<OutputFailure> = outputs
            .iter()
            .filter_map(|start| {
                let error = self
                    .engine
                    .execute(Directive::StartOutput(start.clone()))
                    .err()?;
                warn!(output = %start.binding, pipeline = %start.id, error = %error, "Output failed to start");
                Some(OutputFailure {
                    binding: start.binding.clone(),
                    pipeline: start.id,
                    error,
                })
            })
            .collect();
        debug!(
            started = outputs.len() - failures.len(),
            failed = failures.len(),
            "Program outputs started"
        );
        failures
    }

    /// Undo every phase from the current one backwards.
    #[instrument(name = "rollback_engine", skip(self))]
    pub fn rollback(&self) {
        let current = self.current_phase.lock().take();

        if let Some(mut phase) = current {
            loop {
                info!("Rolling back phase: {}", phase.name());
                self.rollback_phase(phase);

                match phase.previous() {
                    Some(previous) => phase = previous,
                    None => break,
                }
            }
        }
    }

    fn rollback_phase(&self, phase: StartupPhase) {
        match phase {
            // Running outputs are stopped through the output controller.
            StartupPhase::StartOutputs => {}
            StartupPhase::InitAudio => self.engine.release_audio(),
            StartupPhase::InitVideo => self.engine.release_video(),
        }
    }

    /// Release the engine. Idempotent.
    #[instrument(name = "shutdown_engine", skip(self))]
    pub fn shutdown(&self) {
        info!("Releasing engine");
        self.rollback();
    }
}
