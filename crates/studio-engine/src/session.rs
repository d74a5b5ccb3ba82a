//! The studio session.

use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, error, info, instrument, warn};

use studio_audio::{MeterFeed, MeterSubscription, MixerInput};
use studio_ipc::{
    AudioView, Dsk, OutputBinding, Overlay, OverlayView, PipelineHealth, SessionState, Settings,
    SourceKey, SourceSettings, SourceView, StartupPhase, StudioEvent, TransitionType,
    UpdateAudioRequest, UpdateSourceSettings, VolumeLevels, WindowHandle,
};
use studio_output::{OutputController, OutputStatus, PipelineStart};

use crate::capture::CaptureTicket;
use crate::dispatch::{Dispatcher, EventSink};
use crate::display::{DisplayBinding, DisplayRect};
use crate::engine::{Directive, RenderEngine};
use crate::error::{StudioError, StudioResult};
use crate::options::StudioOptions;
use crate::overlay::{dsk_rect, validate_overlay, LayerRect};
use crate::pump::NoticePump;
use crate::registry::LayerKind;
use crate::scene::{SceneMix, SwitchPlan};
use crate::source::{
    initial_media_state, source_binding, source_view, validate_settings, validate_update,
    DEFAULT_VOLUME,
};
use crate::state::{EngineResources, StudioState};

/// Capacity of the engine notice channel.
pub const NOTICE_CHANNEL_CAPACITY: usize = 1024;

/// State shared between the control thread and the studio's workers.
pub(crate) struct Shared {
    pub state: RwLock<StudioState>,
    pub dispatcher: Dispatcher,
    pub meters: MeterFeed,
    pub events: EventSink,
    pub options: StudioOptions,
}

impl Shared {
    /// Start an output's pipeline if it is not running.
    fn start_output(
        &self,
        state: &mut StudioState,
        binding: &OutputBinding,
        now: Instant,
    ) -> StudioResult<()> {
        if let Some(start) = state.outputs.start(binding, now)? {
            self.launch(start);
        }
        Ok(())
    }

    fn launch(&self, start: PipelineStart) {
        let output = start.binding.clone();
        let generation = start.id.0;
        self.dispatcher.submit(Directive::StartOutput(start));
        self.events.send(StudioEvent::OutputHealth {
            output,
            generation,
            health: PipelineHealth::Starting,
        });
    }

    fn apply_switch(&self, state: &mut StudioState, plan: SwitchPlan, now: Instant) -> StudioResult<()> {
        info!(
            from = ?plan.previous,
            to = %plan.to,
            transition = plan.transition.id(),
            duration_ms = plan.duration.as_millis() as u64,
            first = plan.first_activation,
            "Switching scene"
        );
        self.dispatcher.submit(Directive::Transition {
            from: plan.from,
            to: plan.to.clone(),
            transition: plan.transition,
            duration: plan.duration,
        });

        // Dedicated outputs of start-on-active sources follow their scene.
        let source_ids: Vec<String> = state.scenes.sources(&plan.to)?.to_vec();
        for source_id in source_ids {
            let key = SourceKey::new(plan.to.as_str(), source_id);
            let deferred = state
                .sources
                .get(&key)
                .map(|record| record.settings.start_on_active && record.settings.output.is_some())?;
            if deferred {
                self.start_output(state, &source_binding(&key), now)?;
            }
        }

        self.events.send(StudioEvent::SceneSwitched {
            from: plan.previous,
            to: plan.to,
            transition: plan.transition,
            duration_ms: plan.duration.as_millis() as u32,
        });
        Ok(())
    }

    fn publish_overlays(&self, state: &StudioState) {
        self.dispatcher.submit(Directive::SetOverlays {
            stack: state.overlays.composite(),
        });
    }
}

fn validate_startup(settings: &Settings) -> StudioResult<()> {
    let video = &settings.video;
    if video.base_width == 0 || video.base_height == 0 {
        return Err(StudioError::InvalidArgument(
            "base resolution must be non-zero".into(),
        ));
    }
    if video.output_width == 0 || video.output_height == 0 {
        return Err(StudioError::InvalidArgument(
            "output resolution must be non-zero".into(),
        ));
    }
    if video.fps_num == 0 || video.fps_den == 0 {
        return Err(StudioError::InvalidArgument(format!(
            "invalid frame rate {}/{}",
            video.fps_num, video.fps_den
        )));
    }
    if settings.audio.sample_rate == 0 {
        return Err(StudioError::InvalidArgument(
            "sample rate must be non-zero".into(),
        ));
    }
    Ok(())
}

/// A production studio session driving one engine.
///
/// Every operation validates and mutates the shared registries under one
/// lock, then queues directives for the engine's dispatcher thread. Only
/// [`startup`](Self::startup) and [`shutdown`](Self::shutdown) call the
/// engine directly.
pub struct Studio {
    shared: Arc<Shared>,
    engine: Arc<dyn RenderEngine>,
    resources: EngineResources,
    pump: NoticePump,
}

impl Studio {
    /// Create a session and the channel its events are delivered on.
    pub fn new(engine: Arc<dyn RenderEngine>, options: StudioOptions) -> (Self, Receiver<StudioEvent>) {
        let (event_tx, event_rx) = crossbeam_channel::bounded(options.event_channel_capacity.max(1));
        (Self::with_events(engine, options, event_tx), event_rx)
    }

    /// Create a session that sends its events on `events`.
    pub fn with_events(
        engine: Arc<dyn RenderEngine>,
        options: StudioOptions,
        events: Sender<StudioEvent>,
    ) -> Self {
        let state = StudioState::new(Settings::default(), options.capture_timeout);
        let shared = Arc::new(Shared {
            state: RwLock::new(state),
            dispatcher: Dispatcher::new(),
            meters: MeterFeed::new(),
            events: EventSink::new(events),
            options,
        });
        Self {
            shared,
            resources: EngineResources::new(Arc::clone(&engine)),
            engine,
            pump: NoticePump::new(),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.shared.state.read().session.clone()
    }

    /// Orchestration options.
    pub fn options(&self) -> &StudioOptions {
        &self.shared.options
    }

    fn running(&self) -> StudioResult<RwLockWriteGuard<'_, StudioState>> {
        let state = self.shared.state.write();
        if !state.session.is_running() {
            return Err(StudioError::InvalidState(format!(
                "studio is {}",
                state.session.name()
            )));
        }
        Ok(state)
    }

    fn running_read(&self) -> StudioResult<RwLockReadGuard<'_, StudioState>> {
        let state = self.shared.state.read();
        if !state.session.is_running() {
            return Err(StudioError::InvalidState(format!(
                "studio is {}",
                state.session.name()
            )));
        }
        Ok(state)
    }

    fn transition_to(&self, new_state: SessionState) {
        let previous = {
            let mut state = self.shared.state.write();
            std::mem::replace(&mut state.session, new_state.clone())
        };

        debug!(
            previous = %previous.name(),
            current = %new_state.name(),
            "State transition"
        );

        self.shared.events.send(StudioEvent::StateChanged {
            previous: Box::new(previous),
            current: Box::new(new_state),
        });
    }

    /// Block until every directive issued so far has reached the engine.
    pub fn flush(&self) {
        self.shared.dispatcher.flush();
    }

    // ---- lifecycle ----

    /// Initialize the engine and start the program outputs.
    ///
    /// Allowed from `Idle`, or from `Error` after a failed startup.
    #[instrument(name = "studio_startup", skip(self, settings))]
    pub fn startup(&self, settings: Settings) -> StudioResult<()> {
        validate_startup(&settings)?;

        let now = Instant::now();
        let mut outputs = OutputController::new(settings.video.clone(), settings.audio.clone());
        for (index, output) in settings.outputs.iter().enumerate() {
            outputs.register(OutputBinding::Program { index }, output.clone())?;
        }
        let mut starts = Vec::with_capacity(settings.outputs.len());
        for index in 0..settings.outputs.len() {
            if let Some(start) = outputs.start(&OutputBinding::Program { index }, now)? {
                starts.push(start);
            }
        }

        let first_phase = SessionState::Starting {
            phase: StartupPhase::InitVideo,
        };
        let previous = {
            let mut state = self.shared.state.write();
            if !state.session.can_start() {
                return Err(StudioError::InvalidState(format!(
                    "cannot start a studio that is {}",
                    state.session.name()
                )));
            }
            std::mem::replace(&mut state.session, first_phase.clone())
        };
        self.shared.events.send(StudioEvent::StateChanged {
            previous: Box::new(previous),
            current: Box::new(first_phase),
        });

        info!(
            width = settings.video.base_width,
            height = settings.video.base_height,
            fps = settings.video.fps(),
            sample_rate = settings.audio.sample_rate,
            outputs = starts.len(),
            "Starting studio"
        );

        let (notice_tx, notice_rx) = crossbeam_channel::bounded(NOTICE_CHANNEL_CAPACITY);
        let initialized = self.resources.initialize(&settings, notice_tx, &starts, |phase| {
            if phase != StartupPhase::InitVideo {
                self.transition_to(SessionState::Starting { phase });
            }
        });

        let failures = match initialized {
            Ok(failures) => failures,
            Err((phase, e)) => {
                error!(phase = phase.name(), error = %e, "Studio startup failed");
                self.resources.rollback();
                let message = format!("{} failed: {e}", phase.name());
                self.transition_to(SessionState::Error {
                    message: message.clone(),
                });
                return Err(StudioError::EngineFailure(message));
            }
        };

        {
            let mut state = self.shared.state.write();
            state.reset(settings, outputs, self.shared.options.capture_timeout);
            for start in &starts {
                let failure = failures.iter().find(|failure| failure.pipeline == start.id);
                let health = match failure {
                    Some(failure) => {
                        let health = PipelineHealth::Failed {
                            reason: failure.error.to_string(),
                        };
                        state
                            .outputs
                            .apply_health(&failure.binding, failure.pipeline, health.clone());
                        health
                    }
                    None => PipelineHealth::Starting,
                };
                self.shared.events.send(StudioEvent::OutputHealth {
                    output: start.binding.clone(),
                    generation: start.id.0,
                    health,
                });
            }
        }

        let workers = self
            .shared
            .dispatcher
            .start(Arc::clone(&self.engine), self.shared.events.clone())
            .and_then(|()| self.pump.start(Arc::clone(&self.shared), notice_rx));
        if let Err(e) = workers {
            error!(error = %e, "Failed to start studio workers");
            self.shared.dispatcher.stop();
            self.pump.stop();
            self.resources.shutdown();
            self.transition_to(SessionState::Error {
                message: e.to_string(),
            });
            return Err(e);
        }

        self.transition_to(SessionState::Running);
        info!("Studio started");
        Ok(())
    }

    /// Stop every pipeline, release the engine, and end the session.
    ///
    /// Idempotent. Pending captures fail and every display is unbound.
    #[instrument(name = "studio_shutdown", skip(self))]
    pub fn shutdown(&self) -> StudioResult<()> {
        let previous = {
            let mut state = self.shared.state.write();
            if state.session.is_shut_down() {
                debug!("Already shut down, ignoring");
                return Ok(());
            }
            let was_running = state.session.is_running();
            let previous = std::mem::replace(&mut state.session, SessionState::ShuttingDown);

            if was_running {
                info!(
                    scenes = state.scenes.ids().len(),
                    sources = state.sources.len(),
                    pending_captures = state.captures.pending_count(),
                    meter_subscribers = self.shared.meters.subscriber_count(),
                    meters_published = self.shared.meters.published(),
                    "Stopping session"
                );
                for (binding, pipeline) in state.outputs.stop_all() {
                    self.shared.dispatcher.submit(Directive::StopOutput {
                        binding: binding.clone(),
                        pipeline,
                    });
                    self.shared.events.send(StudioEvent::OutputHealth {
                        output: binding,
                        generation: pipeline.0,
                        health: PipelineHealth::Stopped,
                    });
                }
                for name in state.displays.clear() {
                    self.shared.dispatcher.submit(Directive::UnbindDisplay { name });
                }
                let failed = state.captures.fail_all("studio is shutting down");
                if failed > 0 {
                    warn!(failed, "Pending captures failed by shutdown");
                }
            }
            previous
        };
        self.shared.events.send(StudioEvent::StateChanged {
            previous: Box::new(previous),
            current: Box::new(SessionState::ShuttingDown),
        });
        info!("Shutting down studio");

        self.shared.dispatcher.stop();
        self.pump.stop();
        self.resources.shutdown();
        self.shared.meters.close();

        self.transition_to(SessionState::ShutDown);
        info!("Studio shut down");
        Ok(())
    }

    // ---- scenes ----

    /// Create an empty scene. The first scene becomes active through a cut.
    #[instrument(name = "add_scene", skip(self))]
    pub fn add_scene(&self, scene_id: &str) -> StudioResult<String> {
        let mut state = self.running()?;
        state.scenes.add(scene_id)?;

        if state.scenes.active().is_none() {
            let now = Instant::now();
            if let Some(plan) = state.scenes.switch_to(scene_id, TransitionType::Cut, 0, now)? {
                self.shared.apply_switch(&mut state, plan, now)?;
            }
        }
        Ok(scene_id.to_string())
    }

    /// Scene ids in creation order.
    pub fn scene_ids(&self) -> StudioResult<Vec<String>> {
        Ok(self.running_read()?.scenes.ids())
    }

    /// The active scene, if any scene exists.
    pub fn active_scene(&self) -> StudioResult<Option<String>> {
        Ok(self.running_read()?.scenes.active().map(str::to_string))
    }

    /// Current visual state of the program.
    pub fn scene_mix(&self) -> StudioResult<SceneMix> {
        Ok(self.running_read()?.scenes.mix(Instant::now()))
    }

    /// Switch the program to a scene, superseding any switch in flight.
    #[instrument(name = "switch_to_scene", skip(self))]
    pub fn switch_to_scene(
        &self,
        scene_id: &str,
        transition: TransitionType,
        transition_ms: u32,
    ) -> StudioResult<()> {
        let mut state = self.running()?;
        let now = Instant::now();
        match state.scenes.switch_to(scene_id, transition, transition_ms, now)? {
            Some(plan) => self.shared.apply_switch(&mut state, plan, now),
            None => Ok(()),
        }
    }

    // ---- sources ----

    /// Create a source on top of a scene.
    #[instrument(name = "add_source", skip(self, settings))]
    pub fn add_source(
        &self,
        scene_id: &str,
        source_id: &str,
        settings: SourceSettings,
    ) -> StudioResult<SourceView> {
        let key = SourceKey::new(scene_id, source_id);
        validate_settings(&key, &settings)?;

        let mut state = self.running()?;
        if !state.scenes.contains(scene_id) {
            return Err(StudioError::not_found("scene", scene_id));
        }
        if state.sources.contains(&key) {
            return Err(StudioError::exists("source", key.to_string()));
        }
        // Everything that can fail runs before the source becomes visible.
        let binding = source_binding(&key);
        if let Some(output) = &settings.output {
            state.outputs.register(binding.clone(), output.clone())?;
        }
        let input = MixerInput::new(DEFAULT_VOLUME, initial_media_state(settings.source_type));
        let gains = match state.mixer.add_input(key.clone(), input) {
            Ok(gains) => gains,
            Err(e) => {
                state.outputs.unregister(&binding);
                return Err(e.into());
            }
        };
        state.sources.insert(key.clone(), settings.clone())?;
        state.scenes.attach_source(scene_id, source_id)?;

        self.shared.dispatcher.submit(Directive::OpenSource {
            key: key.clone(),
            settings: settings.clone(),
        });
        self.shared
            .dispatcher
            .submit_all(gains.into_iter().map(Directive::from));

        if settings.output.is_some()
            && (!settings.start_on_active || state.scenes.active() == Some(scene_id))
        {
            self.shared.start_output(&mut state, &binding, Instant::now())?;
        }

        info!(source = %key, kind = ?settings.source_type, "Source added");
        let record = state.sources.get(&key)?;
        Ok(source_view(&key, record, state.mixer.input(&key)))
    }

    /// Current view of a source.
    pub fn get_source(&self, scene_id: &str, source_id: &str) -> StudioResult<SourceView> {
        let key = SourceKey::new(scene_id, source_id);
        let state = self.running_read()?;
        let record = state.sources.get(&key)?;
        Ok(source_view(&key, record, state.mixer.input(&key)))
    }

    /// Sources of a scene, bottom first.
    pub fn list_sources(&self, scene_id: &str) -> StudioResult<Vec<SourceView>> {
        let state = self.running_read()?;
        state
            .scenes
            .sources(scene_id)?
            .iter()
            .map(|source_id| {
                let key = SourceKey::new(scene_id, source_id.as_str());
                let record = state.sources.get(&key)?;
                Ok(source_view(&key, record, state.mixer.input(&key)))
            })
            .collect()
    }

    /// Apply the fields present in `request`.
    #[instrument(name = "update_source", skip(self))]
    pub fn update_source(
        &self,
        scene_id: &str,
        source_id: &str,
        request: UpdateSourceSettings,
    ) -> StudioResult<SourceView> {
        let key = SourceKey::new(scene_id, source_id);

        let mut state = self.running()?;
        let current = &state.sources.get(&key)?.settings;
        validate_update(&request, current.source_type)?;
        let current_url = current.url.clone();

        let gains = state.mixer.update_input(
            &key,
            request.volume,
            request.audio_lock,
            request.audio_monitor,
        )?;
        if let Some(url) = request.url {
            if url != current_url {
                state.sources.get_mut(&key)?.settings.url = url.clone();
                self.shared.dispatcher.submit(Directive::SetSourceUrl {
                    key: key.clone(),
                    url,
                });
            }
        }
        self.shared
            .dispatcher
            .submit_all(gains.into_iter().map(Directive::from));

        let record = state.sources.get(&key)?;
        Ok(source_view(&key, record, state.mixer.input(&key)))
    }

    /// Re-open a source. Its dedicated output, if running, gets a new pipeline.
    #[instrument(name = "restart_source", skip(self))]
    pub fn restart_source(&self, scene_id: &str, source_id: &str) -> StudioResult<()> {
        let key = SourceKey::new(scene_id, source_id);
        let mut state = self.running()?;
        let record = state.sources.get_mut(&key)?;
        record.restarts += 1;
        let restarts = record.restarts;

        self.shared
            .dispatcher
            .submit(Directive::RestartSource { key: key.clone() });

        let binding = source_binding(&key);
        if state.outputs.pipeline(&binding).is_some() {
            let (old, new) = state.outputs.restart(&binding, Instant::now())?;
            if let Some(pipeline) = old {
                self.shared.dispatcher.submit(Directive::StopOutput {
                    binding: binding.clone(),
                    pipeline,
                });
            }
            if let Some(start) = new {
                self.shared.launch(start);
            }
        }

        info!(source = %key, restarts, "Source restarted");
        Ok(())
    }

    // ---- displays ----

    /// Bind a preview of `source_id` into a host window.
    ///
    /// The source is looked up by id across scenes in creation order.
    #[instrument(name = "create_display", skip(self))]
    pub fn create_display(
        &self,
        name: &str,
        parent: WindowHandle,
        scale_factor: u32,
        source_id: &str,
    ) -> StudioResult<()> {
        let mut state = self.running()?;
        let order = state.scenes.ids();
        let source = state
            .sources
            .find_by_id(source_id, &order)
            .ok_or_else(|| StudioError::not_found("source", source_id))?;

        state
            .displays
            .create(name, parent, scale_factor, source.clone())?;
        self.shared.dispatcher.submit(Directive::BindDisplay {
            name: name.to_string(),
            parent,
            source,
            scale_factor,
        });
        Ok(())
    }

    /// Reposition and resize a display without recreating it.
    pub fn move_display(&self, name: &str, x: i32, y: i32, width: u32, height: u32) -> StudioResult<()> {
        let mut state = self.running()?;
        let rect = DisplayRect {
            x,
            y,
            width,
            height,
        };
        let (width, height) = state.displays.place(name, rect)?.surface_size(width, height);
        self.shared.dispatcher.submit(Directive::MoveDisplay {
            name: name.to_string(),
            x,
            y,
            width,
            height,
        });
        Ok(())
    }

    /// Release a display.
    pub fn destroy_display(&self, name: &str) -> StudioResult<()> {
        let mut state = self.running()?;
        state.displays.remove(name)?;
        self.shared.dispatcher.submit(Directive::UnbindDisplay {
            name: name.to_string(),
        });
        Ok(())
    }

    /// Every bound display.
    pub fn displays(&self) -> StudioResult<Vec<DisplayBinding>> {
        Ok(self.running_read()?.displays.list())
    }

    // ---- downstream keys ----

    /// Add a downstream key above scenes and overlays.
    #[instrument(name = "add_dsk", skip(self, dsk), fields(id = %dsk.id))]
    pub fn add_dsk(&self, dsk: Dsk) -> StudioResult<()> {
        if dsk.width == 0 || dsk.height == 0 {
            return Err(StudioError::InvalidArgument(format!(
                "dsk {} must have a non-zero size",
                dsk.id
            )));
        }
        let mut state = self.running()?;
        state.layer_ids.claim(&dsk.id, LayerKind::Dsk)?;

        let video = &state.settings.video;
        let rect = dsk_rect(&dsk, video.base_width, video.base_height);
        debug!(position = dsk.position.name(), ?rect, "Downstream key placed");
        state.dsks.add(dsk.clone());
        self.shared.dispatcher.submit(Directive::AddDsk { dsk, rect });
        Ok(())
    }

    /// Downstream keys in creation order.
    pub fn get_dsks(&self) -> StudioResult<Vec<Dsk>> {
        Ok(self.running_read()?.dsks.all().to_vec())
    }

    /// Absolute rectangle of a downstream key on the base canvas.
    pub fn dsk_rect(&self, id: &str) -> StudioResult<LayerRect> {
        let state = self.running_read()?;
        let dsk = state.dsks.get(id)?;
        let video = &state.settings.video;
        Ok(dsk_rect(dsk, video.base_width, video.base_height))
    }

    // ---- audio ----

    /// Global audio settings. `master_volume` is linear; hosts that speak
    /// decibels convert with [`studio_audio::mul_to_db`].
    pub fn get_audio(&self) -> StudioResult<AudioView> {
        Ok(self.running_read()?.mixer.view())
    }

    /// Apply the fields present in `request`.
    ///
    /// `master_volume` is a linear multiplier in 0.0..=1.0; convert decibels
    /// with [`studio_audio::db_to_mul`].
    #[instrument(name = "update_audio", skip(self))]
    pub fn update_audio(&self, request: UpdateAudioRequest) -> StudioResult<AudioView> {
        let mut state = self.running()?;
        let directives = state.mixer.update(&request)?;
        self.shared
            .dispatcher
            .submit_all(directives.into_iter().map(Directive::from));
        Ok(state.mixer.view())
    }

    /// Pull subscription to the level meters of every source.
    ///
    /// When the queue is full the oldest measurement is dropped.
    pub fn subscribe_meters(&self, capacity: usize) -> StudioResult<MeterSubscription> {
        self.running_read()?;
        Ok(self.shared.meters.subscribe(capacity)?)
    }

    /// Run `callback` for every level measurement on its own thread.
    pub fn add_volmeter_callback<F>(&self, callback: F) -> StudioResult<()>
    where
        F: Fn(&VolumeLevels) + Send + 'static,
    {
        self.running_read()?;
        let capacity = self.shared.options.meter_queue_capacity;
        Ok(self.shared.meters.add_callback(capacity, callback)?)
    }

    // ---- capture ----

    /// Request one encoded frame of a source. Never blocks.
    #[instrument(name = "screenshot", skip(self))]
    pub fn screenshot(&self, scene_id: &str, source_id: &str) -> StudioResult<CaptureTicket> {
        let key = SourceKey::new(scene_id, source_id);
        let mut state = self.running()?;
        state.sources.get(&key)?;

        let (ticket, capture) = state.captures.request(key.clone(), Instant::now());
        if let Some(request) = capture {
            self.shared
                .dispatcher
                .submit(Directive::Capture { request, source: key });
        }
        Ok(ticket)
    }

    // ---- overlays ----

    /// Add an overlay on top of the stack.
    #[instrument(name = "add_overlay", skip(self, overlay), fields(id = %overlay.id()))]
    pub fn add_overlay(&self, overlay: Overlay) -> StudioResult<()> {
        validate_overlay(&overlay)?;
        let mut state = self.running()?;
        state.layer_ids.claim(overlay.id(), LayerKind::Overlay)?;
        state.overlays.add(overlay);
        self.shared.publish_overlays(&state);
        Ok(())
    }

    pub fn remove_overlay(&self, overlay_id: &str) -> StudioResult<()> {
        let mut state = self.running()?;
        state.overlays.remove(overlay_id)?;
        state.layer_ids.release_overlay(overlay_id);
        self.shared.publish_overlays(&state);
        Ok(())
    }

    /// Move an overlay to the top and show it.
    pub fn up_overlay(&self, overlay_id: &str) -> StudioResult<()> {
        let mut state = self.running()?;
        state.overlays.up(overlay_id)?;
        self.shared.publish_overlays(&state);
        Ok(())
    }

    /// Hide an overlay, keeping its place in the stack.
    pub fn down_overlay(&self, overlay_id: &str) -> StudioResult<()> {
        let mut state = self.running()?;
        state.overlays.down(overlay_id)?;
        self.shared.publish_overlays(&state);
        Ok(())
    }

    /// Every overlay, top first, including hidden ones.
    pub fn get_overlays(&self) -> StudioResult<Vec<OverlayView>> {
        Ok(self.running_read()?.overlays.views())
    }

    /// Ids of the shown overlays as composited, bottom first.
    pub fn composite_order(&self) -> StudioResult<Vec<String>> {
        Ok(self
            .running_read()?
            .overlays
            .composite()
            .iter()
            .map(|overlay| overlay.id().to_string())
            .collect())
    }

    // ---- outputs ----

    /// Status of every output pipeline.
    pub fn outputs(&self) -> StudioResult<Vec<OutputStatus>> {
        Ok(self.running_read()?.outputs.statuses(Instant::now()))
    }
}

impl Drop for Studio {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!("Shutdown on drop failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    use crate::engine::{EngineError, EngineNotice, EngineResult};
    use crate::{ErrorKind, HeadlessEngine};
    use studio_ipc::{
        AudioSettings, CgImage, CgItem, CgOverlay, CgText, ItemRect, MediaState, OutputSettings,
        OverlayStatus, Position, SourceType, VideoSettings,
    };

    fn studio_with(options: StudioOptions) -> (Studio, Arc<HeadlessEngine>, Receiver<StudioEvent>) {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
        let engine = Arc::new(HeadlessEngine::new());
        let (studio, events) = Studio::new(engine.clone(), options);
        (studio, engine, events)
    }

    fn started(settings: Settings) -> (Studio, Arc<HeadlessEngine>, Receiver<StudioEvent>) {
        let (studio, engine, events) = studio_with(StudioOptions::default());
        studio.startup(settings).unwrap();
        (studio, engine, events)
    }

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(3);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        condition()
    }

    fn next_event(events: &Receiver<StudioEvent>, mut matches: impl FnMut(&StudioEvent) -> bool) -> Option<StudioEvent> {
        let deadline = Instant::now() + Duration::from_secs(3);
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match events.recv_timeout(remaining) {
                Ok(event) if matches(&event) => return Some(event),
                Ok(_) => {}
                Err(_) => return None,
            }
        }
    }

    fn rtmp(key: &str) -> OutputSettings {
        OutputSettings {
            server: "rtmp://live.example.com/app".into(),
            key: key.into(),
            ..Default::default()
        }
    }

    fn cg(id: &str) -> Overlay {
        Overlay::Cg(CgOverlay {
            id: id.into(),
            name: format!("{id} lower third"),
            status: None,
            base_width: 1280,
            base_height: 720,
            items: Vec::new(),
        })
    }

    fn source_output(studio: &Studio, key: &SourceKey) -> OutputStatus {
        let binding = source_binding(key);
        studio
            .outputs()
            .unwrap()
            .into_iter()
            .find(|status| status.binding == binding)
            .unwrap()
    }

    #[test]
    fn test_operations_require_running_session() {
        let (studio, _engine, _events) = studio_with(StudioOptions::default());
        let err = studio.add_scene("scene1").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);

        studio.startup(Settings::default()).unwrap();
        assert_eq!(studio.state(), SessionState::Running);
        let err = studio.startup(Settings::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);

        studio.shutdown().unwrap();
        studio.shutdown().unwrap();
        assert_eq!(studio.state(), SessionState::ShutDown);
        let err = studio.get_audio().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn test_startup_rejects_empty_canvas() {
        let (studio, _engine, _events) = studio_with(StudioOptions::default());
        let mut settings = Settings::default();
        settings.video.base_width = 0;
        let err = studio.startup(settings).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(studio.state(), SessionState::Idle);
    }

    #[test]
    fn test_startup_reports_phases() {
        let (studio, _engine, events) = started(Settings::default());
        let phases: Vec<SessionState> = events
            .try_iter()
            .filter_map(|event| match event {
                StudioEvent::StateChanged { current, .. } => Some(*current),
                _ => None,
            })
            .collect();
        assert_eq!(
            phases,
            vec![
                SessionState::Starting {
                    phase: StartupPhase::InitVideo
                },
                SessionState::Starting {
                    phase: StartupPhase::InitAudio
                },
                SessionState::Starting {
                    phase: StartupPhase::StartOutputs
                },
                SessionState::Running,
            ]
        );
        drop(studio);
    }

    #[test]
    fn test_first_scene_is_cut_to() {
        let (studio, engine, events) = started(Settings::default());
        assert_eq!(studio.add_scene("scene1").unwrap(), "scene1");
        studio.add_scene("scene2").unwrap();
        assert_eq!(studio.active_scene().unwrap().as_deref(), Some("scene1"));
        assert_eq!(studio.scene_ids().unwrap(), vec!["scene1", "scene2"]);

        let err = studio.add_scene("scene1").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);

        studio.flush();
        assert_eq!(engine.program(), SceneMix::solo("scene1"));
        let switched = next_event(&events, |event| matches!(event, StudioEvent::SceneSwitched { .. }));
        match switched {
            Some(StudioEvent::SceneSwitched { from, to, transition, .. }) => {
                assert_eq!(from, None);
                assert_eq!(to, "scene1");
                assert_eq!(transition, TransitionType::Cut);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_superseded_switch_ends_on_latest_scene() {
        let (studio, engine, events) = started(Settings::default());
        studio.add_scene("scene1").unwrap();
        studio.add_scene("scene2").unwrap();

        studio
            .switch_to_scene("scene2", TransitionType::Fade, 1000)
            .unwrap();
        assert_eq!(studio.active_scene().unwrap().as_deref(), Some("scene2"));
        assert!(studio.scene_mix().unwrap().weight("scene2") < 1.0);

        studio.switch_to_scene("scene1", TransitionType::Cut, 0).unwrap();
        assert_eq!(studio.scene_mix().unwrap(), SceneMix::solo("scene1"));

        // Switching to the scene already shown does nothing.
        studio.switch_to_scene("scene1", TransitionType::Cut, 0).unwrap();

        studio.flush();
        assert_eq!(engine.program(), SceneMix::solo("scene1"));
        let targets: Vec<String> = events
            .try_iter()
            .filter_map(|event| match event {
                StudioEvent::SceneSwitched { to, .. } => Some(to),
                _ => None,
            })
            .collect();
        assert_eq!(targets, vec!["scene1", "scene2", "scene1"]);

        let err = studio
            .switch_to_scene("scene9", TransitionType::Cut, 0)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_source_settings_round_trip() {
        let (studio, engine, _events) = started(Settings::default());
        studio.add_scene("scene1").unwrap();

        let view = studio
            .add_source("scene1", "cam", SourceSettings::media("rtmp://ingest.example.com/cam"))
            .unwrap();
        assert_eq!(view.volume, 1.0);
        assert_eq!(view.url, "rtmp://ingest.example.com/cam");

        let view = studio
            .update_source(
                "scene1",
                "cam",
                UpdateSourceSettings {
                    volume: Some(0.4),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(view.volume, 0.4);
        assert_eq!(view.url, "rtmp://ingest.example.com/cam");

        studio
            .update_source(
                "scene1",
                "cam",
                UpdateSourceSettings {
                    url: Some("rtmp://ingest.example.com/backup".into()),
                    audio_lock: Some(true),
                    ..Default::default()
                },
            )
            .unwrap();
        let view = studio.get_source("scene1", "cam").unwrap();
        assert_eq!(view.url, "rtmp://ingest.example.com/backup");
        assert_eq!(view.volume, 0.4);
        assert!(view.audio_lock);

        studio.flush();
        assert!(engine.directive_names().contains(&"setSourceUrl"));
        assert_eq!(engine.gain(&SourceKey::new("scene1", "cam")), Some(0.4));

        let err = studio
            .add_source("scene1", "cam", SourceSettings::image("/tmp/logo.png"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        let err = studio
            .update_source(
                "scene1",
                "cam",
                UpdateSourceSettings {
                    volume: Some(1.5),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        let err = studio.get_source("scene2", "cam").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_same_source_id_in_two_scenes() {
        let (studio, _engine, _events) = started(Settings::default());
        studio.add_scene("scene1").unwrap();
        studio.add_scene("scene2").unwrap();
        studio
            .add_source("scene1", "cam", SourceSettings::media("rtmp://ingest.example.com/a"))
            .unwrap();
        studio
            .add_source("scene2", "cam", SourceSettings::media("rtmp://ingest.example.com/b"))
            .unwrap();

        let sources = studio.list_sources("scene2").unwrap();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].url, "rtmp://ingest.example.com/b");
        assert_eq!(
            studio.get_source("scene1", "cam").unwrap().url,
            "rtmp://ingest.example.com/a"
        );
    }

    #[test]
    fn test_invalid_source_output_creates_nothing() {
        let (studio, _engine, _events) = started(Settings::default());
        studio.add_scene("scene1").unwrap();
        let settings = SourceSettings {
            output: Some(OutputSettings {
                server: "ftp://files.example.com".into(),
                ..rtmp("cam")
            }),
            ..SourceSettings::media("rtmp://ingest.example.com/cam")
        };
        let err = studio.add_source("scene1", "cam", settings).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(studio.list_sources("scene1").unwrap().is_empty());
        assert!(studio.outputs().unwrap().is_empty());
    }

    #[test]
    fn test_oversized_output_bitrate_creates_nothing() {
        let (studio, _engine, _events) = started(Settings::default());
        studio.add_scene("scene1").unwrap();
        let settings = SourceSettings {
            output: Some(OutputSettings {
                video_bitrate_kbps: u32::MAX,
                ..rtmp("source1")
            }),
            ..SourceSettings::media("rtmp://host/live/source1")
        };
        let err = studio.add_source("scene1", "source1", settings).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let err = studio.get_source("scene1", "source1").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(studio.outputs().unwrap().is_empty());
    }

    #[test]
    fn test_media_source_volume_update() {
        let settings = Settings::default();
        assert_eq!(
            (settings.video.base_width, settings.video.base_height, settings.video.fps()),
            (1280, 720, 25.0)
        );
        let (studio, _engine, _events) = started(settings);
        studio.add_scene("scene1").unwrap();
        studio
            .add_source("scene1", "source1", SourceSettings::media("rtmp://host/live/source1"))
            .unwrap();

        let before = studio.get_source("scene1", "source1").unwrap();
        assert_eq!(before.source_type, SourceType::MediaSource);
        assert_eq!(before.volume, DEFAULT_VOLUME);

        let after = studio
            .update_source(
                "scene1",
                "source1",
                UpdateSourceSettings {
                    volume: Some(0.5),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(after.volume, 0.5);
        assert_eq!(after.url, before.url);
        assert_eq!(after.audio_lock, before.audio_lock);
        assert_eq!(after.audio_monitor, before.audio_monitor);
        assert_eq!(studio.get_source("scene1", "source1").unwrap(), after);
    }

    #[test]
    fn test_cg_overlay_items_keep_order() {
        let (studio, _engine, _events) = started(Settings::default());
        let rect = ItemRect {
            x: 40,
            y: 560,
            width: 400,
            height: 80,
        };
        let items = vec![
            CgItem::Image(CgImage {
                rect,
                url: "/tmp/bar.png".into(),
            }),
            CgItem::Text(CgText {
                rect: ItemRect { x: 60, ..rect },
                content: "Breaking news".into(),
                font_size: 32,
                font_family: "Arial".into(),
                color_abgr: "FFFFFFFF".into(),
            }),
        ];
        let Overlay::Cg(base) = cg("cg1");
        studio
            .add_overlay(Overlay::Cg(CgOverlay {
                items: items.clone(),
                ..base
            }))
            .unwrap();
        studio.up_overlay("cg1").unwrap();

        let views = studio.get_overlays().unwrap();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].id, "cg1");
        assert_eq!(views[0].status, OverlayStatus::Up);
        let Overlay::Cg(shown) = &views[0].overlay;
        assert_eq!(shown.items, items);
    }

    /// Engine that refuses to start outputs publishing to `reject_key`.
    struct RejectingEngine {
        reject_key: &'static str,
        notices: parking_lot::Mutex<Option<Sender<EngineNotice>>>,
    }

    impl RenderEngine for RejectingEngine {
        fn name(&self) -> &str {
            "rejecting"
        }

        fn init_video(&self, _: &VideoSettings, notices: Sender<EngineNotice>) -> EngineResult<()> {
            *self.notices.lock() = Some(notices);
            Ok(())
        }

        fn init_audio(&self, _: &AudioSettings) -> EngineResult<()> {
            Ok(())
        }

        fn execute(&self, directive: Directive) -> EngineResult<()> {
            match directive {
                Directive::StartOutput(start) if start.config.publish_url.ends_with(self.reject_key) => {
                    Err(EngineError::Failed("encoder unavailable".into()))
                }
                _ => Ok(()),
            }
        }

        fn release_audio(&self) {}

        fn release_video(&self) {
            self.notices.lock().take();
        }
    }

    #[test]
    fn test_failed_program_output_keeps_studio_running() {
        let engine = Arc::new(RejectingEngine {
            reject_key: "backup",
            notices: parking_lot::Mutex::new(None),
        });
        let (studio, events) = Studio::new(engine, StudioOptions::default());
        let settings = Settings {
            outputs: vec![rtmp("main"), rtmp("backup")],
            ..Default::default()
        };
        studio.startup(settings).unwrap();
        assert_eq!(studio.state(), SessionState::Running);

        let outputs = studio.outputs().unwrap();
        assert_eq!(outputs.len(), 2);
        let health = |index: usize| {
            outputs
                .iter()
                .find(|status| status.binding == OutputBinding::Program { index })
                .map(|status| status.health.clone())
                .unwrap()
        };
        assert_eq!(health(0), PipelineHealth::Starting);
        assert!(matches!(health(1), PipelineHealth::Failed { .. }));

        let failed = next_event(&events, |event| {
            matches!(
                event,
                StudioEvent::OutputHealth {
                    health: PipelineHealth::Failed { .. },
                    ..
                }
            )
        });
        assert!(matches!(
            failed,
            Some(StudioEvent::OutputHealth { output: OutputBinding::Program { index: 1 }, .. })
        ));
        studio.shutdown().unwrap();
    }

    #[test]
    fn test_program_output_goes_live_and_reconnects() {
        let settings = Settings {
            outputs: vec![rtmp("program")],
            ..Default::default()
        };
        let (studio, engine, events) = started(settings);
        let program = OutputBinding::Program { index: 0 };

        assert!(wait_until(|| studio.outputs().unwrap()[0].health.is_live()));
        assert_eq!(
            studio.outputs().unwrap()[0].publish_url,
            "rtmp://live.example.com/app/program"
        );

        engine.simulate_output_drop(&program, "connection reset").unwrap();
        let reconnecting = next_event(&events, |event| {
            matches!(
                event,
                StudioEvent::OutputHealth {
                    health: PipelineHealth::Reconnecting { .. },
                    ..
                }
            )
        });
        match reconnecting {
            Some(StudioEvent::OutputHealth { output, health, .. }) => {
                assert_eq!(output, program);
                assert_eq!(health, PipelineHealth::Reconnecting { attempt: 1 });
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(wait_until(|| studio.outputs().unwrap()[0].health.is_live()));

        studio.shutdown().unwrap();
        assert!(engine.running_outputs().is_empty());
    }

    #[test]
    fn test_restart_source_replaces_pipeline() {
        let (studio, engine, _events) = started(Settings::default());
        studio.add_scene("scene1").unwrap();
        let key = SourceKey::new("scene1", "cam");
        let settings = SourceSettings {
            output: Some(rtmp("cam")),
            ..SourceSettings::media("rtmp://ingest.example.com/cam")
        };
        studio.add_source("scene1", "cam", settings).unwrap();
        let before = source_output(&studio, &key).pipeline.unwrap();

        studio.restart_source("scene1", "cam").unwrap();
        let after = source_output(&studio, &key).pipeline.unwrap();
        assert!(after.0 > before.0);

        studio.flush();
        let names = engine.directive_names();
        assert_eq!(
            names[names.len() - 3..],
            ["restartSource", "stopOutput", "startOutput"]
        );
        assert_eq!(engine.running_outputs(), vec![source_binding(&key)]);

        let err = studio.restart_source("scene1", "ghost").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_start_on_active_output_waits_for_scene() {
        let (studio, _engine, _events) = started(Settings::default());
        studio.add_scene("scene1").unwrap();
        studio.add_scene("scene2").unwrap();
        let key = SourceKey::new("scene2", "replay");
        let settings = SourceSettings {
            start_on_active: true,
            output: Some(rtmp("replay")),
            ..SourceSettings::media("rtmp://ingest.example.com/replay")
        };
        studio.add_source("scene2", "replay", settings).unwrap();
        assert_eq!(source_output(&studio, &key).pipeline, None);

        studio.switch_to_scene("scene2", TransitionType::Cut, 0).unwrap();
        let first = source_output(&studio, &key).pipeline;
        assert!(first.is_some());

        // Coming back to the scene keeps the running pipeline.
        studio.switch_to_scene("scene1", TransitionType::Cut, 0).unwrap();
        studio.switch_to_scene("scene2", TransitionType::Cut, 0).unwrap();
        assert_eq!(source_output(&studio, &key).pipeline, first);
    }

    #[test]
    fn test_overlay_stack_order() {
        let (studio, engine, _events) = started(Settings::default());
        studio.add_overlay(cg("cg1")).unwrap();
        studio.add_overlay(cg("cg2")).unwrap();

        let views = studio.get_overlays().unwrap();
        let ids: Vec<&str> = views.iter().map(|view| view.id.as_str()).collect();
        assert_eq!(ids, vec!["cg2", "cg1"]);
        assert_eq!(studio.composite_order().unwrap(), vec!["cg1", "cg2"]);

        studio.up_overlay("cg1").unwrap();
        assert_eq!(studio.composite_order().unwrap(), vec!["cg2", "cg1"]);

        studio.down_overlay("cg2").unwrap();
        assert_eq!(studio.composite_order().unwrap(), vec!["cg1"]);
        let hidden = studio
            .get_overlays()
            .unwrap()
            .into_iter()
            .find(|view| view.id == "cg2")
            .unwrap();
        assert_eq!(hidden.status, OverlayStatus::Down);

        let err = studio.add_overlay(cg("cg1")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);

        studio.remove_overlay("cg1").unwrap();
        let err = studio.remove_overlay("cg1").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(studio.composite_order().unwrap().is_empty());

        studio.flush();
        assert!(engine.overlay_ids().is_empty());

        // A removed id can be used again.
        studio.add_overlay(cg("cg1")).unwrap();
        studio.flush();
        assert_eq!(engine.overlay_ids(), vec!["cg1"]);
    }

    #[test]
    fn test_dsk_placement() {
        let (studio, engine, _events) = started(Settings::default());
        let dsk = Dsk {
            id: "bug".into(),
            position: Position::BottomRight,
            url: "file:///bug.png".into(),
            left: 20,
            top: 10,
            width: 200,
            height: 100,
        };
        studio.add_dsk(dsk.clone()).unwrap();

        let rect = studio.dsk_rect("bug").unwrap();
        assert_eq!((rect.x, rect.y), (1060, 610));
        assert_eq!(studio.get_dsks().unwrap(), vec![dsk.clone()]);

        let err = studio.add_dsk(dsk).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        let err = studio.add_overlay(cg("bug")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);

        // Downstream keys survive scene switches.
        studio.add_scene("scene1").unwrap();
        studio.add_scene("scene2").unwrap();
        studio.switch_to_scene("scene2", TransitionType::Fade, 300).unwrap();
        studio.flush();
        assert_eq!(engine.dsk_ids(), vec!["bug"]);
        assert_eq!(studio.get_dsks().unwrap().len(), 1);
    }

    #[test]
    fn test_audio_follows_video() {
        let (studio, engine, _events) = started(Settings::default());
        engine.hold_media(true);
        studio.add_scene("scene1").unwrap();
        let key = SourceKey::new("scene1", "cam");
        studio
            .add_source("scene1", "cam", SourceSettings::media("rtmp://ingest.example.com/cam"))
            .unwrap();

        let audio = studio
            .update_audio(UpdateAudioRequest {
                audio_with_video: Some(true),
                ..Default::default()
            })
            .unwrap();
        assert!(audio.audio_with_video);
        studio.flush();
        assert_eq!(engine.gain(&key), Some(0.0));

        engine.simulate_media_state(&key, MediaState::Playing).unwrap();
        assert!(wait_until(|| engine.gain(&key) == Some(1.0)));

        let audio = studio
            .update_audio(UpdateAudioRequest {
                master_volume: Some(0.5),
                pgm_monitor: Some(true),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(audio.master_volume, 0.5);
        studio.flush();
        assert_eq!(engine.gain(&key), Some(0.5));
        assert!(engine.program_monitor());
    }

    #[test]
    fn test_meters_reach_subscribers() {
        let (studio, _engine, _events) = started(Settings::default());
        let meters = studio.subscribe_meters(16).unwrap();
        studio.add_scene("scene1").unwrap();
        studio
            .add_source("scene1", "cam", SourceSettings::media("rtmp://ingest.example.com/cam"))
            .unwrap();

        let levels = meters.recv_timeout(Duration::from_secs(3)).unwrap();
        assert_eq!(levels.source_id, "cam");
        assert_eq!(levels.channels, 2);
        assert_eq!(levels.peak.len(), 2);

        studio.shutdown().unwrap();
        assert!(meters.is_closed());
    }

    #[test]
    fn test_displays() {
        let (studio, engine, _events) = started(Settings::default());
        studio.add_scene("scene1").unwrap();
        studio
            .add_source("scene1", "cam", SourceSettings::media("rtmp://ingest.example.com/cam"))
            .unwrap();

        studio
            .create_display("preview", WindowHandle(0x2a), 2, "cam")
            .unwrap();
        studio.move_display("preview", 10, 20, 320, 180).unwrap();
        let err = studio
            .create_display("preview", WindowHandle(0x2a), 1, "cam")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        let err = studio
            .create_display("other", WindowHandle(0x2a), 1, "ghost")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        studio.flush();
        let moved = engine.directives().into_iter().find_map(|directive| match directive {
            Directive::MoveDisplay { x, y, width, height, .. } => Some((x, y, width, height)),
            _ => None,
        });
        assert_eq!(moved, Some((10, 20, 640, 360)));

        studio.destroy_display("preview").unwrap();
        assert!(studio.displays().unwrap().is_empty());
        let err = studio.move_display("preview", 0, 0, 1, 1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_concurrent_screenshots_share_capture() {
        let options = StudioOptions {
            capture_timeout: Duration::from_millis(200),
            notice_tick: Duration::from_millis(10),
            ..Default::default()
        };
        let (studio, engine, _events) = studio_with(options);
        studio.startup(Settings::default()).unwrap();
        studio.add_scene("scene1").unwrap();
        studio
            .add_source("scene1", "logo", SourceSettings::image("/srv/logo.png"))
            .unwrap();

        engine.ignore_captures(true);
        let first = studio.screenshot("scene1", "logo").unwrap();
        let second = studio.screenshot("scene1", "logo").unwrap();
        studio.flush();
        let captures = engine
            .directive_names()
            .into_iter()
            .filter(|name| *name == "capture")
            .count();
        assert_eq!(captures, 1);
        assert_eq!(first.wait().await.unwrap_err().kind(), ErrorKind::CaptureFailed);
        assert_eq!(second.wait().await.unwrap_err().kind(), ErrorKind::CaptureFailed);

        // A request after the deadline starts a fresh capture.
        engine.ignore_captures(false);
        let png = studio.screenshot("scene1", "logo").unwrap().wait().await.unwrap();
        assert_eq!(&png[..4], b"\x89PNG");

        let err = studio.screenshot("scene1", "ghost").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_screenshot_is_bounded() {
        let options = StudioOptions {
            capture_timeout: Duration::from_millis(100),
            notice_tick: Duration::from_millis(10),
            ..Default::default()
        };
        let (studio, engine, _events) = studio_with(options);
        studio.startup(Settings::default()).unwrap();
        studio.add_scene("scene1").unwrap();
        studio
            .add_source("scene1", "cam", SourceSettings::media("rtmp://ingest.example.com/cam"))
            .unwrap();
        engine.ignore_captures(true);

        let started = Instant::now();
        let err = studio.screenshot("scene1", "cam").unwrap().wait().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CaptureFailed);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_shutdown_fails_pending_captures() {
        let (studio, engine, _events) = started(Settings::default());
        studio.add_scene("scene1").unwrap();
        studio
            .add_source("scene1", "cam", SourceSettings::media("rtmp://ingest.example.com/cam"))
            .unwrap();
        engine.ignore_captures(true);

        let ticket = studio.screenshot("scene1", "cam").unwrap();
        studio.shutdown().unwrap();
        let err = ticket.wait().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CaptureFailed);
        assert!(err.to_string().contains("shutting down"));
    }
}
