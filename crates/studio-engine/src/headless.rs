//! Engine that renders nothing.
//!
//! [`HeadlessEngine`] keeps the state a real engine would keep, runs a
//! render clock at the configured frame rate and answers with plausible
//! notices: sources start playing, pipelines go live and report counters,
//! media sources report audio levels, captures return a PNG of the canvas.
//! It backs the command-line host and the studio's tests.

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bytes::Bytes;
use crossbeam_channel::{Sender, TrySendError};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use studio_audio::{mul_to_db, MixerDirective};
use studio_ipc::{
    AudioSettings, MediaState, OutputBinding, PipelineHealth, SourceKey, SourceType,
    VideoSettings, VolumeLevels,
};
use studio_output::{PipelineId, ReconnectPolicy, StatsReport};

use crate::engine::{Directive, EngineError, EngineNotice, EngineResult, RenderEngine};
use crate::scene::SceneMix;

/// Interval between audio level measurements.
const METER_INTERVAL: Duration = Duration::from_millis(50);

/// Interval between pipeline statistics reports.
const STATS_INTERVAL: Duration = Duration::from_secs(1);

const METER_CHANNELS: u32 = 2;

struct HeadlessSource {
    source_type: SourceType,
    url: String,
    media_state: MediaState,
    gain: f32,
}

/// Frame and byte counters of one pipeline.
#[derive(Debug, Default)]
struct PipelineCounters {
    frames_encoded: u64,
    frames_dropped: u64,
    bytes_sent: u64,
}

impl PipelineCounters {
    fn record_frame(&mut self, bytes: u64) {
        self.frames_encoded += 1;
        self.bytes_sent += bytes;
    }

    fn record_drop(&mut self) {
        self.frames_dropped += 1;
    }

    fn report(&self) -> StatsReport {
        StatsReport {
            frames_encoded: self.frames_encoded,
            frames_dropped: self.frames_dropped,
            bytes_sent: self.bytes_sent,
        }
    }
}

struct HeadlessOutput {
    pipeline: PipelineId,
    health: PipelineHealth,
    drops: u32,
    bytes_per_frame: u64,
    counters: PipelineCounters,
}

#[derive(Default)]
struct HeadlessInner {
    notices: Option<Sender<EngineNotice>>,
    video: Option<VideoSettings>,
    audio: Option<AudioSettings>,
    sources: HashMap<SourceKey, HeadlessSource>,
    outputs: HashMap<OutputBinding, HeadlessOutput>,
    displays: HashMap<String, SourceKey>,
    program: SceneMix,
    overlays: Vec<String>,
    dsks: Vec<String>,
    master_monitor: bool,
    log: Vec<Directive>,
    hold_media: bool,
    ignore_captures: bool,
    last_meter: Option<Instant>,
    last_stats: Option<Instant>,
}

impl HeadlessInner {
    fn notify(&self, notice: EngineNotice) {
        let Some(tx) = &self.notices else {
            return;
        };
        match tx.try_send(notice) {
            Ok(()) => {}
            Err(TrySendError::Full(notice)) => {
                trace!(?notice, "Notice channel full, dropping");
            }
            Err(TrySendError::Disconnected(_)) => {
                debug!("Notice channel closed");
            }
        }
    }

    fn set_media_state(&mut self, key: &SourceKey, state: MediaState) -> EngineResult<()> {
        let source = self.sources.get_mut(key).ok_or_else(|| EngineError::Unknown {
            kind: "source",
            id: key.to_string(),
        })?;
        if source.media_state != state {
            source.media_state = state;
            self.notify(EngineNotice::MediaState {
                key: key.clone(),
                state,
            });
        }
        Ok(())
    }

    fn source(&self, key: &SourceKey) -> EngineResult<&HeadlessSource> {
        self.sources.get(key).ok_or_else(|| EngineError::Unknown {
            kind: "source",
            id: key.to_string(),
        })
    }

    /// Open or re-open a media source.
    fn open(&mut self, key: &SourceKey) -> EngineResult<()> {
        let source_type = self.source(key)?.source_type;
        if source_type == SourceType::MediaSource {
            self.set_media_state(key, MediaState::Opening)?;
            if !self.hold_media {
                self.set_media_state(key, MediaState::Playing)?;
            }
        }
        Ok(())
    }

    fn execute(&mut self, directive: Directive) -> EngineResult<()> {
        if self.video.is_none() || self.audio.is_none() {
            return Err(EngineError::NotInitialized);
        }
        self.log.push(directive.clone());

        match directive {
            Directive::OpenSource { key, settings } => {
                let media_state = match settings.source_type {
                    SourceType::MediaSource => MediaState::Opening,
                    SourceType::Image => MediaState::Playing,
                };
                self.sources.insert(
                    key.clone(),
                    HeadlessSource {
                        source_type: settings.source_type,
                        url: settings.url,
                        media_state,
                        gain: 1.0,
                    },
                );
                if !self.hold_media && settings.source_type == SourceType::MediaSource {
                    self.set_media_state(&key, MediaState::Playing)?;
                }
            }
            Directive::SetSourceUrl { key, url } => {
                let source = self.sources.get_mut(&key).ok_or_else(|| EngineError::Unknown {
                    kind: "source",
                    id: key.to_string(),
                })?;
                debug!(source = %key, from = %source.url, to = %url, "Source url changed");
                source.url = url;
                self.open(&key)?;
            }
            Directive::RestartSource { key } => self.open(&key)?,
            Directive::Transition { to, duration, .. } => {
                debug!(scene = %to, ?duration, "Program transition");
                self.program = SceneMix::solo(to);
            }
            Directive::SetOverlays { stack } => {
                self.overlays = stack.iter().map(|overlay| overlay.id().to_string()).collect();
            }
            Directive::AddDsk { dsk, .. } => self.dsks.push(dsk.id),
            Directive::Mixer(MixerDirective::SetGain { source, gain }) => {
                if let Some(input) = self.sources.get_mut(&source) {
                    input.gain = gain;
                }
            }
            Directive::Mixer(MixerDirective::SetMonitor { source, enabled }) => {
                self.source(&source)?;
                trace!(source = %source, enabled, "Monitor routing changed");
            }
            Directive::Mixer(MixerDirective::SetProgramMonitor(enabled)) => {
                self.master_monitor = enabled;
            }
            Directive::StartOutput(start) => {
                let video = &start.config.video;
                let fps = (f64::from(video.fps_num) / f64::from(video.fps_den.max(1))).max(1.0);
                let kbps = u64::from(video.bitrate_kbps) + u64::from(start.config.audio.bitrate_kbps);
                self.outputs.insert(
                    start.binding,
                    HeadlessOutput {
                        pipeline: start.id,
                        health: PipelineHealth::Starting,
                        drops: 0,
                        bytes_per_frame: (kbps as f64 * 1000.0 / 8.0 / fps) as u64,
                        counters: PipelineCounters::default(),
                    },
                );
            }
            Directive::StopOutput { binding, pipeline } => {
                if self
                    .outputs
                    .get(&binding)
                    .is_some_and(|output| output.pipeline == pipeline)
                {
                    self.outputs.remove(&binding);
                }
            }
            Directive::BindDisplay { name, source, .. } => {
                self.source(&source)?;
                self.displays.insert(name, source);
            }
            Directive::MoveDisplay { name, .. } => {
                if !self.displays.contains_key(&name) {
                    return Err(EngineError::Unknown {
                        kind: "display",
                        id: name,
                    });
                }
            }
            Directive::UnbindDisplay { name } => {
                self.displays.remove(&name);
            }
            Directive::Capture { request, source } => {
                if self.ignore_captures {
                    trace!(capture = %request, "Ignoring capture");
                    return Ok(());
                }
                let result = match self.source(&source) {
                    Ok(headless) => self.encode_frame(headless.source_type),
                    Err(e) => Err(e.to_string()),
                };
                self.notify(EngineNotice::FrameCaptured { request, result });
            }
        }
        Ok(())
    }

    fn encode_frame(&self, source_type: SourceType) -> Result<Bytes, String> {
        let (width, height) = self
            .video
            .as_ref()
            .map_or((1, 1), |video| (video.base_width, video.base_height));
        let fill = match source_type {
            SourceType::MediaSource => Rgba([16, 16, 16, 255]),
            SourceType::Image => Rgba([235, 235, 235, 255]),
        };
        let frame = DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, fill));

        let mut buf = Vec::new();
        frame
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .map_err(|e| format!("png encode failed: {e}"))?;
        Ok(Bytes::from(buf))
    }

    /// Advance one frame.
    fn tick(&mut self, now: Instant) {
        let mut changes = Vec::new();
        for (binding, output) in &mut self.outputs {
            match output.health {
                PipelineHealth::Starting | PipelineHealth::Reconnecting { .. } => {
                    output.health = PipelineHealth::Live;
                    output.drops = 0;
                    changes.push((binding.clone(), output.pipeline, PipelineHealth::Live));
                }
                PipelineHealth::Live => output.counters.record_frame(output.bytes_per_frame),
                PipelineHealth::Failed { .. } | PipelineHealth::Stopped => {}
            }
        }
        for (binding, pipeline, health) in changes {
            self.notify(EngineNotice::OutputHealth {
                binding,
                pipeline,
                health,
            });
        }

        if self.last_meter.map_or(true, |last| now - last >= METER_INTERVAL) {
            self.last_meter = Some(now);
            for (key, source) in &self.sources {
                if source.source_type != SourceType::MediaSource || !source.media_state.is_playing() {
                    continue;
                }
                self.notify(EngineNotice::VolumeLevels(measure(key, source.gain)));
            }
        }

        if self.last_stats.map_or(true, |last| now - last >= STATS_INTERVAL) {
            self.last_stats = Some(now);
            for (binding, output) in &self.outputs {
                if output.health.is_live() {
                    self.notify(EngineNotice::OutputStats {
                        binding: binding.clone(),
                        pipeline: output.pipeline,
                        report: output.counters.report(),
                    });
                }
            }
        }
    }
}

/// A steady tone at half scale, attenuated by the source gain.
fn measure(key: &SourceKey, gain: f32) -> VolumeLevels {
    let peak = mul_to_db(0.5 * gain);
    let magnitude = mul_to_db(0.35 * gain);
    let channels = METER_CHANNELS as usize;
    VolumeLevels {
        scene_id: key.scene_id.clone(),
        source_id: key.source_id.clone(),
        channels: METER_CHANNELS,
        magnitude: vec![magnitude; channels],
        peak: vec![peak; channels],
        input_peak: vec![mul_to_db(0.5); channels],
    }
}

/// Engine without decoding, compositing or publishing.
pub struct HeadlessEngine {
    inner: Arc<Mutex<HeadlessInner>>,
    should_stop: Arc<AtomicBool>,
    clock: Mutex<Option<JoinHandle<()>>>,
}

impl HeadlessEngine {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(HeadlessInner::default())),
            should_stop: Arc::new(AtomicBool::new(false)),
            clock: Mutex::new(None),
        }
    }

    /// Directives executed so far, oldest first.
    pub fn directives(&self) -> Vec<Directive> {
        self.inner.lock().log.clone()
    }

    /// Names of the directives executed so far.
    pub fn directive_names(&self) -> Vec<&'static str> {
        self.inner.lock().log.iter().map(Directive::name).collect()
    }

    /// Scene shown by the last transition.
    pub fn program(&self) -> SceneMix {
        self.inner.lock().program.clone()
    }

    /// Overlay ids as composited, bottom first.
    pub fn overlay_ids(&self) -> Vec<String> {
        self.inner.lock().overlays.clone()
    }

    pub fn dsk_ids(&self) -> Vec<String> {
        self.inner.lock().dsks.clone()
    }

    /// Gain applied to a source, if the engine knows it.
    pub fn gain(&self, key: &SourceKey) -> Option<f32> {
        self.inner.lock().sources.get(key).map(|source| source.gain)
    }

    /// Whether the program mix is routed to the monitor device.
    pub fn program_monitor(&self) -> bool {
        self.inner.lock().master_monitor
    }

    pub fn running_outputs(&self) -> Vec<OutputBinding> {
        self.inner.lock().outputs.keys().cloned().collect()
    }

    /// Keep media sources in `Opening` until a state is simulated.
    pub fn hold_media(&self, hold: bool) {
        self.inner.lock().hold_media = hold;
    }

    /// Leave capture directives unanswered.
    pub fn ignore_captures(&self, ignore: bool) {
        self.inner.lock().ignore_captures = ignore;
    }

    /// Report a playback state change as the decoder would.
    pub fn simulate_media_state(&self, key: &SourceKey, state: MediaState) -> EngineResult<()> {
        self.inner.lock().set_media_state(key, state)
    }

    /// Report a dropped connection on a running pipeline.
    pub fn simulate_output_drop(&self, binding: &OutputBinding, reason: &str) -> EngineResult<()> {
        let mut inner = self.inner.lock();
        let output = inner.outputs.get_mut(binding).ok_or_else(|| EngineError::Unknown {
            kind: "output",
            id: binding.to_string(),
        })?;

        let health = ReconnectPolicy::default().health_after_drop(output.drops, reason);
        output.drops += 1;
        output.counters.record_drop();
        output.health = health.clone();
        let pipeline = output.pipeline;
        warn!(output = %binding, ?health, "Simulated connection drop");

        inner.notify(EngineNotice::OutputHealth {
            binding: binding.clone(),
            pipeline,
            health,
        });
        Ok(())
    }

    fn stop_clock(&self) {
        self.should_stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.clock.lock().take() {
            if handle.join().is_err() {
                warn!("Render clock thread panicked");
            }
        }
    }
}

impl Default for HeadlessEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderEngine for HeadlessEngine {
    fn name(&self) -> &str {
        "headless"
    }

    fn init_video(&self, video: &VideoSettings, notices: Sender<EngineNotice>) -> EngineResult<()> {
        self.stop_clock();
        {
            let mut inner = self.inner.lock();
            let hold_media = inner.hold_media;
            let ignore_captures = inner.ignore_captures;
            *inner = HeadlessInner {
                notices: Some(notices),
                video: Some(video.clone()),
                hold_media,
                ignore_captures,
                ..HeadlessInner::default()
            };
        }

        let interval = Duration::from_nanos(video.frame_interval_ns());
        let inner = Arc::clone(&self.inner);
        self.should_stop.store(false, Ordering::SeqCst);
        let should_stop = Arc::clone(&self.should_stop);

        let handle = thread::Builder::new()
            .name("studio-render".to_string())
            .spawn(move || render_clock(inner, should_stop, interval))
            .map_err(|e| EngineError::Failed(format!("failed to spawn render clock: {e}")))?;
        *self.clock.lock() = Some(handle);

        info!(
            width = video.base_width,
            height = video.base_height,
            fps = video.fps(),
            "Headless video initialized"
        );
        Ok(())
    }

    fn init_audio(&self, audio: &AudioSettings) -> EngineResult<()> {
        self.inner.lock().audio = Some(audio.clone());
        info!(sample_rate = audio.sample_rate, "Headless audio initialized");
        Ok(())
    }

    fn execute(&self, directive: Directive) -> EngineResult<()> {
        self.inner.lock().execute(directive)
    }

    fn release_audio(&self) {
        self.inner.lock().audio = None;
        debug!("Headless audio released");
    }

    fn release_video(&self) {
        self.stop_clock();
        let mut inner = self.inner.lock();
        inner.video = None;
        inner.notices = None;
        inner.outputs.clear();
        inner.displays.clear();
        debug!("Headless video released");
    }
}

impl Drop for HeadlessEngine {
    fn drop(&mut self) {
        self.stop_clock();
    }
}

fn render_clock(inner: Arc<Mutex<HeadlessInner>>, should_stop: Arc<AtomicBool>, interval: Duration) {
    debug!(?interval, "Render clock started");
    let mut frames: u64 = 0;

    while !should_stop.load(Ordering::SeqCst) {
        let frame_start = Instant::now();
        inner.lock().tick(frame_start);
        frames += 1;

        let elapsed = frame_start.elapsed();
        if elapsed < interval {
            thread::sleep(interval - elapsed);
        }
    }

    debug!(frames, "Render clock stopped");
}
