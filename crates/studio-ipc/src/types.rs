//! Settings and records shared across the studio crates.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Global settings passed to the engine at startup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Canvas and output video format.
    pub video: VideoSettings,

    /// Audio format.
    pub audio: AudioSettings,

    /// Program outputs started together with the engine.
    #[serde(default)]
    pub outputs: Vec<OutputSettings>,
}

/// Video canvas configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoSettings {
    /// Width of the composition canvas in pixels.
    pub base_width: u32,

    /// Height of the composition canvas in pixels.
    pub base_height: u32,

    /// Width of the rendered program output in pixels.
    pub output_width: u32,

    /// Height of the rendered program output in pixels.
    pub output_height: u32,

    /// Frame rate numerator.
    pub fps_num: u32,

    /// Frame rate denominator.
    pub fps_den: u32,
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            base_width: 1280,
            base_height: 720,
            output_width: 1280,
            output_height: 720,
            fps_num: 25,
            fps_den: 1,
        }
    }
}

impl VideoSettings {
    /// Frame rate as a floating point value.
    pub fn fps(&self) -> f64 {
        if self.fps_den == 0 {
            return 0.0;
        }
        f64::from(self.fps_num) / f64::from(self.fps_den)
    }

    /// Duration of one frame in nanoseconds.
    pub fn frame_interval_ns(&self) -> u64 {
        if self.fps_num == 0 {
            return 0;
        }
        1_000_000_000u64 * u64::from(self.fps_den) / u64::from(self.fps_num)
    }
}

/// Audio configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioSettings {
    /// Sample rate in Hz.
    pub sample_rate: u32,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self { sample_rate: 44100 }
    }
}

/// Rate control mode of a video encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RateControl {
    #[serde(rename = "CBR")]
    Cbr,
    #[serde(rename = "VBR")]
    Vbr,
}

/// Encode and publish settings for one output pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputSettings {
    /// Publish server, e.g. `rtmp://host/live`.
    pub server: String,

    /// Stream key appended to the server.
    pub key: String,

    /// Prefer a hardware encoder.
    #[serde(default)]
    pub hardware_enable: bool,

    /// Encoded width in pixels.
    pub width: u32,

    /// Encoded height in pixels.
    pub height: u32,

    /// Keyframe interval in seconds.
    pub keyint_sec: u32,

    /// Rate control mode.
    pub rate_control: RateControl,

    /// Encoder speed preset.
    pub preset: String,

    /// H.264 profile.
    pub profile: String,

    /// Encoder tune.
    pub tune: String,

    /// Raw encoder options, `key=value` pairs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x264opts: Option<String>,

    /// Video bitrate in kbps.
    pub video_bitrate_kbps: u32,

    /// Audio bitrate in kbps.
    pub audio_bitrate_kbps: u32,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            server: String::new(),
            key: String::new(),
            hardware_enable: false,
            width: 1280,
            height: 720,
            keyint_sec: 1,
            rate_control: RateControl::Cbr,
            preset: "ultrafast".to_string(),
            profile: "main".to_string(),
            tune: "zerolatency".to_string(),
            x264opts: None,
            video_bitrate_kbps: 1000,
            audio_bitrate_kbps: 64,
        }
    }
}

impl OutputSettings {
    /// Full publish URL: server joined with the stream key.
    pub fn publish_url(&self) -> String {
        if self.server.ends_with('/') {
            format!("{}{}", self.server, self.key)
        } else {
            format!("{}/{}", self.server, self.key)
        }
    }
}

/// Kind of media a source reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceType {
    Image,
    MediaSource,
}

/// Settings used to create a source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceSettings {
    /// Whether `url` is a local file.
    pub is_file: bool,

    /// Source kind.
    #[serde(rename = "type")]
    pub source_type: SourceType,

    /// File path or network locator.
    pub url: String,

    /// Decode with hardware acceleration.
    #[serde(default)]
    pub hardware_decoder: bool,

    /// Only start playback when the owning scene becomes active.
    #[serde(default)]
    pub start_on_active: bool,

    /// Enable network buffering.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_buffer: Option<bool>,

    /// Network buffer size in megabytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buffer_size: Option<u32>,

    /// Dedicated output fed by this source only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<OutputSettings>,
}

impl SourceSettings {
    /// Settings for a network media source with defaults for everything else.
    pub fn media(url: impl Into<String>) -> Self {
        Self {
            is_file: false,
            source_type: SourceType::MediaSource,
            url: url.into(),
            hardware_decoder: false,
            start_on_active: false,
            enable_buffer: None,
            buffer_size: None,
            output: None,
        }
    }

    /// Settings for a still image file.
    pub fn image(path: impl Into<String>) -> Self {
        Self {
            is_file: true,
            source_type: SourceType::Image,
            ..Self::media(path)
        }
    }
}

/// Identity of a source: source ids are unique only within their scene.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceKey {
    pub scene_id: String,
    pub source_id: String,
}

impl SourceKey {
    pub fn new(scene_id: impl Into<String>, source_id: impl Into<String>) -> Self {
        Self {
            scene_id: scene_id.into(),
            source_id: source_id.into(),
        }
    }
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.scene_id, self.source_id)
    }
}

/// Materialized view of a source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceView {
    pub id: String,
    pub scene_id: String,
    #[serde(rename = "type")]
    pub source_type: SourceType,
    pub url: String,
    pub volume: f32,
    pub audio_lock: bool,
    pub audio_monitor: bool,
}

/// Partial update of a source. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSourceSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_lock: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_monitor: Option<bool>,
}

impl UpdateSourceSettings {
    /// Returns true if no field is set.
    pub fn is_empty(&self) -> bool {
        self.url.is_none()
            && self.volume.is_none()
            && self.audio_lock.is_none()
            && self.audio_monitor.is_none()
    }
}

/// Global audio state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioView {
    /// Linear master gain (0.0 - 1.0).
    pub master_volume: f32,

    /// Silence sources whose video is not playing.
    pub audio_with_video: bool,

    /// Program mix routed to the local monitor.
    pub pgm_monitor: bool,
}

/// Partial update of the global audio state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAudioRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master_volume: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_with_video: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pgm_monitor: Option<bool>,
}

/// Visual transition used when switching scenes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransitionType {
    #[serde(rename = "cut_transition")]
    Cut,
    #[serde(rename = "fade_transition")]
    Fade,
    #[serde(rename = "swipe_transition")]
    Swipe,
    #[serde(rename = "slide_transition")]
    Slide,
}

impl TransitionType {
    /// Engine identifier of the transition.
    pub fn id(self) -> &'static str {
        match self {
            Self::Cut => "cut_transition",
            Self::Fade => "fade_transition",
            Self::Swipe => "swipe_transition",
            Self::Slide => "slide_transition",
        }
    }
}

/// Opaque handle of a host-owned native window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WindowHandle(pub u64);

/// Audio levels of one source for one metering period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeLevels {
    pub scene_id: String,
    pub source_id: String,
    pub channels: u32,
    pub magnitude: Vec<f32>,
    pub peak: Vec<f32>,
    pub input_peak: Vec<f32>,
}

/// Playback state of a media source as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MediaState {
    Opening,
    Buffering,
    Playing,
    Paused,
    Stopped,
    Ended,
    Error,
}

impl MediaState {
    /// Returns true if frames are actively flowing.
    pub fn is_playing(self) -> bool {
        matches!(self, Self::Playing)
    }
}

/// What an output pipeline encodes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum OutputBinding {
    /// The composited program, by position in `Settings::outputs`.
    Program { index: usize },

    /// A single source, bypassing the composite.
    Source { scene_id: String, source_id: String },
}

impl fmt::Display for OutputBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Program { index } => write!(f, "program-{index}"),
            Self::Source {
                scene_id,
                source_id,
            } => write!(f, "source:{scene_id}/{source_id}"),
        }
    }
}

/// Health of an output pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum PipelineHealth {
    /// Pipeline created, waiting for the first connection.
    #[default]
    Starting,

    /// Publishing.
    Live,

    /// Connection dropped, engine is retrying.
    Reconnecting { attempt: u32 },

    /// Publishing failed permanently.
    Failed { reason: String },

    /// Pipeline stopped.
    Stopped,
}

impl PipelineHealth {
    /// Returns true while the pipeline is publishing.
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Live)
    }

    /// Returns true if the pipeline ended, successfully or not.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed { .. } | Self::Stopped)
    }

    /// Status message for display.
    pub fn message(&self) -> String {
        match self {
            Self::Starting => "Starting".to_string(),
            Self::Live => "Live".to_string(),
            Self::Reconnecting { attempt } => format!("Reconnecting (attempt {attempt})"),
            Self::Failed { reason } => format!("Failed: {reason}"),
            Self::Stopped => "Stopped".to_string(),
        }
    }
}
