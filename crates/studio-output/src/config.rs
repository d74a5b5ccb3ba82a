//! Encoder configuration resolved from output settings.

use serde::{Deserialize, Serialize};
use url::Url;

use studio_ipc::{AudioSettings, OutputSettings, RateControl, VideoSettings};

use crate::error::OutputError;
use crate::OutputResult;

/// x264 speed presets, fastest first.
pub const PRESETS: [&str; 10] = [
    "ultrafast",
    "superfast",
    "veryfast",
    "faster",
    "fast",
    "medium",
    "slow",
    "slower",
    "veryslow",
    "placebo",
];

/// x264 tunes. An empty tune means none.
pub const TUNES: [&str; 8] = [
    "film",
    "animation",
    "grain",
    "stillimage",
    "psnr",
    "ssim",
    "fastdecode",
    "zerolatency",
];

/// Highest accepted video bitrate in kbps.
pub const MAX_VIDEO_BITRATE_KBPS: u32 = 200_000;

/// Highest accepted audio bitrate in kbps.
pub const MAX_AUDIO_BITRATE_KBPS: u32 = 1_024;

/// H.264 profile levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum H264Profile {
    Baseline,
    Main,
    High,
}

impl H264Profile {
    fn parse(profile: &str) -> OutputResult<Self> {
        match profile.to_ascii_lowercase().as_str() {
            "baseline" => Ok(Self::Baseline),
            "main" => Ok(Self::Main),
            "high" => Ok(Self::High),
            other => Err(OutputError::InvalidSettings(format!(
                "unknown profile '{other}'"
            ))),
        }
    }
}

/// Video encoding configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoEncoderConfig {
    /// Width in pixels.
    pub width: u32,

    /// Height in pixels.
    pub height: u32,

    /// Frame rate numerator.
    pub fps_num: u32,

    /// Frame rate denominator.
    pub fps_den: u32,

    /// Target bitrate in kbps.
    pub bitrate_kbps: u32,

    /// Keyframe interval in seconds.
    pub keyframe_interval_secs: u32,

    /// Rate control mode.
    pub rate_control: RateControl,

    /// Speed preset.
    pub preset: String,

    /// H.264 profile.
    pub profile: H264Profile,

    /// Tune, if any.
    pub tune: Option<String>,

    /// Raw `key=value` encoder options, in the order given.
    pub options: Vec<(String, String)>,

    /// Prefer a hardware encoder.
    pub hardware: bool,
}

impl VideoEncoderConfig {
    /// Keyframe interval in frames.
    pub fn keyframe_interval_frames(&self) -> u32 {
        if self.fps_den == 0 {
            return 0;
        }
        let frames = u64::from(self.keyframe_interval_secs) * u64::from(self.fps_num)
            / u64::from(self.fps_den);
        u32::try_from(frames).unwrap_or(u32::MAX)
    }
}

/// Audio encoding configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioEncoderConfig {
    /// Sample rate in Hz.
    pub sample_rate: u32,

    /// Number of channels.
    pub channels: u16,

    /// Target bitrate in kbps.
    pub bitrate_kbps: u32,
}

/// Everything the engine needs to run one encode and publish pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncoderConfig {
    /// Publish URL including the stream key.
    pub publish_url: String,

    pub video: VideoEncoderConfig,

    pub audio: AudioEncoderConfig,

    /// Target size when it differs from the rendered output.
    pub scale_to: Option<(u32, u32)>,
}

/// Check that `server` is an RTMP URL.
pub fn validate_server(server: &str) -> OutputResult<Url> {
    let url = Url::parse(server).map_err(|e| OutputError::InvalidUrl(format!("{server}: {e}")))?;
    match url.scheme() {
        "rtmp" | "rtmps" => {}
        other => {
            return Err(OutputError::InvalidUrl(format!(
                "scheme must be rtmp or rtmps, got '{other}'"
            )))
        }
    }
    if url.host_str().is_none() {
        return Err(OutputError::InvalidUrl(format!("{server}: missing host")));
    }
    Ok(url)
}

/// Parse a raw option string such as `bframes=0 keyint=50:ref=1`.
pub fn parse_encoder_options(raw: &str) -> OutputResult<Vec<(String, String)>> {
    raw.split(|c: char| c.is_whitespace() || c == ':')
        .filter(|part| !part.is_empty())
        .map(|part| match part.split_once('=') {
            Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
            _ => Err(OutputError::InvalidOption(part.to_string())),
        })
        .collect()
}

/// Validate output settings and resolve the encoder configuration.
pub fn resolve(
    settings: &OutputSettings,
    video: &VideoSettings,
    audio: &AudioSettings,
) -> OutputResult<EncoderConfig> {
    validate_server(&settings.server)?;

    if settings.key.trim().is_empty() {
        return Err(OutputError::InvalidSettings("stream key is empty".into()));
    }
    if settings.width == 0 || settings.height == 0 {
        return Err(OutputError::InvalidSettings(format!(
            "resolution {}x{} must be non-zero",
            settings.width, settings.height
        )));
    }
    if settings.width % 2 != 0 || settings.height % 2 != 0 {
        return Err(OutputError::InvalidSettings(format!(
            "resolution {}x{} must be even",
            settings.width, settings.height
        )));
    }
    if settings.keyint_sec == 0 {
        return Err(OutputError::InvalidSettings("keyintSec must be at least 1".into()));
    }
    if settings.video_bitrate_kbps == 0 || settings.audio_bitrate_kbps == 0 {
        return Err(OutputError::InvalidSettings("bitrates must be positive".into()));
    }
    if settings.video_bitrate_kbps > MAX_VIDEO_BITRATE_KBPS {
        return Err(OutputError::InvalidSettings(format!(
            "video bitrate {} kbps exceeds {MAX_VIDEO_BITRATE_KBPS}",
            settings.video_bitrate_kbps
        )));
    }
    if settings.audio_bitrate_kbps > MAX_AUDIO_BITRATE_KBPS {
        return Err(OutputError::InvalidSettings(format!(
            "audio bitrate {} kbps exceeds {MAX_AUDIO_BITRATE_KBPS}",
            settings.audio_bitrate_kbps
        )));
    }

    let preset = settings.preset.to_ascii_lowercase();
    if !PRESETS.contains(&preset.as_str()) {
        return Err(OutputError::InvalidSettings(format!(
            "unknown preset '{}'",
            settings.preset
        )));
    }
    let profile = H264Profile::parse(&settings.profile)?;
    let tune = match settings.tune.trim().to_ascii_lowercase() {
        t if t.is_empty() => None,
        t if TUNES.contains(&t.as_str()) => Some(t),
        t => return Err(OutputError::InvalidSettings(format!("unknown tune '{t}'"))),
    };
    let options = match settings.x264opts.as_deref() {
        Some(raw) => parse_encoder_options(raw)?,
        None => Vec::new(),
    };

    let output_size = (video.output_width, video.output_height);
    let target = (settings.width, settings.height);
    let scale_to = (output_size != target).then_some(target);

    Ok(EncoderConfig {
        publish_url: settings.publish_url(),
        video: VideoEncoderConfig {
            width: settings.width,
            height: settings.height,
            fps_num: video.fps_num,
            fps_den: video.fps_den,
            bitrate_kbps: settings.video_bitrate_kbps,
            keyframe_interval_secs: settings.keyint_sec,
            rate_control: settings.rate_control,
            preset,
            profile,
            tune,
            options,
            hardware: settings.hardware_enable,
        },
        audio: AudioEncoderConfig {
            sample_rate: audio.sample_rate,
            channels: 2,
            bitrate_kbps: settings.audio_bitrate_kbps,
        },
        scale_to,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output() -> OutputSettings {
        OutputSettings {
            server: "rtmp://host.docker.internal/live".into(),
            key: "output".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_resolve_default_output() {
        let config = resolve(&output(), &VideoSettings::default(), &AudioSettings::default())
            .unwrap();
        assert_eq!(config.publish_url, "rtmp://host.docker.internal/live/output");
        assert_eq!(config.scale_to, None);
        assert_eq!(config.video.profile, H264Profile::Main);
        assert_eq!(config.video.tune.as_deref(), Some("zerolatency"));
        assert_eq!(config.video.keyframe_interval_frames(), 25);
        assert_eq!(config.audio.sample_rate, 44100);
    }

    #[test]
    fn test_smaller_output_requires_scaling() {
        let settings = OutputSettings {
            width: 640,
            height: 360,
            profile: "baseline".into(),
            ..output()
        };
        let config =
            resolve(&settings, &VideoSettings::default(), &AudioSettings::default()).unwrap();
        assert_eq!(config.scale_to, Some((640, 360)));
        assert_eq!(config.video.profile, H264Profile::Baseline);
    }

    #[test]
    fn test_rejects_non_rtmp_server() {
        let settings = OutputSettings {
            server: "http://example.com/live".into(),
            ..output()
        };
        assert!(matches!(
            resolve(&settings, &VideoSettings::default(), &AudioSettings::default()),
            Err(OutputError::InvalidUrl(_))
        ));
        assert!(validate_server("not a url").is_err());
    }

    #[test]
    fn test_rejects_bad_encoder_settings() {
        let video = VideoSettings::default();
        let audio = AudioSettings::default();
        let odd = OutputSettings {
            width: 641,
            ..output()
        };
        assert!(resolve(&odd, &video, &audio).is_err());

        let preset = OutputSettings {
            preset: "warp".into(),
            ..output()
        };
        assert!(resolve(&preset, &video, &audio).is_err());

        let key = OutputSettings {
            key: " ".into(),
            ..output()
        };
        assert!(resolve(&key, &video, &audio).is_err());

        let bitrate = OutputSettings {
            video_bitrate_kbps: u32::MAX,
            ..output()
        };
        assert!(matches!(
            resolve(&bitrate, &video, &audio),
            Err(OutputError::InvalidSettings(_))
        ));
        let bitrate = OutputSettings {
            audio_bitrate_kbps: MAX_AUDIO_BITRATE_KBPS + 1,
            ..output()
        };
        assert!(resolve(&bitrate, &video, &audio).is_err());
    }

    #[test]
    fn test_keyframe_interval_saturates() {
        let settings = OutputSettings {
            keyint_sec: u32::MAX,
            ..output()
        };
        let config = resolve(&settings, &VideoSettings::default(), &AudioSettings::default())
            .unwrap();
        assert_eq!(config.video.keyframe_interval_frames(), u32::MAX);
    }

    #[test]
    fn test_parse_encoder_options() {
        let options = parse_encoder_options("bframes=0 keyint=50:ref=1").unwrap();
        assert_eq!(
            options,
            vec![
                ("bframes".to_string(), "0".to_string()),
                ("keyint".to_string(), "50".to_string()),
                ("ref".to_string(), "1".to_string()),
            ]
        );
        assert!(parse_encoder_options("").unwrap().is_empty());
        assert!(matches!(
            parse_encoder_options("bframes"),
            Err(OutputError::InvalidOption(_))
        ));
    }
}
