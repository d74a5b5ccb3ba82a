//! Audio mixing state.

use std::collections::BTreeMap;

use tracing::{debug, instrument, trace};

use studio_ipc::{AudioView, MediaState, SourceKey, UpdateAudioRequest};

use crate::error::AudioError;
use crate::{check_volume, AudioResult};

/// Gains below this are treated as silence when converting to decibels.
const MIN_DB: f32 = -96.0;

/// Convert decibels to a linear multiplier.
pub fn db_to_mul(db: f32) -> f32 {
    if db.is_finite() {
        10f32.powf(db / 20.0)
    } else if db > 0.0 {
        f32::INFINITY
    } else {
        0.0
    }
}

/// Convert a linear multiplier to decibels. Zero maps to negative infinity.
pub fn mul_to_db(mul: f32) -> f32 {
    if mul <= 0.0 {
        f32::NEG_INFINITY
    } else {
        (20.0 * mul.log10()).max(MIN_DB)
    }
}

/// Directive produced by a mixer state change.
#[derive(Debug, Clone, PartialEq)]
pub enum MixerDirective {
    /// Apply an effective gain to a source.
    SetGain { source: SourceKey, gain: f32 },

    /// Route a source to the local monitor.
    SetMonitor { source: SourceKey, enabled: bool },

    /// Route the program mix to the local monitor.
    SetProgramMonitor(bool),
}

/// Per-source mixer settings.
#[derive(Debug, Clone, PartialEq)]
pub struct MixerInput {
    /// Volume multiplier (0.0 - 1.0).
    pub volume: f32,

    /// Excluded from master and automatic adjustment.
    pub audio_lock: bool,

    /// Routed to the local monitor.
    pub audio_monitor: bool,

    /// Last playback state reported by the engine.
    pub media_state: MediaState,

    /// Last gain sent to the engine.
    applied_gain: Option<f32>,
}

impl MixerInput {
    /// Create a new input.
    pub fn new(volume: f32, media_state: MediaState) -> Self {
        Self {
            volume,
            audio_lock: false,
            audio_monitor: false,
            media_state,
            applied_gain: None,
        }
    }
}

/// Mixer that tracks program audio settings for every source.
#[derive(Debug)]
pub struct AudioMixer {
    master_volume: f32,
    audio_with_video: bool,
    pgm_monitor: bool,
    inputs: BTreeMap<SourceKey, MixerInput>,
}

impl AudioMixer {
    /// Create a new audio mixer.
    pub fn new() -> Self {
        Self {
            master_volume: 1.0,
            audio_with_video: false,
            pgm_monitor: false,
            inputs: BTreeMap::new(),
        }
    }

    /// Current global settings. The master volume is linear; hosts that
    /// speak decibels convert with [`mul_to_db`].
    pub fn view(&self) -> AudioView {
        AudioView {
            master_volume: self.master_volume,
            audio_with_video: self.audio_with_video,
            pgm_monitor: self.pgm_monitor,
        }
    }

    /// Registered input for a source.
    pub fn input(&self, key: &SourceKey) -> Option<&MixerInput> {
        self.inputs.get(key)
    }

    fn gain_for(&self, input: &MixerInput) -> f32 {
        let master = if input.audio_lock {
            1.0
        } else {
            self.master_volume
        };
        let gate = if self.audio_with_video && !input.media_state.is_playing() {
            0.0
        } else {
            1.0
        };
        input.volume * master * gate
    }

    /// Register a source. Returns the directives that set up its gain.
    #[instrument(name = "mixer_add_input", skip(self, input), fields(source = %key))]
    pub fn add_input(
        &mut self,
        key: SourceKey,
        input: MixerInput,
    ) -> AudioResult<Vec<MixerDirective>> {
        check_volume(input.volume)?;
        if self.inputs.contains_key(&key) {
            return Err(AudioError::InputExists(key.to_string()));
        }
        let monitor = input.audio_monitor;
        self.inputs.insert(key.clone(), input);

        let mut directives = Vec::new();
        self.push_gain(&key, &mut directives);
        if monitor {
            directives.push(MixerDirective::SetMonitor {
                source: key,
                enabled: true,
            });
        }
        Ok(directives)
    }

    /// Patch the settings of a source. `None` fields are left unchanged.
    #[instrument(name = "mixer_update_input", skip(self), fields(source = %key))]
    pub fn update_input(
        &mut self,
        key: &SourceKey,
        volume: Option<f32>,
        audio_lock: Option<bool>,
        audio_monitor: Option<bool>,
    ) -> AudioResult<Vec<MixerDirective>> {
        if let Some(volume) = volume {
            check_volume(volume)?;
        }
        let input = self
            .inputs
            .get_mut(key)
            .ok_or_else(|| AudioError::InputNotFound(key.to_string()))?;

        if let Some(volume) = volume {
            input.volume = volume;
        }
        if let Some(lock) = audio_lock {
            input.audio_lock = lock;
        }

        let mut directives = Vec::new();
        if let Some(monitor) = audio_monitor {
            if input.audio_monitor != monitor {
                input.audio_monitor = monitor;
                directives.push(MixerDirective::SetMonitor {
                    source: key.clone(),
                    enabled: monitor,
                });
            }
        }
        self.push_gain(key, &mut directives);
        Ok(directives)
    }

    /// Record a playback state change reported by the engine.
    pub fn set_media_state(&mut self, key: &SourceKey, state: MediaState) -> Vec<MixerDirective> {
        let mut directives = Vec::new();
        match self.inputs.get_mut(key) {
            Some(input) => {
                input.media_state = state;
                self.push_gain(key, &mut directives);
            }
            None => trace!(source = %key, "Media state for unknown input, ignoring"),
        }
        directives
    }

    /// Apply a partial update of the global settings.
    ///
    /// `master_volume` is a linear multiplier; convert decibels with
    /// [`db_to_mul`] first.
    #[instrument(name = "mixer_update", skip(self))]
    pub fn update(&mut self, request: &UpdateAudioRequest) -> AudioResult<Vec<MixerDirective>> {
        if let Some(volume) = request.master_volume {
            check_volume(volume)?;
        }

        if let Some(volume) = request.master_volume {
            self.master_volume = volume;
        }
        if let Some(linked) = request.audio_with_video {
            self.audio_with_video = linked;
        }

        let mut directives = Vec::new();
        if let Some(monitor) = request.pgm_monitor {
            self.pgm_monitor = monitor;
            directives.push(MixerDirective::SetProgramMonitor(monitor));
        }

        let keys: Vec<SourceKey> = self.inputs.keys().cloned().collect();
        for key in &keys {
            self.push_gain(key, &mut directives);
        }

        debug!(
            master_volume = self.master_volume,
            audio_with_video = self.audio_with_video,
            directives = directives.len(),
            "Mixer updated"
        );
        Ok(directives)
    }

    /// Emit a gain directive if the effective gain of `key` changed.
    fn push_gain(&mut self, key: &SourceKey, directives: &mut Vec<MixerDirective>) {
        let Some(input) = self.inputs.get(key) else {
            return;
        };
        let gain = self.gain_for(input);
        if input.applied_gain == Some(gain) {
            return;
        }
        if let Some(input) = self.inputs.get_mut(key) {
            input.applied_gain = Some(gain);
        }
        directives.push(MixerDirective::SetGain {
            source: key.clone(),
            gain,
        });
    }
}

impl Default for AudioMixer {
    fn default() -> Self {
        Self::new()
    }
}
