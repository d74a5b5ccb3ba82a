//! Audio mixer state and level metering.
//!
//! The mixer tracks per-source gain settings and turns them into gain and
//! monitor directives for the engine. The meter feed distributes engine
//! level measurements to any number of subscribers without ever blocking
//! the publishing thread.

mod error;
mod meter;
mod mixer;

pub use error::AudioError;
pub use meter::{MeterFeed, MeterSubscription};
pub use mixer::{db_to_mul, mul_to_db, AudioMixer, MixerDirective, MixerInput};

/// Default queue depth of a meter subscription.
pub const METER_QUEUE_CAPACITY: usize = 64;

/// Result type for audio operations.
pub type AudioResult<T> = Result<T, AudioError>;

/// Validate a linear gain value.
pub fn check_volume(volume: f32) -> AudioResult<f32> {
    if volume.is_finite() && (0.0..=1.0).contains(&volume) {
        Ok(volume)
    } else {
        Err(AudioError::InvalidVolume(volume))
    }
}
