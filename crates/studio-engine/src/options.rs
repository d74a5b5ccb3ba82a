//! Orchestration settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use studio_audio::METER_QUEUE_CAPACITY;
use studio_ipc::EVENT_CHANNEL_CAPACITY;

/// Default bound on a screenshot.
pub const DEFAULT_CAPTURE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default interval of the notice pump's housekeeping tick.
pub const DEFAULT_NOTICE_TICK: Duration = Duration::from_millis(100);

/// Knobs of a studio session that are not part of the engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StudioOptions {
    /// How long a screenshot may take before it fails.
    #[serde(with = "millis")]
    pub capture_timeout: Duration,

    /// Queue depth of meter subscriptions created without an explicit one.
    pub meter_queue_capacity: usize,

    /// Capacity of the event channel created by [`Studio::new`](crate::Studio::new).
    pub event_channel_capacity: usize,

    /// Housekeeping interval of the notice pump.
    #[serde(with = "millis")]
    pub notice_tick: Duration,
}

impl Default for StudioOptions {
    fn default() -> Self {
        Self {
            capture_timeout: DEFAULT_CAPTURE_TIMEOUT,
            meter_queue_capacity: METER_QUEUE_CAPACITY,
            event_channel_capacity: EVENT_CHANNEL_CAPACITY,
            notice_tick: DEFAULT_NOTICE_TICK,
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_options_use_defaults() {
        let options: StudioOptions = serde_json::from_str(r#"{"captureTimeout": 250}"#).unwrap();
        assert_eq!(options.capture_timeout, Duration::from_millis(250));
        assert_eq!(options.notice_tick, DEFAULT_NOTICE_TICK);
        assert_eq!(options.meter_queue_capacity, 64);
    }
}
