//! Publish connection retry model.
//!
//! Reconnecting is done by the engine; this policy describes how it backs
//! off so health messages can say what to expect.

use std::time::Duration;

use studio_ipc::PipelineHealth;

use crate::{BASE_RECONNECT_DELAY_MS, MAX_RECONNECT_ATTEMPTS};

/// Reconnection policy configuration.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Maximum number of reconnection attempts.
    pub max_attempts: u32,

    /// Base delay between attempts (exponential backoff applied).
    pub base_delay: Duration,

    /// Maximum delay between attempts.
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_RECONNECT_ATTEMPTS,
            base_delay: Duration::from_millis(BASE_RECONNECT_DELAY_MS),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl ReconnectPolicy {
    /// Calculate delay for a given attempt number.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let multiplier = 2u64.saturating_pow(attempt.saturating_sub(1));
        let multiplier = u32::try_from(multiplier).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(multiplier).min(self.max_delay)
    }

    /// Check if more attempts are allowed.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Health after the connection dropped `attempt` times in a row.
    pub fn health_after_drop(&self, attempt: u32, reason: &str) -> PipelineHealth {
        if self.should_retry(attempt) {
            PipelineHealth::Reconnecting {
                attempt: attempt + 1,
            }
        } else {
            PipelineHealth::Failed {
                reason: format!("{reason} (gave up after {attempt} attempts)"),
            }
        }
    }
}
