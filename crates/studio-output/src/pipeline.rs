//! Output pipeline registry.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use studio_ipc::{AudioSettings, OutputBinding, OutputSettings, PipelineHealth, VideoSettings};

use crate::config::{resolve, EncoderConfig};
use crate::connection::ReconnectPolicy;
use crate::error::OutputError;
use crate::stats::{OutputStats, StatsCollector, StatsReport};
use crate::OutputResult;

/// Identity of one running pipeline instance.
///
/// A restart creates a new instance with a new id; notices carrying an old
/// id are stale and ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PipelineId(pub u64);

impl fmt::Display for PipelineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Request to start a pipeline, handed to the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineStart {
    pub id: PipelineId,
    pub binding: OutputBinding,
    pub config: EncoderConfig,
}

/// Status of one output as reported to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputStatus {
    pub binding: OutputBinding,
    pub pipeline: Option<PipelineId>,
    pub health: PipelineHealth,
    pub publish_url: String,
    pub stats: OutputStats,
}

struct OutputEntry {
    config: EncoderConfig,
    running: Option<PipelineId>,
    health: PipelineHealth,
    stats: StatsCollector,
}

/// Registry of global and per-source outputs.
pub struct OutputController {
    video: VideoSettings,
    audio: AudioSettings,
    reconnect: ReconnectPolicy,
    outputs: BTreeMap<OutputBinding, OutputEntry>,
    next_id: u64,
}

impl OutputController {
    /// Create an empty controller for the given canvas and audio format.
    pub fn new(video: VideoSettings, audio: AudioSettings) -> Self {
        Self {
            video,
            audio,
            reconnect: ReconnectPolicy::default(),
            outputs: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Register an output. It does not run until [`start`](Self::start).
    pub fn register(&mut self, binding: OutputBinding, settings: OutputSettings) -> OutputResult<()> {
        if self.outputs.contains_key(&binding) {
            return Err(OutputError::AlreadyExists(binding.to_string()));
        }
        let config = resolve(&settings, &self.video, &self.audio)?;
        let target = settings
            .video_bitrate_kbps
            .saturating_add(settings.audio_bitrate_kbps);
        debug!(output = %binding, url = %config.publish_url, "Output registered");
        self.outputs.insert(
            binding,
            OutputEntry {
                config,
                running: None,
                health: PipelineHealth::Stopped,
                stats: StatsCollector::new(target),
            },
        );
        Ok(())
    }

    /// Forget an output whose owner could not be created. Returns the
    /// running pipeline that must be stopped.
    pub fn unregister(&mut self, binding: &OutputBinding) -> Option<PipelineId> {
        self.outputs.remove(binding).and_then(|entry| entry.running)
    }

    /// Returns true if the output is registered.
    pub fn contains(&self, binding: &OutputBinding) -> bool {
        self.outputs.contains_key(binding)
    }

    /// Start a registered output. Starting a running output is a no-op.
    pub fn start(&mut self, binding: &OutputBinding, now: Instant) -> OutputResult<Option<PipelineStart>> {
        let next_id = self.next_id;
        let entry = self
            .outputs
            .get_mut(binding)
            .ok_or_else(|| OutputError::NotFound(binding.to_string()))?;
        if entry.running.is_some() {
            debug!(output = %binding, "Output already running");
            return Ok(None);
        }

        let id = PipelineId(next_id);
        self.next_id += 1;
        entry.running = Some(id);
        entry.health = PipelineHealth::Starting;
        entry.stats.start(now);

        info!(output = %binding, pipeline = %id, "Output pipeline starting");
        Ok(Some(PipelineStart {
            id,
            binding: binding.clone(),
            config: entry.config.clone(),
        }))
    }

    /// Stop a running output. Returns the stopped pipeline, if any.
    pub fn stop(&mut self, binding: &OutputBinding) -> Option<PipelineId> {
        let entry = self.outputs.get_mut(binding)?;
        let id = entry.running.take()?;
        entry.health = PipelineHealth::Stopped;
        entry.stats.stop();
        info!(output = %binding, pipeline = %id, "Output pipeline stopped");
        Some(id)
    }

    /// Replace a running pipeline with a new instance.
    pub fn restart(
        &mut self,
        binding: &OutputBinding,
        now: Instant,
    ) -> OutputResult<(Option<PipelineId>, Option<PipelineStart>)> {
        if !self.outputs.contains_key(binding) {
            return Err(OutputError::NotFound(binding.to_string()));
        }
        let old = self.stop(binding);
        let new = self.start(binding, now)?;
        Ok((old, new))
    }

    /// Stop every running pipeline.
    pub fn stop_all(&mut self) -> Vec<(OutputBinding, PipelineId)> {
        let bindings: Vec<OutputBinding> = self.outputs.keys().cloned().collect();
        bindings
            .into_iter()
            .filter_map(|binding| self.stop(&binding).map(|id| (binding, id)))
            .collect()
    }

    /// Apply a health report from the engine.
    ///
    /// Returns the new health if it changed. Reports for a pipeline instance
    /// that is no longer running are ignored.
    pub fn apply_health(
        &mut self,
        binding: &OutputBinding,
        id: PipelineId,
        health: PipelineHealth,
    ) -> Option<PipelineHealth> {
        let Some(entry) = self.outputs.get_mut(binding) else {
            debug!(output = %binding, "Health for unknown output, ignoring");
            return None;
        };
        if entry.running != Some(id) {
            debug!(output = %binding, pipeline = %id, "Stale health report, ignoring");
            return None;
        }
        if entry.health == health {
            return None;
        }
        match &health {
            PipelineHealth::Failed { reason } => {
                warn!(output = %binding, pipeline = %id, %reason, "Output pipeline failed")
            }
            PipelineHealth::Reconnecting { attempt } => {
                let retry_in = self.reconnect.delay_for_attempt(*attempt);
                warn!(
                    output = %binding,
                    pipeline = %id,
                    attempt,
                    retry_in_ms = retry_in.as_millis() as u64,
                    "Output pipeline reconnecting"
                )
            }
            other => info!(output = %binding, pipeline = %id, health = %other.message(), "Output health changed"),
        }
        entry.health = health.clone();
        Some(health)
    }

    /// Apply a statistics report from the engine.
    pub fn record_stats(&mut self, binding: &OutputBinding, id: PipelineId, report: StatsReport) {
        if let Some(entry) = self.outputs.get_mut(binding) {
            if entry.running == Some(id) {
                entry.stats.record(report);
            }
        }
    }

    /// Running pipeline of an output.
    pub fn pipeline(&self, binding: &OutputBinding) -> Option<PipelineId> {
        self.outputs.get(binding).and_then(|entry| entry.running)
    }

    /// Health of an output.
    pub fn health(&self, binding: &OutputBinding) -> Option<&PipelineHealth> {
        self.outputs.get(binding).map(|entry| &entry.health)
    }

    /// Status of every output, program outputs first.
    pub fn statuses(&self, now: Instant) -> Vec<OutputStatus> {
        self.outputs
            .iter()
            .map(|(binding, entry)| OutputStatus {
                binding: binding.clone(),
                pipeline: entry.running,
                health: entry.health.clone(),
                publish_url: entry.config.publish_url.clone(),
                stats: entry.stats.snapshot(now),
            })
            .collect()
    }

    /// Number of running pipelines.
    pub fn running_count(&self) -> usize {
        self.outputs.values().filter(|e| e.running.is_some()).count()
    }
}
