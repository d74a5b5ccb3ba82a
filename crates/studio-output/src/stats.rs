//! Per-pipeline publish statistics.

use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Cumulative counters reported by the engine for one pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsReport {
    pub frames_encoded: u64,
    pub frames_dropped: u64,
    pub bytes_sent: u64,
}

/// Snapshot of pipeline statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputStats {
    /// Frames encoded since the pipeline started.
    pub frames_encoded: u64,

    /// Frames dropped since the pipeline started.
    pub frames_dropped: u64,

    /// Bytes published since the pipeline started.
    pub bytes_sent: u64,

    /// Average bitrate since start in kbps.
    pub bitrate_kbps: u32,

    /// Target video + audio bitrate in kbps.
    pub target_bitrate_kbps: u32,

    /// Share of frames dropped since the pipeline started.
    pub drop_ratio: f32,

    /// Pipeline uptime in seconds.
    pub uptime_seconds: u64,
}

/// Collects statistics for one pipeline.
#[derive(Debug, Clone)]
pub struct StatsCollector {
    start_time: Option<Instant>,
    last: StatsReport,
    target_bitrate_kbps: u32,
}

impl StatsCollector {
    /// Create a new collector.
    pub fn new(target_bitrate_kbps: u32) -> Self {
        Self {
            start_time: None,
            last: StatsReport::default(),
            target_bitrate_kbps,
        }
    }

    /// Start collection, resetting counters.
    pub fn start(&mut self, now: Instant) {
        self.start_time = Some(now);
        self.last = StatsReport::default();
    }

    /// Stop collection.
    pub fn stop(&mut self) {
        self.start_time = None;
    }

    /// Record the latest cumulative report. Counters never go backwards.
    pub fn record(&mut self, report: StatsReport) {
        self.last = StatsReport {
            frames_encoded: report.frames_encoded.max(self.last.frames_encoded),
            frames_dropped: report.frames_dropped.max(self.last.frames_dropped),
            bytes_sent: report.bytes_sent.max(self.last.bytes_sent),
        };
    }

    /// Ratio of dropped frames to all frames, 0.0 when nothing was produced.
    fn drop_ratio(&self) -> f32 {
        let total = self
            .last
            .frames_encoded
            .saturating_add(self.last.frames_dropped);
        if total == 0 {
            0.0
        } else {
            self.last.frames_dropped as f32 / total as f32
        }
    }

    /// Get current statistics snapshot.
    pub fn snapshot(&self, now: Instant) -> OutputStats {
        let elapsed = self
            .start_time
            .map(|start| now.saturating_duration_since(start))
            .unwrap_or_default();

        let bitrate_kbps = if elapsed.as_secs_f32() > 0.0 {
            (self.last.bytes_sent.saturating_mul(8) as f32 / elapsed.as_secs_f32() / 1000.0) as u32
        } else {
            0
        };

        OutputStats {
            frames_encoded: self.last.frames_encoded,
            frames_dropped: self.last.frames_dropped,
            bytes_sent: self.last.bytes_sent,
            bitrate_kbps,
            target_bitrate_kbps: self.target_bitrate_kbps,
            drop_ratio: self.drop_ratio(),
            uptime_seconds: elapsed.as_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_snapshot_bitrate() {
        let start = Instant::now();
        let mut stats = StatsCollector::new(1064);
        stats.start(start);
        stats.record(StatsReport {
            frames_encoded: 50,
            frames_dropped: 0,
            bytes_sent: 250_000,
        });

        let snapshot = stats.snapshot(start + Duration::from_secs(2));
        assert_eq!(snapshot.bitrate_kbps, 1000);
        assert_eq!(snapshot.uptime_seconds, 2);
        assert_eq!(snapshot.target_bitrate_kbps, 1064);
    }

    #[test]
    fn test_counters_are_monotonic() {
        let mut stats = StatsCollector::new(0);
        stats.start(Instant::now());
        stats.record(StatsReport {
            frames_encoded: 10,
            frames_dropped: 2,
            bytes_sent: 100,
        });
        stats.record(StatsReport {
            frames_encoded: 5,
            frames_dropped: 1,
            bytes_sent: 50,
        });
        let snapshot = stats.snapshot(Instant::now());
        assert_eq!(snapshot.frames_encoded, 10);
        assert_eq!(snapshot.frames_dropped, 2);
        assert!((snapshot.drop_ratio - 2.0 / 12.0).abs() < 1e-6);
    }
}
