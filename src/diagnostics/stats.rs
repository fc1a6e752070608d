use serde::Serialize;
use std::time::Instant;

/// Collects statistics for one capture session's pipeline.
pub struct PipelineStats {
    frames_delivered: u64,
    dropped_unconfigured: u64,
    dropped_overflow: u64,
    conversion_failures: u64,
    requests_accepted: u64,
    start_time: Instant,
}

/// Snapshot of pipeline stats for serialisation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineSnapshot {
    pub fps: f64,
    pub frames_delivered: u64,
    pub dropped_unconfigured: u64,
    pub dropped_overflow: u64,
    pub conversion_failures: u64,
    pub requests_accepted: u64,
    pub drop_rate: f64,
}

impl PipelineStats {
    /// Create new stats with zeroed counters.
    pub fn new() -> Self {
        Self {
            frames_delivered: 0,
            dropped_unconfigured: 0,
            dropped_overflow: 0,
            conversion_failures: 0,
            requests_accepted: 0,
            start_time: Instant::now(),
        }
    }

    /// Record a frame delivered to the consumer.
    pub fn record_delivered(&mut self) {
        self.frames_delivered += 1;
    }

    /// Record a frame dropped because the session was unconfigured or
    /// closing.
    pub fn record_dropped_unconfigured(&mut self) {
        self.dropped_unconfigured += 1;
    }

    /// Record a frame dropped by the queue overflow policy.
    pub fn record_dropped_overflow(&mut self) {
        self.dropped_overflow += 1;
    }

    /// Record a per-frame conversion failure.
    pub fn record_conversion_failure(&mut self) {
        self.conversion_failures += 1;
    }

    /// Record an accepted capture request.
    pub fn record_request(&mut self) {
        self.requests_accepted += 1;
    }

    /// Delivered frames per second since session start.
    pub fn fps(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed < 0.001 {
            return 0.0;
        }
        self.frames_delivered as f64 / elapsed
    }

    /// Dropped frames as a percentage of all frames seen (0.0 - 100.0).
    pub fn drop_rate(&self) -> f64 {
        let dropped = self.dropped_unconfigured + self.dropped_overflow + self.conversion_failures;
        let total = self.frames_delivered + dropped;
        if total == 0 {
            return 0.0;
        }
        (dropped as f64 / total as f64) * 100.0
    }

    pub fn frames_delivered(&self) -> u64 {
        self.frames_delivered
    }

    pub fn dropped_unconfigured(&self) -> u64 {
        self.dropped_unconfigured
    }

    pub fn dropped_overflow(&self) -> u64 {
        self.dropped_overflow
    }

    pub fn conversion_failures(&self) -> u64 {
        self.conversion_failures
    }

    /// Take a serialisable snapshot.
    pub fn snapshot(&self) -> PipelineSnapshot {
        PipelineSnapshot {
            fps: self.fps(),
            frames_delivered: self.frames_delivered,
            dropped_unconfigured: self.dropped_unconfigured,
            dropped_overflow: self.dropped_overflow,
            conversion_failures: self.conversion_failures,
            requests_accepted: self.requests_accepted,
            drop_rate: self.drop_rate(),
        }
    }
}

impl Default for PipelineStats {
    fn default() -> Self {
        Self::new()
    }
}
