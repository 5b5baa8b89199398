//! Stage observation hooks.
//!
//! The runner reports every timed call as a [`StageEvent`] and the per-key
//! aggregates as [`StageSummary`] values once it stops. Observers decide what
//! to do with them; [`TracingObserver`] logs, [`StageRecorder`] keeps them.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::info;

use crate::metrics::LatencyStats;

/// One timed call.
#[derive(Debug, Clone, PartialEq)]
pub struct StageEvent {
    /// Full stage name, including any `#<iteration>` suffix.
    pub stage: String,
    /// Aggregation key: `stage` up to the first `#`.
    pub key: String,
    /// 1-based iteration the call belongs to, 0 for setup stages.
    pub iteration: usize,
    pub duration: Duration,
}

/// Aggregate of all events sharing a key.
#[derive(Debug, Clone, PartialEq)]
pub struct StageSummary {
    pub key: String,
    /// Arithmetic mean of the recorded durations.
    pub mean: Duration,
    pub count: usize,
    pub stats: LatencyStats,
}

impl StageSummary {
    pub fn mean_ms(&self) -> f64 {
        self.mean.as_secs_f64() * 1000.0
    }
}

/// Receives stage timings from the runner.
pub trait StageObserver {
    fn on_stage(&mut self, event: &StageEvent);

    fn on_summary(&mut self, _summaries: &[StageSummary]) {}
}

/// Logs stages through `tracing` at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl StageObserver for TracingObserver {
    fn on_stage(&mut self, event: &StageEvent) {
        info!(
            "Stage: {}, duration: {:.3}ms",
            event.stage,
            event.duration.as_secs_f64() * 1000.0
        );
    }

    fn on_summary(&mut self, summaries: &[StageSummary]) {
        for s in summaries {
            info!("Stage average: {}, duration: {:.3}ms", s.key, s.mean_ms());
        }
    }
}

#[derive(Debug, Default)]
struct Recorded {
    events: Vec<StageEvent>,
    summaries: Vec<StageSummary>,
}

/// Keeps events in memory. Clones share the same buffer, so a clone can be
/// handed to the runner and the first one inspected afterwards.
#[derive(Debug, Default, Clone)]
pub struct StageRecorder {
    inner: Arc<Mutex<Recorded>>,
}

impl StageRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<StageEvent> {
        self.inner
            .lock()
            .map(|r| r.events.clone())
            .unwrap_or_default()
    }

    pub fn summaries(&self) -> Vec<StageSummary> {
        self.inner
            .lock()
            .map(|r| r.summaries.clone())
            .unwrap_or_default()
    }
}

impl StageObserver for StageRecorder {
    fn on_stage(&mut self, event: &StageEvent) {
        if let Ok(mut r) = self.inner.lock() {
            r.events.push(event.clone());
        }
    }

    fn on_summary(&mut self, summaries: &[StageSummary]) {
        if let Ok(mut r) = self.inner.lock() {
            r.summaries = summaries.to_vec();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recorder_clones_share_buffer() {
        let recorder = StageRecorder::new();
        let mut handle = recorder.clone();
        handle.on_stage(&StageEvent {
            stage: "train".into(),
            key: "train".into(),
            iteration: 1,
            duration: Duration::from_millis(3),
        });
        handle.on_summary(&[StageSummary {
            key: "train".into(),
            mean: Duration::from_millis(3),
            count: 1,
            stats: LatencyStats::default(),
        }]);
        assert_eq!(recorder.events().len(), 1);
        assert!((recorder.summaries()[0].mean_ms() - 3.0).abs() < 1e-9);
    }
}
