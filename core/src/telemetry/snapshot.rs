// ## src/telemetry/snapshot.rs

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::telemetry::counters::TelemetryCounters;
use crate::telemetry::timers::{StageTimes, TelemetryTimer};

/// Immutable end-of-batch view: counters, throughput, stage timings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    pub counters: TelemetryCounters,
    pub rows_per_sec: f64,
    pub elapsed: Duration,
    pub stage_times: StageTimes,
}

impl TelemetrySnapshot {
    pub fn from(counters: &TelemetryCounters, timer: &TelemetryTimer) -> Self {
        let elapsed = timer.elapsed();
        let rows_per_sec = if elapsed.as_secs_f64() > 0.0 {
            counters.rows_processed as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };
        Self {
            counters: counters.clone(),
            rows_per_sec,
            elapsed,
            stage_times: timer.stage_times.clone(),
        }
    }

    /// Stage times can overlap with each other but never exceed wall time per stage.
    pub fn sanity_check(&self) -> bool {
        self.stage_times.iter().all(|(_, d)| *d <= self.elapsed)
            && self.counters.chunks_finished() <= self.counters.chunks_dispatched
    }
}
