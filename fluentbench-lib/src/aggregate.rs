use std::time::Duration;

use rama::telemetry::tracing;
use serde::Serialize;
use tokio::time::Instant;

use crate::dispatch::WindowResult;

/// Running totals of a load run, updated once per window.
#[derive(Debug, Clone)]
pub struct RunSummary {
    started: Instant,
    attempted: u64,
    succeeded: u64,
    failed: u64,
    windows: u64,
    late_windows: u64,
}

/// Final figures of a completed run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RunReport {
    pub attempted: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// `succeeded / attempted * 100`, where attempted is the configured total.
    pub success_pct: f64,
    #[serde(serialize_with = "serialize_secs")]
    pub elapsed: Duration,
    pub windows: u64,
    pub late_windows: u64,
}

impl RunSummary {
    pub fn new(started: Instant) -> Self {
        Self {
            started,
            attempted: 0,
            succeeded: 0,
            failed: 0,
            windows: 0,
            late_windows: 0,
        }
    }

    pub fn accumulate(&mut self, window: &WindowResult) {
        self.attempted += window.attempted;
        self.succeeded += window.succeeded;
        self.failed += window.failed;
        self.windows += 1;
        if window.late {
            self.late_windows += 1;
        }
    }

    pub fn attempted(&self) -> u64 {
        self.attempted
    }

    /// Close the run at `now`.
    ///
    /// `expected` is the amount of records the configuration asked for.
    pub fn finalize(&self, expected: u64, now: Instant) -> RunReport {
        if expected != self.attempted {
            tracing::warn!(
                expected,
                attempted = self.attempted,
                "attempted records differ from the configured total"
            );
        }

        let success_pct = if expected == 0 {
            0.
        } else {
            self.succeeded as f64 / expected as f64 * 100.
        };

        RunReport {
            attempted: expected,
            succeeded: self.succeeded,
            failed: self.failed,
            success_pct,
            elapsed: now.saturating_duration_since(self.started),
            windows: self.windows,
            late_windows: self.late_windows,
        }
    }
}

fn serialize_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}
