//! Fan-out of one pacing window.
//!
//! Each window dispatches exactly `rate` sends, bounded to `pool_size`
//! in flight, waits for every one of them and then sleeps out the rest
//! of the window. Windows never overlap and late windows are not
//! compensated for.

use std::{sync::Arc, time::Duration};

use rama::telemetry::tracing;
use tokio::{sync::Semaphore, task::JoinSet};

use crate::{
    clock::{Clock, TokioClock},
    config::{self, DEFAULT_MAX_CONCURRENCY, WINDOW_LENGTH},
    record::RecordGenerator,
    sink::Sink,
};

/// Outcome of one window.
///
/// `attempted == succeeded + failed` and `attempted` equals the rate
/// the window was dispatched with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowResult {
    /// Zero-based window index.
    pub index: u64,
    pub attempted: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// Time spent dispatching, excluding the pacing sleep.
    pub elapsed: Duration,
    /// Sleep applied to fill up the window.
    pub pacing: Duration,
    /// Dispatch took the whole window (or longer).
    pub late: bool,
}

pub struct WindowDispatcher<S, G, C = TokioClock> {
    sink: Arc<S>,
    generator: G,
    clock: C,
    max_concurrency: usize,
}

impl<S, G> WindowDispatcher<S, G> {
    pub fn new(sink: Arc<S>, generator: G) -> Self {
        Self {
            sink,
            generator,
            clock: TokioClock::new(),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }
}

impl<S, G, C> WindowDispatcher<S, G, C> {
    pub fn with_clock<T>(self, clock: T) -> WindowDispatcher<S, G, T> {
        WindowDispatcher {
            sink: self.sink,
            generator: self.generator,
            clock,
            max_concurrency: self.max_concurrency,
        }
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    /// Amount of sends allowed in flight for a window of the given rate.
    pub fn pool_size(&self, rate: u32) -> usize {
        config::pool_size(rate, self.max_concurrency)
    }

    pub fn sink(&self) -> &Arc<S> {
        &self.sink
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }
}

impl<S, G, C> WindowDispatcher<S, G, C>
where
    S: Sink,
    G: RecordGenerator,
    C: Clock,
{
    pub async fn run_window(
        &self,
        window_index: u64,
        rate: u32,
        record_size: usize,
        tag: &Arc<str>,
    ) -> WindowResult {
        let t0 = self.clock.now();

        let pool_size = self.pool_size(rate);
        let permits = Arc::new(Semaphore::new(pool_size));
        let mut tasks = JoinSet::new();

        let first_index = window_index.saturating_mul(rate as u64);
        for i in 0..rate as u64 {
            let index = first_index + i + 1;

            // generation stays on the pacing loop, only the send is concurrent
            let record = self.generator.generate(index, record_size);
            if index == 1
                && let Ok(record) = &record
            {
                match record.encoded_len() {
                    Ok(len) => tracing::info!(
                        target_size = record_size,
                        "first record serializes to {len} bytes"
                    ),
                    Err(err) => tracing::debug!("failed to measure first record: {err}"),
                }
            }

            let sink = self.sink.clone();
            let permits = permits.clone();
            let tag = tag.clone();

            tasks.spawn(async move {
                let record = match record {
                    Ok(record) => record,
                    Err(err) => {
                        tracing::warn!(index, "record generation failed: {err}");
                        return false;
                    }
                };

                let Ok(_permit) = permits.acquire_owned().await else {
                    tracing::debug!(index, "send pool closed before dispatch");
                    return false;
                };
                sink.send(&tag, &record).await
            });
        }

        let mut succeeded = 0u64;
        let mut failed = 0u64;
        while let Some(result) = tasks.join_next().await {
            match result {
                Ok(true) => succeeded += 1,
                Ok(false) => failed += 1,
                Err(err) => {
                    tracing::error!(window = window_index, "send task did not complete: {err}");
                    failed += 1;
                }
            }
        }

        let elapsed = self.clock.now().saturating_duration_since(t0);
        let (pacing, late) = match WINDOW_LENGTH.checked_sub(elapsed) {
            Some(remaining) if !remaining.is_zero() => (remaining, false),
            _ => (Duration::ZERO, true),
        };

        if late {
            tracing::warn!(
                window = window_index,
                ?elapsed,
                "window dispatch overran its budget; run falls behind schedule"
            );
        } else {
            tracing::trace!(window = window_index, ?pacing, "pace window");
            self.clock.sleep(pacing).await;
        }

        WindowResult {
            index: window_index,
            attempted: rate as u64,
            succeeded,
            failed,
            elapsed,
            pacing,
            late,
        }
    }
}
