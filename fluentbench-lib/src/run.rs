//! A complete load run: probe, paced windows, final report.

use std::sync::Arc;

use rama::{error::BoxError, telemetry::tracing};

use crate::{
    aggregate::{RunReport, RunSummary},
    clock::{Clock, TokioClock},
    config::RunConfig,
    dispatch::WindowDispatcher,
    probe::probe,
    record::RecordGenerator,
    report::Reporter,
    sink::Sink,
};

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Connectivity probe failed; no window was dispatched.
    ProbeFailed,
    Completed(RunReport),
}

pub struct LoadRun<S, G, C = TokioClock> {
    cfg: RunConfig,
    tag: Arc<str>,
    dispatcher: WindowDispatcher<S, G, C>,
}

impl<S, G> LoadRun<S, G> {
    pub fn try_new(cfg: RunConfig, sink: Arc<S>, generator: G) -> Result<Self, BoxError> {
        cfg.validate()?;

        let tag = Arc::from(cfg.wire_tag());
        let dispatcher =
            WindowDispatcher::new(sink, generator).with_max_concurrency(cfg.max_concurrency);

        Ok(Self {
            cfg,
            tag,
            dispatcher,
        })
    }
}

impl<S, G, C> LoadRun<S, G, C> {
    pub fn with_clock<T>(self, clock: T) -> LoadRun<S, G, T> {
        LoadRun {
            cfg: self.cfg,
            tag: self.tag,
            dispatcher: self.dispatcher.with_clock(clock),
        }
    }

    pub fn config(&self) -> &RunConfig {
        &self.cfg
    }
}

impl<S, G, C> LoadRun<S, G, C>
where
    S: Sink,
    G: RecordGenerator,
    C: Clock,
{
    pub async fn execute<R>(&self, reporter: &mut R) -> RunOutcome
    where
        R: Reporter + ?Sized,
    {
        let cfg = &self.cfg;
        reporter.on_start(cfg);

        tracing::debug!(host = %cfg.host, port = cfg.port, "load run: probing");
        let ok = probe(self.dispatcher.sink().as_ref()).await;
        reporter.on_probe(cfg, ok);
        if !ok {
            return RunOutcome::ProbeFailed;
        }

        tracing::debug!(
            windows = cfg.duration_secs,
            rate = cfg.rate,
            pool_size = cfg.pool_size(),
            tag = %self.tag,
            "load run: dispatching"
        );
        let mut summary = RunSummary::new(self.dispatcher.clock().now());
        for window in 0..cfg.duration_secs {
            let result = self
                .dispatcher
                .run_window(window, cfg.rate, cfg.record_size, &self.tag)
                .await;
            summary.accumulate(&result);
            reporter.on_window(cfg, &result);
        }

        tracing::debug!(attempted = summary.attempted(), "load run: reporting");
        let report = summary.finalize(cfg.total_records(), self.dispatcher.clock().now());
        reporter.finish(cfg, &report);

        RunOutcome::Completed(report)
    }
}
