use std::io::{self, Write};

use rama::telemetry::tracing;

use fluentbench_lib::{aggregate::RunReport, config::RunConfig, dispatch::WindowResult};

use super::{Reporter, thousands};

/// Console progress, one line per window and a closing summary.
pub struct HumanReporter<W = io::Stdout> {
    out: W,
}

impl HumanReporter {
    pub fn new() -> Self {
        Self::with_writer(io::stdout())
    }
}

impl<W: Write + Send> HumanReporter<W> {
    pub fn with_writer(out: W) -> Self {
        Self { out }
    }

    fn emit(&mut self, text: std::fmt::Arguments<'_>) {
        // stdout going away mid-run must not abort the run
        if let Err(err) = self.out.write_fmt(text).and_then(|_| self.out.flush()) {
            tracing::debug!("human reporter: write failed: {err}");
        }
    }
}

impl<W: Write + Send> Reporter for HumanReporter<W> {
    fn on_start(&mut self, cfg: &RunConfig) {
        self.emit(format_args!(
            "Connecting to Fluentd {}:{}  tag_prefix={}\n",
            cfg.host, cfg.port, cfg.tag_prefix
        ));
    }

    fn on_probe(&mut self, cfg: &RunConfig, ok: bool) {
        if ok {
            self.emit(format_args!(
                "Sending {} logs/sec for {} seconds…\n\n",
                cfg.rate, cfg.duration_secs
            ));
        } else {
            self.emit(format_args!("Initial connection test failed - exiting.\n"));
        }
    }

    fn on_window(&mut self, cfg: &RunConfig, window: &WindowResult) {
        self.emit(format_args!(
            "  • second {:2}/{}: {} logs in {:.2}s\n",
            window.index + 1,
            cfg.duration_secs,
            window.attempted,
            window.elapsed.as_secs_f64(),
        ));
    }

    fn finish(&mut self, _cfg: &RunConfig, report: &RunReport) {
        self.emit(format_args!(
            "\n=====  Run complete  =====\n \
             attempted : {}\n \
             succeeded : {}\n \
             failed    : {}\n \
             success % : {:5.2}%\n \
             elapsed   : {:.2}s\n",
            thousands(report.attempted),
            thousands(report.succeeded),
            thousands(report.failed),
            report.success_pct,
            report.elapsed.as_secs_f64(),
        ));
        if report.late_windows > 0 {
            self.emit(format_args!(
                " late      : {} of {} windows\n",
                thousands(report.late_windows),
                thousands(report.windows),
            ));
        }
        self.emit(format_args!("\n"));
    }
}
