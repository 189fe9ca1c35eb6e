use std::io::{self, Write};

use rama::telemetry::tracing;

use fluentbench_lib::{aggregate::RunReport, config::RunConfig, dispatch::WindowResult};

use super::Reporter;

/// One JSON object per line, for machine consumption.
pub struct JsonlReporter<W = io::Stdout> {
    out: W,
}

impl JsonlReporter {
    pub fn new() -> Self {
        Self::with_writer(io::stdout())
    }
}

impl<W: Write + Send> JsonlReporter<W> {
    pub fn with_writer(out: W) -> Self {
        Self { out }
    }

    fn emit(&mut self, line: serde_json::Value) {
        if let Err(err) = writeln!(self.out, "{line}").and_then(|_| self.out.flush()) {
            tracing::debug!("jsonl reporter: write failed: {err}");
        }
    }
}

impl<W: Write + Send> Reporter for JsonlReporter<W> {
    fn on_start(&mut self, cfg: &RunConfig) {
        self.emit(serde_json::json!({
            "type": "start",
            "host": cfg.host,
            "port": cfg.port,
            "tag": cfg.wire_tag(),
            "duration_secs": cfg.duration_secs,
            "rate": cfg.rate,
            "record_size": cfg.record_size,
            "timeout_ms": cfg.send_timeout.as_millis() as u64,
            "pool_size": cfg.pool_size(),
            "require_ack": cfg.require_ack,
        }));
    }

    fn on_probe(&mut self, _cfg: &RunConfig, ok: bool) {
        self.emit(serde_json::json!({
            "type": "probe",
            "ok": ok,
        }));
    }

    fn on_window(&mut self, _cfg: &RunConfig, window: &WindowResult) {
        self.emit(serde_json::json!({
            "type": "window",
            "index": window.index,
            "attempted": window.attempted,
            "succeeded": window.succeeded,
            "failed": window.failed,
            "elapsed_ms": window.elapsed.as_millis() as u64,
            "pacing_ms": window.pacing.as_millis() as u64,
            "late": window.late,
        }));
    }

    fn finish(&mut self, _cfg: &RunConfig, report: &RunReport) {
        self.emit(serde_json::json!({
            "type": "final",
            "total": report,
        }));
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::Value;
    use rama::telemetry::tracing;
    use tracing_test::traced_test;

    use super::*;
    use crate::cmd::run::reporter::test_writer::BrokenWriter;

    fn lines(reporter: JsonlReporter<Vec<u8>>) -> Vec<Value> {
        String::from_utf8(reporter.out)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn test_jsonl_run_output() {
        let cfg = RunConfig {
            duration_secs: 1,
            rate: 5,
            ..Default::default()
        };
        let mut reporter = JsonlReporter::with_writer(Vec::new());

        reporter.on_start(&cfg);
        reporter.on_probe(&cfg, true);
        reporter.on_window(
            &cfg,
            &WindowResult {
                index: 0,
                attempted: 5,
                succeeded: 4,
                failed: 1,
                elapsed: Duration::from_millis(120),
                pacing: Duration::from_millis(880),
                late: false,
            },
        );
        reporter.finish(
            &cfg,
            &RunReport {
                attempted: 5,
                succeeded: 4,
                failed: 1,
                success_pct: 80.,
                elapsed: Duration::from_millis(1000),
                windows: 1,
                late_windows: 0,
            },
        );

        let lines = lines(reporter);
        assert_eq!(4, lines.len());

        assert_eq!("start", lines[0]["type"]);
        assert_eq!("INFO.ops-test.dev.unspecified", lines[0]["tag"]);
        assert_eq!(5, lines[0]["pool_size"]);

        assert_eq!("probe", lines[1]["type"]);
        assert_eq!(true, lines[1]["ok"]);

        assert_eq!("window", lines[2]["type"]);
        assert_eq!(4, lines[2]["succeeded"]);
        assert_eq!(120, lines[2]["elapsed_ms"]);
        assert_eq!(false, lines[2]["late"]);

        assert_eq!("final", lines[3]["type"]);
        assert_eq!(5, lines[3]["total"]["attempted"]);
        assert_eq!(80., lines[3]["total"]["success_pct"]);
        assert_eq!(1., lines[3]["total"]["elapsed"]);
    }

    #[test]
    #[traced_test]
    fn test_jsonl_write_failure_is_logged() {
        let mut reporter = JsonlReporter::with_writer(BrokenWriter);
        reporter.on_probe(&RunConfig::default(), false);

        assert!(logs_contain("jsonl reporter: write failed"));
    }
}
