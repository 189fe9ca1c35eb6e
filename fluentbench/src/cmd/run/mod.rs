use std::{fmt, sync::Arc, time::Duration};

use rama::{error::BoxError, graceful::ShutdownGuard, telemetry::tracing};

use clap::Args;
use fluentbench_lib::{
    config::{self, RunConfig},
    record::RandomRecordGenerator,
    run::{LoadRun, RunOutcome},
    sink::ForwardSink,
};

pub mod reporter;

use self::reporter::*;

#[derive(Debug, Clone, Args)]
/// send synthetic log records to a Fluentd forward endpoint at a fixed rate
pub struct RunCommand {
    /// duration of the run, one pacing window per second
    #[arg(value_name = "DURATION_SECONDS", required = true)]
    duration: u64,

    /// records sent per second
    #[arg(long, default_value_t = config::DEFAULT_RATE)]
    rate: u32,

    /// approximate serialized size of each record, in bytes
    #[arg(long, value_name = "BYTES", default_value_t = config::DEFAULT_RECORD_SIZE)]
    size: usize,

    /// Fluentd host
    #[arg(long, default_value = config::DEFAULT_HOST)]
    host: String,

    /// Fluentd forward port
    #[arg(long, default_value_t = config::DEFAULT_PORT)]
    port: u16,

    /// tag prefix, sent as `INFO.<TAG>.dev.unspecified`
    #[arg(long, default_value = config::DEFAULT_TAG_PREFIX)]
    tag: String,

    /// timeout applied to each send (connect and emit), in seconds
    #[arg(long, value_name = "SECONDS", default_value_t = config::DEFAULT_SEND_TIMEOUT.as_secs_f64())]
    timeout: f64,

    /// upper bound of sends in flight within one window
    #[arg(long, default_value_t = config::DEFAULT_MAX_CONCURRENCY)]
    max_concurrency: usize,

    /// only count a record as delivered once Fluentd acknowledged it
    #[arg(long, default_value_t = false)]
    require_ack: bool,

    /// report json instead of a human-friendly format
    #[arg(long, default_value_t = false)]
    json: bool,
}

impl RunCommand {
    fn try_into_config(self) -> Result<RunConfig, BoxError> {
        if !self.timeout.is_finite() || self.timeout <= 0. {
            return Err(BoxError::from("timeout must be a positive amount of seconds"));
        }

        Ok(RunConfig {
            duration_secs: self.duration,
            rate: self.rate,
            record_size: self.size,
            host: self.host,
            port: self.port,
            tag_prefix: self.tag,
            send_timeout: Duration::from_secs_f64(self.timeout),
            max_concurrency: self.max_concurrency,
            require_ack: self.require_ack,
        })
    }
}

pub async fn exec(_guard: ShutdownGuard, args: RunCommand) -> Result<(), BoxError> {
    let json = args.json;
    let cfg = args.try_into_config()?;

    tracing::info!(
        duration_secs = cfg.duration_secs,
        rate = cfg.rate,
        record_size = cfg.record_size,
        host = %cfg.host,
        port = cfg.port,
        tag = %cfg.wire_tag(),
        timeout = ?cfg.send_timeout,
        pool_size = cfg.pool_size(),
        require_ack = cfg.require_ack,
        "run config parameters ready",
    );

    let sink = Arc::new(ForwardSink::from_config(&cfg));
    let run = LoadRun::try_new(cfg, sink, RandomRecordGenerator::new())?;

    let mut reporter: Box<dyn Reporter> = if json {
        Box::new(JsonlReporter::new())
    } else {
        Box::new(HumanReporter::new())
    };

    // a started run is never cut short: windows are not cancellable
    match run.execute(&mut reporter).await {
        RunOutcome::Completed(report) => {
            tracing::debug!(?report, "load run complete");
            Ok(())
        }
        RunOutcome::ProbeFailed => Err(ConnectionTestFailed {
            host: run.config().host.clone(),
            port: run.config().port,
        }
        .into()),
    }
}

/// The initial connection test failed and no window was dispatched.
///
/// The reporter already told the user, so the process only has to
/// exit with a failure status.
#[derive(Debug)]
pub struct ConnectionTestFailed {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for ConnectionTestFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "initial connection test to {}:{} failed",
            self.host, self.port
        )
    }
}

impl std::error::Error for ConnectionTestFailed {}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Debug, Parser)]
    struct Cli {
        #[command(flatten)]
        run: RunCommand,
    }

    fn parse(args: &[&str]) -> Result<RunConfig, BoxError> {
        let cli = Cli::try_parse_from(std::iter::once("fluentbench").chain(args.iter().copied()))?;
        cli.run.try_into_config()
    }

    #[test]
    fn test_defaults() {
        let cfg = parse(&["30"]).unwrap();
        assert_eq!(
            RunConfig {
                duration_secs: 30,
                ..Default::default()
            },
            cfg
        );
        assert_eq!("INFO.ops-test.dev.unspecified", cfg.wire_tag());
    }

    #[test]
    fn test_all_options() {
        let cfg = parse(&[
            "5",
            "--rate",
            "800",
            "--size",
            "2048",
            "--host",
            "fluentd.internal",
            "--port",
            "24225",
            "--tag",
            "billing",
            "--timeout",
            "1.5",
            "--max-concurrency",
            "64",
            "--require-ack",
        ])
        .unwrap();

        assert_eq!(5, cfg.duration_secs);
        assert_eq!(800, cfg.rate);
        assert_eq!(2048, cfg.record_size);
        assert_eq!("fluentd.internal", cfg.host);
        assert_eq!(24225, cfg.port);
        assert_eq!("INFO.billing.dev.unspecified", cfg.wire_tag());
        assert_eq!(Duration::from_millis(1500), cfg.send_timeout);
        assert_eq!(64, cfg.pool_size());
        assert!(cfg.require_ack);
    }

    #[test]
    fn test_invalid_arguments() {
        assert!(parse(&[]).is_err());
        assert!(parse(&["ten"]).is_err());
        assert!(parse(&["10", "--timeout", "0"]).is_err());
        assert!(parse(&["10", "--timeout", "-1"]).is_err());
    }
}
