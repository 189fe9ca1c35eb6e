use std::{net::SocketAddr, time::Duration};

use rama::{
    error::{BoxError, ErrorContext as _},
    graceful::ShutdownGuard,
    telemetry::tracing,
};

use clap::Args;
use fluentbench_lib::{
    collector::{CollectorConfig, CollectorSnapshot, ForwardCollector},
    utils,
};
use tokio::net::TcpListener;

const STATS_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Args)]
/// run a local Fluentd forward collector to benchmark against
pub struct MockCommand {
    /// socket address to bind to
    #[arg(long, short = 'b', value_name = "ADDRESS", default_value = "127.0.0.1:24224")]
    pub bind: SocketAddr,

    /// delay applied before a record is accepted
    #[arg(long, value_name = "SECONDS", default_value_t = 0.)]
    latency: f64,

    /// chance (0..=1) that a frame makes the collector drop the connection
    #[arg(long, default_value_t = 0.)]
    drop_rate: f32,

    /// chance (0..=1) that a frame is swallowed without ever being acked
    #[arg(long, default_value_t = 0.)]
    stall_rate: f32,
}

pub async fn exec(guard: ShutdownGuard, args: MockCommand) -> Result<(), BoxError> {
    if !args.latency.is_finite() || args.latency < 0. {
        return Err(BoxError::from("latency must be a non-negative amount of seconds"));
    }

    let collector = ForwardCollector::try_new(CollectorConfig {
        latency: Duration::from_secs_f64(args.latency),
        drop_rate: args.drop_rate,
        stall_rate: args.stall_rate,
    })?;

    let listener = TcpListener::bind(args.bind)
        .await
        .context("bind mock forward collector")?;
    let addr = listener
        .local_addr()
        .context("get bound address for mock forward collector")?;

    tracing::info!(
        %addr,
        latency = args.latency,
        drop_rate = args.drop_rate,
        stall_rate = args.stall_rate,
        "{} mock collector ready",
        utils::env::project_name(),
    );

    let stats = collector.stats();
    guard.spawn_task_fn(async move |guard| {
        let mut previous = CollectorSnapshot::default();
        let mut interval = tokio::time::interval(STATS_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = guard.cancelled() => return,
                _ = interval.tick() => (),
            }

            let current = stats.snapshot();
            if current == previous {
                continue;
            }
            tracing::info!(
                records = current.records - previous.records,
                total_records = current.records,
                connections = current.connections,
                messages = current.messages,
                bytes = current.bytes,
                dropped = current.dropped,
                stalled = current.stalled,
                "mock collector stats",
            );
            previous = current;
        }
    });

    collector
        .serve(listener, guard.clone_weak().into_cancelled())
        .await;

    Ok(())
}
