//! Network-facing side of a send: one attempt, one boolean.

use std::time::Duration;

use rama::telemetry::tracing;
use serde::Serialize;

use crate::{
    config::{DEFAULT_SEND_TIMEOUT, RunConfig},
    forward::ForwardClient,
};

/// Performs exactly one delivery attempt per call.
///
/// Implementations never fail past this boundary:
/// every fault (refused, timed out, broken connection, ...) is `false`.
pub trait Sink: Send + Sync + 'static {
    fn send<R>(&self, tag: &str, record: &R) -> impl Future<Output = bool> + Send
    where
        R: Serialize + Sync + ?Sized;
}

/// [`Sink`] emitting to a Fluentd forward endpoint,
/// over a fresh connection per send.
#[derive(Debug, Clone)]
pub struct ForwardSink {
    host: String,
    port: u16,
    timeout: Duration,
    require_ack: bool,
}

impl ForwardSink {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            timeout: DEFAULT_SEND_TIMEOUT,
            require_ack: false,
        }
    }

    pub fn from_config(cfg: &RunConfig) -> Self {
        Self::new(cfg.host.clone(), cfg.port)
            .with_timeout(cfg.send_timeout)
            .with_ack(cfg.require_ack)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_ack(mut self, require_ack: bool) -> Self {
        self.require_ack = require_ack;
        self
    }
}

impl Sink for ForwardSink {
    async fn send<R>(&self, tag: &str, record: &R) -> bool
    where
        R: Serialize + Sync + ?Sized,
    {
        let mut client = match ForwardClient::connect(&self.host, self.port, self.timeout).await {
            Ok(client) => client.with_ack(self.require_ack),
            Err(err) => {
                tracing::debug!(
                    host = %self.host,
                    port = self.port,
                    "forward sink: connect failed: {err}"
                );
                return false;
            }
        };

        let result = client.emit(tag, record).await;
        client.close().await;

        match result {
            Ok(()) => true,
            Err(err) => {
                tracing::debug!(
                    host = %self.host,
                    port = self.port,
                    %tag,
                    "forward sink: emit failed: {err}"
                );
                false
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_sink {
    use std::sync::{
        Mutex,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    };

    use super::*;

    type Outcome = Box<dyn Fn(u64) -> bool + Send + Sync + 'static>;

    /// Sink whose outcome is a function of the (1-based) call number.
    pub(crate) struct ScriptedSink {
        outcome: Outcome,
        delay: Duration,
        calls: AtomicU64,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        tags: Mutex<Vec<String>>,
    }

    impl ScriptedSink {
        pub(crate) fn new(outcome: impl Fn(u64) -> bool + Send + Sync + 'static) -> Self {
            Self {
                outcome: Box::new(outcome),
                delay: Duration::ZERO,
                calls: AtomicU64::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                tags: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn always(ok: bool) -> Self {
            Self::new(move |_| ok)
        }

        /// Hold every send for `delay` (tokio time).
        pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        pub(crate) fn calls(&self) -> u64 {
            self.calls.load(Ordering::SeqCst)
        }

        pub(crate) fn max_in_flight(&self) -> usize {
            self.max_in_flight.load(Ordering::SeqCst)
        }

        pub(crate) fn tags(&self) -> Vec<String> {
            self.tags.lock().unwrap().clone()
        }
    }

    impl Sink for ScriptedSink {
        async fn send<R>(&self, tag: &str, _record: &R) -> bool
        where
            R: Serialize + Sync + ?Sized,
        {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            self.tags.lock().unwrap().push(tag.to_owned());

            let in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(in_flight, Ordering::SeqCst);

            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            (self.outcome)(call)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rama::telemetry::tracing;
    use tokio::net::TcpListener;
    use tracing_test::traced_test;

    use super::*;
    use crate::{
        collector::{CollectorConfig, CollectorStats, ForwardCollector},
        record::{RandomRecordGenerator, RecordGenerator as _},
    };

    const TAG: &str = "INFO.ops-test.dev.unspecified";

    async fn spawn_collector(cfg: CollectorConfig) -> (u16, Arc<CollectorStats>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let collector = ForwardCollector::try_new(cfg).unwrap();
        let stats = collector.stats();
        tokio::spawn(collector.serve(listener, std::future::pending::<()>()));

        (port, stats)
    }

    async fn wait_for_records(stats: &CollectorStats, expected: u64) {
        for _ in 0..200 {
            if stats.snapshot().records >= expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "collector did not receive {expected} records: {:?}",
            stats.snapshot()
        );
    }

    fn record() -> crate::record::LogRecord {
        RandomRecordGenerator::with_host("test")
            .generate(1, 848)
            .unwrap()
    }

    #[tokio::test]
    async fn test_forward_sink_delivers_without_ack() {
        let (port, stats) = spawn_collector(CollectorConfig::default()).await;

        let sink = ForwardSink::new("127.0.0.1", port);
        for _ in 0..3 {
            assert!(sink.send(TAG, &record()).await);
        }

        wait_for_records(&stats, 3).await;
        let snapshot = stats.snapshot();
        assert_eq!(3, snapshot.messages);
        assert_eq!(3, snapshot.connections);
    }

    #[tokio::test]
    async fn test_forward_sink_delivers_with_ack() {
        let (port, stats) = spawn_collector(CollectorConfig::default()).await;

        let sink = ForwardSink::new("127.0.0.1", port).with_ack(true);
        assert!(sink.send(TAG, &record()).await);

        // the ack is only written once the record is counted
        assert_eq!(1, stats.snapshot().records);
    }

    #[tokio::test]
    async fn test_forward_sink_dropped_connection() {
        let (port, stats) = spawn_collector(CollectorConfig {
            drop_rate: 1.0,
            ..Default::default()
        })
        .await;

        // acked delivery notices the drop
        let acked = ForwardSink::new("127.0.0.1", port).with_ack(true);
        assert!(!acked.send(TAG, &record()).await);

        // without ack a written frame counts as accepted
        let buffered = ForwardSink::new("127.0.0.1", port);
        assert!(buffered.send(TAG, &record()).await);

        assert_eq!(0, stats.snapshot().records);
    }

    #[tokio::test]
    async fn test_forward_sink_stalled_ack_times_out() {
        let (port, stats) = spawn_collector(CollectorConfig {
            stall_rate: 1.0,
            ..Default::default()
        })
        .await;

        let sink = ForwardSink::new("127.0.0.1", port)
            .with_ack(true)
            .with_timeout(Duration::from_millis(200));

        let start = tokio::time::Instant::now();
        assert!(!sink.send(TAG, &record()).await);
        assert!(start.elapsed() >= Duration::from_millis(200));
        assert!(start.elapsed() < Duration::from_secs(3));
        assert_eq!(1, stats.snapshot().stalled);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_forward_sink_connection_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let sink = ForwardSink::new("127.0.0.1", port).with_timeout(Duration::from_millis(500));
        assert!(!sink.send(TAG, &record()).await);

        tracing::debug!("connection refused test done");
        assert!(logs_contain("forward sink: connect failed"));
    }
}
