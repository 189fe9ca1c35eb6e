//! Minimal Fluentd `in_forward` stand-in, with failure injection.
//!
//! Used by the `mock` command and by the end-to-end tests of this crate.

use std::{
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use rama::{
    error::{BoxError, ErrorContext as _},
    telemetry::tracing,
};
use tokio::{
    io::{AsyncReadExt as _, AsyncWriteExt as _},
    net::{TcpListener, TcpStream},
};

use crate::forward::{ForwardMessage, decode_message, encode_ack};

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CollectorConfig {
    /// Delay applied before a frame is accepted (and acked).
    pub latency: Duration,
    /// Chance that a frame makes the collector drop the connection.
    pub drop_rate: f32,
    /// Chance that a frame is swallowed without ever being acked.
    pub stall_rate: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameOutcome {
    Ok,
    Drop,
    Stall,
}

/// Counters shared between all connections of a collector.
#[derive(Debug, Default)]
pub struct CollectorStats {
    connections: AtomicU64,
    messages: AtomicU64,
    records: AtomicU64,
    bytes: AtomicU64,
    dropped: AtomicU64,
    stalled: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CollectorSnapshot {
    pub connections: u64,
    pub messages: u64,
    pub records: u64,
    pub bytes: u64,
    pub dropped: u64,
    pub stalled: u64,
}

impl CollectorStats {
    pub fn snapshot(&self) -> CollectorSnapshot {
        CollectorSnapshot {
            connections: self.connections.load(Ordering::Relaxed),
            messages: self.messages.load(Ordering::Relaxed),
            records: self.records.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            stalled: self.stalled.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug)]
pub struct ForwardCollector {
    cfg: CollectorConfig,
    stats: Arc<CollectorStats>,
}

impl ForwardCollector {
    pub fn try_new(cfg: CollectorConfig) -> Result<Self, BoxError> {
        for (name, rate) in [("drop_rate", cfg.drop_rate), ("stall_rate", cfg.stall_rate)] {
            if !(0.0..=1.0).contains(&rate) {
                return Err(BoxError::from(format!(
                    "{name} must be within [0, 1], got {rate}"
                )));
            }
        }
        if cfg.drop_rate + cfg.stall_rate > 1. {
            return Err(BoxError::from("drop_rate + stall_rate must be <= 1.0"));
        }

        Ok(Self {
            cfg,
            stats: Arc::new(CollectorStats::default()),
        })
    }

    pub fn stats(&self) -> Arc<CollectorStats> {
        self.stats.clone()
    }

    /// Accept connections until `shutdown` resolves.
    ///
    /// Connections accepted before that keep being served
    /// by their own task until the peer hangs up.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F)
    where
        F: Future + Send,
    {
        let collector = Arc::new(self);
        let mut shutdown = std::pin::pin!(shutdown);

        loop {
            let (stream, peer) = tokio::select! {
                _ = &mut shutdown => {
                    tracing::debug!("collector: shutdown requested, stop accepting");
                    return;
                }
                accepted = listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(err) => {
                        tracing::debug!("collector: accept failed: {err}");
                        continue;
                    }
                },
            };

            collector.stats.connections.fetch_add(1, Ordering::Relaxed);
            tokio::spawn(collector.clone().serve_connection(stream, peer));
        }
    }

    async fn serve_connection(self: Arc<Self>, mut stream: TcpStream, peer: SocketAddr) {
        tracing::trace!(%peer, "collector: connection accepted");

        let mut buf = Vec::with_capacity(4096);
        let mut scratch = vec![0u8; 8192];

        loop {
            loop {
                match decode_message(&buf) {
                    Ok(Some((message, consumed))) => {
                        buf.drain(..consumed);
                        if let Err(err) = self.on_message(&mut stream, message, consumed).await {
                            tracing::debug!(%peer, "collector: close connection: {err}");
                            return;
                        }
                    }
                    Ok(None) => break,
                    Err(err) => {
                        tracing::debug!(%peer, "collector: invalid frame: {err}");
                        return;
                    }
                }
            }

            match stream.read(&mut scratch).await {
                Ok(0) => {
                    tracing::trace!(%peer, "collector: peer closed connection");
                    return;
                }
                Ok(n) => buf.extend_from_slice(&scratch[..n]),
                Err(err) => {
                    tracing::trace!(%peer, "collector: read failed: {err}");
                    return;
                }
            }
        }
    }

    async fn on_message(
        &self,
        stream: &mut TcpStream,
        message: ForwardMessage,
        frame_len: usize,
    ) -> Result<(), BoxError> {
        self.stats.messages.fetch_add(1, Ordering::Relaxed);
        self.stats
            .bytes
            .fetch_add(frame_len as u64, Ordering::Relaxed);

        match self.pick_outcome() {
            FrameOutcome::Drop => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                Err(BoxError::from("dropped by failure injection"))
            }
            FrameOutcome::Stall => {
                self.stats.stalled.fetch_add(1, Ordering::Relaxed);
                // swallow everything until the peer gives up
                let _ = tokio::io::copy(stream, &mut tokio::io::sink()).await;
                Err(BoxError::from("stalled by failure injection"))
            }
            FrameOutcome::Ok => {
                if !self.cfg.latency.is_zero() {
                    tokio::time::sleep(self.cfg.latency).await;
                }

                self.stats
                    .records
                    .fetch_add(message.entries.len() as u64, Ordering::Relaxed);

                if let Some(chunk) = message.chunk.as_deref() {
                    let ack = encode_ack(chunk)?;
                    stream.write_all(&ack).await.context("write forward ack")?;
                    stream.flush().await.context("flush forward ack")?;
                }
                Ok(())
            }
        }
    }

    #[inline(always)]
    fn clamp_rate(v: f32) -> f32 {
        v.clamp(0., 1.0)
    }

    fn pick_outcome(&self) -> FrameOutcome {
        let t_drop = Self::clamp_rate(self.cfg.drop_rate);
        let t_stall = t_drop + Self::clamp_rate(self.cfg.stall_rate);

        if t_stall == 0. {
            return FrameOutcome::Ok;
        }

        let r: f32 = rand::random();
        if r < t_drop {
            FrameOutcome::Drop
        } else if r < t_stall {
            FrameOutcome::Stall
        } else {
            FrameOutcome::Ok
        }
    }
}
