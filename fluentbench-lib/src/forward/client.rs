use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rama::{
    error::{BoxError, ErrorContext as _},
    telemetry::tracing,
};
use serde::Serialize;
use tokio::{
    io::{AsyncReadExt as _, AsyncWriteExt as _},
    net::TcpStream,
};

use super::{AckResponse, decode_ack, encode_message};

/// Acks are tiny maps; anything beyond this is not an ack.
const MAX_ACK_LEN: usize = 1024;

/// A single forward-protocol connection.
///
/// Connect and every emit are bounded by the timeout given at connect time.
/// The socket is released on [`ForwardClient::close`] or when dropped.
#[derive(Debug)]
pub struct ForwardClient {
    stream: TcpStream,
    timeout: Duration,
    require_ack: bool,
}

impl ForwardClient {
    pub async fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self, BoxError> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect((host, port)))
            .await
            .context("forward connect timed out")?
            .context("tcp connect to forward endpoint")?;

        if let Err(err) = stream.set_nodelay(true) {
            tracing::trace!("forward client: failed to set TCP_NODELAY: {err}");
        }

        Ok(Self {
            stream,
            timeout,
            require_ack: false,
        })
    }

    /// Request an ack for each emitted event.
    pub fn with_ack(mut self, require_ack: bool) -> Self {
        self.require_ack = require_ack;
        self
    }

    /// Emit one event.
    ///
    /// Without ack the event counts as accepted once written and flushed.
    pub async fn emit<R>(&mut self, tag: &str, record: &R) -> Result<(), BoxError>
    where
        R: Serialize + ?Sized,
    {
        let chunk = self
            .require_ack
            .then(|| uuid::Uuid::new_v4().simple().to_string());
        let frame = encode_message(tag, unix_time_secs(), record, chunk.as_deref())?;

        tokio::time::timeout(self.timeout, self.write_frame(&frame, chunk.as_deref()))
            .await
            .context("forward emit timed out")?
    }

    async fn write_frame(&mut self, frame: &[u8], chunk: Option<&str>) -> Result<(), BoxError> {
        self.stream
            .write_all(frame)
            .await
            .context("write forward frame")?;
        self.stream.flush().await.context("flush forward frame")?;

        let Some(chunk) = chunk else {
            return Ok(());
        };

        let AckResponse { ack } = self.read_ack().await?;
        if ack != chunk {
            return Err(BoxError::from("forward ack does not match the emitted chunk"));
        }
        Ok(())
    }

    async fn read_ack(&mut self) -> Result<AckResponse, BoxError> {
        let mut buf = Vec::with_capacity(64);
        let mut scratch = [0u8; 128];

        loop {
            let n = self
                .stream
                .read(&mut scratch)
                .await
                .context("read forward ack")?;
            if n == 0 {
                return Err(BoxError::from("connection closed before ack was received"));
            }
            buf.extend_from_slice(&scratch[..n]);

            if let Some((ack, _)) = decode_ack(&buf)? {
                return Ok(ack);
            }
            if buf.len() > MAX_ACK_LEN {
                return Err(BoxError::from("forward ack response too large"));
            }
        }
    }

    /// Shut the connection down, best effort.
    pub async fn close(mut self) {
        match tokio::time::timeout(self.timeout, self.stream.shutdown()).await {
            Ok(Ok(())) => (),
            Ok(Err(err)) => tracing::trace!("forward client: shutdown failed: {err}"),
            Err(_) => tracing::trace!("forward client: shutdown timed out"),
        }
    }
}

fn unix_time_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
