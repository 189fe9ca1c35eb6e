use std::time::Duration;

use rama::error::BoxError;

/// Records per second when no rate is given.
pub const DEFAULT_RATE: u32 = 10;
/// Approximate serialized size (in bytes) of one generated record.
pub const DEFAULT_RECORD_SIZE: usize = 848;
pub const DEFAULT_HOST: &str = "localhost";
/// Default port of the Fluentd `in_forward` input.
pub const DEFAULT_PORT: u16 = 24224;
pub const DEFAULT_TAG_PREFIX: &str = "ops-test";
/// Bound applied to every send, including the connectivity probe.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(3);
/// Upper bound of simultaneously open connections within one window.
pub const DEFAULT_MAX_CONCURRENCY: usize = 500;
/// Length of one pacing window.
pub const WINDOW_LENGTH: Duration = Duration::from_secs(1);

/// Immutable parameters of a single load run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    /// Amount of one-second windows to dispatch.
    pub duration_secs: u64,
    /// Records dispatched per window.
    pub rate: u32,
    /// Target serialized size of each record, in bytes.
    pub record_size: usize,
    pub host: String,
    pub port: u16,
    /// Middle segment of the wire tag, see [`RunConfig::wire_tag`].
    pub tag_prefix: String,
    pub send_timeout: Duration,
    pub max_concurrency: usize,
    /// Wait for a forward-protocol ack before counting a send as delivered.
    pub require_ack: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            duration_secs: 1,
            rate: DEFAULT_RATE,
            record_size: DEFAULT_RECORD_SIZE,
            host: DEFAULT_HOST.to_owned(),
            port: DEFAULT_PORT,
            tag_prefix: DEFAULT_TAG_PREFIX.to_owned(),
            send_timeout: DEFAULT_SEND_TIMEOUT,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            require_ack: false,
        }
    }
}

impl RunConfig {
    /// Tag attached to every dispatched record.
    pub fn wire_tag(&self) -> String {
        format!("INFO.{}.dev.unspecified", self.tag_prefix)
    }

    /// Amount of records a complete run attempts.
    pub fn total_records(&self) -> u64 {
        self.duration_secs.saturating_mul(self.rate as u64)
    }

    /// Size of the per-window worker pool.
    pub fn pool_size(&self) -> usize {
        pool_size(self.rate, self.max_concurrency)
    }

    pub fn validate(&self) -> Result<(), BoxError> {
        if self.duration_secs == 0 {
            return Err(BoxError::from("duration must be at least one second"));
        }
        if self.rate == 0 {
            return Err(BoxError::from("rate must be at least one record per second"));
        }
        if self.max_concurrency == 0 {
            return Err(BoxError::from("max concurrency must be at least one"));
        }
        if self.host.trim().is_empty() {
            return Err(BoxError::from("host cannot be empty"));
        }
        if self.send_timeout.is_zero() {
            return Err(BoxError::from("send timeout must be greater than zero"));
        }
        Ok(())
    }
}

/// `min(rate, cap)`, never zero.
pub fn pool_size(rate: u32, cap: usize) -> usize {
    (rate as usize).min(cap).max(1)
}
