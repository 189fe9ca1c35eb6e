//! Synthetic structured log records.

use std::time::SystemTime;

use rama::error::{BoxError, ErrorContext as _};
use rand::{Rng as _, seq::IndexedRandom as _};
use serde::Serialize;

use crate::utils::os;

const SERVICES: [&str; 5] = [
    "auth-service",
    "billing-service",
    "user-service",
    "inventory",
    "notifications",
];

const PAYLOAD_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    Info,
    Debug,
    Warn,
    Error,
}

impl Level {
    const ALL: [Self; 4] = [Self::Info, Self::Debug, Self::Warn, Self::Error];
}

/// One synthetic log event.
///
/// Serializes as a flat map. Fields are fixed once built;
/// `payload` pads the record to the requested size.
#[derive(Debug, Clone, Serialize)]
pub struct LogRecord {
    log_id: String,
    level: Level,
    service: &'static str,
    user_id: u16,
    message: String,
    host: String,
    timestamp: String,
    trace_id: String,
    session_id: String,
    payload: String,
}

impl LogRecord {
    pub fn log_id(&self) -> &str {
        &self.log_id
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// Length of the compact JSON encoding of this record.
    pub fn encoded_len(&self) -> Result<usize, BoxError> {
        let buf = serde_json::to_vec(self).context("json encode log record")?;
        Ok(buf.len())
    }
}

/// Produces one record per requested global index.
pub trait RecordGenerator: Send + Sync + 'static {
    fn generate(&self, index: u64, target_size: usize) -> Result<LogRecord, BoxError>;
}

impl<F> RecordGenerator for F
where
    F: Fn(u64, usize) -> Result<LogRecord, BoxError> + Send + Sync + 'static,
{
    fn generate(&self, index: u64, target_size: usize) -> Result<LogRecord, BoxError> {
        (self)(index, target_size)
    }
}

/// Fills every field at random, host name excepted.
#[derive(Debug, Clone)]
pub struct RandomRecordGenerator {
    host: String,
}

impl Default for RandomRecordGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl RandomRecordGenerator {
    pub fn new() -> Self {
        Self::with_host(os::hostname())
    }

    pub fn with_host(host: impl Into<String>) -> Self {
        Self { host: host.into() }
    }
}

impl RecordGenerator for RandomRecordGenerator {
    fn generate(&self, index: u64, target_size: usize) -> Result<LogRecord, BoxError> {
        let mut rng = rand::rng();

        let mut record = LogRecord {
            log_id: uuid::Uuid::new_v4().to_string(),
            level: *Level::ALL.choose(&mut rng).context("pick log level")?,
            service: *SERVICES.choose(&mut rng).context("pick service")?,
            user_id: rng.random_range(1000..=9999),
            message: format!("Log event {index} - simulated operation completed."),
            host: self.host.clone(),
            timestamp: humantime::format_rfc3339_seconds(SystemTime::now()).to_string(),
            trace_id: short_id(),
            session_id: short_id(),
            payload: String::new(),
        };

        // the empty payload already counts for its key and quotes
        let unpadded = record.encoded_len()?;
        let pad_len = target_size.saturating_sub(unpadded);
        record.payload = (0..pad_len)
            .map(|_| PAYLOAD_CHARSET[rng.random_range(0..PAYLOAD_CHARSET.len())] as char)
            .collect();

        Ok(record)
    }
}

fn short_id() -> String {
    let mut id = uuid::Uuid::new_v4().to_string();
    id.truncate(16);
    id
}
