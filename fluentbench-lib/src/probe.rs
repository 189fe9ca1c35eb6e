use rama::telemetry::tracing;
use serde::Serialize;

use crate::sink::Sink;

/// Tag of the single record sent before a run.
pub const PROBE_TAG: &str = "connection_test";

#[derive(Debug, Serialize)]
struct ProbeRecord {
    msg: &'static str,
}

/// Send one minimal record; `true` only if the sink delivered it.
///
/// No retries: a failed probe aborts the run.
pub async fn probe<S: Sink>(sink: &S) -> bool {
    let ok = sink.send(PROBE_TAG, &ProbeRecord { msg: "ping" }).await;
    if ok {
        tracing::info!("connectivity probe succeeded");
    } else {
        tracing::error!("connectivity probe failed");
    }
    ok
}
