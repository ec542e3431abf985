//! Ingestion loop: poll the detection feed, map records, feed the pipeline
//!
//! State machine per connection attempt:
//! Disconnected → Authenticating → Subscribing → Streaming → (Disconnected
//! on any error). Re-entry into Disconnected waits one fixed interval;
//! there is no exponential growth, jitter, or attempt ceiling. Only a
//! credential denial exits the loop with an error.

use crate::fields::FieldMap;
use crate::mapper::map_detection;
use crate::source::{DetectionSource, SourceError};
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use wifitak_cot::{validate_event, Clock, CotEvent};

/// Tuning for the ingestion loop.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Fixed wait between reconnection attempts
    pub retry_interval: Duration,
    /// Freshness window added to each event's start time
    pub stale_window_secs: i64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            retry_interval: Duration::from_secs(3),
            stale_window_secs: 3600,
        }
    }
}

/// Counters for one run of the ingestion loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// Records received from the feed
    pub received: u64,
    /// Events pushed into the pipeline
    pub forwarded: u64,
    /// Records skipped for lacking a usable position
    pub skipped_no_position: u64,
    /// Mapped events that failed the validity check
    pub invalid: u64,
    /// Messages that were not parsable JSON objects
    pub unparsable: u64,
}

/// Run the ingestion loop until cancellation or a fatal source error.
///
/// Transient connection failures retry forever on the fixed interval.
/// Valid events are pushed into `tx` with a suspending send, so a full
/// pipeline applies backpressure here instead of dropping.
pub async fn run_ingest<S: DetectionSource>(
    mut source: S,
    fields: FieldMap,
    config: IngestConfig,
    clock: Arc<dyn Clock>,
    tx: flume::Sender<CotEvent>,
    cancel: CancellationToken,
) -> Result<IngestStats, SourceError> {
    let mut stats = IngestStats::default();

    loop {
        let mut stream = tokio::select! {
            _ = cancel.cancelled() => return Ok(stats),
            result = source.connect() => match result {
                Ok(stream) => stream,
                Err(e) if e.is_fatal() => {
                    error!(
                        error = %e,
                        "detection feed rejected the configured credentials; \
                         fix the feed username/password and restart"
                    );
                    return Err(e);
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        retry_secs = config.retry_interval.as_secs(),
                        "detection feed unavailable, retrying"
                    );
                    if !wait_retry(&cancel, config.retry_interval).await {
                        return Ok(stats);
                    }
                    continue;
                }
            },
        };

        info!("streaming detections from feed");

        loop {
            let message = tokio::select! {
                _ = cancel.cancelled() => return Ok(stats),
                message = stream.next() => message,
            };

            match message {
                Some(Ok(text)) => {
                    stats.received += 1;
                    match handle_record(&text, &fields, &config, clock.as_ref(), &mut stats) {
                        Some(event) => {
                            let sent = tokio::select! {
                                _ = cancel.cancelled() => return Ok(stats),
                                result = tx.send_async(event) => result.is_ok(),
                            };
                            if !sent {
                                // all consumers are gone; nothing left to feed
                                return Ok(stats);
                            }
                            stats.forwarded += 1;
                        }
                        None => {}
                    }
                }
                Some(Err(e)) => {
                    warn!(error = %e, "detection stream failed");
                    break;
                }
                None => {
                    warn!("detection stream closed by the feed");
                    break;
                }
            }
        }

        debug!(?stats, "feed disconnected, backing off before reconnect");
        if !wait_retry(&cancel, config.retry_interval).await {
            return Ok(stats);
        }
    }
}

/// Parse, map, and validate one feed message. Returns the event to
/// forward, or `None` when the record is dropped (counted in `stats`).
fn handle_record(
    text: &str,
    fields: &FieldMap,
    config: &IngestConfig,
    clock: &dyn Clock,
    stats: &mut IngestStats,
) -> Option<CotEvent> {
    let record = match serde_json::from_str::<serde_json::Value>(text) {
        Ok(serde_json::Value::Object(map)) => map,
        Ok(_) => {
            stats.unparsable += 1;
            debug!("feed message is not a JSON object, dropping");
            return None;
        }
        Err(e) => {
            stats.unparsable += 1;
            debug!(error = %e, "feed message is not valid JSON, dropping");
            return None;
        }
    };

    let event = match map_detection(&record, fields, clock, config.stale_window_secs) {
        Some(event) => event,
        None => {
            // no usable position; deliberate silent skip
            stats.skipped_no_position += 1;
            debug!("record has no usable position, skipping");
            return None;
        }
    };

    if let Err(e) = validate_event(&event) {
        stats.invalid += 1;
        warn!(uid = %event.uid, error = %e, "mapped event failed validation, dropping");
        return None;
    }

    Some(event)
}

/// Sleep out the retry interval; false when cancelled mid-wait.
async fn wait_retry(cancel: &CancellationToken, interval: Duration) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(interval) => true,
    }
}
