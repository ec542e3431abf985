//! Fan-out dispatcher: one inbound event queue, many outbound senders
//!
//! Each sender gets its own relay task and bounded relay queue, so a
//! failing destination does not disturb the others. The dispatcher
//! encodes per sender, since destinations can want different wire
//! formats. Relay sends suspend when a relay queue is full; a stalled
//! destination therefore backpressures the whole pipeline once its
//! relay fills, rather than dropping events silently. After a failed
//! delivery the relay waits out the fixed retry interval before taking
//! the next event, so a down destination is not hammered per event.

use crate::sender::CotSender;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use wifitak_cot::CotEvent;

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Per-sender relay queue depth
    pub relay_depth: usize,
    /// Fixed wait after a failed delivery before the next attempt
    pub retry_interval: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            relay_depth: 64,
            retry_interval: Duration::from_secs(3),
        }
    }
}

/// Counters aggregated over the whole dispatcher run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Events taken off the inbound queue
    pub dispatched: u64,
    /// Payloads delivered across all senders
    pub sent: u64,
    /// Failed delivery attempts across all senders
    pub send_failures: u64,
    /// Events a sender's wire format could not encode
    pub encode_failures: u64,
}

#[derive(Debug, Default)]
struct RelayStats {
    sent: u64,
    send_failures: u64,
    encode_failures: u64,
}

/// Run the fan-out until the inbound queue closes or `cancel` fires.
pub async fn run_dispatch(
    rx: flume::Receiver<CotEvent>,
    senders: Vec<Box<dyn CotSender>>,
    config: DispatchConfig,
    cancel: CancellationToken,
) -> DispatchStats {
    let mut stats = DispatchStats::default();
    let mut relays = Vec::with_capacity(senders.len());
    let mut workers = Vec::with_capacity(senders.len());

    for sender in senders {
        let name = sender.name().to_string();
        let (relay_tx, relay_rx) = flume::bounded::<Arc<CotEvent>>(config.relay_depth);
        workers.push(tokio::spawn(relay(
            sender,
            relay_rx,
            config.retry_interval,
            cancel.clone(),
        )));
        relays.push((name, relay_tx));
    }

    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = rx.recv_async() => match event {
                Ok(event) => event,
                // producer side closed, drain and exit
                Err(_) => break,
            },
        };

        stats.dispatched += 1;
        let event = Arc::new(event);

        let mut cancelled = false;
        for (name, relay_tx) in &relays {
            tokio::select! {
                _ = cancel.cancelled() => {
                    cancelled = true;
                    break;
                }
                result = relay_tx.send_async(Arc::clone(&event)) => {
                    if result.is_err() {
                        debug!(sender = %name, "relay gone, event copy discarded");
                    }
                }
            }
        }
        if cancelled {
            break;
        }
    }

    // closing the relay queues lets each worker drain and exit
    drop(relays);
    for worker in workers {
        if let Ok(relay_stats) = worker.await {
            stats.sent += relay_stats.sent;
            stats.send_failures += relay_stats.send_failures;
            stats.encode_failures += relay_stats.encode_failures;
        }
    }

    info!(?stats, "dispatcher stopped");
    stats
}

async fn relay(
    mut sender: Box<dyn CotSender>,
    rx: flume::Receiver<Arc<CotEvent>>,
    retry_interval: Duration,
    cancel: CancellationToken,
) -> RelayStats {
    let mut stats = RelayStats::default();

    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = rx.recv_async() => match event {
                Ok(event) => event,
                Err(_) => break,
            },
        };

        let payload = match wifitak_cot::encode(&event, sender.format()) {
            Ok(payload) => payload,
            Err(e) => {
                stats.encode_failures += 1;
                warn!(sender = sender.name(), uid = %event.uid, error = %e, "encode failed");
                continue;
            }
        };

        match sender.send(&payload).await {
            Ok(()) => stats.sent += 1,
            Err(e) => {
                stats.send_failures += 1;
                warn!(
                    sender = sender.name(),
                    uid = %event.uid,
                    error = %e,
                    retry_secs = retry_interval.as_secs(),
                    "delivery failed, holding this sender back"
                );
                // fixed hold per failed destination, other relays keep going
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(retry_interval) => {}
                }
            }
        }
    }

    stats
}
