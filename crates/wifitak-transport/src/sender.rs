//! The outbound sender seam

use async_trait::async_trait;
use std::time::Duration;
use wifitak_cot::WireFormat;

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),

    #[error("encode error: {0}")]
    Codec(#[from] wifitak_cot::CodecError),

    #[error("send timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid destination address: {0}")]
    BadAddress(String),
}

/// One outbound destination for encoded CoT payloads.
///
/// Implementations own their socket and their recovery policy. A failed
/// send must leave the sender usable for the next payload; the dispatcher
/// never tears a sender down mid-run.
#[async_trait]
pub trait CotSender: Send {
    /// Stable name for logs, unique within one dispatcher.
    fn name(&self) -> &str;

    /// Wire format this destination expects.
    fn format(&self) -> WireFormat;

    /// Deliver one encoded event payload.
    async fn send(&mut self, payload: &[u8]) -> Result<(), SendError>;
}
