//! Stdout sender, mainly for piping into other tools and for debugging

use crate::sender::{CotSender, SendError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use wifitak_cot::WireFormat;

fn default_format() -> WireFormat {
    WireFormat::Xml
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StdoutConfig {
    #[serde(default = "default_format")]
    pub format: WireFormat,
}

impl Default for StdoutConfig {
    fn default() -> Self {
        Self {
            format: default_format(),
        }
    }
}

/// Writes each payload to stdout. XML payloads get a trailing newline so
/// line-oriented consumers see one event per line; binary formats are
/// written verbatim.
pub struct StdoutSender<W = tokio::io::Stdout> {
    format: WireFormat,
    writer: W,
}

impl StdoutSender {
    pub fn new(config: &StdoutConfig) -> Self {
        Self {
            format: config.format,
            writer: tokio::io::stdout(),
        }
    }
}

impl<W: AsyncWrite + Unpin + Send> StdoutSender<W> {
    /// Sender over an arbitrary writer, used by tests.
    pub fn with_writer(format: WireFormat, writer: W) -> Self {
        Self { format, writer }
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> CotSender for StdoutSender<W> {
    fn name(&self) -> &str {
        "stdout"
    }

    fn format(&self) -> WireFormat {
        self.format
    }

    async fn send(&mut self, payload: &[u8]) -> Result<(), SendError> {
        self.writer.write_all(payload).await?;
        if self.format == WireFormat::Xml {
            self.writer.write_all(b"\n").await?;
        }
        self.writer.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn xml_payloads_are_newline_terminated() {
        let mut sender = StdoutSender::with_writer(WireFormat::Xml, Vec::new());
        sender.send(b"<event/>").await.unwrap();
        sender.send(b"<event/>").await.unwrap();
        assert_eq!(sender.writer, b"<event/>\n<event/>\n");
    }

    #[tokio::test]
    async fn binary_payloads_are_written_verbatim() {
        let mut sender = StdoutSender::with_writer(WireFormat::Mesh, Vec::new());
        sender.send(&[0xBF, 0x01, 0xBF, 0x12]).await.unwrap();
        assert_eq!(sender.writer, vec![0xBF, 0x01, 0xBF, 0x12]);
    }
}
