//! Unicast UDP and TCP senders

use crate::sender::{CotSender, SendError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::timeout;
use tracing::{debug, info, warn};
use wifitak_cot::WireFormat;

fn default_format() -> WireFormat {
    WireFormat::Xml
}

fn default_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UdpConfig {
    pub addr: SocketAddr,
    #[serde(default = "default_format")]
    pub format: WireFormat,
}

/// One datagram per event, fire and forget.
pub struct UdpSender {
    name: String,
    addr: SocketAddr,
    format: WireFormat,
    socket: UdpSocket,
}

impl UdpSender {
    pub fn bind(config: &UdpConfig) -> Result<Self, SendError> {
        let socket = socket2::Socket::new(
            socket2::Domain::IPV4,
            socket2::Type::DGRAM,
            Some(socket2::Protocol::UDP),
        )?;
        socket.set_nonblocking(true)?;
        let local: SocketAddr = (Ipv4Addr::UNSPECIFIED, 0).into();
        socket.bind(&local.into())?;

        info!(addr = %config.addr, "udp sender ready");

        Ok(Self {
            name: format!("udp:{}", config.addr),
            addr: config.addr,
            format: config.format,
            socket: UdpSocket::from_std(socket.into())?,
        })
    }
}

#[async_trait]
impl CotSender for UdpSender {
    fn name(&self) -> &str {
        &self.name
    }

    fn format(&self) -> WireFormat {
        self.format
    }

    async fn send(&mut self, payload: &[u8]) -> Result<(), SendError> {
        let sent = self.socket.send_to(payload, self.addr).await?;
        if sent != payload.len() {
            warn!(expected = payload.len(), actual = sent, "partial datagram sent");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TcpConfig {
    pub addr: SocketAddr,
    #[serde(default = "default_format")]
    pub format: WireFormat,
    #[serde(default = "default_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub write_timeout_secs: u64,
}

/// Persistent TCP connection, re-established lazily.
///
/// The connection is dialed on first use and dropped on any write
/// failure; the next send dials again. One lost event per broken
/// connection is accepted rather than buffering unsent payloads.
pub struct TcpSender {
    name: String,
    config: TcpConfig,
    stream: Option<TcpStream>,
}

impl TcpSender {
    pub fn new(config: TcpConfig) -> Self {
        Self {
            name: format!("tcp:{}", config.addr),
            config,
            stream: None,
        }
    }

    async fn ensure_connected(&mut self) -> Result<&mut TcpStream, SendError> {
        if self.stream.is_none() {
            let connect_timeout = Duration::from_secs(self.config.connect_timeout_secs);
            let stream = timeout(connect_timeout, TcpStream::connect(self.config.addr))
                .await
                .map_err(|_| SendError::Timeout(connect_timeout))??;

            stream.set_nodelay(true)?;
            let keepalive = socket2::TcpKeepalive::new().with_time(Duration::from_secs(30));
            socket2::SockRef::from(&stream).set_tcp_keepalive(&keepalive)?;

            info!(addr = %self.config.addr, "tcp sender connected");
            self.stream = Some(stream);
        }

        // just set above when it was None
        Ok(self.stream.as_mut().unwrap())
    }
}

#[async_trait]
impl CotSender for TcpSender {
    fn name(&self) -> &str {
        &self.name
    }

    fn format(&self) -> WireFormat {
        self.config.format
    }

    async fn send(&mut self, payload: &[u8]) -> Result<(), SendError> {
        let write_timeout = Duration::from_secs(self.config.write_timeout_secs);

        let result = async {
            let stream = self.ensure_connected().await?;
            timeout(write_timeout, stream.write_all(payload))
                .await
                .map_err(|_| SendError::Timeout(write_timeout))??;
            timeout(write_timeout, stream.flush())
                .await
                .map_err(|_| SendError::Timeout(write_timeout))??;
            Ok(())
        }
        .await;

        if let Err(ref e) = result {
            debug!(addr = %self.config.addr, error = %e, "dropping tcp connection");
            self.stream = None;
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn udp_sender_delivers_a_datagram() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let config = UdpConfig {
            addr: receiver.local_addr().unwrap(),
            format: WireFormat::Xml,
        };

        let mut sender = UdpSender::bind(&config).unwrap();
        sender.send(b"<event/>").await.unwrap();

        let mut buf = [0u8; 32];
        let (n, _) = receiver.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"<event/>");
    }

    #[tokio::test]
    async fn tcp_sender_reconnects_after_peer_closes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            // first connection: read exactly the first payload then hang
            // up, so later retry writes cannot coalesce into this read
            let (mut conn, _) = listener.accept().await.unwrap();
            let mut first = [0u8; 5];
            conn.read_exact(&mut first).await.unwrap();
            drop(conn);

            // second connection after the sender notices the break
            let (mut conn2, _) = listener.accept().await.unwrap();
            let mut second = [0u8; 6];
            conn2.read_exact(&mut second).await.unwrap();

            (first.to_vec(), second.to_vec())
        });

        let mut sender = TcpSender::new(TcpConfig {
            addr,
            format: WireFormat::Xml,
            connect_timeout_secs: 5,
            write_timeout_secs: 5,
        });

        sender.send(b"first").await.unwrap();

        // writes into the dead connection eventually surface the break;
        // those payloads are lost by design
        let mut saw_error = false;
        for _ in 0..50 {
            if sender.send(b"x").await.is_err() {
                saw_error = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(saw_error, "broken connection should error a send");
        assert!(sender.stream.is_none());

        // the next send dials a fresh connection
        sender.send(b"second").await.unwrap();

        let (first, second) = server.await.unwrap();
        assert_eq!(first, b"first");
        assert_eq!(second, b"second");
    }
}
