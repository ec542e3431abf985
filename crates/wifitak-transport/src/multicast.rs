//! Multicast UDP sender
//!
//! Default destination is the TAK mesh SA group, 239.2.3.1:6969.

use crate::sender::{CotSender, SendError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};
use wifitak_cot::WireFormat;

/// Largest payload that fits one datagram on a standard 1500-byte MTU.
const MAX_UDP_PAYLOAD: usize = 1472;

/// The mesh SA multicast group ATAK listens on out of the box.
pub const DEFAULT_GROUP: Ipv4Addr = Ipv4Addr::new(239, 2, 3, 1);
pub const DEFAULT_PORT: u16 = 6969;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MulticastConfig {
    pub group: Ipv4Addr,
    pub port: u16,
    /// Interface to send multicast through (None = routing default)
    pub interface: Option<Ipv4Addr>,
    pub ttl: u32,
    pub format: WireFormat,
}

impl Default for MulticastConfig {
    fn default() -> Self {
        Self {
            group: DEFAULT_GROUP,
            port: DEFAULT_PORT,
            interface: None,
            ttl: 1,
            format: WireFormat::Mesh,
        }
    }
}

pub struct MulticastSender {
    name: String,
    group: SocketAddrV4,
    format: WireFormat,
    socket: UdpSocket,
}

impl MulticastSender {
    /// Bind a send socket and configure it for the multicast group.
    pub fn bind(config: &MulticastConfig) -> Result<Self, SendError> {
        if !config.group.is_multicast() {
            return Err(SendError::BadAddress(format!(
                "{} is not a multicast group",
                config.group
            )));
        }

        let socket = socket2::Socket::new(
            socket2::Domain::IPV4,
            socket2::Type::DGRAM,
            Some(socket2::Protocol::UDP),
        )?;
        socket.set_nonblocking(true)?;
        socket.set_multicast_ttl_v4(config.ttl)?;
        if let Some(interface) = config.interface {
            socket.set_multicast_if_v4(&interface)?;
        }

        let local: SocketAddr = (Ipv4Addr::UNSPECIFIED, 0).into();
        socket.bind(&local.into())?;

        let socket = UdpSocket::from_std(socket.into())?;
        let group = SocketAddrV4::new(config.group, config.port);

        info!(group = %group, ttl = config.ttl, "multicast sender ready");

        Ok(Self {
            name: format!("multicast:{group}"),
            group,
            format: config.format,
            socket,
        })
    }
}

#[async_trait]
impl CotSender for MulticastSender {
    fn name(&self) -> &str {
        &self.name
    }

    fn format(&self) -> WireFormat {
        self.format
    }

    async fn send(&mut self, payload: &[u8]) -> Result<(), SendError> {
        if payload.len() > MAX_UDP_PAYLOAD {
            warn!(
                size = payload.len(),
                max = MAX_UDP_PAYLOAD,
                "payload exceeds one datagram, may be fragmented or dropped"
            );
        }

        let sent = self.socket.send_to(payload, self.group).await?;
        if sent != payload.len() {
            warn!(expected = payload.len(), actual = sent, "partial datagram sent");
        }
        debug!(group = %self.group, size = sent, "multicast payload sent");

        Ok(())
    }
}
