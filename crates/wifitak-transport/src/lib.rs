//! Outbound CoT delivery
//!
//! A [`CotSender`] is one destination for encoded events: the TAK mesh
//! multicast group, a unicast UDP or TCP peer, or stdout. The
//! [`dispatch`] module fans one inbound event queue out to any number of
//! senders, each behind its own relay task so destinations fail
//! independently.

pub mod dispatch;
pub mod multicast;
pub mod sender;
pub mod stdio;
pub mod unicast;

pub use dispatch::{run_dispatch, DispatchConfig, DispatchStats};
pub use multicast::{MulticastConfig, MulticastSender};
pub use sender::{CotSender, SendError};
pub use stdio::{StdoutConfig, StdoutSender};
pub use unicast::{TcpConfig, TcpSender, UdpConfig, UdpSender};

use serde::{Deserialize, Serialize};

/// One configured destination, as it appears in the senders list of the
/// config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SenderConfig {
    Multicast(MulticastConfig),
    Udp(UdpConfig),
    Tcp(TcpConfig),
    Stdout(StdoutConfig),
}

impl SenderConfig {
    /// Construct the sender. Sockets are bound here, so this must run
    /// inside the runtime.
    pub fn build(&self) -> Result<Box<dyn CotSender>, SendError> {
        match self {
            SenderConfig::Multicast(config) => Ok(Box::new(MulticastSender::bind(config)?)),
            SenderConfig::Udp(config) => Ok(Box::new(UdpSender::bind(config)?)),
            SenderConfig::Tcp(config) => Ok(Box::new(TcpSender::new(config.clone()))),
            SenderConfig::Stdout(config) => Ok(Box::new(StdoutSender::new(config))),
        }
    }
}
