//! NAT traversal: gateway port mapping and public address discovery.
//!
//! Runs once at startup, before the transport binds, so the STUN query
//! leaves from the port the group will use.

pub mod stun;
pub mod upnp;

pub use stun::{StunClient, StunConfig, parse_binding_response};
pub use upnp::UpnpPortMapper;

use async_trait::async_trait;
use std::fmt;
use std::net::{IpAddr, SocketAddrV4};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
    Udp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Protocol::Tcp => "TCP",
            Protocol::Udp => "UDP",
        })
    }
}

/// Asks a gateway to forward an external port here. Never fails loudly:
/// `false` means no mapping.
#[async_trait]
pub trait PortMapper: Send + Sync {
    /// Maps external `port` to the same local port.
    async fn map_port(&self, port: u16, protocol: Protocol) -> bool;

    /// The gateway's public address, if it reports one.
    async fn external_ip(&self) -> Option<IpAddr> {
        None
    }
}

/// What startup traversal achieved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NatReport {
    pub mapped_tcp: bool,
    pub mapped_udp: bool,
    pub public_addr: Option<SocketAddrV4>,
}

impl NatReport {
    /// Whether an invitation can name a reachable endpoint.
    pub fn has_public(&self) -> bool {
        self.public_addr.is_some()
    }
}

pub struct NatBootstrap {
    mapper: Option<Arc<dyn PortMapper>>,
    stun: StunClient,
}

impl NatBootstrap {
    pub fn new(mapper: Option<Arc<dyn PortMapper>>, stun: StunClient) -> Self {
        Self { mapper, stun }
    }

    /// UPnP over the default gateway and the default STUN responders.
    pub fn with_defaults() -> Self {
        Self::new(Some(Arc::new(UpnpPortMapper::default())), StunClient::default())
    }

    /// Maps `port` for TCP and UDP, then asks STUN for the public endpoint.
    pub async fn run(&self, port: u16) -> NatReport {
        let mut report = NatReport::default();
        if let Some(mapper) = &self.mapper {
            report.mapped_tcp = mapper.map_port(port, Protocol::Tcp).await;
            report.mapped_udp = mapper.map_port(port, Protocol::Udp).await;
        }
        report.public_addr = self.stun.query(port).await;
        info!(
            port,
            mapped_tcp = report.mapped_tcp,
            mapped_udp = report.mapped_udp,
            public = ?report.public_addr,
            "NAT bootstrap finished"
        );
        report
    }
}

impl fmt::Debug for NatBootstrap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NatBootstrap")
            .field("mapper", &self.mapper.is_some())
            .field("stun", &self.stun)
            .finish()
    }
}
