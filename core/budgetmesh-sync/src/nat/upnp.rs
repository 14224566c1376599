//! Gateway port mapping over UPnP IGD.

use super::{PortMapper, Protocol};
use async_trait::async_trait;
use igd_next::aio::Gateway;
use igd_next::aio::tokio::{Tokio, search_gateway};
use igd_next::{PortMappingProtocol, SearchOptions};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Zero asks the gateway for a permanent mapping.
const LEASE_SECS: u32 = 0;

/// Maps ports on the first gateway that answers discovery.
#[derive(Debug)]
pub struct UpnpPortMapper {
    search_timeout: Duration,
    gateway: Mutex<Option<Gateway<Tokio>>>,
}

impl UpnpPortMapper {
    pub fn new(search_timeout: Duration) -> Self {
        Self {
            search_timeout,
            gateway: Mutex::new(None),
        }
    }

    async fn gateway(&self) -> Option<Gateway<Tokio>> {
        let mut cached = self.gateway.lock().await;
        if cached.is_none() {
            let options = SearchOptions {
                timeout: Some(self.search_timeout),
                ..Default::default()
            };
            match search_gateway(options).await {
                Ok(found) => {
                    debug!(gateway = %found.addr, "found UPnP gateway");
                    *cached = Some(found);
                }
                Err(e) => {
                    debug!("no UPnP gateway: {e}");
                    return None;
                }
            }
        }
        cached.clone()
    }
}

impl Default for UpnpPortMapper {
    fn default() -> Self {
        Self::new(Duration::from_secs(3))
    }
}

/// The local address the OS would use to reach `gateway`.
async fn local_ip_towards(gateway: SocketAddr) -> Option<IpAddr> {
    let probe = UdpSocket::bind(("0.0.0.0", 0)).await.ok()?;
    probe.connect(gateway).await.ok()?;
    probe.local_addr().ok().map(|a| a.ip())
}

#[async_trait]
impl PortMapper for UpnpPortMapper {
    async fn map_port(&self, port: u16, protocol: Protocol) -> bool {
        let Some(gateway) = self.gateway().await else {
            return false;
        };
        let Some(local_ip) = local_ip_towards(gateway.addr).await else {
            debug!(gateway = %gateway.addr, "cannot determine local address");
            return false;
        };
        let proto = match protocol {
            Protocol::Tcp => PortMappingProtocol::TCP,
            Protocol::Udp => PortMappingProtocol::UDP,
        };

        // A stale rule from a previous run blocks the new one.
        if let Err(e) = gateway.remove_port(proto, port).await {
            debug!(port, %protocol, "no previous mapping removed: {e}");
        }
        let description = format!("budgetmesh-{protocol}");
        match gateway
            .add_port(proto, port, SocketAddr::new(local_ip, port), LEASE_SECS, &description)
            .await
        {
            Ok(()) => {
                info!(port, %protocol, %local_ip, "gateway port mapped");
                true
            }
            Err(e) => {
                debug!(port, %protocol, "gateway refused mapping: {e}");
                false
            }
        }
    }

    async fn external_ip(&self) -> Option<IpAddr> {
        let gateway = self.gateway().await?;
        gateway.get_external_ip().await.ok()
    }
}
