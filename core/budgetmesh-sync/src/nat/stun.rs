//! Minimal STUN binding client (RFC 5389), IPv4 only.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::debug;

pub const MAGIC_COOKIE: u32 = 0x2112_A442;
pub const BINDING_REQUEST: u16 = 0x0001;
pub const BINDING_SUCCESS: u16 = 0x0101;
pub const XOR_MAPPED_ADDRESS: u16 = 0x0020;

const HEADER_LEN: usize = 20;
const FAMILY_IPV4: u8 = 0x01;

/// A 96-bit transaction id.
pub type TransactionId = [u8; 12];

#[derive(Debug, Clone)]
pub struct StunConfig {
    /// `host:port` responders, asked in order.
    pub servers: Vec<String>,
    /// Per-responder wait.
    pub timeout: Duration,
}

impl Default for StunConfig {
    fn default() -> Self {
        Self {
            servers: vec![
                "stun.l.google.com:19302".to_string(),
                "stun1.l.google.com:19302".to_string(),
                "stun2.l.google.com:19302".to_string(),
            ],
            timeout: Duration::from_secs(2),
        }
    }
}

pub fn build_binding_request(txid: &TransactionId) -> [u8; HEADER_LEN] {
    let mut req = [0u8; HEADER_LEN];
    req[0..2].copy_from_slice(&BINDING_REQUEST.to_be_bytes());
    // Length 0: no attributes.
    req[4..8].copy_from_slice(&MAGIC_COOKIE.to_be_bytes());
    req[8..20].copy_from_slice(txid);
    req
}

/// Extracts the IPv4 XOR-MAPPED-ADDRESS from a binding success response
/// to `txid`. Anything else yields `None`.
pub fn parse_binding_response(buf: &[u8], txid: &TransactionId) -> Option<SocketAddrV4> {
    if buf.len() < HEADER_LEN {
        return None;
    }
    let msg_type = u16::from_be_bytes([buf[0], buf[1]]);
    let msg_len = usize::from(u16::from_be_bytes([buf[2], buf[3]]));
    let cookie = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
    if msg_type != BINDING_SUCCESS || cookie != MAGIC_COOKIE || buf[8..20] != txid[..] {
        return None;
    }

    let end = HEADER_LEN.saturating_add(msg_len).min(buf.len());
    let mut pos = HEADER_LEN;
    while pos + 4 <= end {
        let attr = u16::from_be_bytes([buf[pos], buf[pos + 1]]);
        let len = usize::from(u16::from_be_bytes([buf[pos + 2], buf[pos + 3]]));
        let value = buf.get(pos + 4..pos + 4 + len)?;

        if attr == XOR_MAPPED_ADDRESS && len >= 8 && value[1] == FAMILY_IPV4 {
            let port = u16::from_be_bytes([value[2], value[3]]) ^ (MAGIC_COOKIE >> 16) as u16;
            let ip = u32::from_be_bytes([value[4], value[5], value[6], value[7]]) ^ MAGIC_COOKIE;
            return Some(SocketAddrV4::new(Ipv4Addr::from(ip), port));
        }
        // Attribute values are padded to 4 bytes.
        pos += 4 + len.div_ceil(4) * 4;
    }
    None
}

/// Asks public responders for this host's reflexive address.
#[derive(Debug, Clone, Default)]
pub struct StunClient {
    config: StunConfig,
}

impl StunClient {
    pub fn new(config: StunConfig) -> Self {
        Self { config }
    }

    /// Queries responders in order from `local_port` and returns the first
    /// mapped address.
    pub async fn query(&self, local_port: u16) -> Option<SocketAddrV4> {
        for server in &self.config.servers {
            match self.ask(server, local_port).await {
                Some(addr) => {
                    debug!(%server, %addr, "STUN mapped address");
                    return Some(addr);
                }
                None => debug!(%server, "no STUN answer"),
            }
        }
        None
    }

    async fn ask(&self, server: &str, local_port: u16) -> Option<SocketAddrV4> {
        let target = tokio::net::lookup_host(server)
            .await
            .ok()?
            .find(SocketAddr::is_ipv4)?;
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, local_port))
            .await
            .map_err(|e| debug!(local_port, "STUN bind failed: {e}"))
            .ok()?;

        let txid: TransactionId = rand::random();
        socket
            .send_to(&build_binding_request(&txid), target)
            .await
            .ok()?;

        let wait = async {
            let mut buf = [0u8; 1024];
            loop {
                let (len, from) = socket.recv_from(&mut buf).await.ok()?;
                if from != target {
                    continue;
                }
                if let Some(addr) = parse_binding_response(&buf[..len], &txid) {
                    return Some(addr);
                }
            }
        };
        tokio::time::timeout(self.config.timeout, wait)
            .await
            .ok()
            .flatten()
    }
}
