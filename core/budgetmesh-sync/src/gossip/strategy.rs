//! Peer discovery strategies.
//!
//! A strategy decides where a broadcast goes. The transport owns the socket
//! and holds exactly one strategy at a time; switching strategy never
//! rebinds the socket.

use crate::error::SyncResult;
use crate::seeds::Seed;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use tokio::net::UdpSocket;
use tracing::debug;

/// Where to send, and how to prepare the shared socket for it.
#[async_trait]
pub trait PeerStrategy: Send + Sync + fmt::Debug {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Prepares the socket when this strategy becomes active.
    fn attach(&self, _socket: &UdpSocket) -> SyncResult<()> {
        Ok(())
    }

    /// Undoes [`PeerStrategy::attach`] when the strategy is replaced.
    fn detach(&self, _socket: &UdpSocket) {}

    /// Current broadcast destinations.
    async fn targets(&self) -> Vec<SocketAddr>;

    /// Adds a learned endpoint. Returns whether it was new.
    fn add_endpoint(&self, seed: &Seed) -> bool;

    /// Whether peers heard from should also receive broadcasts. Lets a
    /// seeded node answer members behind NAT that reached it first.
    fn replies_to_heard(&self) -> bool {
        false
    }

    /// Known endpoints in canonical form.
    fn seeds(&self) -> Vec<String> {
        Vec::new()
    }
}

/// LAN discovery through an IPv4 multicast group.
///
/// Endpoints learned at runtime are sent to alongside the group, so a
/// member reached through an announcement never drops off the LAN.
#[derive(Debug)]
pub struct LocalDiscovery {
    group: Ipv4Addr,
    port: u16,
    learned: Seeded,
}

impl LocalDiscovery {
    pub fn new(group: Ipv4Addr, port: u16) -> Self {
        Self {
            group,
            port,
            learned: Seeded::default(),
        }
    }

    fn group_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.group, self.port))
    }
}

#[async_trait]
impl PeerStrategy for LocalDiscovery {
    fn name(&self) -> &'static str {
        "local-discovery"
    }

    fn attach(&self, socket: &UdpSocket) -> SyncResult<()> {
        socket.join_multicast_v4(self.group, Ipv4Addr::UNSPECIFIED)?;
        // Other members on this host must hear us too; our own frames are
        // filtered above the socket.
        socket.set_multicast_loop_v4(true)?;
        socket.set_multicast_ttl_v4(1)?;
        Ok(())
    }

    fn detach(&self, socket: &UdpSocket) {
        if let Err(e) = socket.leave_multicast_v4(self.group, Ipv4Addr::UNSPECIFIED) {
            debug!(group = %self.group, "leave multicast failed: {e}");
        }
    }

    async fn targets(&self) -> Vec<SocketAddr> {
        let group = self.group_addr();
        let mut targets = vec![group];
        targets.extend(self.learned.targets().await.into_iter().filter(|t| *t != group));
        targets
    }

    fn add_endpoint(&self, seed: &Seed) -> bool {
        self.learned.add_endpoint(seed)
    }

    // Off the LAN, answer whoever reached us once we know anyone by address.
    fn replies_to_heard(&self) -> bool {
        !self.learned.is_empty()
    }

    fn seeds(&self) -> Vec<String> {
        self.learned.seeds()
    }
}

/// An explicit endpoint list, resolved lazily and extended at runtime.
#[derive(Debug, Default)]
pub struct Seeded {
    seeds: Mutex<Vec<Seed>>,
    resolved: Mutex<HashMap<Seed, Vec<SocketAddr>>>,
}

impl Seeded {
    /// Builds from any accepted seed spellings; invalid entries are dropped.
    pub fn new<I, S>(seeds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut list: Vec<Seed> = Vec::new();
        for raw in seeds {
            match Seed::parse(raw.as_ref()) {
                Ok(seed) if !list.contains(&seed) => list.push(seed),
                Ok(_) => {}
                Err(e) => debug!("skipping seed: {e}"),
            }
        }
        Self {
            seeds: Mutex::new(list),
            resolved: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.seeds.lock().is_empty()
    }
}

#[async_trait]
impl PeerStrategy for Seeded {
    fn name(&self) -> &'static str {
        "seeded"
    }

    async fn targets(&self) -> Vec<SocketAddr> {
        let seeds = self.seeds.lock().clone();
        let mut targets = Vec::new();

        for seed in seeds {
            let cached = self.resolved.lock().get(&seed).cloned();
            let addrs = match cached {
                Some(addrs) => addrs,
                None => match tokio::net::lookup_host(seed.to_lookup()).await {
                    Ok(found) => {
                        let addrs: Vec<SocketAddr> = found.collect();
                        self.resolved.lock().insert(seed.clone(), addrs.clone());
                        addrs
                    }
                    Err(e) => {
                        // Not cached, so the next broadcast retries.
                        debug!(seed = %seed.canonical(), "resolve failed: {e}");
                        continue;
                    }
                },
            };
            for addr in addrs {
                if !targets.contains(&addr) {
                    targets.push(addr);
                }
            }
        }
        targets
    }

    fn add_endpoint(&self, seed: &Seed) -> bool {
        let mut seeds = self.seeds.lock();
        if seeds.contains(seed) {
            return false;
        }
        seeds.push(seed.clone());
        true
    }

    fn replies_to_heard(&self) -> bool {
        true
    }

    fn seeds(&self) -> Vec<String> {
        self.seeds.lock().iter().map(Seed::canonical).collect()
    }
}
