//! UDP gossip transport.
//!
//! One socket, bound once, carries both encrypted operation datagrams and
//! presence heartbeats. The active [`PeerStrategy`] decides where a
//! broadcast goes and can be swapped while the socket stays bound.
//!
//! Receive-side processing is split into small pure pieces ([`frame`],
//! [`presence`]) so the I/O loop only moves bytes.

pub mod frame;
pub mod presence;
pub mod strategy;

pub use frame::Frame;
pub use presence::Presence;
pub use strategy::{LocalDiscovery, PeerStrategy, Seeded};

use crate::error::{SyncError, SyncResult};
use crate::seeds::{DEFAULT_PORT, Seed};
use parking_lot::Mutex;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::{RwLock, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Default LAN multicast group.
pub const DEFAULT_MULTICAST_GROUP: Ipv4Addr = Ipv4Addr::new(239, 255, 77, 77);

const INBOUND_CAPACITY: usize = 1024;
const PEER_EVENT_CAPACITY: usize = 256;

/// How peers are found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportMode {
    /// Multicast on the local network.
    LocalDiscovery,
    /// Explicit endpoints in any accepted seed spelling.
    Seeded(Vec<String>),
}

/// Transport settings.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub bind_addr: IpAddr,
    pub bind_port: u16,
    pub mode: TransportMode,
    pub multicast_group: Ipv4Addr,
    pub heartbeat_interval: Duration,
    pub peer_timeout: Duration,
    /// Largest datagram sent or accepted, framing included.
    pub max_datagram: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            bind_port: DEFAULT_PORT,
            mode: TransportMode::LocalDiscovery,
            multicast_group: DEFAULT_MULTICAST_GROUP,
            heartbeat_interval: Duration::from_secs(2),
            peer_timeout: Duration::from_secs(10),
            max_datagram: 60 * 1024,
        }
    }
}

/// A data datagram as received, framing stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    pub from: SocketAddr,
    pub payload: Vec<u8>,
}

/// Presence changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    Joined(SocketAddr),
    Left(SocketAddr),
}

/// State shared between the transport handle and its I/O task.
struct Shared {
    strategy: RwLock<Option<Arc<dyn PeerStrategy>>>,
    presence: Presence,
    instance: u64,
    inbound_tx: mpsc::Sender<Inbound>,
    peer_tx: mpsc::Sender<PeerEvent>,
}

impl Shared {
    async fn targets(&self, local: SocketAddr) -> Vec<SocketAddr> {
        // Clone the Arc so resolution never holds the lock.
        let Some(strategy) = self.strategy.read().await.clone() else {
            return Vec::new();
        };
        let mut targets = strategy.targets().await;
        if strategy.replies_to_heard() {
            for addr in self.presence.live() {
                if !targets.contains(&addr) {
                    targets.push(addr);
                }
            }
        }
        targets.retain(|t| t.is_ipv4() == local.is_ipv4());
        targets
    }

    fn publish(&self, event: PeerEvent) {
        debug!(?event, "presence changed");
        // Nobody listening, or a slow listener, must not stall the socket.
        let _ = self.peer_tx.try_send(event);
    }

    fn handle_datagram(&self, datagram: &[u8], from: SocketAddr) {
        match frame::decode(datagram) {
            Some(Frame::Heartbeat { instance }) if instance == self.instance => {}
            Some(Frame::Heartbeat { .. }) => {
                if let Some(event) = self.presence.observe(from, Instant::now()) {
                    self.publish(event);
                }
            }
            Some(Frame::Data(payload)) => {
                let inbound = Inbound {
                    from,
                    payload: payload.to_vec(),
                };
                if let Err(mpsc::error::TrySendError::Full(_)) = self.inbound_tx.try_send(inbound)
                {
                    warn!(%from, "inbound queue full, dropping datagram");
                }
            }
            None => debug!(%from, len = datagram.len(), "ignoring unframed datagram"),
        }
    }
}

/// The gossip transport.
pub struct GossipTransport {
    config: TransportConfig,
    shared: Arc<Shared>,
    socket: Mutex<Option<Arc<UdpSocket>>>,
    task: Mutex<Option<JoinHandle<()>>>,
    inbound_rx: Mutex<Option<mpsc::Receiver<Inbound>>>,
    peer_rx: Mutex<Option<mpsc::Receiver<PeerEvent>>>,
}

impl GossipTransport {
    pub fn new(config: TransportConfig) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CAPACITY);
        let (peer_tx, peer_rx) = mpsc::channel(PEER_EVENT_CAPACITY);
        Self {
            config,
            shared: Arc::new(Shared {
                strategy: RwLock::new(None),
                presence: Presence::new(),
                instance: rand::random(),
                inbound_tx,
                peer_tx,
            }),
            socket: Mutex::new(None),
            task: Mutex::new(None),
            inbound_rx: Mutex::new(Some(inbound_rx)),
            peer_rx: Mutex::new(Some(peer_rx)),
        }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Binds the socket and starts the I/O task. Starting a running
    /// transport returns the existing local address.
    pub async fn start(&self) -> SyncResult<SocketAddr> {
        if let Some(addr) = self.local_addr() {
            return Ok(addr);
        }

        let bind = SocketAddr::new(self.config.bind_addr, self.config.bind_port);
        let socket = UdpSocket::bind(bind)
            .await
            .map_err(|e| SyncError::Network(format!("bind {bind}: {e}")))?;
        let socket = Arc::new(socket);
        let local = socket.local_addr()?;

        // A reconfigure before start wins over the configured mode.
        let strategy = self
            .shared
            .strategy
            .write()
            .await
            .get_or_insert_with(|| build_strategy(&self.config.mode, &self.config))
            .clone();
        if let Err(e) = strategy.attach(&socket) {
            warn!(strategy = strategy.name(), "socket setup failed: {e}");
        }

        let task = tokio::spawn(run_io(
            Arc::clone(&socket),
            Arc::clone(&self.shared),
            self.config.clone(),
        ));

        *self.socket.lock() = Some(socket);
        *self.task.lock() = Some(task);
        info!(%local, strategy = strategy.name(), "gossip transport started");
        Ok(local)
    }

    /// Sends `payload` to every current target. Returns how many sends
    /// succeeded. A stopped transport drops the payload.
    pub async fn broadcast(&self, payload: &[u8]) -> SyncResult<usize> {
        let Some(socket) = self.socket.lock().clone() else {
            debug!("transport not running, dropping broadcast");
            return Ok(0);
        };

        let datagram = Frame::Data(payload).encode();
        if datagram.len() > self.config.max_datagram {
            return Err(SyncError::Protocol(format!(
                "datagram of {} bytes exceeds limit of {}",
                datagram.len(),
                self.config.max_datagram
            )));
        }

        let local = socket.local_addr()?;
        let mut sent = 0;
        for target in self.shared.targets(local).await {
            match socket.send_to(&datagram, target).await {
                Ok(_) => sent += 1,
                Err(e) => debug!(%target, "send failed: {e}"),
            }
        }
        Ok(sent)
    }

    /// Replaces the active strategy without rebinding.
    pub async fn reconfigure(&self, mode: TransportMode) -> SyncResult<()> {
        let next = build_strategy(&mode, &self.config);
        let socket = self.socket.lock().clone();

        if let Some(socket) = &socket {
            if let Err(e) = next.attach(socket) {
                warn!(strategy = next.name(), "socket setup failed: {e}");
            }
        }

        let previous = self.shared.strategy.write().await.replace(Arc::clone(&next));
        if let (Some(previous), Some(socket)) = (previous, &socket) {
            previous.detach(socket);
        }
        info!(strategy = next.name(), "transport reconfigured");
        Ok(())
    }

    /// Adds a seed endpoint to the active strategy. Local discovery keeps
    /// its multicast group and sends to the seed as well. Before start the
    /// configured strategy is installed first. Returns whether the seed
    /// was new.
    pub async fn add_seed(&self, endpoint: &str) -> SyncResult<bool> {
        let seed = Seed::parse(endpoint)?;
        let strategy = self
            .shared
            .strategy
            .write()
            .await
            .get_or_insert_with(|| build_strategy(&self.config.mode, &self.config))
            .clone();

        let added = strategy.add_endpoint(&seed);
        if added {
            debug!(seed = %seed.canonical(), strategy = strategy.name(), "seed added");
        }
        Ok(added)
    }

    /// Where a broadcast would go right now.
    pub async fn targets(&self) -> Vec<SocketAddr> {
        let bound = self.socket.lock().as_ref().and_then(|s| s.local_addr().ok());
        let local =
            bound.unwrap_or_else(|| SocketAddr::new(self.config.bind_addr, self.config.bind_port));
        self.shared.targets(local).await
    }

    /// Seeds known to the active strategy, canonical form.
    pub async fn seeds(&self) -> Vec<String> {
        match self.shared.strategy.read().await.as_ref() {
            Some(strategy) => strategy.seeds(),
            None => Vec::new(),
        }
    }

    /// Addresses currently considered present.
    pub fn live_peers(&self) -> Vec<SocketAddr> {
        self.shared.presence.live()
    }

    /// Takes the inbound data stream. Only the first call succeeds.
    pub fn take_inbound(&self) -> Option<mpsc::Receiver<Inbound>> {
        self.inbound_rx.lock().take()
    }

    /// Takes the presence event stream. Only the first call succeeds.
    pub fn take_peer_events(&self) -> Option<mpsc::Receiver<PeerEvent>> {
        self.peer_rx.lock().take()
    }

    /// Stops the I/O task and releases the socket. Does not wait.
    pub fn stop(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
        if self.socket.lock().take().is_some() {
            self.shared.presence.clear();
            info!("gossip transport stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.socket.lock().is_some()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket
            .lock()
            .as_ref()
            .and_then(|s| s.local_addr().ok())
    }
}

impl Drop for GossipTransport {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for GossipTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GossipTransport")
            .field("config", &self.config)
            .field("local_addr", &self.local_addr())
            .finish_non_exhaustive()
    }
}

fn build_strategy(mode: &TransportMode, config: &TransportConfig) -> Arc<dyn PeerStrategy> {
    match mode {
        TransportMode::LocalDiscovery => {
            Arc::new(LocalDiscovery::new(config.multicast_group, config.bind_port))
        }
        TransportMode::Seeded(seeds) => Arc::new(Seeded::new(seeds)),
    }
}

async fn run_io(socket: Arc<UdpSocket>, shared: Arc<Shared>, config: TransportConfig) {
    let mut buf = vec![0u8; config.max_datagram];
    let mut heartbeat_timer = tokio::time::interval(config.heartbeat_interval);
    let heartbeat = Frame::Heartbeat {
        instance: shared.instance,
    }
    .encode();

    loop {
        tokio::select! {
            result = socket.recv_from(&mut buf) => {
                match result {
                    Ok((len, from)) => shared.handle_datagram(&buf[..len], from),
                    // ICMP unreachable from a departed peer surfaces here.
                    Err(e) => debug!("gossip recv error: {e}"),
                }
            }

            _ = heartbeat_timer.tick() => {
                let local = match socket.local_addr() {
                    Ok(addr) => addr,
                    Err(e) => {
                        warn!("socket lost its address: {e}");
                        break;
                    }
                };
                for target in shared.targets(local).await {
                    if let Err(e) = socket.send_to(&heartbeat, target).await {
                        debug!(%target, "heartbeat failed: {e}");
                    }
                }
                for event in shared.presence.expire(Instant::now(), config.peer_timeout) {
                    shared.publish(event);
                }
            }
        }
    }
}
