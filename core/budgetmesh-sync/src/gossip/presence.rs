//! Peer presence tracking (Sans-IO).
//!
//! A peer is present from the first frame heard from its address until
//! nothing has been heard for the configured timeout.

use super::PeerEvent;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
pub struct Presence {
    last_heard: Mutex<HashMap<SocketAddr, Instant>>,
}

impl Presence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a frame from `addr`. Returns a join event for a new peer.
    pub fn observe(&self, addr: SocketAddr, now: Instant) -> Option<PeerEvent> {
        let mut guard = self.last_heard.lock();
        match guard.insert(addr, now) {
            None => Some(PeerEvent::Joined(addr)),
            Some(_) => None,
        }
    }

    /// Drops peers silent for longer than `timeout`.
    pub fn expire(&self, now: Instant, timeout: Duration) -> Vec<PeerEvent> {
        let mut guard = self.last_heard.lock();
        let stale: Vec<SocketAddr> = guard
            .iter()
            .filter(|(_, seen)| now.saturating_duration_since(**seen) > timeout)
            .map(|(addr, _)| *addr)
            .collect();
        for addr in &stale {
            guard.remove(addr);
        }
        stale.into_iter().map(PeerEvent::Left).collect()
    }

    /// Addresses currently present.
    pub fn live(&self) -> Vec<SocketAddr> {
        self.last_heard.lock().keys().copied().collect()
    }

    pub fn clear(&self) {
        self.last_heard.lock().clear();
    }
}
