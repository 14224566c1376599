//! Peer-to-peer replication for BudgetMesh.
//!
//! Members of a group gossip signed, encrypted operations over UDP and
//! converge on the same ledger without a server.
//!
//! # Architecture
//!
//! - **Protocol**: the sixteen replicated operations, control messages and
//!   the signed envelope around both
//! - **Gossip**: one UDP socket with a swappable peer strategy (LAN
//!   multicast or explicit seeds) and heartbeat presence
//! - **NAT**: gateway port mapping and STUN discovery at startup
//! - **Invite**: signed, expiring invitation codes and join links
//! - **Engine**: stamps local changes, applies remote ones last-writer-wins
//!
//! ## Message path
//!
//! 1. A local mutation is stamped with the member's logical clock
//! 2. It is written through the store, which keeps the newest version
//! 3. The operation is signed, encrypted with the group passphrase and
//!    broadcast
//! 4. Receivers decrypt, verify, merge their clock and apply it the same way
//!
//! # Example
//!
//! ```no_run
//! use budgetmesh_store::{Decimal, Expense, MemoryStore};
//! use budgetmesh_sync::{
//!     EngineConfig, GossipTransport, LocalIdentity, ReplicationEngine, TransportConfig,
//! };
//! use std::sync::Arc;
//!
//! # async fn run() -> budgetmesh_sync::SyncResult<()> {
//! let transport = Arc::new(GossipTransport::new(TransportConfig::default()));
//! let engine = Arc::new(ReplicationEngine::new(
//!     LocalIdentity::generate("Alice"),
//!     EngineConfig::new("family", "correct horse battery staple"),
//!     Arc::new(MemoryStore::new()),
//!     transport,
//! ));
//! engine.start().await?;
//! engine
//!     .add_expense(Expense::new("Alice", "Food", Decimal::new(1250, 2), "EUR", 0))
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod engine;
mod error;
mod fsutil;
pub mod gossip;
mod identity;
pub mod invite;
pub mod nat;
pub mod protocol;
pub mod seeds;
mod session;

pub use engine::{ChangeEvent, EngineConfig, Mutation, RemoteOutcome, ReplicationEngine};
pub use error::{SyncError, SyncResult};
pub use gossip::{
    GossipTransport, Inbound, LocalDiscovery, PeerEvent, PeerStrategy, Seeded, TransportConfig,
    TransportMode,
};
pub use identity::{IDENTITY_FILE, IdentityStore, LocalIdentity};
pub use invite::{Invite, InviteCode, InviteError, JoinLink};
pub use nat::{NatBootstrap, NatReport, PortMapper, StunClient, StunConfig, UpnpPortMapper};
pub use protocol::{ControlMessage, Operation, Payload, SignedEnvelope};
pub use seeds::{DEFAULT_PORT, Seed, SeedBook, SeedSink, normalize_seed, parse_seed_list};
pub use session::{SESSION_FILE, Session, SessionStore};
