//! Replication engine.
//!
//! Local mutations are stamped with the member's logical clock, written
//! through the last-writer-wins store, then signed, encrypted and gossiped.
//! Remote datagrams take the reverse path: decrypt, verify, merge the clock,
//! apply. Every member runs the same engine; there is no coordinator.
//!
//! Store access and the passphrase KDF both block, so they run on Tokio's
//! blocking pool.

use crate::error::{SyncError, SyncResult};
use crate::gossip::GossipTransport;
use crate::identity::LocalIdentity;
use crate::protocol::{ControlMessage, Operation, Payload, SignedEnvelope};
use crate::seeds::{SeedBook, SeedSink, normalize_seed};
use budgetmesh_crypto::{ChannelCipher, KdfParams};
use budgetmesh_store::{
    Category, CategoryBudget, EntityKind, Expense, FxRate, Goal, Member, Record, RecurringRule,
    Replicated, ReplicatedStore, ReplicatedStoreExt, Rule, Tombstone,
};
use budgetmesh_types::LogicalClock;
use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const CHANGE_EVENT_CAPACITY: usize = 256;

/// Group membership settings.
#[derive(Clone)]
pub struct EngineConfig {
    pub group_id: String,
    /// Shared group passphrase. Every holder is a trusted peer.
    pub passphrase: String,
    pub kdf: KdfParams,
}

impl EngineConfig {
    pub fn new(group_id: impl Into<String>, passphrase: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            passphrase: passphrase.into(),
            kdf: KdfParams::default(),
        }
    }

    #[must_use]
    pub fn with_kdf(mut self, kdf: KdfParams) -> Self {
        self.kdf = kdf;
        self
    }
}

impl fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineConfig")
            .field("group_id", &self.group_id)
            .field("passphrase", &"[REDACTED]")
            .field("kdf", &self.kdf)
            .finish()
    }
}

/// A local change requested by the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Upsert(Record),
    Delete { kind: EntityKind, key: String },
}

/// What happened to an inbound datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteOutcome {
    /// The operation won and changed the store.
    Applied,
    /// The store already held a version at least as new.
    Stale,
    /// An announced endpoint was new and has been added.
    PeerLearned,
    /// An announced endpoint was already known.
    PeerKnown,
    /// Our own datagram, looped back.
    Ignored,
    /// Undecryptable, unsigned, malformed or unusable.
    Rejected,
}

/// Change notifications for subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    /// The active list of this kind may have changed.
    Records(EntityKind),
    /// Peer presence or the seed book changed.
    Peers,
}

pub struct ReplicationEngine {
    identity: LocalIdentity,
    author: String,
    config: EngineConfig,
    cipher: Arc<ChannelCipher>,
    clock: Arc<LogicalClock>,
    store: Arc<dyn ReplicatedStore>,
    transport: Arc<GossipTransport>,
    seeds: Mutex<SeedBook>,
    seed_sink: Option<Arc<dyn SeedSink>>,
    events: broadcast::Sender<ChangeEvent>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ReplicationEngine {
    pub fn new(
        identity: LocalIdentity,
        config: EngineConfig,
        store: Arc<dyn ReplicatedStore>,
        transport: Arc<GossipTransport>,
    ) -> Self {
        let author = identity.member_id().to_string();
        let cipher = ChannelCipher::with_params(config.passphrase.clone(), config.kdf.clone());
        let (events, _) = broadcast::channel(CHANGE_EVENT_CAPACITY);
        Self {
            clock: Arc::new(LogicalClock::new(author.clone())),
            identity,
            author,
            config,
            cipher: Arc::new(cipher),
            store,
            transport,
            seeds: Mutex::new(SeedBook::new()),
            seed_sink: None,
            events,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Replaces the clock. Its node id should be this member's id.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<LogicalClock>) -> Self {
        self.clock = clock;
        self
    }

    /// Persists the seed book through `sink` whenever it grows.
    #[must_use]
    pub fn with_seed_sink(mut self, sink: Arc<dyn SeedSink>) -> Self {
        self.seed_sink = Some(sink);
        self
    }

    /// Seeds already known at startup, any accepted spelling.
    #[must_use]
    pub fn with_seeds<I, S>(self, seeds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        *self.seeds.lock() = SeedBook::from_entries(seeds);
        self
    }

    pub fn identity(&self) -> &LocalIdentity {
        &self.identity
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn clock(&self) -> &Arc<LogicalClock> {
        &self.clock
    }

    pub fn transport(&self) -> &Arc<GossipTransport> {
        &self.transport
    }

    /// Known seeds, canonical and sorted.
    pub fn seeds(&self) -> Vec<String> {
        self.seeds.lock().to_vec()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.events.subscribe()
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Starts the transport and the inbound loop.
    pub async fn start(self: &Arc<Self>) -> SyncResult<()> {
        let mut inbound = self
            .transport
            .take_inbound()
            .ok_or(SyncError::AlreadyTaken("inbound stream"))?;
        let peer_events = self.transport.take_peer_events();
        self.transport.start().await?;

        // The loop holds only a weak handle so dropping the engine ends it.
        let engine: Weak<Self> = Arc::downgrade(self);
        let inbound_task = tokio::spawn(async move {
            while let Some(datagram) = inbound.recv().await {
                let Some(engine) = engine.upgrade() else {
                    break;
                };
                let outcome = engine.apply_remote(&datagram.payload).await;
                debug!(from = %datagram.from, ?outcome, "inbound datagram");
            }
        });

        let mut tasks = self.tasks.lock();
        tasks.push(inbound_task);
        if let Some(mut peer_events) = peer_events {
            let events = self.events.clone();
            tasks.push(tokio::spawn(async move {
                while let Some(event) = peer_events.recv().await {
                    debug!(?event, "peer presence");
                    let _ = events.send(ChangeEvent::Peers);
                }
            }));
        }
        info!(
            member = %self.author,
            group = %self.config.group_id,
            "replication engine started"
        );
        Ok(())
    }

    /// Stops background work and closes the transport.
    pub fn stop(&self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        self.transport.stop();
        info!("replication engine stopped");
    }

    // ── Local mutations ──────────────────────────────────────────

    /// Stamps, stores and gossips a local change. Returns the operation
    /// as sent.
    pub async fn apply_local(&self, mutation: Mutation) -> SyncResult<Operation> {
        let op = match mutation {
            Mutation::Upsert(mut record) => {
                record.prepare_key();
                require_key(record.kind(), &record.key())?;
                record.restamp(self.clock.tick(), &self.author);
                Operation::upsert(record)
            }
            Mutation::Delete { kind, key } => {
                Operation::delete(kind, self.tombstone_for(kind, &key)?)
            }
        };
        self.commit(op.clone()).await?;
        Ok(op)
    }

    pub async fn add_expense(&self, expense: Expense) -> SyncResult<Expense> {
        self.upsert_record(expense).await
    }

    pub async fn delete_expense(&self, id: &str) -> SyncResult<Tombstone> {
        self.delete_record(EntityKind::Expense, id).await
    }

    pub async fn upsert_budget(&self, budget: CategoryBudget) -> SyncResult<CategoryBudget> {
        self.upsert_record(budget).await
    }

    pub async fn delete_budget(&self, category: &str) -> SyncResult<Tombstone> {
        self.delete_record(EntityKind::CategoryBudget, category).await
    }

    pub async fn upsert_fx(&self, rate: FxRate) -> SyncResult<FxRate> {
        self.upsert_record(rate).await
    }

    pub async fn delete_fx(&self, code: &str) -> SyncResult<Tombstone> {
        self.delete_record(EntityKind::FxRate, code).await
    }

    pub async fn upsert_rule(&self, rule: Rule) -> SyncResult<Rule> {
        self.upsert_record(rule).await
    }

    pub async fn delete_rule(&self, id: &str) -> SyncResult<Tombstone> {
        self.delete_record(EntityKind::Rule, id).await
    }

    pub async fn upsert_recurring(&self, rule: RecurringRule) -> SyncResult<RecurringRule> {
        self.upsert_record(rule).await
    }

    pub async fn delete_recurring(&self, id: &str) -> SyncResult<Tombstone> {
        self.delete_record(EntityKind::RecurringRule, id).await
    }

    pub async fn upsert_goal(&self, goal: Goal) -> SyncResult<Goal> {
        self.upsert_record(goal).await
    }

    pub async fn delete_goal(&self, id: &str) -> SyncResult<Tombstone> {
        self.delete_record(EntityKind::Goal, id).await
    }

    pub async fn upsert_category(&self, category: Category) -> SyncResult<Category> {
        self.upsert_record(category).await
    }

    pub async fn delete_category(&self, name: &str) -> SyncResult<Tombstone> {
        self.delete_record(EntityKind::Category, name).await
    }

    pub async fn upsert_member(&self, member: Member) -> SyncResult<Member> {
        self.upsert_record(member).await
    }

    pub async fn delete_member(&self, id: &str) -> SyncResult<Tombstone> {
        self.delete_record(EntityKind::Member, id).await
    }

    async fn upsert_record<R>(&self, mut record: R) -> SyncResult<R>
    where
        R: Replicated + Into<Record>,
    {
        record.prepare_key();
        require_key(R::KIND, &record.key())?;
        record.restamp(self.clock.tick(), &self.author);
        self.commit(Operation::upsert(record.clone().into())).await?;
        Ok(record)
    }

    async fn delete_record(&self, kind: EntityKind, key: &str) -> SyncResult<Tombstone> {
        let tombstone = self.tombstone_for(kind, key)?;
        self.commit(Operation::delete(kind, tombstone.clone())).await?;
        Ok(tombstone)
    }

    fn tombstone_for(&self, kind: EntityKind, key: &str) -> SyncResult<Tombstone> {
        let key = kind.canonical_key(key);
        if key.is_empty() {
            return Err(SyncError::Protocol(format!("{kind} delete without a key")));
        }
        Ok(Tombstone {
            key,
            ver: self.clock.tick(),
            author: self.author.clone(),
        })
    }

    /// Writes `op` locally, then gossips it. A failed broadcast is logged;
    /// the local write stands.
    async fn commit(&self, op: Operation) -> SyncResult<()> {
        let kind = op.kind();
        let name = op.name();
        if self.write(op.clone()).await? {
            self.notify(ChangeEvent::Records(kind));
        }
        match self.broadcast(&Payload::Operation(op)).await {
            Ok(sent) => debug!(op = name, sent, "operation gossiped"),
            Err(e) => warn!(op = name, "failed to gossip operation: {e}"),
        }
        Ok(())
    }

    async fn write(&self, op: Operation) -> SyncResult<bool> {
        let store = Arc::clone(&self.store);
        let changed = tokio::task::spawn_blocking(move || op.apply_to(store.as_ref())).await??;
        Ok(changed)
    }

    // ── Gossip ───────────────────────────────────────────────────

    /// Announces a reachable endpoint of ours to the group.
    pub async fn announce(&self, endpoint: &str) -> SyncResult<usize> {
        let s = normalize_seed(endpoint)?;
        info!(endpoint = %s, "announcing endpoint");
        self.broadcast(&Payload::Control(ControlMessage::Announce { s }))
            .await
    }

    /// Signs and encrypts `payload` into one datagram body.
    pub async fn seal(&self, payload: &Payload) -> SyncResult<Vec<u8>> {
        let envelope = SignedEnvelope::seal(
            self.identity.signing(),
            self.author.clone(),
            self.identity.display_name(),
            payload.to_json()?,
        )
        .in_group(self.config.group_id.clone());
        let plaintext = serde_json::to_vec(&envelope)?;
        let cipher = Arc::clone(&self.cipher);
        let sealed = tokio::task::spawn_blocking(move || cipher.encrypt(&plaintext)).await??;
        Ok(sealed)
    }

    async fn broadcast(&self, payload: &Payload) -> SyncResult<usize> {
        let datagram = self.seal(payload).await?;
        self.transport.broadcast(&datagram).await
    }

    // ── Remote input ─────────────────────────────────────────────

    /// Processes one inbound datagram body. Never fails; the outcome says
    /// what happened.
    pub async fn apply_remote(&self, datagram: &[u8]) -> RemoteOutcome {
        let cipher = Arc::clone(&self.cipher);
        let sealed = datagram.to_vec();
        let plaintext = match tokio::task::spawn_blocking(move || cipher.decrypt(&sealed)).await {
            Ok(Ok(plaintext)) => plaintext,
            Ok(Err(e)) => {
                debug!("dropping datagram: {e}");
                return RemoteOutcome::Rejected;
            }
            Err(e) => {
                warn!("decrypt task failed: {e}");
                return RemoteOutcome::Rejected;
            }
        };

        let envelope: SignedEnvelope = match serde_json::from_slice(&plaintext) {
            Ok(envelope) => envelope,
            Err(e) => {
                debug!("dropping malformed envelope: {e}");
                return RemoteOutcome::Rejected;
            }
        };
        if envelope.group_id != self.config.group_id {
            debug!(sender = %envelope.sender_id, group = %envelope.group_id, "dropping envelope for another group");
            return RemoteOutcome::Rejected;
        }
        let payload_json = match envelope.verify() {
            Ok(json) => json,
            Err(e) => {
                debug!(sender = %envelope.sender_id, "dropping unverified envelope: {e}");
                return RemoteOutcome::Rejected;
            }
        };
        if envelope.sender_id == self.author {
            return RemoteOutcome::Ignored;
        }

        match Payload::from_json(payload_json) {
            Ok(Payload::Control(ControlMessage::Announce { s })) => self.learn_seed(&s).await,
            Ok(Payload::Operation(op)) => self.apply_remote_op(op, &envelope.sender_name).await,
            Err(e) => {
                warn!(sender = %envelope.sender_id, "dropping undecodable payload: {e}");
                RemoteOutcome::Rejected
            }
        }
    }

    async fn apply_remote_op(&self, mut op: Operation, sender_name: &str) -> RemoteOutcome {
        op.canonicalize_key();
        if op.stamp().is_zero() || op.key().is_empty() {
            warn!(op = op.name(), sender = sender_name, "dropping unversioned operation");
            return RemoteOutcome::Rejected;
        }
        self.clock.merge(op.stamp());

        let kind = op.kind();
        let name = op.name();
        let store = Arc::clone(&self.store);
        match tokio::task::spawn_blocking(move || op.apply_to(store.as_ref())).await {
            Ok(Ok(true)) => {
                debug!(op = name, sender = sender_name, "applied remote operation");
                self.notify(ChangeEvent::Records(kind));
                RemoteOutcome::Applied
            }
            Ok(Ok(false)) => RemoteOutcome::Stale,
            Ok(Err(e)) => {
                warn!(op = name, "failed to apply remote operation: {e}");
                RemoteOutcome::Rejected
            }
            Err(e) => {
                warn!(op = name, "apply task failed: {e}");
                RemoteOutcome::Rejected
            }
        }
    }

    async fn learn_seed(&self, endpoint: &str) -> RemoteOutcome {
        let (canonical, snapshot) = {
            let mut seeds = self.seeds.lock();
            match seeds.insert(endpoint) {
                Ok(Some(canonical)) => (canonical, seeds.to_vec()),
                Ok(None) => return RemoteOutcome::PeerKnown,
                Err(e) => {
                    debug!("ignoring announced endpoint: {e}");
                    return RemoteOutcome::Rejected;
                }
            }
        };

        if let Some(sink) = self.seed_sink.clone() {
            match tokio::task::spawn_blocking(move || sink.save_seeds(&snapshot)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("failed to persist seeds: {e}"),
                Err(e) => warn!("seed persistence task failed: {e}"),
            }
        }
        if let Err(e) = self.transport.add_seed(&canonical).await {
            warn!(seed = %canonical, "transport rejected seed: {e}");
        }
        info!(seed = %canonical, "learned seed");
        self.notify(ChangeEvent::Peers);
        RemoteOutcome::PeerLearned
    }

    fn notify(&self, event: ChangeEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    // ── Reads ────────────────────────────────────────────────────

    /// Live records of one kind in display order. Blocks on the store.
    pub fn list_active<R: Replicated>(&self) -> SyncResult<Vec<R>> {
        Ok(self.store.list_active::<R>()?)
    }

    /// One live record by key. Blocks on the store.
    pub fn get<R: Replicated>(&self, key: &str) -> SyncResult<Option<R>> {
        Ok(self.store.get::<R>(key)?)
    }
}

fn require_key(kind: EntityKind, key: &str) -> SyncResult<()> {
    if key.is_empty() {
        return Err(SyncError::Protocol(format!("{kind} upsert without a key")));
    }
    Ok(())
}

impl Drop for ReplicationEngine {
    fn drop(&mut self) {
        for task in self.tasks.get_mut().drain(..) {
            task.abort();
        }
    }
}

impl fmt::Debug for ReplicationEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplicationEngine")
            .field("member", &self.author)
            .field("config", &self.config)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}
