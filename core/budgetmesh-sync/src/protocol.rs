//! Wire protocol.
//!
//! A datagram body, once decrypted, is a [`SignedEnvelope`] whose
//! `payloadJson` is one [`Payload`]: either a replicated [`Operation`]
//! (`{"type": ..., "payload": ...}`) or a [`ControlMessage`]
//! (`{"t": ...}`). The two are told apart by which tag field is present.

use crate::error::{SyncError, SyncResult};
use budgetmesh_crypto::{CryptoResult, PublicKey, SigningIdentity};
use budgetmesh_store::{
    Category, CategoryBudget, EntityKind, Expense, FxRate, Goal, Member, Record, RecurringRule,
    Replicated, ReplicatedStore, ReplicatedStoreExt, Rule, StorageResult, Tombstone, Version,
};
use budgetmesh_types::Stamp;
use serde::{Deserialize, Serialize};

/// One replicated mutation. Deletes carry only a [`Tombstone`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operation {
    Add(Expense),
    Delete(Tombstone),
    BudgetUpsert(CategoryBudget),
    BudgetDelete(Tombstone),
    FxUpsert(FxRate),
    FxDelete(Tombstone),
    RuleUpsert(Rule),
    RuleDelete(Tombstone),
    RecurUpsert(RecurringRule),
    RecurDelete(Tombstone),
    GoalUpsert(Goal),
    GoalDelete(Tombstone),
    CategoryUpsert(Category),
    CategoryDelete(Tombstone),
    MemberUpsert(Member),
    MemberDelete(Tombstone),
}

impl Operation {
    /// Wraps a record in its upsert operation.
    pub fn upsert(record: Record) -> Self {
        match record {
            Record::Expense(r) => Operation::Add(r),
            Record::CategoryBudget(r) => Operation::BudgetUpsert(r),
            Record::FxRate(r) => Operation::FxUpsert(r),
            Record::Rule(r) => Operation::RuleUpsert(r),
            Record::RecurringRule(r) => Operation::RecurUpsert(r),
            Record::Goal(r) => Operation::GoalUpsert(r),
            Record::Member(r) => Operation::MemberUpsert(r),
            Record::Category(r) => Operation::CategoryUpsert(r),
        }
    }

    /// Wraps a tombstone in the delete operation for `kind`.
    pub fn delete(kind: EntityKind, tombstone: Tombstone) -> Self {
        match kind {
            EntityKind::Expense => Operation::Delete(tombstone),
            EntityKind::CategoryBudget => Operation::BudgetDelete(tombstone),
            EntityKind::FxRate => Operation::FxDelete(tombstone),
            EntityKind::Rule => Operation::RuleDelete(tombstone),
            EntityKind::RecurringRule => Operation::RecurDelete(tombstone),
            EntityKind::Goal => Operation::GoalDelete(tombstone),
            EntityKind::Member => Operation::MemberDelete(tombstone),
            EntityKind::Category => Operation::CategoryDelete(tombstone),
        }
    }

    /// The record kind this operation targets.
    pub fn kind(&self) -> EntityKind {
        match self {
            Operation::Add(_) | Operation::Delete(_) => EntityKind::Expense,
            Operation::BudgetUpsert(_) | Operation::BudgetDelete(_) => EntityKind::CategoryBudget,
            Operation::FxUpsert(_) | Operation::FxDelete(_) => EntityKind::FxRate,
            Operation::RuleUpsert(_) | Operation::RuleDelete(_) => EntityKind::Rule,
            Operation::RecurUpsert(_) | Operation::RecurDelete(_) => EntityKind::RecurringRule,
            Operation::GoalUpsert(_) | Operation::GoalDelete(_) => EntityKind::Goal,
            Operation::CategoryUpsert(_) | Operation::CategoryDelete(_) => EntityKind::Category,
            Operation::MemberUpsert(_) | Operation::MemberDelete(_) => EntityKind::Member,
        }
    }

    /// The tombstone, for delete operations.
    pub fn tombstone(&self) -> Option<&Tombstone> {
        match self {
            Operation::Delete(t)
            | Operation::BudgetDelete(t)
            | Operation::FxDelete(t)
            | Operation::RuleDelete(t)
            | Operation::RecurDelete(t)
            | Operation::GoalDelete(t)
            | Operation::CategoryDelete(t)
            | Operation::MemberDelete(t) => Some(t),
            _ => None,
        }
    }

    /// The key of the targeted record.
    pub fn key(&self) -> String {
        match self {
            Operation::Add(r) => r.key(),
            Operation::BudgetUpsert(r) => r.key(),
            Operation::FxUpsert(r) => r.key(),
            Operation::RuleUpsert(r) => r.key(),
            Operation::RecurUpsert(r) => r.key(),
            Operation::GoalUpsert(r) => r.key(),
            Operation::CategoryUpsert(r) => r.key(),
            Operation::MemberUpsert(r) => r.key(),
            Operation::Delete(t)
            | Operation::BudgetDelete(t)
            | Operation::FxDelete(t)
            | Operation::RuleDelete(t)
            | Operation::RecurDelete(t)
            | Operation::GoalDelete(t)
            | Operation::CategoryDelete(t)
            | Operation::MemberDelete(t) => t.key.clone(),
        }
    }

    /// Rewrites the target key into its stored form, so every replica files
    /// the same change under the same key.
    pub fn canonicalize_key(&mut self) {
        let kind = self.kind();
        match self {
            Operation::Add(r) => r.canonicalize_key(),
            Operation::BudgetUpsert(r) => r.canonicalize_key(),
            Operation::FxUpsert(r) => r.canonicalize_key(),
            Operation::RuleUpsert(r) => r.canonicalize_key(),
            Operation::RecurUpsert(r) => r.canonicalize_key(),
            Operation::GoalUpsert(r) => r.canonicalize_key(),
            Operation::CategoryUpsert(r) => r.canonicalize_key(),
            Operation::MemberUpsert(r) => r.canonicalize_key(),
            Operation::Delete(t)
            | Operation::BudgetDelete(t)
            | Operation::FxDelete(t)
            | Operation::RuleDelete(t)
            | Operation::RecurDelete(t)
            | Operation::GoalDelete(t)
            | Operation::CategoryDelete(t)
            | Operation::MemberDelete(t) => t.key = kind.canonical_key(&t.key),
        }
    }

    /// The version stamp carried by the operation.
    pub fn stamp(&self) -> &Stamp {
        match self {
            Operation::Add(r) => &r.ver,
            Operation::BudgetUpsert(r) => &r.ver,
            Operation::FxUpsert(r) => &r.ver,
            Operation::RuleUpsert(r) => &r.ver,
            Operation::RecurUpsert(r) => &r.ver,
            Operation::GoalUpsert(r) => &r.ver,
            Operation::CategoryUpsert(r) => &r.ver,
            Operation::MemberUpsert(r) => &r.ver,
            Operation::Delete(t)
            | Operation::BudgetDelete(t)
            | Operation::FxDelete(t)
            | Operation::RuleDelete(t)
            | Operation::RecurDelete(t)
            | Operation::GoalDelete(t)
            | Operation::CategoryDelete(t)
            | Operation::MemberDelete(t) => &t.ver,
        }
    }

    /// The wire name of the operation kind, e.g. `BUDGET_UPSERT`.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Add(_) => "ADD",
            Operation::Delete(_) => "DELETE",
            Operation::BudgetUpsert(_) => "BUDGET_UPSERT",
            Operation::BudgetDelete(_) => "BUDGET_DELETE",
            Operation::FxUpsert(_) => "FX_UPSERT",
            Operation::FxDelete(_) => "FX_DELETE",
            Operation::RuleUpsert(_) => "RULE_UPSERT",
            Operation::RuleDelete(_) => "RULE_DELETE",
            Operation::RecurUpsert(_) => "RECUR_UPSERT",
            Operation::RecurDelete(_) => "RECUR_DELETE",
            Operation::GoalUpsert(_) => "GOAL_UPSERT",
            Operation::GoalDelete(_) => "GOAL_DELETE",
            Operation::CategoryUpsert(_) => "CATEGORY_UPSERT",
            Operation::CategoryDelete(_) => "CATEGORY_DELETE",
            Operation::MemberUpsert(_) => "MEMBER_UPSERT",
            Operation::MemberDelete(_) => "MEMBER_DELETE",
        }
    }

    /// Applies the operation to `store` with last-writer-wins semantics.
    /// Returns whether the store changed.
    pub fn apply_to(&self, store: &dyn ReplicatedStore) -> StorageResult<bool> {
        match self {
            Operation::Add(r) => store.upsert_if_newer(r),
            Operation::BudgetUpsert(r) => store.upsert_if_newer(r),
            Operation::FxUpsert(r) => store.upsert_if_newer(r),
            Operation::RuleUpsert(r) => store.upsert_if_newer(r),
            Operation::RecurUpsert(r) => store.upsert_if_newer(r),
            Operation::GoalUpsert(r) => store.upsert_if_newer(r),
            Operation::CategoryUpsert(r) => store.upsert_if_newer(r),
            Operation::MemberUpsert(r) => store.upsert_if_newer(r),
            Operation::Delete(t)
            | Operation::BudgetDelete(t)
            | Operation::FxDelete(t)
            | Operation::RuleDelete(t)
            | Operation::RecurDelete(t)
            | Operation::GoalDelete(t)
            | Operation::CategoryDelete(t)
            | Operation::MemberDelete(t) => {
                store.tombstone_if_newer(self.kind(), &t.key, &t.version())
            }
        }
    }

    /// The version the operation competes with.
    pub fn version(&self) -> Version {
        match self.tombstone() {
            Some(t) => t.version(),
            None => Version::new(self.stamp().clone(), self.author()),
        }
    }

    fn author(&self) -> &str {
        match self {
            Operation::Add(r) => &r.author,
            Operation::BudgetUpsert(r) => &r.author,
            Operation::FxUpsert(r) => &r.author,
            Operation::RuleUpsert(r) => &r.author,
            Operation::RecurUpsert(r) => &r.author,
            Operation::GoalUpsert(r) => &r.author,
            Operation::CategoryUpsert(r) => &r.author,
            Operation::MemberUpsert(r) => &r.author,
            Operation::Delete(t)
            | Operation::BudgetDelete(t)
            | Operation::FxDelete(t)
            | Operation::RuleDelete(t)
            | Operation::RecurDelete(t)
            | Operation::GoalDelete(t)
            | Operation::CategoryDelete(t)
            | Operation::MemberDelete(t) => &t.author,
        }
    }
}

/// Out-of-band messages sharing the channel with operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum ControlMessage {
    /// A member announcing a reachable endpoint, `host[port]`.
    #[serde(rename = "ANN")]
    Announce { s: String },
}

/// What a signed envelope carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Control(ControlMessage),
    Operation(Operation),
}

impl Payload {
    /// Serializes to the JSON text that gets signed.
    pub fn to_json(&self) -> SyncResult<String> {
        Ok(match self {
            Payload::Control(c) => serde_json::to_string(c)?,
            Payload::Operation(op) => serde_json::to_string(op)?,
        })
    }

    /// Parses payload JSON, branching on which tag field is present.
    pub fn from_json(json: &str) -> SyncResult<Self> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        let Some(object) = value.as_object() else {
            return Err(SyncError::Protocol("payload is not an object".into()));
        };
        match (object.contains_key("t"), object.contains_key("type")) {
            (true, false) => Ok(Payload::Control(serde_json::from_value(value)?)),
            (false, true) => Ok(Payload::Operation(serde_json::from_value(value)?)),
            (true, true) => Err(SyncError::Protocol("payload has both control and operation tags".into())),
            (false, false) => Err(SyncError::Protocol("payload has no tag".into())),
        }
    }
}

impl From<Operation> for Payload {
    fn from(op: Operation) -> Self {
        Payload::Operation(op)
    }
}

impl From<ControlMessage> for Payload {
    fn from(c: ControlMessage) -> Self {
        Payload::Control(c)
    }
}

/// A payload signed by its sender.
///
/// The signature covers the exact bytes of `payload_json`, so the JSON is
/// carried as a string and never re-serialized before verification.
/// `group_id` travels inside the encrypted body; a receiver drops envelopes
/// addressed to another group even when the passphrase matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedEnvelope {
    pub sender_id: String,
    pub sender_name: String,
    #[serde(default)]
    pub group_id: String,
    pub pub_key_b64: String,
    pub payload_json: String,
    pub sig_b64: String,
}

impl SignedEnvelope {
    /// Signs `payload_json` with `identity`.
    pub fn seal(
        identity: &SigningIdentity,
        sender_id: impl Into<String>,
        sender_name: impl Into<String>,
        payload_json: impl Into<String>,
    ) -> Self {
        let payload_json = payload_json.into();
        Self {
            sender_id: sender_id.into(),
            sender_name: sender_name.into(),
            group_id: String::new(),
            pub_key_b64: identity.public_key().to_base64(),
            sig_b64: identity.sign_base64(payload_json.as_bytes()),
            payload_json,
        }
    }

    /// Addresses the envelope to `group_id`.
    #[must_use]
    pub fn in_group(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = group_id.into();
        self
    }

    /// Checks the signature against the embedded public key and returns the
    /// payload on success.
    pub fn verify(&self) -> CryptoResult<&str> {
        let key = PublicKey::from_base64(&self.pub_key_b64)?;
        key.verify_base64(self.payload_json.as_bytes(), &self.sig_b64)?;
        Ok(&self.payload_json)
    }
}
