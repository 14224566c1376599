//! The eight replicated record kinds.
//!
//! Each record carries its own `ver` and `author`. A record with `deleted`
//! set is stored as a tombstone: key and version survive, content does not.

use crate::version::Version;
use budgetmesh_types::{RecordId, Stamp};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Discriminates the record kinds sharing one store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Expense,
    CategoryBudget,
    FxRate,
    Rule,
    RecurringRule,
    Goal,
    Member,
    Category,
}

impl EntityKind {
    /// Every kind, in a stable order.
    pub const ALL: [EntityKind; 8] = [
        EntityKind::Expense,
        EntityKind::CategoryBudget,
        EntityKind::FxRate,
        EntityKind::Rule,
        EntityKind::RecurringRule,
        EntityKind::Goal,
        EntityKind::Member,
        EntityKind::Category,
    ];

    /// Stable name used as the storage discriminator.
    pub const fn as_str(self) -> &'static str {
        match self {
            EntityKind::Expense => "expense",
            EntityKind::CategoryBudget => "category_budget",
            EntityKind::FxRate => "fx_rate",
            EntityKind::Rule => "rule",
            EntityKind::RecurringRule => "recurring_rule",
            EntityKind::Goal => "goal",
            EntityKind::Member => "member",
            EntityKind::Category => "category",
        }
    }

    /// The stored form of a key of this kind: trimmed, and upper-cased for
    /// currency codes. Applied to local writes and remote operations alike.
    pub fn canonical_key(self, key: &str) -> String {
        match self {
            EntityKind::FxRate => key.trim().to_ascii_uppercase(),
            _ => key.trim().to_string(),
        }
    }

    /// Inverse of [`EntityKind::as_str`].
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Behaviour shared by every replicated record type.
pub trait Replicated: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// The kind this type is stored under.
    const KIND: EntityKind;

    /// The identifier or natural key.
    fn key(&self) -> String;

    /// The stamp of the write that produced this value.
    fn stamp(&self) -> &Stamp;

    /// The member that authored this value.
    fn author(&self) -> &str;

    /// Returns true if this value is a deletion.
    fn is_deleted(&self) -> bool;

    /// Overwrites `ver` and `author`; called once per local mutation.
    fn restamp(&mut self, stamp: Stamp, author: &str);

    /// Rewrites the key into [`EntityKind::canonical_key`] form. Never
    /// invents a key.
    fn canonicalize_key(&mut self) {}

    /// Local writes only: canonicalizes the key and fills in a fresh
    /// identifier where the record has none.
    fn prepare_key(&mut self) {
        self.canonicalize_key();
    }

    /// Display order of the active list.
    fn order(a: &Self, b: &Self) -> Ordering;

    /// The (stamp, author) pair used for conflict resolution.
    fn version(&self) -> Version {
        Version::new(self.stamp().clone(), self.author())
    }
}

/// Metadata retained for a deleted key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tombstone {
    pub key: String,
    pub ver: Stamp,
    pub author: String,
}

impl Tombstone {
    /// The version this tombstone competes with.
    pub fn version(&self) -> Version {
        Version::new(self.ver.clone(), self.author.clone())
    }
}

fn fresh_id(id: &mut String) {
    if id.trim().is_empty() {
        *id = RecordId::new().to_string();
    }
}

macro_rules! replicated_common {
    () => {
        fn stamp(&self) -> &Stamp {
            &self.ver
        }

        fn author(&self) -> &str {
            &self.author
        }

        fn is_deleted(&self) -> bool {
            self.deleted
        }

        fn restamp(&mut self, stamp: Stamp, author: &str) {
            self.ver = stamp;
            self.author = author.to_string();
        }
    };
}

// ── Expense ──────────────────────────────────────────────────────

/// A single spend by one member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Expense {
    #[serde(default)]
    pub id: String,
    pub who: String,
    pub category: String,
    pub amount: Decimal,
    pub currency: String,
    #[serde(default)]
    pub note: String,
    /// When the spend happened, epoch milliseconds.
    pub ts: u64,
    #[serde(default)]
    pub ver: Stamp,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub deleted: bool,
}

impl Expense {
    /// A new, unstamped expense. The engine assigns id and version.
    pub fn new(
        who: impl Into<String>,
        category: impl Into<String>,
        amount: Decimal,
        currency: impl Into<String>,
        ts: u64,
    ) -> Self {
        Self {
            id: String::new(),
            who: who.into(),
            category: category.into(),
            amount,
            currency: currency.into(),
            note: String::new(),
            ts,
            ver: Stamp::zero(),
            author: String::new(),
            deleted: false,
        }
    }

    /// Sets the free-text note.
    #[must_use]
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = note.into();
        self
    }
}

impl Replicated for Expense {
    const KIND: EntityKind = EntityKind::Expense;

    fn key(&self) -> String {
        self.id.clone()
    }

    replicated_common!();

    fn canonicalize_key(&mut self) {
        self.id = Self::KIND.canonical_key(&self.id);
    }

    fn prepare_key(&mut self) {
        self.canonicalize_key();
        fresh_id(&mut self.id);
    }

    fn order(a: &Self, b: &Self) -> Ordering {
        b.ts.cmp(&a.ts).then_with(|| a.id.cmp(&b.id))
    }
}

// ── CategoryBudget ───────────────────────────────────────────────

/// How unspent or overspent budget carries into the next month.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RolloverMode {
    #[default]
    None,
    Surplus,
    Deficit,
    Both,
}

/// The monthly limit for one category. Keyed by category name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryBudget {
    pub category: String,
    pub monthly_limit: Decimal,
    pub currency: String,
    #[serde(default)]
    pub rollover_mode: RolloverMode,
    #[serde(default)]
    pub rollover_cap: Option<Decimal>,
    #[serde(default)]
    pub ver: Stamp,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub deleted: bool,
}

impl CategoryBudget {
    /// A new, unstamped budget without rollover.
    pub fn new(category: impl Into<String>, monthly_limit: Decimal, currency: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            monthly_limit,
            currency: currency.into(),
            rollover_mode: RolloverMode::None,
            rollover_cap: None,
            ver: Stamp::zero(),
            author: String::new(),
            deleted: false,
        }
    }
}

impl Replicated for CategoryBudget {
    const KIND: EntityKind = EntityKind::CategoryBudget;

    fn key(&self) -> String {
        self.category.clone()
    }

    replicated_common!();

    fn canonicalize_key(&mut self) {
        self.category = Self::KIND.canonical_key(&self.category);
    }

    fn order(a: &Self, b: &Self) -> Ordering {
        a.category.cmp(&b.category)
    }
}

// ── FxRate ───────────────────────────────────────────────────────

/// Units of `code` per unit of the group's base currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FxRate {
    pub code: String,
    pub per_base: Decimal,
    #[serde(default)]
    pub ver: Stamp,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub deleted: bool,
}

impl FxRate {
    /// A new, unstamped rate.
    pub fn new(code: impl Into<String>, per_base: Decimal) -> Self {
        Self {
            code: code.into(),
            per_base,
            ver: Stamp::zero(),
            author: String::new(),
            deleted: false,
        }
    }
}

impl Replicated for FxRate {
    const KIND: EntityKind = EntityKind::FxRate;

    fn key(&self) -> String {
        self.code.clone()
    }

    replicated_common!();

    fn canonicalize_key(&mut self) {
        self.code = Self::KIND.canonical_key(&self.code);
    }

    fn order(a: &Self, b: &Self) -> Ordering {
        a.code.cmp(&b.code)
    }
}

// ── Rule ─────────────────────────────────────────────────────────

/// How a categorization rule matches an expense note.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleKind {
    #[default]
    Substring,
    Regex,
}

/// Auto-categorization rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub kind: RuleKind,
    pub pattern: String,
    pub category: String,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub ver: Stamp,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub deleted: bool,
}

impl Replicated for Rule {
    const KIND: EntityKind = EntityKind::Rule;

    fn key(&self) -> String {
        self.id.clone()
    }

    replicated_common!();

    fn canonicalize_key(&mut self) {
        self.id = Self::KIND.canonical_key(&self.id);
    }

    fn prepare_key(&mut self) {
        self.canonicalize_key();
        fresh_id(&mut self.id);
    }

    fn order(a: &Self, b: &Self) -> Ordering {
        a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id))
    }
}

// ── RecurringRule ────────────────────────────────────────────────

/// Cadence of a recurring expense.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Period {
    #[default]
    Monthly,
    Weekly,
    Yearly,
}

/// Template that an external scheduler materializes into expenses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecurringRule {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub period: Period,
    /// Day of month (monthly/yearly).
    #[serde(default)]
    pub day: u8,
    /// ISO weekday 1..=7 (weekly).
    #[serde(default)]
    pub weekday: u8,
    /// Month 1..=12 (yearly).
    #[serde(default)]
    pub month: u8,
    pub amount: Decimal,
    pub currency: String,
    pub category: String,
    #[serde(default)]
    pub note: String,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub ver: Stamp,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub deleted: bool,
}

impl Replicated for RecurringRule {
    const KIND: EntityKind = EntityKind::RecurringRule;

    fn key(&self) -> String {
        self.id.clone()
    }

    replicated_common!();

    fn canonicalize_key(&mut self) {
        self.id = Self::KIND.canonical_key(&self.id);
    }

    fn prepare_key(&mut self) {
        self.canonicalize_key();
        fresh_id(&mut self.id);
    }

    fn order(a: &Self, b: &Self) -> Ordering {
        a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id))
    }
}

// ── Goal ─────────────────────────────────────────────────────────

/// A savings target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Goal {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub target: Decimal,
    pub currency: String,
    #[serde(default)]
    pub due_ts: Option<u64>,
    #[serde(default)]
    pub ver: Stamp,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub deleted: bool,
}

impl Replicated for Goal {
    const KIND: EntityKind = EntityKind::Goal;

    fn key(&self) -> String {
        self.id.clone()
    }

    replicated_common!();

    fn canonicalize_key(&mut self) {
        self.id = Self::KIND.canonical_key(&self.id);
    }

    fn prepare_key(&mut self) {
        self.canonicalize_key();
        fresh_id(&mut self.id);
    }

    // Goals without a due date sort last.
    fn order(a: &Self, b: &Self) -> Ordering {
        a.due_ts
            .unwrap_or(u64::MAX)
            .cmp(&b.due_ts.unwrap_or(u64::MAX))
            .then_with(|| a.name.cmp(&b.name))
    }
}

// ── Member ───────────────────────────────────────────────────────

/// A group member as shown in the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub ver: Stamp,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub deleted: bool,
}

impl Member {
    /// A new, unstamped member entry.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ver: Stamp::zero(),
            author: String::new(),
            deleted: false,
        }
    }
}

impl Replicated for Member {
    const KIND: EntityKind = EntityKind::Member;

    fn key(&self) -> String {
        self.id.clone()
    }

    replicated_common!();

    fn canonicalize_key(&mut self) {
        self.id = Self::KIND.canonical_key(&self.id);
    }

    fn prepare_key(&mut self) {
        self.canonicalize_key();
        fresh_id(&mut self.id);
    }

    fn order(a: &Self, b: &Self) -> Ordering {
        a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id))
    }
}

// ── Category ─────────────────────────────────────────────────────

/// A spending category. Keyed by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub ver: Stamp,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub deleted: bool,
}

impl Category {
    /// A new, unstamped category with no styling.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            color: None,
            icon: None,
            ver: Stamp::zero(),
            author: String::new(),
            deleted: false,
        }
    }
}

impl Replicated for Category {
    const KIND: EntityKind = EntityKind::Category;

    fn key(&self) -> String {
        self.name.clone()
    }

    replicated_common!();

    fn canonicalize_key(&mut self) {
        self.name = Self::KIND.canonical_key(&self.name);
    }

    fn order(a: &Self, b: &Self) -> Ordering {
        a.name.cmp(&b.name)
    }
}

fn default_true() -> bool {
    true
}

// ── Record ───────────────────────────────────────────────────────

/// Any one replicated record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Expense(Expense),
    CategoryBudget(CategoryBudget),
    FxRate(FxRate),
    Rule(Rule),
    RecurringRule(RecurringRule),
    Goal(Goal),
    Member(Member),
    Category(Category),
}

macro_rules! record_dispatch {
    ($self:expr, $r:ident => $body:expr) => {
        match $self {
            Record::Expense($r) => $body,
            Record::CategoryBudget($r) => $body,
            Record::FxRate($r) => $body,
            Record::Rule($r) => $body,
            Record::RecurringRule($r) => $body,
            Record::Goal($r) => $body,
            Record::Member($r) => $body,
            Record::Category($r) => $body,
        }
    };
}

impl Record {
    /// The kind of the wrapped record.
    pub fn kind(&self) -> EntityKind {
        match self {
            Record::Expense(_) => EntityKind::Expense,
            Record::CategoryBudget(_) => EntityKind::CategoryBudget,
            Record::FxRate(_) => EntityKind::FxRate,
            Record::Rule(_) => EntityKind::Rule,
            Record::RecurringRule(_) => EntityKind::RecurringRule,
            Record::Goal(_) => EntityKind::Goal,
            Record::Member(_) => EntityKind::Member,
            Record::Category(_) => EntityKind::Category,
        }
    }

    /// The wrapped record's key.
    pub fn key(&self) -> String {
        record_dispatch!(self, r => r.key())
    }

    /// The wrapped record's version.
    pub fn version(&self) -> Version {
        record_dispatch!(self, r => r.version())
    }

    /// Returns true if the wrapped record is a deletion.
    pub fn is_deleted(&self) -> bool {
        record_dispatch!(self, r => r.is_deleted())
    }

    /// Restamps the wrapped record.
    pub fn restamp(&mut self, stamp: Stamp, author: &str) {
        record_dispatch!(self, r => r.restamp(stamp, author))
    }

    /// Assigns a fresh id or canonicalizes the natural key.
    pub fn prepare_key(&mut self) {
        record_dispatch!(self, r => r.prepare_key())
    }

    /// Canonicalizes the key without assigning one.
    pub fn canonicalize_key(&mut self) {
        record_dispatch!(self, r => r.canonicalize_key())
    }
}

macro_rules! record_from {
    ($($variant:ident),* $(,)?) => {
        $(
            impl From<$variant> for Record {
                fn from(value: $variant) -> Self {
                    Record::$variant(value)
                }
            }
        )*
    };
}

record_from!(
    Expense,
    CategoryBudget,
    FxRate,
    Rule,
    RecurringRule,
    Goal,
    Member,
    Category,
);
