//! Replicated records and last-writer-wins storage for BudgetMesh.
//!
//! Every record kind resolves concurrent writes the same way: the write
//! with the greatest [`Version`] wins, deletes leave a [`Tombstone`] that
//! only a strictly newer write can replace, and nothing is ever removed.

mod error;
mod memory;
mod model;
mod sqlite;
mod store;
mod version;

pub use error::{StorageError, StorageResult};
pub use memory::MemoryStore;
pub use model::{
    Category, CategoryBudget, EntityKind, Expense, FxRate, Goal, Member, Period, Record,
    RecurringRule, Replicated, RolloverMode, Rule, RuleKind, Tombstone,
};
pub use sqlite::SqliteStore;
pub use store::{ReplicatedStore, ReplicatedStoreExt, Row};
pub use version::{Version, should_replace};

pub use rust_decimal::Decimal;
