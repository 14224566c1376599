//! Identifiers, version stamps and the logical clock shared by every
//! BudgetMesh crate.
//!
//! Record payloads (expenses, budgets, ...) live in `budgetmesh-store`.

mod clock;
mod ids;
mod timestamp;

pub use clock::{LogicalClock, TimeSource, system_now_millis};
pub use ids::{MemberId, RecordId};
pub use timestamp::Stamp;

/// A stamp string that is not `wall:counter:node`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid stamp: {0}")]
pub struct Error(String);
