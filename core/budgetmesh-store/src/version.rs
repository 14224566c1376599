//! Last-writer-wins ordering of record versions.
//!
//! Every replicated record carries the stamp of the mutation that produced
//! it and the member that authored it. Versions compare by wall time, then
//! counter, then author id; the stamp's node id is only a final tie-breaker
//! so the order stays total.

use budgetmesh_types::Stamp;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// The (stamp, author) pair that decides which write wins.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Version {
    pub stamp: Stamp,
    pub author: String,
}

impl Version {
    /// Creates a version.
    pub fn new(stamp: Stamp, author: impl Into<String>) -> Self {
        Self {
            stamp,
            author: author.into(),
        }
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.stamp
            .wall_time()
            .cmp(&other.stamp.wall_time())
            .then(self.stamp.counter().cmp(&other.stamp.counter()))
            .then_with(|| self.author.cmp(&other.author))
            .then_with(|| self.stamp.node().cmp(other.stamp.node()))
    }
}

/// Determines if an incoming write should win over what is stored.
///
/// Only a strictly greater version replaces; an equal version is a
/// re-delivery and is ignored.
pub fn should_replace(existing: Option<&Version>, incoming: &Version) -> bool {
    existing.is_none_or(|current| incoming > current)
}
