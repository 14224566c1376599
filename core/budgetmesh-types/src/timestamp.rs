//! Version stamps for causal ordering.
//!
//! A stamp combines physical time with a logical counter and the id of the
//! node that issued it:
//! - Monotonicity (a node never issues the same stamp twice)
//! - Causality (a stamp produced after observing A is greater than A)
//! - Determinism (equal wall time and counter fall back to the node id)

use crate::Error;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// A hybrid logical clock stamp.
///
/// Consists of:
/// - `wall_time`: Milliseconds since Unix epoch (physical component)
/// - `counter`: Logical counter for events at the same wall time
/// - `node`: Id of the issuing node, used as the final tie-breaker
///
/// The text form is `wall:counter:node`, which is also the serde
/// representation. An empty string deserializes to [`Stamp::zero`], the
/// placeholder callers use when they let the engine stamp a record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Stamp {
    wall_time: u64,
    counter: u32,
    node: String,
}

impl Stamp {
    /// Creates a stamp from components.
    #[must_use]
    pub fn new(wall_time: u64, counter: u32, node: impl Into<String>) -> Self {
        Self {
            wall_time,
            counter,
            node: node.into(),
        }
    }

    /// The unset stamp. Lower than every stamp a clock can issue.
    #[must_use]
    pub fn zero() -> Self {
        Self::new(0, 0, "")
    }

    /// Returns true for the unset stamp.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.wall_time == 0 && self.counter == 0 && self.node.is_empty()
    }

    /// Returns the wall time component.
    #[must_use]
    pub const fn wall_time(&self) -> u64 {
        self.wall_time
    }

    /// Returns the logical counter.
    #[must_use]
    pub const fn counter(&self) -> u32 {
        self.counter
    }

    /// Returns the issuing node id.
    #[must_use]
    pub fn node(&self) -> &str {
        &self.node
    }

    /// Returns true if this stamp orders strictly before the other.
    #[must_use]
    pub fn is_before(&self, other: &Self) -> bool {
        self < other
    }

    /// Returns true if this stamp orders strictly after the other.
    #[must_use]
    pub fn is_after(&self, other: &Self) -> bool {
        self > other
    }
}

impl Default for Stamp {
    fn default() -> Self {
        Self::zero()
    }
}

impl PartialOrd for Stamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Stamp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.wall_time
            .cmp(&other.wall_time)
            .then(self.counter.cmp(&other.counter))
            .then_with(|| self.node.cmp(&other.node))
    }
}

impl fmt::Display for Stamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.wall_time, self.counter, self.node)
    }
}

impl FromStr for Stamp {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Ok(Self::zero());
        }
        // The node id may itself contain ':' so only split off the first two fields.
        let mut parts = s.splitn(3, ':');
        let (Some(wall), Some(counter), Some(node)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(Error(format!("expected wall:counter:node, got {s:?}")));
        };
        let wall_time = wall
            .parse::<u64>()
            .map_err(|e| Error(format!("bad wall time {wall:?}: {e}")))?;
        let counter = counter
            .parse::<u32>()
            .map_err(|e| Error(format!("bad counter {counter:?}: {e}")))?;
        Ok(Self::new(wall_time, counter, node))
    }
}

impl Serialize for Stamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Stamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}
