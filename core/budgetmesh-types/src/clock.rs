//! The node-local logical clock.
//!
//! Based on the HLC algorithm from "Logical Physical Clocks" (Kulkarni et al.).
//! One instance per node, shared behind an `Arc`; `tick` and `merge` are a
//! single critical section so no caller ever sees a half-updated
//! (wall, counter) pair.

use crate::Stamp;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of wall-clock milliseconds. Injectable so tests can freeze time.
pub type TimeSource = Arc<dyn Fn() -> u64 + Send + Sync>;

/// Milliseconds since the Unix epoch according to the system clock.
pub fn system_now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

#[derive(Debug, Default, Clone, Copy)]
struct ClockState {
    wall_time: u64,
    counter: u32,
}

/// The successor of (wall, counter). A full counter carries into the wall
/// time so the result still orders strictly after its input.
fn successor(wall_time: u64, counter: u32) -> (u64, u32) {
    match counter.checked_add(1) {
        Some(counter) => (wall_time, counter),
        None => (wall_time.saturating_add(1), 0),
    }
}

/// Issues causality-respecting [`Stamp`]s for a single node.
pub struct LogicalClock {
    node: String,
    state: Mutex<ClockState>,
    now: TimeSource,
}

impl LogicalClock {
    /// Creates a clock for `node` driven by the system clock.
    pub fn new(node: impl Into<String>) -> Self {
        Self::with_time_source(node, Arc::new(system_now_millis))
    }

    /// Creates a clock with an explicit time source.
    pub fn with_time_source(node: impl Into<String>, now: TimeSource) -> Self {
        Self {
            node: node.into(),
            state: Mutex::new(ClockState::default()),
            now,
        }
    }

    /// The node id stamped into every issued stamp.
    pub fn node(&self) -> &str {
        &self.node
    }

    /// Issues a stamp for a new local event.
    ///
    /// The result is greater than every stamp previously issued or merged by
    /// this clock.
    pub fn tick(&self) -> Stamp {
        let now = (self.now)();
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        if now > state.wall_time {
            state.wall_time = now;
            state.counter = 0;
        } else {
            (state.wall_time, state.counter) = successor(state.wall_time, state.counter);
        }

        Stamp::new(state.wall_time, state.counter, self.node.clone())
    }

    /// Advances the clock past an observed remote stamp.
    ///
    /// Returns a new local stamp that is strictly greater than both the
    /// previous local state and `remote`.
    pub fn merge(&self, remote: &Stamp) -> Stamp {
        let now = (self.now)();
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        let local_wall = state.wall_time;
        let remote_wall = remote.wall_time();
        let wall_time = now.max(local_wall).max(remote_wall);

        let (wall_time, counter) = if wall_time == local_wall && wall_time == remote_wall {
            successor(wall_time, state.counter.max(remote.counter()))
        } else if wall_time == local_wall {
            successor(wall_time, state.counter)
        } else if wall_time == remote_wall {
            successor(wall_time, remote.counter())
        } else {
            (wall_time, 0)
        };

        state.wall_time = wall_time;
        state.counter = counter;

        Stamp::new(wall_time, counter, self.node.clone())
    }

    /// The most recent (wall, counter) issued, without advancing the clock.
    pub fn last(&self) -> Stamp {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        Stamp::new(state.wall_time, state.counter, self.node.clone())
    }
}

impl fmt::Debug for LogicalClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogicalClock")
            .field("node", &self.node)
            .field("last", &self.last())
            .finish()
    }
}
