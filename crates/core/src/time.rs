//! Virtual-time types for the distributed time-quantum protocol.
//!
//! Virtual time is signed nanoseconds. The sentinel value −1 marks a peer
//! that has not published its first step yet.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One pending simulation step of a participant: the earliest virtual
/// instant it is willing to execute next, and the step length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextSimTask {
    /// Virtual time point in nanoseconds. Monotonically non-decreasing per
    /// participant; −1 before the first step.
    pub time_point: i64,
    /// Step duration in nanoseconds, > 0 once published.
    pub duration: i64,
}

impl NextSimTask {
    /// The state a peer is tracked with before its first publication.
    pub const UNPUBLISHED: NextSimTask = NextSimTask { time_point: -1, duration: 0 };

    pub fn new(time_point: i64, duration: i64) -> Self {
        Self { time_point, duration }
    }
}

/// Convert a wall-clock style `Duration` into virtual nanoseconds.
pub fn duration_to_nanos(d: Duration) -> i64 {
    i64::try_from(d.as_nanos()).unwrap_or(i64::MAX)
}

#[cfg(test)]
#[path = "time_tests.rs"]
mod tests;
