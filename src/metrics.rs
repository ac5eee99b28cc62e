//! Worker pool observability.
//!
//! The broker publishes a [`PoolStatus`] snapshot after every state change;
//! servers hand out the latest one.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Point-in-time snapshot of one server's worker pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStatus {
    // Gauges
    pub live: usize,
    pub ready: usize,
    pub busy: usize,
    pub pending: usize,

    // Counters
    pub spawned_total: u64,
    pub destroyed_total: u64,
    pub requests_total: u64,
    pub replies_total: u64,
}

impl PoolStatus {
    /// No request is being worked on or waiting for a worker.
    pub fn is_idle(&self) -> bool {
        self.busy == 0 && self.pending == 0
    }
}

impl fmt::Display for PoolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "live={} ready={} busy={} pending={} spawned={} destroyed={} requests={} replies={}",
            self.live,
            self.ready,
            self.busy,
            self.pending,
            self.spawned_total,
            self.destroyed_total,
            self.requests_total,
            self.replies_total
        )
    }
}
