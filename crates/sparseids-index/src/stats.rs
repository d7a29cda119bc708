//! Per-index operation counters.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    /// Mutations that changed state.
    pub mutations_applied: u64,
    /// Mutations that found nothing to change.
    pub noops: u64,
    /// Mutations refused for a precondition or conflict.
    pub rejected: u64,
    /// Remembered identifiers contradicted by incoming data.
    pub conflicts: u64,
    /// Updates published on the bus.
    pub events_emitted: u64,
    /// Observer callbacks run across all published updates.
    pub deliveries: u64,
}

impl IndexStats {
    pub(crate) fn record_event(&mut self, delivered: usize) {
        self.mutations_applied += 1;
        self.events_emitted += 1;
        self.deliveries += delivered as u64;
    }
}
