//! Events emitted by the counter store.

use aegis_core::PatternEvent;
use std::time::Instant;

/// Availability and maintenance events.
#[derive(Debug, Clone)]
pub enum StoreEvent {
    /// The primary backend failed and the store switched to its fallback.
    BackendDegraded {
        /// When the switch happened.
        at: Instant,
        /// The operation that observed the failure.
        operation: String,
    },
    /// A probe succeeded and the primary backend is serving again.
    BackendRecovered {
        /// When the recovery was observed.
        at: Instant,
    },
    /// A fallback sweep evicted expired keys.
    SweepCompleted {
        /// When the sweep ran.
        at: Instant,
        /// How many keys were evicted.
        evicted: usize,
    },
}

impl PatternEvent for StoreEvent {
    fn kind(&self) -> &'static str {
        match self {
            StoreEvent::BackendDegraded { .. } => "backend_degraded",
            StoreEvent::BackendRecovered { .. } => "backend_recovered",
            StoreEvent::SweepCompleted { .. } => "sweep_completed",
        }
    }

    fn occurred_at(&self) -> Instant {
        match self {
            StoreEvent::BackendDegraded { at, .. }
            | StoreEvent::BackendRecovered { at }
            | StoreEvent::SweepCompleted { at, .. } => *at,
        }
    }

    fn source(&self) -> &str {
        "counter_store"
    }
}
