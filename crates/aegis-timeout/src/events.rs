//! Events emitted by the timeout manager.

use aegis_core::PatternEvent;
use std::time::{Duration, Instant};

/// Scope of a timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutScope {
    /// The per-operation deadline elapsed.
    Operation,
    /// The outer global budget elapsed.
    Global,
}

/// Execution and cleanup events.
#[derive(Debug, Clone)]
pub enum TimeoutEvent {
    /// An operation finished (successfully or with its own error).
    OperationCompleted {
        name: String,
        at: Instant,
        operation_id: String,
        duration: Duration,
    },
    /// An operation hit a deadline and was cancelled.
    OperationTimedOut {
        name: String,
        at: Instant,
        operation_id: String,
        scope: TimeoutScope,
        after: Duration,
    },
    /// A resource was registered under an operation.
    ResourceRegistered {
        name: String,
        at: Instant,
        operation_id: String,
        resource_id: String,
    },
    /// A resource's cleanup completed.
    ResourceCleaned {
        name: String,
        at: Instant,
        resource_id: String,
        duration: Duration,
    },
    /// A resource's cleanup failed or exceeded its bound.
    CleanupFailed {
        name: String,
        at: Instant,
        resource_id: String,
        reason: String,
    },
    /// The sweeper retired an idle resource.
    StaleResourceRetired {
        name: String,
        at: Instant,
        resource_id: String,
        idle_for: Duration,
    },
}

impl PatternEvent for TimeoutEvent {
    fn kind(&self) -> &'static str {
        match self {
            TimeoutEvent::OperationCompleted { .. } => "operation_completed",
            TimeoutEvent::OperationTimedOut { .. } => "operation_timed_out",
            TimeoutEvent::ResourceRegistered { .. } => "resource_registered",
            TimeoutEvent::ResourceCleaned { .. } => "resource_cleaned",
            TimeoutEvent::CleanupFailed { .. } => "cleanup_failed",
            TimeoutEvent::StaleResourceRetired { .. } => "stale_resource_retired",
        }
    }

    fn occurred_at(&self) -> Instant {
        match self {
            TimeoutEvent::OperationCompleted { at, .. }
            | TimeoutEvent::OperationTimedOut { at, .. }
            | TimeoutEvent::ResourceRegistered { at, .. }
            | TimeoutEvent::ResourceCleaned { at, .. }
            | TimeoutEvent::CleanupFailed { at, .. }
            | TimeoutEvent::StaleResourceRetired { at, .. } => *at,
        }
    }

    fn source(&self) -> &str {
        match self {
            TimeoutEvent::OperationCompleted { name, .. }
            | TimeoutEvent::OperationTimedOut { name, .. }
            | TimeoutEvent::ResourceRegistered { name, .. }
            | TimeoutEvent::ResourceCleaned { name, .. }
            | TimeoutEvent::CleanupFailed { name, .. }
            | TimeoutEvent::StaleResourceRetired { name, .. } => name,
        }
    }
}
