//! Events emitted by circuit breakers.

use crate::BreakerState;
use aegis_core::PatternEvent;
use std::time::{Duration, Instant};

/// Breaker lifecycle events.
#[derive(Debug, Clone)]
pub enum BreakerEvent {
    /// The circuit moved between states.
    StateTransition {
        name: String,
        at: Instant,
        from: BreakerState,
        to: BreakerState,
    },
    /// A call was admitted.
    CallPermitted {
        name: String,
        at: Instant,
        state: BreakerState,
    },
    /// A call was short-circuited.
    CallRejected { name: String, at: Instant },
    /// A call completed successfully.
    SuccessRecorded {
        name: String,
        at: Instant,
        duration: Duration,
    },
    /// A call failed.
    FailureRecorded {
        name: String,
        at: Instant,
        duration: Duration,
    },
}

impl PatternEvent for BreakerEvent {
    fn kind(&self) -> &'static str {
        match self {
            BreakerEvent::StateTransition { .. } => "state_transition",
            BreakerEvent::CallPermitted { .. } => "call_permitted",
            BreakerEvent::CallRejected { .. } => "call_rejected",
            BreakerEvent::SuccessRecorded { .. } => "success_recorded",
            BreakerEvent::FailureRecorded { .. } => "failure_recorded",
        }
    }

    fn occurred_at(&self) -> Instant {
        match self {
            BreakerEvent::StateTransition { at, .. }
            | BreakerEvent::CallPermitted { at, .. }
            | BreakerEvent::CallRejected { at, .. }
            | BreakerEvent::SuccessRecorded { at, .. }
            | BreakerEvent::FailureRecorded { at, .. } => *at,
        }
    }

    fn source(&self) -> &str {
        match self {
            BreakerEvent::StateTransition { name, .. }
            | BreakerEvent::CallPermitted { name, .. }
            | BreakerEvent::CallRejected { name, .. }
            | BreakerEvent::SuccessRecorded { name, .. }
            | BreakerEvent::FailureRecorded { name, .. } => name,
        }
    }
}
