//! Events emitted by the backoff engine.

use aegis_core::{ErrorClass, PatternEvent};
use std::time::{Duration, Instant};

/// Optional per-call context carried into events.
#[derive(Debug, Clone, Default)]
pub struct BackoffContext {
    /// The user on whose behalf the operation runs.
    pub user_id: Option<String>,
    /// Originating channel, when applicable.
    pub channel: Option<String>,
}

/// Retry lifecycle events.
#[derive(Debug, Clone)]
pub enum BackoffEvent {
    /// An attempt is starting.
    AttemptStarted {
        operation: String,
        at: Instant,
        attempt: usize,
    },
    /// An attempt failed with the given class.
    AttemptFailed {
        operation: String,
        at: Instant,
        attempt: usize,
        class: ErrorClass,
    },
    /// A retry will run after `delay`.
    RetryScheduled {
        operation: String,
        at: Instant,
        attempt: usize,
        delay: Duration,
    },
    /// The operation succeeded.
    Succeeded {
        operation: String,
        at: Instant,
        attempts: usize,
        context: Option<BackoffContext>,
    },
    /// Every attempt failed.
    Exhausted {
        operation: String,
        at: Instant,
        attempts: usize,
        context: Option<BackoffContext>,
    },
    /// A non-retryable failure ended the loop immediately.
    NonRetryable {
        operation: String,
        at: Instant,
        class: ErrorClass,
        context: Option<BackoffContext>,
    },
}

impl PatternEvent for BackoffEvent {
    fn kind(&self) -> &'static str {
        match self {
            BackoffEvent::AttemptStarted { .. } => "attempt_started",
            BackoffEvent::AttemptFailed { .. } => "attempt_failed",
            BackoffEvent::RetryScheduled { .. } => "retry_scheduled",
            BackoffEvent::Succeeded { .. } => "succeeded",
            BackoffEvent::Exhausted { .. } => "exhausted",
            BackoffEvent::NonRetryable { .. } => "non_retryable",
        }
    }

    fn occurred_at(&self) -> Instant {
        match self {
            BackoffEvent::AttemptStarted { at, .. }
            | BackoffEvent::AttemptFailed { at, .. }
            | BackoffEvent::RetryScheduled { at, .. }
            | BackoffEvent::Succeeded { at, .. }
            | BackoffEvent::Exhausted { at, .. }
            | BackoffEvent::NonRetryable { at, .. } => *at,
        }
    }

    fn source(&self) -> &str {
        match self {
            BackoffEvent::AttemptStarted { operation, .. }
            | BackoffEvent::AttemptFailed { operation, .. }
            | BackoffEvent::RetryScheduled { operation, .. }
            | BackoffEvent::Succeeded { operation, .. }
            | BackoffEvent::Exhausted { operation, .. }
            | BackoffEvent::NonRetryable { operation, .. } => operation,
        }
    }
}
