//! Timeout error type.

use crate::events::TimeoutScope;
use std::fmt;
use std::time::Duration;

/// Failure of a bounded execution.
#[derive(Debug, Clone, PartialEq)]
pub enum TimeoutError<E> {
    /// A deadline elapsed and the operation was cancelled.
    Elapsed {
        /// Which deadline fired.
        scope: TimeoutScope,
        /// The configured deadline.
        after: Duration,
    },
    /// The operation itself failed before any deadline.
    Inner(E),
}

impl<E> TimeoutError<E> {
    /// Whether this failure is a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, TimeoutError::Elapsed { .. })
    }

    /// Extracts the operation's own error, if any.
    pub fn into_inner(self) -> Option<E> {
        match self {
            TimeoutError::Inner(e) => Some(e),
            TimeoutError::Elapsed { .. } => None,
        }
    }
}

impl<E: fmt::Display> fmt::Display for TimeoutError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeoutError::Elapsed { scope, after } => {
                let label = match scope {
                    TimeoutScope::Operation => "operation",
                    TimeoutScope::Global => "global",
                };
                write!(f, "{label} timeout after {after:?}")
            }
            TimeoutError::Inner(e) => write!(f, "operation failed: {e}"),
        }
    }
}

impl<E: fmt::Display + fmt::Debug> std::error::Error for TimeoutError<E> {}
