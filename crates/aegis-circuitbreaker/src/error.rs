//! Breaker error type.

use std::fmt;
use std::time::Duration;

/// Error returned by [`CircuitBreaker::execute`](crate::CircuitBreaker::execute).
#[derive(Debug, Clone, PartialEq)]
pub enum BreakerError<E> {
    /// The circuit is open and the call was short-circuited.
    Open {
        /// Breaker name.
        name: String,
        /// How long the circuit has been open.
        open_for: Duration,
    },
    /// The wrapped operation failed.
    Inner(E),
}

impl<E> BreakerError<E> {
    /// Whether this error is an open-circuit rejection.
    pub fn is_open(&self) -> bool {
        matches!(self, BreakerError::Open { .. })
    }

    /// Extracts the inner operation error, if any.
    pub fn into_inner(self) -> Option<E> {
        match self {
            BreakerError::Inner(e) => Some(e),
            BreakerError::Open { .. } => None,
        }
    }
}

impl<E: fmt::Display> fmt::Display for BreakerError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BreakerError::Open { name, open_for } => {
                write!(f, "circuit '{name}' is open ({open_for:?})")
            }
            BreakerError::Inner(e) => write!(f, "service call failed: {e}"),
        }
    }
}

impl<E: fmt::Display + fmt::Debug> std::error::Error for BreakerError<E> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn helpers() {
        let open: BreakerError<&str> = BreakerError::Open {
            name: "svc".into(),
            open_for: Duration::from_secs(1),
        };
        assert!(open.is_open());
        assert_eq!(open.into_inner(), None);

        let inner = BreakerError::Inner("boom");
        assert!(!inner.is_open());
        assert_eq!(inner.into_inner(), Some("boom"));
    }
}
