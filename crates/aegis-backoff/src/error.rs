//! Backoff error type.

use aegis_core::ErrorClass;
use std::fmt;

/// Terminal failure of a retried operation.
#[derive(Debug, Clone, PartialEq)]
pub enum BackoffError<E> {
    /// Every attempt failed.
    Exhausted {
        /// Attempts made, including the first.
        attempts: usize,
        /// Class of the final failure.
        last_class: ErrorClass,
        /// The final failure; absent when the last attempt timed out.
        last: Option<E>,
    },
    /// A non-retryable failure ended the loop immediately.
    NonRetryable {
        /// Class of the failure.
        class: ErrorClass,
        /// The failure itself.
        error: E,
    },
    /// The total budget elapsed before a success.
    TotalTimeout {
        /// Attempts made before the budget ran out.
        attempts: usize,
    },
}

impl<E> BackoffError<E> {
    /// Whether the loop stopped on a non-retryable class.
    pub fn is_non_retryable(&self) -> bool {
        matches!(self, BackoffError::NonRetryable { .. })
    }

    /// Whether the total budget ran out.
    pub fn is_total_timeout(&self) -> bool {
        matches!(self, BackoffError::TotalTimeout { .. })
    }

    /// Extracts the underlying failure, when one is carried.
    pub fn into_inner(self) -> Option<E> {
        match self {
            BackoffError::Exhausted { last, .. } => last,
            BackoffError::NonRetryable { error, .. } => Some(error),
            BackoffError::TotalTimeout { .. } => None,
        }
    }
}

impl<E: fmt::Display> fmt::Display for BackoffError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackoffError::Exhausted {
                attempts,
                last_class,
                last,
            } => match last {
                Some(err) => write!(f, "exhausted after {attempts} attempts ({last_class}): {err}"),
                None => write!(f, "exhausted after {attempts} attempts ({last_class})"),
            },
            BackoffError::NonRetryable { class, error } => {
                write!(f, "non-retryable {class} failure: {error}")
            }
            BackoffError::TotalTimeout { attempts } => {
                write!(f, "retry budget elapsed after {attempts} attempts")
            }
        }
    }
}

impl<E: fmt::Display + fmt::Debug> std::error::Error for BackoffError<E> {}
