//! Failure classification for dependency errors.
//!
//! The backoff engine retries only transient classes; auth, validation,
//! and bad-request failures surface immediately.

use std::fmt;

/// Broad class of a dependency failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Connection-level failures: refused, reset, DNS, socket errors.
    Network,
    /// The operation exceeded its deadline.
    Timeout,
    /// The downstream rejected the call for rate reasons (e.g. HTTP 429).
    RateLimit,
    /// 5xx-style failures from the downstream.
    ServerError,
    /// Authentication or authorization failure.
    AuthError,
    /// The request failed input validation.
    Validation,
    /// Malformed request rejected by the downstream.
    BadRequest,
    /// Anything that could not be classified.
    Unknown,
}

impl ErrorClass {
    /// Whether failures of this class are worth retrying.
    pub fn is_retryable(self) -> bool {
        !matches!(
            self,
            ErrorClass::AuthError | ErrorClass::Validation | ErrorClass::BadRequest
        )
    }

    /// Stable label used in events and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorClass::Network => "network",
            ErrorClass::Timeout => "timeout",
            ErrorClass::RateLimit => "rate_limit",
            ErrorClass::ServerError => "server_error",
            ErrorClass::AuthError => "auth_error",
            ErrorClass::Validation => "validation",
            ErrorClass::BadRequest => "bad_request",
            ErrorClass::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Best-effort classification of an error message.
///
/// Used as the default classifier where the caller does not install a
/// typed one. Matching is keyword-based and case-insensitive.
pub fn classify_message(message: &str) -> ErrorClass {
    let msg = message.to_ascii_lowercase();

    if msg.contains("timed out") || msg.contains("timeout") || msg.contains("deadline") {
        ErrorClass::Timeout
    } else if msg.contains("rate limit")
        || msg.contains("too many requests")
        || msg.contains("429")
    {
        ErrorClass::RateLimit
    } else if msg.contains("unauthorized")
        || msg.contains("forbidden")
        || msg.contains("401")
        || msg.contains("403")
        || msg.contains("auth")
    {
        ErrorClass::AuthError
    } else if msg.contains("validation") || msg.contains("invalid") {
        ErrorClass::Validation
    } else if msg.contains("bad request") || msg.contains("400") {
        ErrorClass::BadRequest
    } else if msg.contains("connection")
        || msg.contains("econnrefused")
        || msg.contains("econnreset")
        || msg.contains("network")
        || msg.contains("dns")
        || msg.contains("socket")
        || msg.contains("broken pipe")
    {
        ErrorClass::Network
    } else if msg.contains("internal server")
        || msg.contains("500")
        || msg.contains("502")
        || msg.contains("503")
        || msg.contains("504")
        || msg.contains("unavailable")
    {
        ErrorClass::ServerError
    } else {
        ErrorClass::Unknown
    }
}
