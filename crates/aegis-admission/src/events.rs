//! Events emitted by the admission subsystem.

use aegis_core::PatternEvent;
use std::time::Instant;

/// What an admission event reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionEventKind {
    /// A request was admitted.
    Allowed,
    /// A request was denied.
    Blocked,
    /// A warning-level observation.
    Warning,
    /// A penalty was applied.
    Penalty,
    /// A user's activity scored suspicious.
    Suspicious,
    /// An internal error occurred (the request was failed open).
    Error,
}

impl AdmissionEventKind {
    /// Stable label.
    pub fn as_str(self) -> &'static str {
        match self {
            AdmissionEventKind::Allowed => "allowed",
            AdmissionEventKind::Blocked => "blocked",
            AdmissionEventKind::Warning => "warning",
            AdmissionEventKind::Penalty => "penalty",
            AdmissionEventKind::Suspicious => "suspicious",
            AdmissionEventKind::Error => "error",
        }
    }
}

/// One admission event; the gate keeps a bounded ring of these.
#[derive(Debug, Clone)]
pub struct AdmissionEvent {
    /// Event kind.
    pub kind: AdmissionEventKind,
    /// The user concerned.
    pub user_id: String,
    /// The action requested.
    pub action: String,
    /// When it happened.
    pub at: Instant,
    /// Free-form detail.
    pub detail: Option<String>,
}

impl PatternEvent for AdmissionEvent {
    fn kind(&self) -> &'static str {
        self.kind.as_str()
    }

    fn occurred_at(&self) -> Instant {
        self.at
    }

    fn source(&self) -> &str {
        "admission"
    }
}
