//! Degradation levels.

/// Service level, from fully featured to survival mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DegradationLevel {
    /// All features active.
    Full,
    /// Non-essential features degraded.
    Reduced,
    /// Only essential features, in degraded form.
    Minimal,
    /// Survival mode.
    Emergency,
}

impl DegradationLevel {
    /// Numeric severity; higher is more degraded.
    pub fn severity(self) -> u8 {
        match self {
            DegradationLevel::Full => 0,
            DegradationLevel::Reduced => 1,
            DegradationLevel::Minimal => 2,
            DegradationLevel::Emergency => 3,
        }
    }

    /// Whether `self` is more degraded than `other`.
    pub fn is_worse_than(self, other: DegradationLevel) -> bool {
        self.severity() > other.severity()
    }

    /// One step toward FULL, or `None` when already there.
    pub fn step_up(self) -> Option<DegradationLevel> {
        match self {
            DegradationLevel::Full => None,
            DegradationLevel::Reduced => Some(DegradationLevel::Full),
            DegradationLevel::Minimal => Some(DegradationLevel::Reduced),
            DegradationLevel::Emergency => Some(DegradationLevel::Minimal),
        }
    }

    /// Stable label for logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            DegradationLevel::Full => "full",
            DegradationLevel::Reduced => "reduced",
            DegradationLevel::Minimal => "minimal",
            DegradationLevel::Emergency => "emergency",
        }
    }
}

impl std::fmt::Display for DegradationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
