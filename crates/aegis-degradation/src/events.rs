//! Events emitted by the degradation manager.

use crate::level::DegradationLevel;
use crate::strategy::DegradedBehavior;
use aegis_core::PatternEvent;
use std::time::{Duration, Instant};

/// Level and feature events.
#[derive(Debug, Clone)]
pub enum DegradationEvent {
    /// The active level changed.
    LevelChanged {
        name: String,
        at: Instant,
        from: DegradationLevel,
        to: DegradationLevel,
        /// What drove the change.
        trigger: String,
        /// Time spent at the previous level.
        dwell: Duration,
    },
    /// A call was served through a degraded path.
    FeatureServedDegraded {
        name: String,
        at: Instant,
        feature: String,
        behavior: DegradedBehavior,
    },
    /// A call to a disabled feature was refused.
    FeatureRefused {
        name: String,
        at: Instant,
        feature: String,
        level: DegradationLevel,
    },
}

impl PatternEvent for DegradationEvent {
    fn kind(&self) -> &'static str {
        match self {
            DegradationEvent::LevelChanged { .. } => "level_changed",
            DegradationEvent::FeatureServedDegraded { .. } => "feature_served_degraded",
            DegradationEvent::FeatureRefused { .. } => "feature_refused",
        }
    }

    fn occurred_at(&self) -> Instant {
        match self {
            DegradationEvent::LevelChanged { at, .. }
            | DegradationEvent::FeatureServedDegraded { at, .. }
            | DegradationEvent::FeatureRefused { at, .. } => *at,
        }
    }

    fn source(&self) -> &str {
        match self {
            DegradationEvent::LevelChanged { name, .. }
            | DegradationEvent::FeatureServedDegraded { name, .. }
            | DegradationEvent::FeatureRefused { name, .. } => name,
        }
    }
}
