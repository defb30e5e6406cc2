//! Per-level strategy: triggers, feature rules, recovery conditions.

use crate::level::DegradationLevel;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Health observed by the manager; fed externally and by executions.
#[derive(Debug, Clone, Default)]
pub struct HealthSample {
    /// Failure ratio, 0.0..=1.0.
    pub error_rate: f64,
    /// Average response time in milliseconds.
    pub avg_response_time_ms: f64,
    /// Combined resource usage, 0.0..=1.0.
    pub resource_usage: f64,
    /// Free-form gauges for metric-based conditions.
    pub custom: HashMap<String, f64>,
}

/// Condition that pushes the service into a level.
#[derive(Clone)]
pub enum TriggerCondition {
    /// Error rate at or above the threshold.
    ErrorRate(f64),
    /// Average response time at or above the threshold.
    ResponseTime(Duration),
    /// Resource usage at or above the threshold.
    ResourceUsage(f64),
    /// Arbitrary predicate over the health sample.
    Custom(Arc<dyn Fn(&HealthSample) -> bool + Send + Sync>),
}

impl TriggerCondition {
    pub(crate) fn fires(&self, sample: &HealthSample) -> bool {
        match self {
            TriggerCondition::ErrorRate(threshold) => sample.error_rate >= *threshold,
            TriggerCondition::ResponseTime(threshold) => {
                sample.avg_response_time_ms >= threshold.as_secs_f64() * 1000.0
            }
            TriggerCondition::ResourceUsage(threshold) => sample.resource_usage >= *threshold,
            TriggerCondition::Custom(predicate) => predicate(sample),
        }
    }

    pub(crate) fn describe(&self) -> String {
        match self {
            TriggerCondition::ErrorRate(t) => format!("error_rate>={t}"),
            TriggerCondition::ResponseTime(t) => format!("response_time>={t:?}"),
            TriggerCondition::ResourceUsage(t) => format!("resource_usage>={t}"),
            TriggerCondition::Custom(_) => "custom".to_string(),
        }
    }
}

impl std::fmt::Debug for TriggerCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.describe())
    }
}

/// How a feature behaves while its level is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DegradedBehavior {
    /// The feature is off; calls fail with a disabled-feature error.
    Disable,
    /// A caller-supplied simplified implementation is used.
    Simplify,
    /// A caller-supplied cached value is served.
    Cache,
    /// A caller-supplied fallback value is served.
    Fallback,
}

/// A feature and its degraded behavior at some level.
#[derive(Debug, Clone)]
pub struct FeatureRule {
    /// Feature name as used by callers.
    pub name: String,
    /// Essential features keep running in degraded form rather than
    /// being disabled outright.
    pub essential: bool,
    /// Behavior while the level is active.
    pub behavior: DegradedBehavior,
}

impl FeatureRule {
    /// Creates a rule.
    pub fn new(name: impl Into<String>, essential: bool, behavior: DegradedBehavior) -> Self {
        Self {
            name: name.into(),
            essential,
            behavior,
        }
    }
}

/// Condition for stepping back toward FULL.
#[derive(Debug, Clone)]
pub enum RecoveryCondition {
    /// Step up after this long at the level.
    Time {
        /// Minimum dwell time.
        after: Duration,
    },
    /// Step up once the error rate has stayed below a threshold.
    Health {
        /// Error-rate ceiling considered healthy.
        max_error_rate: f64,
        /// How long the rate must hold below the ceiling.
        hold_for: Duration,
    },
    /// Only explicit operator action recovers.
    Manual,
    /// Step up once a custom gauge drops below a threshold.
    Metric {
        /// Gauge name in [`HealthSample::custom`].
        name: String,
        /// Ceiling considered healthy.
        below: f64,
    },
}

/// Everything the manager needs to run one non-FULL level.
#[derive(Clone)]
pub struct LevelStrategy {
    /// The level this strategy describes.
    pub level: DegradationLevel,
    /// Condition that activates the level.
    pub trigger: TriggerCondition,
    /// Feature behaviors while active.
    pub features: Vec<FeatureRule>,
    /// Conditions for stepping back up; any one suffices.
    pub recovery: Vec<RecoveryCondition>,
}

impl LevelStrategy {
    /// Creates a strategy for a level.
    pub fn new(level: DegradationLevel, trigger: TriggerCondition) -> Self {
        Self {
            level,
            trigger,
            features: Vec::new(),
            recovery: Vec::new(),
        }
    }

    /// Adds a feature rule.
    pub fn with_feature(mut self, rule: FeatureRule) -> Self {
        self.features.push(rule);
        self
    }

    /// Adds a recovery condition.
    pub fn with_recovery(mut self, condition: RecoveryCondition) -> Self {
        self.recovery.push(condition);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_rate_trigger_fires_at_threshold() {
        let trigger = TriggerCondition::ErrorRate(0.3);
        let mut sample = HealthSample::default();
        assert!(!trigger.fires(&sample));
        sample.error_rate = 0.35;
        assert!(trigger.fires(&sample));
    }

    #[test]
    fn response_time_trigger_compares_millis() {
        let trigger = TriggerCondition::ResponseTime(Duration::from_millis(500));
        let sample = HealthSample {
            avg_response_time_ms: 600.0,
            ..Default::default()
        };
        assert!(trigger.fires(&sample));
    }

    #[test]
    fn custom_trigger_sees_the_sample() {
        let trigger = TriggerCondition::Custom(Arc::new(|s: &HealthSample| {
            s.custom.get("queue_depth").copied().unwrap_or(0.0) > 100.0
        }));
        let mut sample = HealthSample::default();
        sample.custom.insert("queue_depth".into(), 250.0);
        assert!(trigger.fires(&sample));
    }
}
