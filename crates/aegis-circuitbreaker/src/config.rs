//! Circuit breaker configuration.

use crate::events::BreakerEvent;
use crate::BreakerState;
use aegis_core::{FnListener, Listeners};
use std::time::Duration;

/// Configuration for a single breaker.
#[derive(Clone)]
pub struct BreakerConfig {
    /// Consecutive failures that trip the circuit from CLOSED.
    pub failure_threshold: usize,
    /// How long the circuit stays OPEN before probing.
    pub recovery_timeout: Duration,
    /// Consecutive successes in HALF_OPEN required to close.
    pub success_threshold: usize,
    /// Minimum calls inside `time_window` before the error rate applies.
    pub volume_threshold: usize,
    /// Failure ratio (0.0..=1.0) that trips the circuit once the volume
    /// threshold is met.
    pub error_rate: f64,
    /// Window over which calls are counted for the error-rate check.
    pub time_window: Duration,
    /// Concurrent probe calls admitted while HALF_OPEN.
    pub half_open_max_calls: usize,
    /// Bounded call history retained for rate computation.
    pub history_limit: usize,
    pub(crate) listeners: Listeners<BreakerEvent>,
    pub(crate) name: String,
}

impl BreakerConfig {
    /// Returns a builder with defaults.
    pub fn builder() -> BreakerConfigBuilder {
        BreakerConfigBuilder::new()
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        BreakerConfigBuilder::new().build_config()
    }
}

/// Builder for [`BreakerConfig`].
pub struct BreakerConfigBuilder {
    failure_threshold: usize,
    recovery_timeout: Duration,
    success_threshold: usize,
    volume_threshold: usize,
    error_rate: f64,
    time_window: Duration,
    half_open_max_calls: usize,
    history_limit: usize,
    listeners: Listeners<BreakerEvent>,
    name: String,
}

impl Default for BreakerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl BreakerConfigBuilder {
    /// Creates a builder with defaults: 5 consecutive failures, 60 s
    /// recovery, 3 successes to close, 50% error rate over a 60 s window
    /// with at least 10 calls, 3 half-open probes, 100 retained calls.
    pub fn new() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            success_threshold: 3,
            volume_threshold: 10,
            error_rate: 0.5,
            time_window: Duration::from_secs(60),
            half_open_max_calls: 3,
            history_limit: 100,
            listeners: Listeners::new(),
            name: "<unnamed>".to_string(),
        }
    }

    /// Consecutive failures that trip the circuit.
    pub fn failure_threshold(mut self, n: usize) -> Self {
        self.failure_threshold = n;
        self
    }

    /// Time the circuit stays OPEN before a probe call is admitted.
    pub fn recovery_timeout(mut self, d: Duration) -> Self {
        self.recovery_timeout = d;
        self
    }

    /// Consecutive HALF_OPEN successes required to close.
    pub fn success_threshold(mut self, n: usize) -> Self {
        self.success_threshold = n;
        self
    }

    /// Minimum call volume before the error-rate check applies.
    pub fn volume_threshold(mut self, n: usize) -> Self {
        self.volume_threshold = n;
        self
    }

    /// Failure ratio that trips the circuit.
    pub fn error_rate(mut self, rate: f64) -> Self {
        self.error_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Window for the error-rate computation.
    pub fn time_window(mut self, d: Duration) -> Self {
        self.time_window = d;
        self
    }

    /// Concurrent probe calls admitted while HALF_OPEN.
    pub fn half_open_max_calls(mut self, n: usize) -> Self {
        self.half_open_max_calls = n.max(1);
        self
    }

    /// Bound on the retained call history.
    pub fn history_limit(mut self, n: usize) -> Self {
        self.history_limit = n.max(1);
        self
    }

    /// Name used in events, logs, and metrics.
    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }

    /// Registers a callback for state transitions.
    pub fn on_state_transition<F>(mut self, f: F) -> Self
    where
        F: Fn(BreakerState, BreakerState) + Send + Sync + 'static,
    {
        self.listeners.add(FnListener::new(move |event| {
            if let BreakerEvent::StateTransition { from, to, .. } = event {
                f(*from, *to);
            }
        }));
        self
    }

    /// Registers a callback for rejected calls.
    pub fn on_call_rejected<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.listeners.add(FnListener::new(move |event| {
            if matches!(event, BreakerEvent::CallRejected { .. }) {
                f();
            }
        }));
        self
    }

    /// Registers a callback for permitted calls.
    pub fn on_call_permitted<F>(mut self, f: F) -> Self
    where
        F: Fn(BreakerState) + Send + Sync + 'static,
    {
        self.listeners.add(FnListener::new(move |event| {
            if let BreakerEvent::CallPermitted { state, .. } = event {
                f(*state);
            }
        }));
        self
    }

    pub(crate) fn build_config(self) -> BreakerConfig {
        BreakerConfig {
            failure_threshold: self.failure_threshold,
            recovery_timeout: self.recovery_timeout,
            success_threshold: self.success_threshold,
            volume_threshold: self.volume_threshold,
            error_rate: self.error_rate,
            time_window: self.time_window,
            half_open_max_calls: self.half_open_max_calls,
            history_limit: self.history_limit,
            listeners: self.listeners,
            name: self.name,
        }
    }

    /// Builds the configuration.
    pub fn build(self) -> BreakerConfig {
        self.build_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let config = BreakerConfig::builder().build();
        assert_eq!(config.failure_threshold, 5);
        assert_eq!(config.success_threshold, 3);
        assert_eq!(config.half_open_max_calls, 3);
    }

    #[test]
    fn error_rate_is_clamped() {
        let config = BreakerConfig::builder().error_rate(1.7).build();
        assert_eq!(config.error_rate, 1.0);
    }
}
