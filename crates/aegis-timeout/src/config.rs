//! Timeout manager configuration.

use crate::events::TimeoutEvent;
use aegis_core::{FnListener, Listeners};
use std::time::Duration;

/// Configuration for bounded execution and resource cleanup.
#[derive(Clone)]
pub struct TimeoutConfig {
    /// Deadline for a single operation.
    pub operation_timeout: Duration,
    /// Optional outer budget covering the whole call, including cleanup
    /// of earlier attempts layered above this manager.
    pub global_timeout: Option<Duration>,
    /// Bound on each resource cleanup function.
    pub cleanup_timeout: Duration,
    /// Resources idle longer than this are retired by the sweeper.
    pub stale_threshold: Duration,
    /// How often the background sweeper runs.
    pub sweep_interval: Duration,
    pub(crate) listeners: Listeners<TimeoutEvent>,
    pub(crate) name: String,
}

impl TimeoutConfig {
    /// Returns a builder with defaults.
    pub fn builder() -> TimeoutConfigBuilder {
        TimeoutConfigBuilder::new()
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        TimeoutConfigBuilder::new().build()
    }
}

/// Builder for [`TimeoutConfig`].
pub struct TimeoutConfigBuilder {
    operation_timeout: Duration,
    global_timeout: Option<Duration>,
    cleanup_timeout: Duration,
    stale_threshold: Duration,
    sweep_interval: Duration,
    listeners: Listeners<TimeoutEvent>,
    name: String,
}

impl Default for TimeoutConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeoutConfigBuilder {
    /// Defaults: 30 s per operation, no global budget, 5 s cleanup bound,
    /// 60 s stale threshold, 5 s sweep interval.
    pub fn new() -> Self {
        Self {
            operation_timeout: Duration::from_secs(30),
            global_timeout: None,
            cleanup_timeout: Duration::from_secs(5),
            stale_threshold: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(5),
            listeners: Listeners::new(),
            name: "<unnamed>".to_string(),
        }
    }

    /// Per-operation deadline.
    pub fn operation_timeout(mut self, d: Duration) -> Self {
        self.operation_timeout = d;
        self
    }

    /// Outer budget for the whole call.
    pub fn global_timeout(mut self, d: Duration) -> Self {
        self.global_timeout = Some(d);
        self
    }

    /// Bound on each cleanup function.
    pub fn cleanup_timeout(mut self, d: Duration) -> Self {
        self.cleanup_timeout = d;
        self
    }

    /// Idle threshold after which the sweeper retires a resource.
    pub fn stale_threshold(mut self, d: Duration) -> Self {
        self.stale_threshold = d;
        self
    }

    /// Sweeper cadence.
    pub fn sweep_interval(mut self, d: Duration) -> Self {
        self.sweep_interval = d;
        self
    }

    /// Name used in events, logs, and metrics.
    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }

    /// Registers a callback when an operation times out.
    pub fn on_timeout<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.listeners.add(FnListener::new(move |event| {
            if matches!(event, TimeoutEvent::OperationTimedOut { .. }) {
                f();
            }
        }));
        self
    }

    /// Registers a callback when a cleanup fails or exceeds its bound.
    pub fn on_cleanup_failed<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.listeners.add(FnListener::new(move |event| {
            if let TimeoutEvent::CleanupFailed { resource_id, .. } = event {
                f(resource_id);
            }
        }));
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> TimeoutConfig {
        TimeoutConfig {
            operation_timeout: self.operation_timeout,
            global_timeout: self.global_timeout,
            cleanup_timeout: self.cleanup_timeout,
            stale_threshold: self.stale_threshold,
            sweep_interval: self.sweep_interval,
            listeners: self.listeners,
            name: self.name,
        }
    }
}
