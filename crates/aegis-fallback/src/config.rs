//! Fallback chain configuration.

use crate::events::FallbackEvent;
use aegis_core::{FnListener, Listeners};
use serde_json::Value;
use std::time::Duration;

/// Configuration for the fallback chain.
#[derive(Clone)]
pub struct FallbackConfig {
    /// Deadline for each candidate attempt.
    pub fallback_timeout: Duration,
    /// Maximum candidates tried per call.
    pub max_chain_length: usize,
    /// Whether a canned value is returned when every candidate fails.
    pub enable_emergency_fallback: bool,
    /// The canned value.
    pub emergency_value: Value,
    pub(crate) listeners: Listeners<FallbackEvent>,
    pub(crate) name: String,
}

impl FallbackConfig {
    /// Returns a builder with defaults.
    pub fn builder() -> FallbackConfigBuilder {
        FallbackConfigBuilder::new()
    }
}

impl Default for FallbackConfig {
    fn default() -> Self {
        FallbackConfigBuilder::new().build()
    }
}

/// Builder for [`FallbackConfig`].
pub struct FallbackConfigBuilder {
    fallback_timeout: Duration,
    max_chain_length: usize,
    enable_emergency_fallback: bool,
    emergency_value: Value,
    listeners: Listeners<FallbackEvent>,
    name: String,
}

impl Default for FallbackConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FallbackConfigBuilder {
    /// Defaults: 10 s per candidate, chain of at most 3, emergency
    /// fallback enabled with a generic unavailable message.
    pub fn new() -> Self {
        Self {
            fallback_timeout: Duration::from_secs(10),
            max_chain_length: 3,
            enable_emergency_fallback: true,
            emergency_value: serde_json::json!({
                "status": "unavailable",
                "message": "all tools failed; please retry later",
            }),
            listeners: Listeners::new(),
            name: "<unnamed>".to_string(),
        }
    }

    /// Per-candidate deadline.
    pub fn fallback_timeout(mut self, d: Duration) -> Self {
        self.fallback_timeout = d;
        self
    }

    /// Maximum candidates tried.
    pub fn max_chain_length(mut self, n: usize) -> Self {
        self.max_chain_length = n.max(1);
        self
    }

    /// Enables or disables the emergency fallback.
    pub fn enable_emergency_fallback(mut self, enabled: bool) -> Self {
        self.enable_emergency_fallback = enabled;
        self
    }

    /// Canned value returned when every candidate fails.
    pub fn emergency_value(mut self, value: Value) -> Self {
        self.emergency_value = value;
        self
    }

    /// Name used in events, logs, and metrics.
    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }

    /// Registers a callback when a candidate fails.
    pub fn on_candidate_failed<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.listeners.add(FnListener::new(move |event| {
            if let FallbackEvent::CandidateFailed { tool, .. } = event {
                f(tool);
            }
        }));
        self
    }

    /// Registers a callback when the emergency fallback is served.
    pub fn on_emergency_used<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.listeners.add(FnListener::new(move |event| {
            if matches!(event, FallbackEvent::EmergencyUsed { .. }) {
                f();
            }
        }));
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> FallbackConfig {
        FallbackConfig {
            fallback_timeout: self.fallback_timeout,
            max_chain_length: self.max_chain_length,
            enable_emergency_fallback: self.enable_emergency_fallback,
            emergency_value: self.emergency_value,
            listeners: self.listeners,
            name: self.name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let config = FallbackConfig::builder().build();
        assert_eq!(config.max_chain_length, 3);
        assert!(config.enable_emergency_fallback);
    }

    #[test]
    fn chain_length_floor_is_one() {
        let config = FallbackConfig::builder().max_chain_length(0).build();
        assert_eq!(config.max_chain_length, 1);
    }
}
