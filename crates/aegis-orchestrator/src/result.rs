//! Operation definitions and aggregated execution results.
//!
//! The composition layer is payload-agnostic: operations produce opaque
//! JSON values and stringly errors, which is what tool invocations and
//! model calls look like by the time they reach resilience handling.
//! Typed APIs live in the individual pattern crates.

use aegis_circuitbreaker::BreakerConfig;
use aegis_config::BackoffSettings;
use aegis_timeout::CancellationToken;
use futures::future::BoxFuture;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// An executable operation: re-invokable, cancellation-aware.
pub type RunFn =
    Arc<dyn Fn(CancellationToken) -> BoxFuture<'static, Result<Value, String>> + Send + Sync>;

/// Wraps a closure into a [`RunFn`].
pub fn run_fn<F>(f: F) -> RunFn
where
    F: Fn(CancellationToken) -> BoxFuture<'static, Result<Value, String>> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Everything the orchestrator needs to know about one operation.
#[derive(Clone)]
pub struct OperationDefinition {
    /// Stable id; keys backoff metrics and the resource registry.
    pub id: String,
    /// Downstream service; keys the breaker manager.
    pub service: String,
    /// Action name; keys the fallback chain.
    pub action: String,
    /// Essential operations get the full circuit-first composition and
    /// hybrid boundary handling.
    pub essential: bool,
    /// Per-operation deadline override.
    pub timeout: Option<Duration>,
    /// Per-operation retry override.
    pub retry: Option<BackoffSettings>,
    /// Per-service breaker override, installed on first use.
    pub breaker: Option<BreakerConfig>,
    /// Degradation feature gating this operation.
    pub feature: Option<String>,
}

impl OperationDefinition {
    /// Creates a definition.
    pub fn new(
        id: impl Into<String>,
        service: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            service: service.into(),
            action: action.into(),
            essential: false,
            timeout: None,
            retry: None,
            breaker: None,
            feature: None,
        }
    }

    /// Marks the operation essential.
    pub fn essential(mut self) -> Self {
        self.essential = true;
        self
    }

    /// Sets the deadline override.
    pub fn with_timeout(mut self, d: Duration) -> Self {
        self.timeout = Some(d);
        self
    }

    /// Sets the retry override.
    pub fn with_retry(mut self, settings: BackoffSettings) -> Self {
        self.retry = Some(settings);
        self
    }

    /// Sets the breaker override.
    pub fn with_breaker(mut self, config: BreakerConfig) -> Self {
        self.breaker = Some(config);
        self
    }

    /// Names the degradation feature gating this operation.
    pub fn with_feature(mut self, feature: impl Into<String>) -> Self {
        self.feature = Some(feature.into());
        self
    }
}

/// A resilience pattern that participated in an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResiliencePattern {
    CircuitBreaker,
    Timeout,
    Backoff,
    Fallback,
    Degradation,
}

impl ResiliencePattern {
    /// Stable label.
    pub fn as_str(self) -> &'static str {
        match self {
            ResiliencePattern::CircuitBreaker => "circuit_breaker",
            ResiliencePattern::Timeout => "timeout",
            ResiliencePattern::Backoff => "backoff",
            ResiliencePattern::Fallback => "fallback",
            ResiliencePattern::Degradation => "degradation",
        }
    }
}

/// Strategy the orchestrator picked for an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Breaker wrapping timeout wrapping retry, fallback on open.
    CircuitFirst,
    /// Bounded single attempt, fallback chain on failure.
    TimeoutWithFallback,
    /// Retry loop drives the call.
    BackoffRetry,
    /// The degradation manager served the call.
    DegradedPath,
}

impl Strategy {
    /// Stable label.
    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::CircuitFirst => "circuit_first",
            Strategy::TimeoutWithFallback => "timeout_with_fallback",
            Strategy::BackoffRetry => "backoff_retry",
            Strategy::DegradedPath => "degraded_path",
        }
    }
}

/// One step of the execution trace.
#[derive(Debug, Clone)]
pub struct PathStep {
    /// Pattern that acted.
    pub pattern: ResiliencePattern,
    /// What it did.
    pub action: String,
    /// When the step finished.
    pub at: Instant,
    /// How long it took.
    pub duration: Duration,
    /// Whether it succeeded.
    pub ok: bool,
}

/// Aggregated result of one orchestrated execution.
#[derive(Debug, Clone)]
pub struct ResilienceResult {
    /// Whether a value was produced.
    pub success: bool,
    /// Produced payload.
    pub result: Option<Value>,
    /// Terminal failure rendering.
    pub error: Option<String>,
    /// Patterns that participated, in order of first touch.
    pub patterns_used: Vec<ResiliencePattern>,
    /// Step-by-step trace.
    pub execution_path: Vec<PathStep>,
    /// Strategy that drove the execution.
    pub final_strategy: Strategy,
    /// Wall-clock time of the whole call.
    pub total_execution_time: Duration,
    /// Whether a fallback (chain or breaker fallback) served the value.
    pub from_fallback: bool,
    /// Whether a degraded path served the value.
    pub degraded: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn definition_builder_sets_fields() {
        let def = OperationDefinition::new("op-1", "search", "query")
            .essential()
            .with_timeout(Duration::from_secs(5))
            .with_feature("ai_processing");
        assert!(def.essential);
        assert_eq!(def.timeout, Some(Duration::from_secs(5)));
        assert_eq!(def.feature.as_deref(), Some("ai_processing"));
    }

    #[test]
    fn labels_are_stable() {
        assert_eq!(Strategy::CircuitFirst.as_str(), "circuit_first");
        assert_eq!(ResiliencePattern::Backoff.as_str(), "backoff");
    }
}
