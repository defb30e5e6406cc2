//! Admission control and resilience orchestration for request-processing
//! services fronting expensive downstreams (tool invocations, model
//! calls).
//!
//! Two subsystems compose the core:
//!
//! - **Admission** ([`admission`], [`store`]) decides whether a request
//!   may proceed: per-user rate limits and cooldowns over a shared
//!   counter store, behavioral anomaly scoring, and progressive
//!   penalties with allow/deny list overrides.
//! - **Resilience** ([`circuitbreaker`], [`backoff`], [`timeout`],
//!   [`degradation`], [`fallback`], [`orchestrator`]) executes admitted
//!   requests under a composite failure-handling regime: per-service
//!   breakers, adaptive retry with jitter, bounded execution with
//!   resource cleanup, graceful degradation, and an ordered fallback
//!   chain, composed per operation by the orchestrator and wrapped in
//!   error-accumulating boundaries.
//!
//! Each pattern is its own crate, re-exported here behind a feature of
//! the same name; the `full` feature (default) enables everything.
//!
//! # Admission in five lines
//!
//! ```rust
//! # #[cfg(feature = "admission")]
//! # async fn example() {
//! use aegis::admission::{
//!     ActivityConfig, ActivityMonitor, AdmissionGate, GateConfig, GateRequest,
//!     PenaltyConfig, PenaltyManager, RateLimitRule, RateLimiter,
//! };
//! use aegis::store::CounterStore;
//! use std::sync::Arc;
//!
//! let store = Arc::new(CounterStore::in_memory());
//! let gate = AdmissionGate::new(
//!     Arc::new(PenaltyManager::new(PenaltyConfig::default(), Arc::clone(&store))),
//!     Arc::new(RateLimiter::new(Arc::clone(&store), vec![RateLimitRule::new("deploy")])),
//!     Arc::new(ActivityMonitor::new(ActivityConfig::default())),
//!     GateConfig::default(),
//! );
//! let decision = gate.gate(GateRequest::new("u1", "job_trigger")).await;
//! assert!(decision.allowed);
//! # }
//! ```
//!
//! # Resilient execution
//!
//! ```rust
//! # #[cfg(feature = "orchestrator")]
//! # async fn example() {
//! use aegis::orchestrator::{run_fn, OperationDefinition, ResilienceOrchestrator};
//! use aegis::config::StaticConfigProvider;
//! use serde_json::json;
//!
//! let orchestrator = ResilienceOrchestrator::from_provider(&StaticConfigProvider::new());
//! let def = OperationDefinition::new("summarize-1", "llm", "summarize").essential();
//! let result = orchestrator
//!     .execute(run_fn(|_cancel| Box::pin(async { Ok(json!({"summary": "..."})) })), &def)
//!     .await;
//! assert!(result.success);
//! # }
//! ```

pub use aegis_core as core;

#[cfg(feature = "store")]
pub use aegis_store as store;

#[cfg(feature = "admission")]
pub use aegis_admission as admission;

#[cfg(feature = "circuitbreaker")]
pub use aegis_circuitbreaker as circuitbreaker;

#[cfg(feature = "backoff")]
pub use aegis_backoff as backoff;

#[cfg(feature = "timeout")]
pub use aegis_timeout as timeout;

#[cfg(feature = "degradation")]
pub use aegis_degradation as degradation;

#[cfg(feature = "fallback")]
pub use aegis_fallback as fallback;

#[cfg(feature = "orchestrator")]
pub use aegis_orchestrator as orchestrator;

#[cfg(feature = "config")]
pub use aegis_config as config;
