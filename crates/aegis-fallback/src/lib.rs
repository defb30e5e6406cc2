//! Ordered fallback chain over a tool capability registry.
//!
//! When a service's primary tool fails terminally, the chain tries
//! alternative tools that support the same action, ordered by user-intent
//! match, reliability, and priority, each within `fallback_timeout` and
//! capped at `max_chain_length`. If every candidate fails and the
//! emergency fallback is enabled, a canned value is returned and the
//! outcome is marked `emergency_fallback_used`.
//!
//! Tool results are opaque JSON payloads.
//!
//! # Example
//!
//! ```rust
//! use aegis_fallback::{FallbackChain, FallbackConfig, ToolCapability};
//! use serde_json::json;
//!
//! # async fn example() {
//! let chain = FallbackChain::new(FallbackConfig::default());
//! chain.registry().register(
//!     ToolCapability::new("web-search").with_action("search"),
//! );
//!
//! let outcome = chain
//!     .execute("web-search", "search", None, |tool, _action| {
//!         let tool = tool.name.clone();
//!         Box::pin(async move { Ok(json!({ "served_by": tool })) })
//!     })
//!     .await;
//! assert!(outcome.success);
//! # }
//! ```

mod config;
mod events;
mod registry;

pub use config::{FallbackConfig, FallbackConfigBuilder};
pub use events::FallbackEvent;
pub use registry::{CapabilityRegistry, ToolCapability};

use futures::future::BoxFuture;
use serde_json::Value;
use std::time::Instant;

/// Result of running the chain.
#[derive(Debug, Clone)]
pub struct ChainOutcome {
    /// Whether any candidate (or the emergency fallback) produced a value.
    pub success: bool,
    /// The produced value.
    pub result: Option<Value>,
    /// Last failure reason when nothing succeeded.
    pub error: Option<String>,
    /// Zero-based position of the successful candidate in the chain.
    pub used_level: Option<usize>,
    /// Name of the tool that served the call.
    pub used_tool: Option<String>,
    /// Whether the canned emergency value was served.
    pub emergency_fallback_used: bool,
    /// Candidates tried.
    pub attempts: usize,
}

/// Executor invoked per candidate: receives the tool and the action.
pub type ToolExecutor<'a> =
    dyn Fn(&ToolCapability, &str) -> BoxFuture<'static, Result<Value, String>> + Send + Sync + 'a;

/// Tries alternative tools in order when the primary fails.
pub struct FallbackChain {
    config: FallbackConfig,
    registry: CapabilityRegistry,
}

impl FallbackChain {
    /// Creates a chain with an empty registry.
    pub fn new(config: FallbackConfig) -> Self {
        Self {
            config,
            registry: CapabilityRegistry::new(),
        }
    }

    /// The underlying capability registry.
    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    /// The chain configuration.
    pub fn config(&self) -> &FallbackConfig {
        &self.config
    }

    /// Runs the chain for `(service, action)`, trying each candidate with
    /// `executor` until one succeeds.
    pub async fn execute<F>(
        &self,
        service: &str,
        action: &str,
        user_intent: Option<&str>,
        executor: F,
    ) -> ChainOutcome
    where
        F: Fn(&ToolCapability, &str) -> BoxFuture<'static, Result<Value, String>> + Send + Sync,
    {
        let candidates =
            self.registry
                .candidates(service, action, user_intent, self.config.max_chain_length);

        let mut last_error: Option<String> = None;
        let mut attempts = 0;

        for (position, tool) in candidates.iter().enumerate() {
            attempts += 1;
            self.config.listeners.emit(&FallbackEvent::CandidateTried {
                name: self.config.name.clone(),
                at: Instant::now(),
                tool: tool.name.clone(),
                position,
            });

            let started = Instant::now();
            let result =
                tokio::time::timeout(self.config.fallback_timeout, executor(tool, action)).await;

            match result {
                Ok(Ok(value)) => {
                    self.config
                        .listeners
                        .emit(&FallbackEvent::CandidateSucceeded {
                            name: self.config.name.clone(),
                            at: Instant::now(),
                            tool: tool.name.clone(),
                            position,
                            duration: started.elapsed(),
                        });

                    #[cfg(feature = "metrics")]
                    metrics::counter!("aegis_fallback_calls_total", "chain" => self.config.name.clone(), "outcome" => "success")
                        .increment(1);

                    return ChainOutcome {
                        success: true,
                        result: Some(value),
                        error: None,
                        used_level: Some(position),
                        used_tool: Some(tool.name.clone()),
                        emergency_fallback_used: false,
                        attempts,
                    };
                }
                Ok(Err(reason)) => {
                    self.record_failure(&tool.name, reason.clone());
                    last_error = Some(reason);
                }
                Err(_) => {
                    let reason = format!(
                        "tool '{}' exceeded fallback timeout {:?}",
                        tool.name, self.config.fallback_timeout
                    );
                    self.record_failure(&tool.name, reason.clone());
                    last_error = Some(reason);
                }
            }
        }

        if self.config.enable_emergency_fallback {
            self.config.listeners.emit(&FallbackEvent::EmergencyUsed {
                name: self.config.name.clone(),
                at: Instant::now(),
            });
            tracing::warn!(service, action, "every candidate failed, serving emergency value");

            #[cfg(feature = "metrics")]
            metrics::counter!("aegis_fallback_calls_total", "chain" => self.config.name.clone(), "outcome" => "emergency")
                .increment(1);

            return ChainOutcome {
                success: true,
                result: Some(self.config.emergency_value.clone()),
                error: last_error,
                used_level: None,
                used_tool: None,
                emergency_fallback_used: true,
                attempts,
            };
        }

        #[cfg(feature = "metrics")]
        metrics::counter!("aegis_fallback_calls_total", "chain" => self.config.name.clone(), "outcome" => "failed")
            .increment(1);

        ChainOutcome {
            success: false,
            result: None,
            error: last_error.or_else(|| Some(format!("no tools support action '{action}'"))),
            used_level: None,
            used_tool: None,
            emergency_fallback_used: false,
            attempts,
        }
    }

    fn record_failure(&self, tool: &str, reason: String) {
        tracing::debug!(tool, %reason, "fallback candidate failed");
        self.config.listeners.emit(&FallbackEvent::CandidateFailed {
            name: self.config.name.clone(),
            at: Instant::now(),
            tool: tool.to_string(),
            reason,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn chain() -> FallbackChain {
        let chain = FallbackChain::new(
            FallbackConfig::builder()
                .fallback_timeout(Duration::from_millis(50))
                .max_chain_length(3)
                .name("test")
                .build(),
        );
        chain
            .registry()
            .register(ToolCapability::new("primary").with_action("search").with_reliability(0.9));
        chain.registry().register(
            ToolCapability::new("backup")
                .with_action("search")
                .with_reliability(0.8),
        );
        chain
    }

    #[tokio::test]
    async fn primary_success_uses_level_zero() {
        let outcome = chain()
            .execute("primary", "search", None, |tool, _| {
                let name = tool.name.clone();
                Box::pin(async move { Ok(json!({ "tool": name })) })
            })
            .await;

        assert!(outcome.success);
        assert_eq!(outcome.used_level, Some(0));
        assert_eq!(outcome.used_tool.as_deref(), Some("primary"));
        assert!(!outcome.emergency_fallback_used);
    }

    #[tokio::test]
    async fn falls_through_to_the_backup() {
        let outcome = chain()
            .execute("primary", "search", None, |tool, _| {
                let name = tool.name.clone();
                Box::pin(async move {
                    if name == "primary" {
                        Err("primary down".to_string())
                    } else {
                        Ok(json!({ "tool": name }))
                    }
                })
            })
            .await;

        assert!(outcome.success);
        assert_eq!(outcome.used_level, Some(1));
        assert_eq!(outcome.used_tool.as_deref(), Some("backup"));
        assert_eq!(outcome.attempts, 2);
    }

    #[tokio::test]
    async fn all_failures_serve_the_emergency_value() {
        let outcome = chain()
            .execute("primary", "search", None, |_, _| {
                Box::pin(async { Err("down".to_string()) })
            })
            .await;

        assert!(outcome.success);
        assert!(outcome.emergency_fallback_used);
        assert!(outcome.used_tool.is_none());
        assert_eq!(outcome.attempts, 2);
    }

    #[tokio::test]
    async fn disabled_emergency_reports_failure() {
        let chain = FallbackChain::new(
            FallbackConfig::builder()
                .enable_emergency_fallback(false)
                .fallback_timeout(Duration::from_millis(50))
                .name("test")
                .build(),
        );
        chain
            .registry()
            .register(ToolCapability::new("only").with_action("search"));

        let outcome = chain
            .execute("only", "search", None, |_, _| {
                Box::pin(async { Err("down".to_string()) })
            })
            .await;

        assert!(!outcome.success);
        assert!(!outcome.emergency_fallback_used);
        assert_eq!(outcome.error.as_deref(), Some("down"));
    }

    #[tokio::test]
    async fn slow_candidates_time_out_and_fall_through() {
        let outcome = chain()
            .execute("primary", "search", None, |tool, _| {
                let name = tool.name.clone();
                Box::pin(async move {
                    if name == "primary" {
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                    Ok(json!({ "tool": name }))
                })
            })
            .await;

        assert!(outcome.success);
        assert_eq!(outcome.used_tool.as_deref(), Some("backup"));
    }
}
