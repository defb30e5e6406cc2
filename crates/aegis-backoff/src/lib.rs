//! Adaptive retry with pluggable backoff strategies and jitter.
//!
//! [`BackoffExecutor::execute`] runs an operation up to `max_attempts`
//! times or until the `total_timeout` budget elapses, whichever comes
//! first. Failures are classified ([`aegis_core::ErrorClass`]); auth,
//! validation, and bad-request classes break the loop immediately.
//!
//! The delay before each retry is produced by the configured
//! [`BackoffStrategy`], scaled by adaptive factors (failure class, EMA
//! success rate, reported system load), capped at `max_delay`, and then
//! jittered.
//!
//! # Example
//!
//! ```rust
//! use aegis_backoff::{BackoffConfig, BackoffExecutor, BackoffStrategy, JitterMode};
//! use std::time::Duration;
//!
//! # async fn example() {
//! let executor = BackoffExecutor::new();
//! let config = BackoffConfig::<String>::builder()
//!     .max_attempts(5)
//!     .base_delay(Duration::from_millis(100))
//!     .strategy(BackoffStrategy::Exponential)
//!     .jitter(JitterMode::Equal)
//!     .classify_display()
//!     .build();
//!
//! let outcome = executor
//!     .execute("fetch-profile", &config, || async {
//!         Ok::<_, String>("profile".to_string())
//!     })
//!     .await;
//! assert!(outcome.success);
//! assert_eq!(outcome.attempts, 1);
//! # }
//! ```
//!
//! The executor keeps a per-operation EMA of success rate, response time,
//! and failure-class tallies, and can recommend a strategy from them via
//! [`BackoffExecutor::recommended_strategy`].

mod config;
mod error;
mod events;
mod metrics;
mod strategy;

pub use config::{AdaptiveTuning, BackoffConfig, BackoffConfigBuilder};
pub use error::BackoffError;
pub use events::{BackoffContext, BackoffEvent};
pub use metrics::{MetricsRegistry, OperationSnapshot};
pub use strategy::{jitter_secs, strategy_delay_secs, BackoffStrategy, JitterMode};

use aegis_core::ErrorClass;
use std::future::Future;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Result of a retried operation.
#[derive(Debug)]
pub struct BackoffOutcome<T, E> {
    /// Whether an attempt succeeded.
    pub success: bool,
    /// Produced value, when `success`.
    pub result: Option<T>,
    /// Terminal failure, when not `success`.
    pub error: Option<BackoffError<E>>,
    /// Attempts made, including the first.
    pub attempts: usize,
    /// Sum of retry sleeps.
    pub total_delay: Duration,
    /// Wall-clock time across attempts and sleeps.
    pub elapsed: Duration,
}

impl<T, E> BackoffOutcome<T, E> {
    /// Collapses the outcome into a `Result`.
    pub fn into_result(self) -> Result<T, BackoffError<E>> {
        match (self.result, self.error) {
            (Some(value), _) => Ok(value),
            (None, Some(err)) => Err(err),
            (None, None) => Err(BackoffError::TotalTimeout { attempts: 0 }),
        }
    }
}

enum AttemptFailure<E> {
    Inner(E),
    Timeout,
}

#[derive(Debug, Clone, Copy, Default)]
struct SystemLoad {
    cpu: f64,
    memory: f64,
}

/// Runs operations under adaptive retry and tracks per-operation metrics.
#[derive(Default)]
pub struct BackoffExecutor {
    metrics: MetricsRegistry,
    system_load: Mutex<SystemLoad>,
}

impl BackoffExecutor {
    /// Creates an executor with empty metrics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds externally sampled CPU and memory load (0.0..=1.0 each).
    pub fn record_system_load(&self, cpu: f64, memory: f64) {
        let mut load = self.system_load.lock().unwrap_or_else(|e| e.into_inner());
        load.cpu = cpu.clamp(0.0, 1.0);
        load.memory = memory.clamp(0.0, 1.0);
    }

    fn load_average(&self) -> f64 {
        let load = self.system_load.lock().unwrap_or_else(|e| e.into_inner());
        (load.cpu + load.memory) / 2.0
    }

    /// Per-operation metrics registry.
    pub fn metrics(&self) -> &MetricsRegistry {
        &self.metrics
    }

    /// Strategy recommendation from observed behavior: decorrelated when
    /// network failures dominate, fibonacci when the success rate has
    /// collapsed, exponential otherwise.
    pub fn recommended_strategy(&self, operation: &str) -> BackoffStrategy {
        if self.metrics.dominant_error(operation) == Some(ErrorClass::Network) {
            return BackoffStrategy::Decorrelated;
        }
        if self.metrics.success_rate(operation).unwrap_or(1.0) < 0.3 {
            return BackoffStrategy::Fibonacci;
        }
        BackoffStrategy::Exponential
    }

    /// Runs `op` under the configured retry policy.
    pub async fn execute<T, E, F, Fut>(
        &self,
        operation: &str,
        config: &BackoffConfig<E>,
        op: F,
    ) -> BackoffOutcome<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.execute_in_context(operation, config, None, op).await
    }

    /// As [`execute`](Self::execute), with caller context carried into
    /// terminal events.
    pub async fn execute_in_context<T, E, F, Fut>(
        &self,
        operation: &str,
        config: &BackoffConfig<E>,
        context: Option<BackoffContext>,
        mut op: F,
    ) -> BackoffOutcome<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let started = Instant::now();
        let mut total_delay = Duration::ZERO;
        let mut prev_delay = config.base_delay;

        for attempt in 1..=config.max_attempts {
            if let Some(total) = config.total_timeout {
                if started.elapsed() >= total {
                    return self.finish_total_timeout(operation, config, &context, attempt - 1, total_delay, started);
                }
            }

            config.listeners.emit(&BackoffEvent::AttemptStarted {
                operation: operation.to_string(),
                at: Instant::now(),
                attempt,
            });

            let attempt_started = Instant::now();
            let attempt_result: Result<T, AttemptFailure<E>> = match config.operation_timeout {
                Some(deadline) => match tokio::time::timeout(deadline, op()).await {
                    Ok(Ok(value)) => Ok(value),
                    Ok(Err(err)) => Err(AttemptFailure::Inner(err)),
                    Err(_) => Err(AttemptFailure::Timeout),
                },
                None => op().await.map_err(AttemptFailure::Inner),
            };
            let attempt_duration = attempt_started.elapsed();

            match attempt_result {
                Ok(value) => {
                    self.metrics.record_success(operation, attempt_duration);
                    config.listeners.emit(&BackoffEvent::Succeeded {
                        operation: operation.to_string(),
                        at: Instant::now(),
                        attempts: attempt,
                        context: context.clone(),
                    });

                    #[cfg(feature = "metrics")]
                    ::metrics::counter!("aegis_backoff_calls_total", "operation" => operation.to_string(), "outcome" => "success")
                        .increment(1);

                    return BackoffOutcome {
                        success: true,
                        result: Some(value),
                        error: None,
                        attempts: attempt,
                        total_delay,
                        elapsed: started.elapsed(),
                    };
                }
                Err(failure) => {
                    let (class, inner) = match failure {
                        AttemptFailure::Timeout => (ErrorClass::Timeout, None),
                        AttemptFailure::Inner(err) => ((config.classifier)(&err), Some(err)),
                    };
                    self.metrics.record_failure(operation, class, attempt_duration);
                    config.listeners.emit(&BackoffEvent::AttemptFailed {
                        operation: operation.to_string(),
                        at: Instant::now(),
                        attempt,
                        class,
                    });
                    tracing::debug!(
                        operation,
                        attempt,
                        class = class.as_str(),
                        "attempt failed"
                    );

                    if !class.is_retryable() {
                        config.listeners.emit(&BackoffEvent::NonRetryable {
                            operation: operation.to_string(),
                            at: Instant::now(),
                            class,
                            context: context.clone(),
                        });

                        #[cfg(feature = "metrics")]
                        ::metrics::counter!("aegis_backoff_calls_total", "operation" => operation.to_string(), "outcome" => "non_retryable")
                            .increment(1);

                        return BackoffOutcome {
                            success: false,
                            result: None,
                            // Timeout is always retryable, so `inner` is present here.
                            error: inner.map(|error| BackoffError::NonRetryable { class, error }),
                            attempts: attempt,
                            total_delay,
                            elapsed: started.elapsed(),
                        };
                    }

                    if attempt == config.max_attempts {
                        config.listeners.emit(&BackoffEvent::Exhausted {
                            operation: operation.to_string(),
                            at: Instant::now(),
                            attempts: attempt,
                            context: context.clone(),
                        });

                        #[cfg(feature = "metrics")]
                        ::metrics::counter!("aegis_backoff_calls_total", "operation" => operation.to_string(), "outcome" => "exhausted")
                            .increment(1);

                        return BackoffOutcome {
                            success: false,
                            result: None,
                            error: Some(BackoffError::Exhausted {
                                attempts: attempt,
                                last_class: class,
                                last: inner,
                            }),
                            attempts: attempt,
                            total_delay,
                            elapsed: started.elapsed(),
                        };
                    }

                    let delay = self.compute_delay(operation, config, attempt, prev_delay, class);

                    if let Some(total) = config.total_timeout {
                        if started.elapsed() + delay >= total {
                            return self.finish_total_timeout(operation, config, &context, attempt, total_delay, started);
                        }
                    }

                    config.listeners.emit(&BackoffEvent::RetryScheduled {
                        operation: operation.to_string(),
                        at: Instant::now(),
                        attempt,
                        delay,
                    });

                    tokio::time::sleep(delay).await;
                    total_delay += delay;
                    prev_delay = delay;
                }
            }
        }

        // max_attempts >= 1, so the loop always returns.
        unreachable!("backoff loop exited without an outcome")
    }

    fn finish_total_timeout<T, E>(
        &self,
        operation: &str,
        config: &BackoffConfig<E>,
        context: &Option<BackoffContext>,
        attempts: usize,
        total_delay: Duration,
        started: Instant,
    ) -> BackoffOutcome<T, E> {
        config.listeners.emit(&BackoffEvent::Exhausted {
            operation: operation.to_string(),
            at: Instant::now(),
            attempts,
            context: context.clone(),
        });

        #[cfg(feature = "metrics")]
        ::metrics::counter!("aegis_backoff_calls_total", "operation" => operation.to_string(), "outcome" => "total_timeout")
            .increment(1);

        BackoffOutcome {
            success: false,
            result: None,
            error: Some(BackoffError::TotalTimeout { attempts }),
            attempts,
            total_delay,
            elapsed: started.elapsed(),
        }
    }

    /// Delay before the retry following the failed `attempt` (1-indexed).
    fn compute_delay<E>(
        &self,
        operation: &str,
        config: &BackoffConfig<E>,
        attempt: usize,
        prev_delay: Duration,
        class: ErrorClass,
    ) -> Duration {
        let mut rng = rand::rng();
        let mut secs = strategy::strategy_delay_secs(
            config.strategy,
            config.base_delay.as_secs_f64(),
            config.multiplier,
            attempt,
            prev_delay.as_secs_f64(),
            &mut rng,
        );

        if config.adaptive.by_error_class {
            secs *= strategy::error_class_factor(class);
        }
        if config.adaptive.by_success_rate {
            let rate = self.metrics.success_rate(operation).unwrap_or(1.0);
            secs *= strategy::success_rate_factor(rate);
        }
        if config.adaptive.by_system_load {
            secs *= strategy::system_load_factor(self.load_average());
        }

        let capped = secs.min(config.max_delay.as_secs_f64());
        let jittered = strategy::jitter_secs(config.jitter, capped, &mut rng);
        strategy::to_duration(jittered, config.max_delay)
    }
}
