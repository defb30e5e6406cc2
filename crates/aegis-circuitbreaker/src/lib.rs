//! Per-service circuit breakers.
//!
//! A breaker watches call outcomes for one downstream service and
//! fast-fails callers while the service is unhealthy.
//!
//! ## States
//! - **Closed**: normal operation, calls pass through
//! - **Open**: tripped, calls are rejected immediately
//! - **HalfOpen**: probing recovery with a bounded number of calls
//!
//! The circuit trips when either `failure_threshold` consecutive failures
//! occur, or the windowed failure rate reaches `error_rate` with at least
//! `volume_threshold` calls. After `recovery_timeout` the next caller is
//! admitted as a probe; `success_threshold` consecutive probe successes
//! close the circuit, and any probe failure reopens it.
//!
//! ## Example
//!
//! ```rust
//! use aegis_circuitbreaker::{BreakerConfig, CircuitBreaker};
//! use std::time::Duration;
//!
//! # async fn example() {
//! let breaker = CircuitBreaker::new(
//!     BreakerConfig::builder()
//!         .name("search-api")
//!         .failure_threshold(3)
//!         .recovery_timeout(Duration::from_secs(30))
//!         .build(),
//! );
//!
//! let outcome = breaker
//!     .execute(|| async { Ok::<_, String>("hit".to_string()) })
//!     .await;
//! assert!(outcome.success);
//! # }
//! ```
//!
//! While open, [`CircuitBreaker::execute_with_fallback`] serves the
//! fallback instead and marks the outcome `from_cache`.

mod circuit;
mod config;
mod error;
mod events;

pub use circuit::{BreakerMetrics, BreakerState};
pub use config::{BreakerConfig, BreakerConfigBuilder};
pub use error::BreakerError;
pub use events::BreakerEvent;

use circuit::{Acquire, Circuit};
use dashmap::DashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Result of one call through a breaker.
#[derive(Debug)]
pub struct BreakerOutcome<T, E> {
    /// Whether a value was produced (by the operation or a fallback).
    pub success: bool,
    /// Produced value, when `success`.
    pub result: Option<T>,
    /// Failure, when not `success`.
    pub error: Option<BreakerError<E>>,
    /// Breaker state observed after the call.
    pub state: BreakerState,
    /// Wall-clock time spent in the operation or fallback.
    pub execution_time: Duration,
    /// True when the value came from the fallback while the circuit was open.
    pub from_cache: bool,
    /// How long the circuit had been open, for rejected calls.
    pub circuit_open_time: Option<Duration>,
}

impl<T, E> BreakerOutcome<T, E> {
    /// Collapses the outcome into a `Result`.
    pub fn into_result(self) -> Result<T, BreakerError<E>> {
        match (self.result, self.error) {
            (Some(value), _) => Ok(value),
            (None, Some(err)) => Err(err),
            // `success` without a value cannot be constructed by this crate.
            (None, None) => Err(BreakerError::Open {
                name: String::new(),
                open_for: Duration::ZERO,
            }),
        }
    }
}

/// A circuit breaker guarding one downstream service.
pub struct CircuitBreaker {
    circuit: Mutex<Circuit>,
    state_atomic: Arc<AtomicU8>,
    config: Arc<BreakerConfig>,
}

impl CircuitBreaker {
    /// Creates a breaker from the given configuration.
    pub fn new(config: BreakerConfig) -> Self {
        let state_atomic = Arc::new(AtomicU8::new(BreakerState::Closed as u8));
        Self {
            circuit: Mutex::new(Circuit::new(Arc::clone(&state_atomic))),
            state_atomic,
            config: Arc::new(config),
        }
    }

    /// Breaker name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Current state without acquiring the circuit lock. Safe from sync
    /// contexts such as metrics collection.
    pub fn state_sync(&self) -> BreakerState {
        BreakerState::from_u8(self.state_atomic.load(Ordering::Acquire))
    }

    /// Current state.
    pub async fn state(&self) -> BreakerState {
        self.circuit.lock().await.state()
    }

    /// Snapshot of the breaker's counters.
    pub async fn metrics(&self) -> BreakerMetrics {
        self.circuit.lock().await.metrics(&self.config)
    }

    /// Forces the circuit open.
    pub async fn force_open(&self) {
        self.circuit.lock().await.force_open(&self.config);
    }

    /// Forces the circuit closed.
    pub async fn force_closed(&self) {
        self.circuit.lock().await.force_closed(&self.config);
    }

    /// Resets state and history.
    pub async fn reset(&self) {
        self.circuit.lock().await.reset(&self.config);
    }

    /// Runs `op` under the breaker. Rejected calls fail with
    /// [`BreakerError::Open`].
    pub async fn execute<T, E, F, Fut>(&self, op: F) -> BreakerOutcome<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.execute_inner(op, None::<fn() -> futures::future::Ready<Result<T, E>>>)
            .await
    }

    /// Runs `op` under the breaker; while the circuit is open the
    /// fallback is used instead and the outcome is marked `from_cache`.
    pub async fn execute_with_fallback<T, E, F, Fut, FB, FbFut>(
        &self,
        op: F,
        fallback: FB,
    ) -> BreakerOutcome<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        FB: FnOnce() -> FbFut,
        FbFut: Future<Output = Result<T, E>>,
    {
        self.execute_inner(op, Some(fallback)).await
    }

    async fn execute_inner<T, E, F, Fut, FB, FbFut>(
        &self,
        op: F,
        fallback: Option<FB>,
    ) -> BreakerOutcome<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        FB: FnOnce() -> FbFut,
        FbFut: Future<Output = Result<T, E>>,
    {
        let acquire = {
            let mut circuit = self.circuit.lock().await;
            circuit.try_acquire(&self.config)
        };

        if let Acquire::Rejected { open_for } = acquire {
            tracing::debug!(breaker = %self.config.name, "call rejected, circuit open");

            if let Some(fallback) = fallback {
                let start = Instant::now();
                let result = fallback().await;
                let execution_time = start.elapsed();
                return match result {
                    Ok(value) => BreakerOutcome {
                        success: true,
                        result: Some(value),
                        error: None,
                        state: self.state_sync(),
                        execution_time,
                        from_cache: true,
                        circuit_open_time: Some(open_for),
                    },
                    Err(err) => BreakerOutcome {
                        success: false,
                        result: None,
                        error: Some(BreakerError::Inner(err)),
                        state: self.state_sync(),
                        execution_time,
                        from_cache: true,
                        circuit_open_time: Some(open_for),
                    },
                };
            }

            return BreakerOutcome {
                success: false,
                result: None,
                error: Some(BreakerError::Open {
                    name: self.config.name.clone(),
                    open_for,
                }),
                state: self.state_sync(),
                execution_time: Duration::ZERO,
                from_cache: false,
                circuit_open_time: Some(open_for),
            };
        }

        let start = Instant::now();
        let result = op().await;
        let execution_time = start.elapsed();

        let state = {
            let mut circuit = self.circuit.lock().await;
            match &result {
                Ok(_) => circuit.record_success(&self.config, execution_time),
                Err(_) => circuit.record_failure(&self.config, execution_time),
            }
            circuit.state()
        };

        match result {
            Ok(value) => BreakerOutcome {
                success: true,
                result: Some(value),
                error: None,
                state,
                execution_time,
                from_cache: false,
                circuit_open_time: None,
            },
            Err(err) => BreakerOutcome {
                success: false,
                result: None,
                error: Some(BreakerError::Inner(err)),
                state,
                execution_time,
                from_cache: false,
                circuit_open_time: None,
            },
        }
    }
}

/// Keeps one breaker per service name.
pub struct BreakerManager {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    default_config: BreakerConfig,
}

impl BreakerManager {
    /// Creates a manager; unknown services get `default_config` with the
    /// service name filled in.
    pub fn new(default_config: BreakerConfig) -> Self {
        Self {
            breakers: DashMap::new(),
            default_config,
        }
    }

    /// Returns the breaker for `service`, creating it on first use.
    pub fn breaker(&self, service: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(service) {
            return Arc::clone(existing.value());
        }
        let mut config = self.default_config.clone();
        config.name = service.to_string();
        self.breakers
            .entry(service.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(config)))
            .value()
            .clone()
    }

    /// Installs a breaker with an explicit configuration, replacing any
    /// existing breaker for the service. The breaker takes the service
    /// name regardless of what the configuration carried.
    pub fn install(&self, service: &str, mut config: BreakerConfig) -> Arc<CircuitBreaker> {
        config.name = service.to_string();
        let breaker = Arc::new(CircuitBreaker::new(config));
        self.breakers
            .insert(service.to_string(), Arc::clone(&breaker));
        breaker
    }

    /// Current state of a service's breaker, if one exists.
    pub fn state(&self, service: &str) -> Option<BreakerState> {
        self.breakers.get(service).map(|b| b.state_sync())
    }

    /// Number of currently open breakers.
    pub fn open_count(&self) -> usize {
        self.breakers
            .iter()
            .filter(|entry| entry.value().state_sync() == BreakerState::Open)
            .count()
    }

    /// Snapshot of every breaker's metrics.
    pub async fn snapshot(&self) -> Vec<(String, BreakerMetrics)> {
        let breakers: Vec<(String, Arc<CircuitBreaker>)> = self
            .breakers
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();

        let mut out = Vec::with_capacity(breakers.len());
        for (name, breaker) in breakers {
            out.push((name, breaker.metrics().await));
        }
        out
    }

    /// Resets every breaker to closed.
    pub async fn reset_all(&self) {
        let breakers: Vec<Arc<CircuitBreaker>> = self
            .breakers
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        for breaker in breakers {
            breaker.reset().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tripping_config() -> BreakerConfig {
        BreakerConfig::builder()
            .name("svc")
            .failure_threshold(3)
            .recovery_timeout(Duration::from_millis(50))
            .success_threshold(1)
            .build()
    }

    #[tokio::test]
    async fn three_failures_open_the_circuit() {
        let breaker = CircuitBreaker::new(tripping_config());

        for _ in 0..3 {
            let outcome = breaker
                .execute(|| async { Err::<(), _>("boom".to_string()) })
                .await;
            assert!(!outcome.success);
        }
        assert_eq!(breaker.state().await, BreakerState::Open);

        // Fourth call is short-circuited without invoking the operation.
        let invoked = std::sync::atomic::AtomicBool::new(false);
        let outcome = breaker
            .execute(|| {
                invoked.store(true, Ordering::SeqCst);
                async { Ok::<_, String>(()) }
            })
            .await;
        assert!(!invoked.load(Ordering::SeqCst));
        assert!(outcome.error.as_ref().is_some_and(|e| e.is_open()));
        assert!(outcome.circuit_open_time.is_some());
    }

    #[tokio::test]
    async fn open_circuit_serves_the_fallback() {
        let breaker = CircuitBreaker::new(tripping_config());
        for _ in 0..3 {
            breaker
                .execute(|| async { Err::<String, _>("boom".to_string()) })
                .await;
        }

        let outcome = breaker
            .execute_with_fallback(
                || async { Err::<String, _>("still down".to_string()) },
                || async { Ok("cached".to_string()) },
            )
            .await;
        assert!(outcome.success);
        assert!(outcome.from_cache);
        assert_eq!(outcome.result.as_deref(), Some("cached"));
    }

    #[tokio::test]
    async fn recovers_through_half_open() {
        let breaker = CircuitBreaker::new(tripping_config());
        for _ in 0..3 {
            breaker
                .execute(|| async { Err::<(), _>("boom".to_string()) })
                .await;
        }
        tokio::time::sleep(Duration::from_millis(60)).await;

        let outcome = breaker.execute(|| async { Ok::<_, String>(()) }).await;
        assert!(outcome.success);
        assert_eq!(breaker.state().await, BreakerState::Closed);
    }

    #[tokio::test]
    async fn manager_creates_one_breaker_per_service() {
        let manager = BreakerManager::new(tripping_config());
        let a = manager.breaker("a");
        let a2 = manager.breaker("a");
        assert!(Arc::ptr_eq(&a, &a2));
        assert_eq!(a.name(), "a");

        manager.breaker("b").force_open().await;
        assert_eq!(manager.open_count(), 1);
        assert_eq!(manager.state("b"), Some(BreakerState::Open));

        manager.reset_all().await;
        assert_eq!(manager.open_count(), 0);
    }
}
