//! Bounded execution with cooperative cancellation and resource cleanup.
//!
//! [`TimeoutManager::execute`] races an operation against a per-operation
//! deadline and an optional global budget. On timeout the operation's
//! [`CancellationToken`] is cancelled and every resource registered under
//! the operation id is cleaned up, each destructor bounded by
//! `cleanup_timeout`. A background sweeper retires resources idle beyond a
//! stale threshold.
//!
//! Operations receive the token and are expected to respect it; timeouts
//! are cooperative.
//!
//! # Example
//!
//! ```rust
//! use aegis_timeout::{ResourceHandle, ResourceKind, TimeoutConfig, TimeoutManager};
//! use std::time::Duration;
//!
//! # async fn example() {
//! let manager = TimeoutManager::new(
//!     TimeoutConfig::builder()
//!         .operation_timeout(Duration::from_secs(5))
//!         .build(),
//! );
//!
//! manager.register_resource(
//!     "fetch-1",
//!     ResourceHandle::new("conn", ResourceKind::Connection, || {
//!         Box::pin(async { Ok(()) })
//!     }),
//! );
//!
//! let outcome = manager
//!     .execute("fetch-1", |_cancel| async { Ok::<_, String>(42) })
//!     .await;
//! assert!(outcome.success);
//! # }
//! ```

mod config;
mod error;
mod events;
mod registry;

pub use config::{TimeoutConfig, TimeoutConfigBuilder};
pub use error::TimeoutError;
pub use events::{TimeoutEvent, TimeoutScope};
pub use registry::{CleanupFn, ResourceHandle, ResourceKind, ResourceRegistry};
pub use tokio_util::sync::CancellationToken;

use aegis_core::{Ema, DEFAULT_SMOOTHING};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// What happened to an operation's registered resources.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Resources whose cleanup was attempted.
    pub attempted: usize,
    /// Cleanups that failed or exceeded their bound.
    pub failed: usize,
}

/// Result of one bounded execution.
#[derive(Debug)]
pub struct TimeoutOutcome<T, E> {
    /// Whether the operation produced a value.
    pub success: bool,
    /// Produced value, when `success`.
    pub result: Option<T>,
    /// Failure, when not `success`.
    pub error: Option<TimeoutError<E>>,
    /// Wall-clock time of the operation.
    pub elapsed: Duration,
    /// Whether a deadline fired.
    pub timed_out: bool,
    /// Cleanup report for the operation's resources.
    pub cleanup: CleanupReport,
}

impl<T, E> TimeoutOutcome<T, E> {
    /// Collapses the outcome into a `Result`.
    pub fn into_result(self) -> Result<T, TimeoutError<E>> {
        match (self.result, self.error) {
            (Some(value), _) => Ok(value),
            (None, Some(err)) => Err(err),
            (None, None) => Err(TimeoutError::Elapsed {
                scope: TimeoutScope::Operation,
                after: Duration::ZERO,
            }),
        }
    }
}

/// Aggregate counters for observability.
#[derive(Debug, Clone)]
pub struct ManagerStats {
    pub operations_total: u64,
    pub timeouts_total: u64,
    pub cleanups_total: u64,
    pub cleanup_failures_total: u64,
    /// EMA of cleanup duration in milliseconds.
    pub avg_cleanup_time_ms: f64,
    /// Currently registered resources.
    pub active_resources: usize,
}

#[derive(Debug)]
struct StatsInner {
    operations: u64,
    timeouts: u64,
    cleanups: u64,
    cleanup_failures: u64,
    cleanup_time_ms: Ema,
}

impl StatsInner {
    fn new() -> Self {
        Self {
            operations: 0,
            timeouts: 0,
            cleanups: 0,
            cleanup_failures: 0,
            cleanup_time_ms: Ema::new(DEFAULT_SMOOTHING),
        }
    }
}

/// Runs operations under deadlines and owns the resource registry.
pub struct TimeoutManager {
    config: TimeoutConfig,
    registry: ResourceRegistry,
    stats: Mutex<StatsInner>,
}

impl TimeoutManager {
    /// Creates a manager from the given configuration.
    pub fn new(config: TimeoutConfig) -> Self {
        Self {
            config,
            registry: ResourceRegistry::new(),
            stats: Mutex::new(StatsInner::new()),
        }
    }

    /// The manager's configuration.
    pub fn config(&self) -> &TimeoutConfig {
        &self.config
    }

    /// Registers a resource under an operation id.
    pub fn register_resource(&self, operation_id: &str, handle: ResourceHandle) {
        self.config.listeners.emit(&TimeoutEvent::ResourceRegistered {
            name: self.config.name.clone(),
            at: Instant::now(),
            operation_id: operation_id.to_string(),
            resource_id: handle.id.clone(),
        });
        self.registry.register(operation_id, handle);
    }

    /// Refreshes a resource's idle stamp.
    pub fn touch_resource(&self, operation_id: &str, resource_id: &str) {
        self.registry.touch(operation_id, resource_id);
    }

    /// Currently registered resources.
    pub fn active_resources(&self) -> usize {
        self.registry.active_count()
    }

    /// Aggregate counters.
    pub fn stats(&self) -> ManagerStats {
        let stats = self.stats.lock().unwrap_or_else(|e| e.into_inner());
        ManagerStats {
            operations_total: stats.operations,
            timeouts_total: stats.timeouts,
            cleanups_total: stats.cleanups,
            cleanup_failures_total: stats.cleanup_failures,
            avg_cleanup_time_ms: stats.cleanup_time_ms.value_or(0.0),
            active_resources: self.registry.active_count(),
        }
    }

    /// Runs `op` under the manager's configured deadlines.
    pub async fn execute<T, E, F, Fut>(&self, operation_id: &str, op: F) -> TimeoutOutcome<T, E>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let config = self.config.clone();
        self.execute_with(operation_id, &config, op).await
    }

    /// Runs `op` under explicit deadlines, overriding the manager's own.
    pub async fn execute_with<T, E, F, Fut>(
        &self,
        operation_id: &str,
        config: &TimeoutConfig,
        op: F,
    ) -> TimeoutOutcome<T, E>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        {
            let mut stats = self.stats.lock().unwrap_or_else(|e| e.into_inner());
            stats.operations += 1;
        }

        let token = CancellationToken::new();
        let started = Instant::now();

        let op_fut = op(token.clone());
        tokio::pin!(op_fut);
        let op_deadline = tokio::time::sleep(config.operation_timeout);
        tokio::pin!(op_deadline);

        let raced: Result<Result<T, E>, TimeoutScope> = if let Some(global) = config.global_timeout
        {
            let global_deadline = tokio::time::sleep(global);
            tokio::pin!(global_deadline);
            tokio::select! {
                result = &mut op_fut => Ok(result),
                _ = &mut op_deadline => Err(TimeoutScope::Operation),
                _ = &mut global_deadline => Err(TimeoutScope::Global),
            }
        } else {
            tokio::select! {
                result = &mut op_fut => Ok(result),
                _ = &mut op_deadline => Err(TimeoutScope::Operation),
            }
        };

        let elapsed = started.elapsed();

        match raced {
            Ok(Ok(value)) => {
                self.config.listeners.emit(&TimeoutEvent::OperationCompleted {
                    name: self.config.name.clone(),
                    at: Instant::now(),
                    operation_id: operation_id.to_string(),
                    duration: elapsed,
                });
                let cleanup = self.cleanup_operation(operation_id, config).await;
                TimeoutOutcome {
                    success: true,
                    result: Some(value),
                    error: None,
                    elapsed,
                    timed_out: false,
                    cleanup,
                }
            }
            Ok(Err(err)) => {
                // The operation failed on its own; cancel so registered
                // destructors and in-flight children observe it.
                token.cancel();
                let cleanup = self.cleanup_operation(operation_id, config).await;
                TimeoutOutcome {
                    success: false,
                    result: None,
                    error: Some(TimeoutError::Inner(err)),
                    elapsed,
                    timed_out: false,
                    cleanup,
                }
            }
            Err(scope) => {
                token.cancel();
                let after = match scope {
                    TimeoutScope::Operation => config.operation_timeout,
                    TimeoutScope::Global => config.global_timeout.unwrap_or(config.operation_timeout),
                };
                {
                    let mut stats = self.stats.lock().unwrap_or_else(|e| e.into_inner());
                    stats.timeouts += 1;
                }
                self.config.listeners.emit(&TimeoutEvent::OperationTimedOut {
                    name: self.config.name.clone(),
                    at: Instant::now(),
                    operation_id: operation_id.to_string(),
                    scope,
                    after,
                });
                tracing::warn!(operation_id, ?scope, "operation timed out, cancelling");

                #[cfg(feature = "metrics")]
                metrics::counter!("aegis_timeout_expirations_total", "manager" => self.config.name.clone())
                    .increment(1);

                let cleanup = self.cleanup_operation(operation_id, config).await;
                TimeoutOutcome {
                    success: false,
                    result: None,
                    error: Some(TimeoutError::Elapsed { scope, after }),
                    elapsed,
                    timed_out: true,
                    cleanup,
                }
            }
        }
    }

    /// Cleans up every resource registered under `operation_id`.
    pub async fn cleanup_operation(
        &self,
        operation_id: &str,
        config: &TimeoutConfig,
    ) -> CleanupReport {
        let handles = self.registry.drain_operation(operation_id);
        self.run_cleanups(handles, config).await
    }

    async fn run_cleanups(
        &self,
        handles: Vec<ResourceHandle>,
        config: &TimeoutConfig,
    ) -> CleanupReport {
        let mut report = CleanupReport {
            attempted: handles.len(),
            failed: 0,
        };

        for handle in handles {
            let cleanup_started = Instant::now();
            let result = tokio::time::timeout(config.cleanup_timeout, (handle.cleanup)()).await;
            let cleanup_duration = cleanup_started.elapsed();

            {
                let mut stats = self.stats.lock().unwrap_or_else(|e| e.into_inner());
                stats.cleanups += 1;
                stats
                    .cleanup_time_ms
                    .observe(cleanup_duration.as_secs_f64() * 1000.0);
            }

            match result {
                Ok(Ok(())) => {
                    self.config.listeners.emit(&TimeoutEvent::ResourceCleaned {
                        name: self.config.name.clone(),
                        at: Instant::now(),
                        resource_id: handle.id.clone(),
                        duration: cleanup_duration,
                    });
                }
                Ok(Err(reason)) => {
                    report.failed += 1;
                    self.record_cleanup_failure(&handle.id, reason);
                }
                Err(_) => {
                    report.failed += 1;
                    self.record_cleanup_failure(
                        &handle.id,
                        format!("cleanup exceeded {:?}", config.cleanup_timeout),
                    );
                }
            }
        }
        report
    }

    fn record_cleanup_failure(&self, resource_id: &str, reason: String) {
        {
            let mut stats = self.stats.lock().unwrap_or_else(|e| e.into_inner());
            stats.cleanup_failures += 1;
        }
        tracing::warn!(resource_id, %reason, "resource cleanup failed");
        self.config.listeners.emit(&TimeoutEvent::CleanupFailed {
            name: self.config.name.clone(),
            at: Instant::now(),
            resource_id: resource_id.to_string(),
            reason,
        });

        #[cfg(feature = "metrics")]
        metrics::counter!("aegis_timeout_cleanup_failures_total", "manager" => self.config.name.clone())
            .increment(1);
    }

    /// One sweeper pass: retires resources idle beyond the stale
    /// threshold. Returns how many were retired.
    pub async fn sweep_once(&self) -> usize {
        let stale = self.registry.drain_stale(self.config.stale_threshold);
        let count = stale.len();
        for handle in &stale {
            self.config.listeners.emit(&TimeoutEvent::StaleResourceRetired {
                name: self.config.name.clone(),
                at: Instant::now(),
                resource_id: handle.id.clone(),
                idle_for: handle.last_accessed.elapsed(),
            });
        }
        let config = self.config.clone();
        self.run_cleanups(stale, &config).await;
        count
    }

    /// Spawns the background sweeper. The handle aborts it when dropped.
    pub fn spawn_sweeper(self: &Arc<Self>) -> SweeperHandle {
        let manager = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut tick = tokio::time::interval(manager.config.sweep_interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tick.tick().await;
                let retired = manager.sweep_once().await;
                if retired > 0 {
                    tracing::debug!(retired, "sweeper retired stale resources");
                }
            }
        });
        SweeperHandle { handle }
    }
}

/// Aborts the sweeper task when dropped.
pub struct SweeperHandle {
    handle: JoinHandle<()>,
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    fn fast_config() -> TimeoutConfig {
        TimeoutConfig::builder()
            .operation_timeout(Duration::from_millis(50))
            .cleanup_timeout(Duration::from_millis(50))
            .name("test")
            .build()
    }

    #[tokio::test]
    async fn completes_within_deadline() {
        let manager = TimeoutManager::new(fast_config());
        let outcome = manager
            .execute("op", |_cancel| async { Ok::<_, String>(7) })
            .await;
        assert!(outcome.success);
        assert_eq!(outcome.result, Some(7));
        assert!(!outcome.timed_out);
    }

    #[tokio::test]
    async fn deadline_produces_a_timeout_error() {
        let manager = TimeoutManager::new(fast_config());

        let outcome: TimeoutOutcome<(), String> = manager
            .execute("op", |_cancel| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;

        assert!(outcome.timed_out);
        assert!(outcome.error.as_ref().is_some_and(|e| e.is_timeout()));
        assert!(outcome.elapsed < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn timeout_cleans_registered_resources() {
        let manager = TimeoutManager::new(fast_config());
        let cleaned = Arc::new(AtomicUsize::new(0));
        let cleaned_clone = Arc::clone(&cleaned);

        manager.register_resource(
            "op",
            ResourceHandle::new("conn", ResourceKind::Connection, move || {
                let cleaned = Arc::clone(&cleaned_clone);
                Box::pin(async move {
                    cleaned.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
            }),
        );

        let outcome: TimeoutOutcome<(), String> = manager
            .execute("op", |_cancel| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;

        assert!(outcome.timed_out);
        assert_eq!(outcome.cleanup, CleanupReport { attempted: 1, failed: 0 });
        assert_eq!(cleaned.load(Ordering::SeqCst), 1);
        assert_eq!(manager.active_resources(), 0);
    }

    #[tokio::test]
    async fn slow_cleanup_is_reported_failed_but_execution_continues() {
        let manager = TimeoutManager::new(
            TimeoutConfig::builder()
                .operation_timeout(Duration::from_millis(50))
                .cleanup_timeout(Duration::from_millis(10))
                .name("test")
                .build(),
        );

        manager.register_resource(
            "op",
            ResourceHandle::new("slow", ResourceKind::Custom, || {
                Box::pin(async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(())
                })
            }),
        );

        let outcome = manager
            .execute("op", |_cancel| async { Ok::<_, String>(()) })
            .await;

        assert!(outcome.success);
        assert_eq!(outcome.cleanup.failed, 1);
        assert_eq!(manager.stats().cleanup_failures_total, 1);
    }

    #[tokio::test]
    async fn global_budget_fires_before_operation_deadline() {
        let manager = TimeoutManager::new(
            TimeoutConfig::builder()
                .operation_timeout(Duration::from_secs(5))
                .global_timeout(Duration::from_millis(30))
                .name("test")
                .build(),
        );

        let outcome: TimeoutOutcome<(), String> = manager
            .execute("op", |_cancel| async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            })
            .await;

        assert!(outcome.timed_out);
        assert!(matches!(
            outcome.error,
            Some(TimeoutError::Elapsed {
                scope: TimeoutScope::Global,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn sweeper_retires_idle_resources() {
        let manager = Arc::new(TimeoutManager::new(
            TimeoutConfig::builder()
                .stale_threshold(Duration::from_millis(10))
                .sweep_interval(Duration::from_millis(10))
                .name("test")
                .build(),
        ));
        let _sweeper = manager.spawn_sweeper();

        manager.register_resource(
            "op",
            ResourceHandle::new("idle", ResourceKind::Memory, || Box::pin(async { Ok(()) })),
        );
        assert_eq!(manager.active_resources(), 1);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(manager.active_resources(), 0);
    }

    #[tokio::test]
    async fn operation_error_still_cleans_up() {
        let manager = TimeoutManager::new(fast_config());
        let cleaned = Arc::new(AtomicBool::new(false));
        let cleaned_clone = Arc::clone(&cleaned);

        manager.register_resource(
            "op",
            ResourceHandle::new("r", ResourceKind::File, move || {
                let cleaned = Arc::clone(&cleaned_clone);
                Box::pin(async move {
                    cleaned.store(true, Ordering::SeqCst);
                    Ok(())
                })
            }),
        );

        let outcome: TimeoutOutcome<(), String> = manager
            .execute("op", |_cancel| async { Err("boom".to_string()) })
            .await;

        assert!(!outcome.success);
        assert!(!outcome.timed_out);
        assert!(cleaned.load(Ordering::SeqCst));
    }
}
