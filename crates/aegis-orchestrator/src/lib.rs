//! Strategy selection and composition over the aegis resilience
//! patterns.
//!
//! For each operation the [`ResilienceOrchestrator`] picks a strategy:
//!
//! - a non-FULL degradation level delegates to the degradation manager;
//! - an open breaker for the service picks **timeout-with-fallback**
//!   (one bounded attempt, then the fallback chain);
//! - a collapsed success rate picks **backoff-retry**;
//! - otherwise **circuit-first**: breaker wrapping timeout wrapping
//!   retry, with the fallback chain as breaker fallback for essential
//!   operations.
//!
//! Executions are traced step by step and feed EMA metrics; a background
//! health check can auto-degrade the service when error rate, response
//! time, or open-breaker count cross configured thresholds.
//!
//! The [`ResilienceBoundary`] wraps the orchestrator per region
//! (AI processing, tool execution, ...), accumulates errors, isolates
//! itself when they pile up, and snapshots request context on failure so
//! an external store can resume the work.

mod boundary;
mod result;

pub use boundary::{
    BoundaryConfig, BoundaryKind, BoundaryOutcome, BoundaryState, ContextSnapshot, ContextStore,
    ExecutionStyle, MemoryContextStore, ResilienceBoundary,
};
pub use result::{
    run_fn, OperationDefinition, PathStep, ResiliencePattern, ResilienceResult, RunFn, Strategy,
};

use aegis_backoff::{BackoffConfig, BackoffExecutor};
use aegis_circuitbreaker::{BreakerManager, BreakerState};
use aegis_config::{BackoffSettings, ConfigProvider};
use aegis_core::{Ema, DEFAULT_SMOOTHING};
use aegis_degradation::{DegradationLevel, DegradationManager, DegradedPaths};
use aegis_fallback::{FallbackChain, ToolCapability};
use aegis_timeout::{CancellationToken, TimeoutConfig, TimeoutManager};
use futures::future::BoxFuture;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// Bridge from fallback-chain candidates to actual tool invocations.
pub type ToolExecutorFn =
    Arc<dyn Fn(&ToolCapability, &str) -> BoxFuture<'static, Result<Value, String>> + Send + Sync>;

/// Orchestrator tuning.
#[derive(Clone)]
pub struct OrchestratorConfig {
    /// Cadence of the background health check.
    pub health_check_interval: Duration,
    /// Error rate at which the health check degrades the service.
    pub auto_degrade_error_rate: f64,
    /// Average response time at which the health check degrades.
    pub auto_degrade_response_time: Duration,
    /// Open breakers at which the health check degrades.
    pub auto_degrade_open_breakers: usize,
    /// Success rate below which backoff-retry is picked.
    pub low_success_threshold: f64,
    /// Retry settings for operations without an override.
    pub default_backoff: BackoffSettings,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            health_check_interval: Duration::from_secs(5),
            auto_degrade_error_rate: 0.3,
            auto_degrade_response_time: Duration::from_secs(10),
            auto_degrade_open_breakers: 3,
            low_success_threshold: 0.5,
            default_backoff: BackoffSettings::default(),
        }
    }
}

/// Point-in-time orchestrator metrics.
#[derive(Debug, Clone)]
pub struct OrchestratorMetrics {
    pub executions: u64,
    /// EMA of execution outcomes.
    pub success_rate: f64,
    /// EMA of execution duration in milliseconds.
    pub avg_response_time_ms: f64,
    pub fallbacks_used: u64,
    pub open_breakers: usize,
    pub active_resources: usize,
}

struct MetricsInner {
    executions: u64,
    success_rate: Ema,
    avg_response_time_ms: Ema,
    fallbacks_used: u64,
}

struct Exec {
    value: Value,
    from_fallback: bool,
    degraded: bool,
}

/// Composes breaker, timeout, backoff, degradation, and fallback per
/// operation.
pub struct ResilienceOrchestrator {
    breakers: Arc<BreakerManager>,
    backoff: Arc<BackoffExecutor>,
    timeouts: Arc<TimeoutManager>,
    degradation: Arc<DegradationManager>,
    fallbacks: Arc<FallbackChain>,
    tool_executor: Option<ToolExecutorFn>,
    config: OrchestratorConfig,
    metrics: Mutex<MetricsInner>,
}

impl ResilienceOrchestrator {
    /// Creates an orchestrator over the given components.
    pub fn new(
        breakers: Arc<BreakerManager>,
        backoff: Arc<BackoffExecutor>,
        timeouts: Arc<TimeoutManager>,
        degradation: Arc<DegradationManager>,
        fallbacks: Arc<FallbackChain>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            breakers,
            backoff,
            timeouts,
            degradation,
            fallbacks,
            tool_executor: None,
            config,
            metrics: Mutex::new(MetricsInner {
                executions: 0,
                success_rate: Ema::seeded(DEFAULT_SMOOTHING, 1.0),
                avg_response_time_ms: Ema::new(DEFAULT_SMOOTHING),
                fallbacks_used: 0,
            }),
        }
    }

    /// Builds components from a configuration provider.
    pub fn from_provider(provider: &dyn ConfigProvider) -> Self {
        let mut config = OrchestratorConfig::default();
        config.default_backoff = provider.backoff_settings("default");
        Self::new(
            Arc::new(BreakerManager::new(provider.breaker_config("default"))),
            Arc::new(BackoffExecutor::new()),
            Arc::new(TimeoutManager::new(provider.timeout_config())),
            Arc::new({
                let mut builder = DegradationManager::builder();
                for strategy in provider.degradation_strategies() {
                    builder = builder.strategy(strategy);
                }
                builder.build()
            }),
            Arc::new(FallbackChain::new(Default::default())),
            config,
        )
    }

    /// Installs the bridge that lets the fallback chain invoke tools.
    pub fn with_tool_executor(mut self, executor: ToolExecutorFn) -> Self {
        self.tool_executor = Some(executor);
        self
    }

    /// The breaker manager.
    pub fn breakers(&self) -> &Arc<BreakerManager> {
        &self.breakers
    }

    /// The backoff executor.
    pub fn backoff(&self) -> &Arc<BackoffExecutor> {
        &self.backoff
    }

    /// The timeout manager.
    pub fn timeouts(&self) -> &Arc<TimeoutManager> {
        &self.timeouts
    }

    /// The degradation manager.
    pub fn degradation(&self) -> &Arc<DegradationManager> {
        &self.degradation
    }

    /// The fallback chain.
    pub fn fallbacks(&self) -> &Arc<FallbackChain> {
        &self.fallbacks
    }

    /// Aggregate metrics.
    pub fn metrics(&self) -> OrchestratorMetrics {
        let inner = self.metrics.lock().unwrap_or_else(|e| e.into_inner());
        OrchestratorMetrics {
            executions: inner.executions,
            success_rate: inner.success_rate.value_or(1.0),
            avg_response_time_ms: inner.avg_response_time_ms.value_or(0.0),
            fallbacks_used: inner.fallbacks_used,
            open_breakers: self.breakers.open_count(),
            active_resources: self.timeouts.active_resources(),
        }
    }

    fn backoff_config_for(&self, def: &OperationDefinition) -> BackoffConfig<String> {
        let settings = def
            .retry
            .clone()
            .unwrap_or_else(|| self.config.default_backoff.clone());
        let mut builder = BackoffConfig::<String>::builder()
            .max_attempts(settings.max_attempts)
            .base_delay(settings.base_delay)
            .multiplier(settings.multiplier)
            .max_delay(settings.max_delay)
            .strategy(settings.strategy)
            .jitter(settings.jitter)
            .classify_display()
            .name(def.id.clone());
        if let Some(total) = settings.total_timeout {
            builder = builder.total_timeout(total);
        }
        if let Some(op) = settings.operation_timeout {
            builder = builder.operation_timeout(op);
        }
        builder.build()
    }

    fn timeout_config_for(&self, def: &OperationDefinition) -> TimeoutConfig {
        let mut config = self.timeouts.config().clone();
        if let Some(timeout) = def.timeout {
            config.operation_timeout = timeout;
        }
        config
    }

    /// Runs an operation under the selected strategy.
    pub async fn execute(&self, op: RunFn, def: &OperationDefinition) -> ResilienceResult {
        self.execute_with_paths(op, def, DegradedPaths::none()).await
    }

    /// As [`execute`](Self::execute), with degraded paths for the
    /// operation's feature.
    pub async fn execute_with_paths(
        &self,
        op: RunFn,
        def: &OperationDefinition,
        paths: DegradedPaths<Value>,
    ) -> ResilienceResult {
        let started = Instant::now();
        let path: Arc<Mutex<Vec<PathStep>>> = Arc::new(Mutex::new(Vec::new()));

        if let Some(breaker_config) = &def.breaker {
            if self.breakers.state(&def.service).is_none() {
                self.breakers.install(&def.service, breaker_config.clone());
            }
        }

        let (strategy, outcome) = if self.degradation.current_level() != DegradationLevel::Full {
            (
                Strategy::DegradedPath,
                self.run_degraded(&op, def, paths, &path).await,
            )
        } else if self.breakers.state(&def.service) == Some(BreakerState::Open) {
            (
                Strategy::TimeoutWithFallback,
                self.run_timeout_with_fallback(&op, def, &path).await,
            )
        } else if self
            .backoff
            .metrics()
            .success_rate(&def.id)
            .unwrap_or(1.0)
            < self.config.low_success_threshold
        {
            (
                Strategy::BackoffRetry,
                self.run_backoff_retry(&op, def, &path).await,
            )
        } else {
            (
                Strategy::CircuitFirst,
                self.run_circuit_first(&op, def, &path).await,
            )
        };

        let total_execution_time = started.elapsed();
        let execution_path = {
            let steps = path.lock().unwrap_or_else(|e| e.into_inner());
            steps.clone()
        };
        let mut patterns_used = Vec::new();
        for step in &execution_path {
            if !patterns_used.contains(&step.pattern) {
                patterns_used.push(step.pattern);
            }
        }

        let result = match outcome {
            Ok(exec) => {
                self.observe(true, total_execution_time, exec.from_fallback);
                ResilienceResult {
                    success: true,
                    result: Some(exec.value),
                    error: None,
                    patterns_used,
                    execution_path,
                    final_strategy: strategy,
                    total_execution_time,
                    from_fallback: exec.from_fallback,
                    degraded: exec.degraded,
                }
            }
            Err(error) => {
                self.observe(false, total_execution_time, false);
                tracing::debug!(
                    operation = %def.id,
                    strategy = strategy.as_str(),
                    %error,
                    "orchestrated execution failed"
                );
                ResilienceResult {
                    success: false,
                    result: None,
                    error: Some(error),
                    patterns_used,
                    execution_path,
                    final_strategy: strategy,
                    total_execution_time,
                    from_fallback: false,
                    degraded: false,
                }
            }
        };

        #[cfg(feature = "metrics")]
        metrics::counter!(
            "aegis_orchestrated_executions_total",
            "strategy" => strategy.as_str(),
            "outcome" => if result.success { "success" } else { "failure" }
        )
        .increment(1);

        result
    }

    fn observe(&self, ok: bool, duration: Duration, from_fallback: bool) {
        let mut inner = self.metrics.lock().unwrap_or_else(|e| e.into_inner());
        inner.executions += 1;
        inner.success_rate.observe(if ok { 1.0 } else { 0.0 });
        inner
            .avg_response_time_ms
            .observe(duration.as_secs_f64() * 1000.0);
        if from_fallback {
            inner.fallbacks_used += 1;
        }
    }

    fn push_step(
        path: &Arc<Mutex<Vec<PathStep>>>,
        pattern: ResiliencePattern,
        action: &str,
        started: Instant,
        ok: bool,
    ) {
        let mut steps = path.lock().unwrap_or_else(|e| e.into_inner());
        steps.push(PathStep {
            pattern,
            action: action.to_string(),
            at: Instant::now(),
            duration: started.elapsed(),
            ok,
        });
    }

    async fn run_degraded(
        &self,
        op: &RunFn,
        def: &OperationDefinition,
        paths: DegradedPaths<Value>,
        path: &Arc<Mutex<Vec<PathStep>>>,
    ) -> Result<Exec, String> {
        let feature = def
            .feature
            .clone()
            .unwrap_or_else(|| def.action.clone());
        let op = Arc::clone(op);
        let started = Instant::now();

        let served = self
            .degradation
            .execute(&feature, paths, || op(CancellationToken::new()))
            .await;

        match served {
            Ok(served) => {
                Self::push_step(path, ResiliencePattern::Degradation, "served", started, true);
                let degraded = served.was_degraded();
                Ok(Exec {
                    value: served.into_inner(),
                    from_fallback: false,
                    degraded,
                })
            }
            Err(err) => {
                Self::push_step(path, ResiliencePattern::Degradation, "refused", started, false);
                Err(err.to_string())
            }
        }
    }

    /// Bounded single attempt, then the fallback chain.
    async fn run_timeout_with_fallback(
        &self,
        op: &RunFn,
        def: &OperationDefinition,
        path: &Arc<Mutex<Vec<PathStep>>>,
    ) -> Result<Exec, String> {
        match self.run_bounded(op, def, path).await {
            Ok(value) => Ok(Exec {
                value,
                from_fallback: false,
                degraded: false,
            }),
            Err(error) => {
                let chained = self.run_chain(def, path).await;
                match chained {
                    Ok(value) => Ok(Exec {
                        value,
                        from_fallback: true,
                        degraded: false,
                    }),
                    Err(chain_error) => Err(format!("{error}; fallback chain: {chain_error}")),
                }
            }
        }
    }

    /// Timeout-bounded single run of the operation.
    async fn run_bounded(
        &self,
        op: &RunFn,
        def: &OperationDefinition,
        path: &Arc<Mutex<Vec<PathStep>>>,
    ) -> Result<Value, String> {
        let timeout_config = self.timeout_config_for(def);
        let op = Arc::clone(op);
        let started = Instant::now();

        let outcome = self
            .timeouts
            .execute_with(&def.id, &timeout_config, |token| op(token))
            .await;
        let ok = outcome.success;
        Self::push_step(path, ResiliencePattern::Timeout, "bounded_run", started, ok);
        outcome.into_result().map_err(|e| e.to_string())
    }

    /// Runs the fallback chain for the operation's service and action.
    async fn run_chain(
        &self,
        def: &OperationDefinition,
        path: &Arc<Mutex<Vec<PathStep>>>,
    ) -> Result<Value, String> {
        let started = Instant::now();
        let outcome = match &self.tool_executor {
            Some(executor) => {
                let executor = Arc::clone(executor);
                self.fallbacks
                    .execute(&def.service, &def.action, None, move |tool, action| {
                        executor(tool, action)
                    })
                    .await
            }
            None => {
                self.fallbacks
                    .execute(&def.service, &def.action, None, |_tool, _action| {
                        Box::pin(async { Err("no tool executor installed".to_string()) })
                    })
                    .await
            }
        };

        Self::push_step(
            path,
            ResiliencePattern::Fallback,
            "chain",
            started,
            outcome.success,
        );
        if outcome.success {
            outcome
                .result
                .ok_or_else(|| "fallback chain returned no value".to_string())
        } else {
            Err(outcome
                .error
                .unwrap_or_else(|| "fallback chain failed".to_string()))
        }
    }

    /// Retry loop driving the operation directly.
    async fn run_backoff_retry(
        &self,
        op: &RunFn,
        def: &OperationDefinition,
        path: &Arc<Mutex<Vec<PathStep>>>,
    ) -> Result<Exec, String> {
        let backoff_config = self.backoff_config_for(def);
        let token = CancellationToken::new();
        let op = Arc::clone(op);
        let started = Instant::now();

        let outcome = self
            .backoff
            .execute(&def.id, &backoff_config, || op(token.clone()))
            .await;
        Self::push_step(
            path,
            ResiliencePattern::Backoff,
            "retry_loop",
            started,
            outcome.success,
        );
        outcome
            .into_result()
            .map(|value| Exec {
                value,
                from_fallback: false,
                degraded: false,
            })
            .map_err(|e| e.to_string())
    }

    /// Breaker wrapping timeout wrapping retry; the fallback chain backs
    /// essential operations while the circuit is open.
    async fn run_circuit_first(
        &self,
        op: &RunFn,
        def: &OperationDefinition,
        path: &Arc<Mutex<Vec<PathStep>>>,
    ) -> Result<Exec, String> {
        let breaker = self.breakers.breaker(&def.service);
        let timeout_config = self.timeout_config_for(def);
        let backoff_config = self.backoff_config_for(def);
        let started = Instant::now();

        let guarded = || {
            let op = Arc::clone(op);
            let path = Arc::clone(path);
            let timeout_config = timeout_config.clone();
            let backoff_config = backoff_config.clone();
            async move {
                let t_started = Instant::now();
                let outcome = self
                    .timeouts
                    .execute_with(&def.id, &timeout_config, |token| {
                        let op = Arc::clone(&op);
                        let path = Arc::clone(&path);
                        let backoff_config = backoff_config.clone();
                        async move {
                            let b_started = Instant::now();
                            let b_outcome = self
                                .backoff
                                .execute(&def.id, &backoff_config, || op(token.clone()))
                                .await;
                            Self::push_step(
                                &path,
                                ResiliencePattern::Backoff,
                                "retry_loop",
                                b_started,
                                b_outcome.success,
                            );
                            b_outcome.into_result().map_err(|e| e.to_string())
                        }
                    })
                    .await;
                Self::push_step(
                    &path,
                    ResiliencePattern::Timeout,
                    "bounded_run",
                    t_started,
                    outcome.success,
                );
                outcome.into_result().map_err(|e| e.to_string())
            }
        };

        let outcome = if def.essential {
            breaker
                .execute_with_fallback(guarded, || async {
                    self.run_chain(def, path).await
                })
                .await
        } else {
            breaker.execute(guarded).await
        };

        Self::push_step(
            path,
            ResiliencePattern::CircuitBreaker,
            "guarded_call",
            started,
            outcome.success,
        );

        let from_fallback = outcome.from_cache;
        outcome
            .into_result()
            .map(|value| Exec {
                value,
                from_fallback,
                degraded: false,
            })
            .map_err(|e| e.to_string())
    }

    /// One health-check pass: inspects metrics and degrades the service
    /// when thresholds are crossed. Returns true when it degraded.
    pub fn health_check(&self) -> bool {
        let metrics = self.metrics();
        let error_rate = 1.0 - metrics.success_rate;
        let response_ms = metrics.avg_response_time_ms;
        let open = metrics.open_breakers;

        let threshold_ms = self.config.auto_degrade_response_time.as_secs_f64() * 1000.0;
        let should_degrade = error_rate >= self.config.auto_degrade_error_rate
            || response_ms >= threshold_ms
            || open >= self.config.auto_degrade_open_breakers;

        if should_degrade && self.degradation.current_level() == DegradationLevel::Full {
            tracing::warn!(
                error_rate,
                response_ms,
                open_breakers = open,
                "health check degrading service"
            );
            self.degradation.set_level(
                DegradationLevel::Reduced,
                &format!(
                    "health_check: error_rate={error_rate:.2} response_ms={response_ms:.0} open_breakers={open}"
                ),
            );
            return true;
        }
        false
    }

    /// Spawns the background health check. The handle aborts it when
    /// dropped.
    pub fn spawn_health_monitor(self: &Arc<Self>) -> HealthMonitorHandle {
        let orchestrator = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut tick = tokio::time::interval(orchestrator.config.health_check_interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tick.tick().await;
                orchestrator.health_check();
            }
        });
        HealthMonitorHandle { handle }
    }
}

/// Aborts the health monitor when dropped.
pub struct HealthMonitorHandle {
    handle: JoinHandle<()>,
}

impl Drop for HealthMonitorHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
