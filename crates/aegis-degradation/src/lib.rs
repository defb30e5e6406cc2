//! Graceful degradation: FULL / REDUCED / MINIMAL / EMERGENCY.
//!
//! A [`DegradationManager`] owns the active level. Health samples — fed
//! externally via [`DegradationManager::report_health`] and internally by
//! every execution — are evaluated against per-level triggers; when a
//! trigger fires, the manager commits a transition to that level. While a
//! non-FULL level is active, feature calls are served through the level's
//! configured degraded behavior: refused, simplified, cached, or replaced
//! with a fallback value.
//!
//! Recovery steps one level toward FULL at a time, driven by the level's
//! recovery conditions, and never while the level's trigger still fires.
//! Only the manager commits transitions; the background monitor and
//! health probes merely propose them.
//!
//! # Example
//!
//! ```rust
//! use aegis_degradation::{
//!     DegradationLevel, DegradationManager, DegradedBehavior, FeatureRule, LevelStrategy,
//!     TriggerCondition,
//! };
//!
//! let manager = DegradationManager::builder()
//!     .strategy(
//!         LevelStrategy::new(DegradationLevel::Reduced, TriggerCondition::ErrorRate(0.3))
//!             .with_feature(FeatureRule::new(
//!                 "advanced_formatting",
//!                 false,
//!                 DegradedBehavior::Disable,
//!             )),
//!     )
//!     .build();
//! assert_eq!(manager.current_level(), DegradationLevel::Full);
//! ```

mod events;
mod level;
mod strategy;

pub use events::DegradationEvent;
pub use level::DegradationLevel;
pub use strategy::{
    DegradedBehavior, FeatureRule, HealthSample, LevelStrategy, RecoveryCondition,
    TriggerCondition,
};

use aegis_core::{Ema, Listeners, DEFAULT_SMOOTHING};
use futures::future::BoxFuture;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// A recorded level change.
#[derive(Debug, Clone)]
pub struct LevelTransition {
    /// When the transition was committed.
    pub at: Instant,
    /// The level entered.
    pub level: DegradationLevel,
    /// What drove the transition.
    pub trigger: String,
    /// Time spent at the previous level.
    pub dwell: Duration,
}

/// How a value was produced under degradation.
#[derive(Debug, Clone, PartialEq)]
pub enum Served<T> {
    /// The real implementation ran.
    Normal(T),
    /// The simplified implementation ran.
    Simplified(T),
    /// A cached value was returned.
    Cached(T),
    /// A configured fallback value was returned.
    Fallback(T),
}

impl<T> Served<T> {
    /// Unwraps the value.
    pub fn into_inner(self) -> T {
        match self {
            Served::Normal(v) | Served::Simplified(v) | Served::Cached(v) | Served::Fallback(v) => v,
        }
    }

    /// Whether a degraded path served the call.
    pub fn was_degraded(&self) -> bool {
        !matches!(self, Served::Normal(_))
    }
}

/// Failure of a degraded execution.
#[derive(Debug, Clone, PartialEq)]
pub enum DegradationError<E> {
    /// The feature is disabled at the current level.
    FeatureDisabled {
        feature: String,
        level: DegradationLevel,
    },
    /// The level calls for a degraded path the caller did not supply.
    DegradedPathMissing {
        feature: String,
        behavior: DegradedBehavior,
    },
    /// The simplified implementation failed.
    SimplifiedFailed { feature: String, reason: String },
    /// The real implementation failed.
    Inner(E),
}

impl<E: std::fmt::Display> std::fmt::Display for DegradationError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DegradationError::FeatureDisabled { feature, level } => {
                write!(f, "feature '{feature}' is disabled at level {level}")
            }
            DegradationError::DegradedPathMissing { feature, behavior } => {
                write!(f, "feature '{feature}' needs a {behavior:?} path, none supplied")
            }
            DegradationError::SimplifiedFailed { feature, reason } => {
                write!(f, "simplified '{feature}' failed: {reason}")
            }
            DegradationError::Inner(e) => write!(f, "operation failed: {e}"),
        }
    }
}

impl<E: std::fmt::Display + std::fmt::Debug> std::error::Error for DegradationError<E> {}

/// Simplified implementation of a feature.
pub type SimplifiedFn<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<T, String>> + Send + Sync>;

/// Caller-supplied degraded paths for one execution.
pub struct DegradedPaths<T> {
    /// Served under [`DegradedBehavior::Fallback`].
    pub fallback_value: Option<T>,
    /// Served under [`DegradedBehavior::Cache`].
    pub cached_value: Option<T>,
    /// Run under [`DegradedBehavior::Simplify`].
    pub simplified: Option<SimplifiedFn<T>>,
}

impl<T> Default for DegradedPaths<T> {
    fn default() -> Self {
        Self {
            fallback_value: None,
            cached_value: None,
            simplified: None,
        }
    }
}

impl<T> DegradedPaths<T> {
    /// No degraded paths.
    pub fn none() -> Self {
        Self::default()
    }

    /// Sets the fallback value.
    pub fn with_fallback(mut self, value: T) -> Self {
        self.fallback_value = Some(value);
        self
    }

    /// Sets the cached value.
    pub fn with_cached(mut self, value: T) -> Self {
        self.cached_value = Some(value);
        self
    }

    /// Sets the simplified implementation.
    pub fn with_simplified<F>(mut self, f: F) -> Self
    where
        F: Fn() -> BoxFuture<'static, Result<T, String>> + Send + Sync + 'static,
    {
        self.simplified = Some(Arc::new(f));
        self
    }
}

struct StateInner {
    current: DegradationLevel,
    entered_at: Instant,
    healthy_since: Option<Instant>,
    history: VecDeque<LevelTransition>,
}

struct HealthInner {
    sample: HealthSample,
    error_ema: Ema,
    response_ema: Ema,
}

/// Owns the degradation level and serves feature calls under it.
pub struct DegradationManager {
    strategies: Vec<LevelStrategy>,
    state: Mutex<StateInner>,
    health: Mutex<HealthInner>,
    listeners: Listeners<DegradationEvent>,
    name: String,
    history_limit: usize,
    monitor_interval: Duration,
}

/// Builder for [`DegradationManager`].
pub struct DegradationManagerBuilder {
    strategies: Vec<LevelStrategy>,
    listeners: Listeners<DegradationEvent>,
    name: String,
    history_limit: usize,
    monitor_interval: Duration,
}

impl Default for DegradationManagerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DegradationManagerBuilder {
    /// Creates a builder with no strategies, 100 retained transitions,
    /// and a 1 s monitor interval.
    pub fn new() -> Self {
        Self {
            strategies: Vec::new(),
            listeners: Listeners::new(),
            name: "degradation".to_string(),
            history_limit: 100,
            monitor_interval: Duration::from_secs(1),
        }
    }

    /// Adds a level strategy.
    pub fn strategy(mut self, strategy: LevelStrategy) -> Self {
        self.strategies.push(strategy);
        self
    }

    /// Name used in events and logs.
    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }

    /// Bound on retained transitions.
    pub fn history_limit(mut self, n: usize) -> Self {
        self.history_limit = n.max(1);
        self
    }

    /// Cadence of the recovery monitor.
    pub fn monitor_interval(mut self, d: Duration) -> Self {
        self.monitor_interval = d;
        self
    }

    /// Registers a listener for degradation events.
    pub fn listener<L>(mut self, listener: L) -> Self
    where
        L: aegis_core::EventListener<DegradationEvent> + 'static,
    {
        self.listeners.add(listener);
        self
    }

    /// Builds the manager, starting at FULL.
    pub fn build(mut self) -> DegradationManager {
        // Most severe first so trigger evaluation finds the deepest
        // firing level.
        self.strategies
            .sort_by(|a, b| b.level.severity().cmp(&a.level.severity()));
        DegradationManager {
            strategies: self.strategies,
            state: Mutex::new(StateInner {
                current: DegradationLevel::Full,
                entered_at: Instant::now(),
                healthy_since: None,
                history: VecDeque::new(),
            }),
            health: Mutex::new(HealthInner {
                sample: HealthSample::default(),
                error_ema: Ema::seeded(DEFAULT_SMOOTHING, 0.0),
                response_ema: Ema::new(DEFAULT_SMOOTHING),
            }),
            listeners: self.listeners,
            name: self.name,
            history_limit: self.history_limit,
            monitor_interval: self.monitor_interval,
        }
    }
}

impl DegradationManager {
    /// Returns a builder.
    pub fn builder() -> DegradationManagerBuilder {
        DegradationManagerBuilder::new()
    }

    /// The currently active level.
    pub fn current_level(&self) -> DegradationLevel {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).current
    }

    /// Alias for [`current_level`](Self::current_level), for callers
    /// that branch cheaply on the active level.
    pub fn active_level(&self) -> DegradationLevel {
        self.current_level()
    }

    /// Recorded transitions, oldest first.
    pub fn history(&self) -> Vec<LevelTransition> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.history.iter().cloned().collect()
    }

    /// Latest health sample.
    pub fn health(&self) -> HealthSample {
        self.health
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .sample
            .clone()
    }

    /// Behavior for a feature under the current level; `None` means the
    /// feature runs normally. Rules accumulate: a REDUCED rule still
    /// applies at MINIMAL.
    pub fn feature_mode(&self, feature: &str) -> Option<DegradedBehavior> {
        let current = self.current_level();
        self.strategies
            .iter()
            .filter(|s| s.level.severity() <= current.severity())
            .filter(|s| s.level != DegradationLevel::Full)
            .find_map(|s| {
                s.features
                    .iter()
                    .find(|f| f.name == feature)
                    .map(|f| f.behavior)
            })
    }

    /// Whether a feature is callable (not disabled) right now.
    pub fn is_feature_enabled(&self, feature: &str) -> bool {
        self.feature_mode(feature) != Some(DegradedBehavior::Disable)
    }

    /// Features disabled at the current level.
    pub fn disabled_features(&self) -> Vec<String> {
        let current = self.current_level();
        let mut out = Vec::new();
        for strategy in &self.strategies {
            if strategy.level.severity() <= current.severity() {
                for rule in &strategy.features {
                    if rule.behavior == DegradedBehavior::Disable && !out.contains(&rule.name) {
                        out.push(rule.name.clone());
                    }
                }
            }
        }
        out
    }

    /// Feeds an externally measured health sample and evaluates triggers.
    pub fn report_health(&self, sample: HealthSample) {
        {
            let mut health = self.health.lock().unwrap_or_else(|e| e.into_inner());
            health.error_ema = Ema::seeded(DEFAULT_SMOOTHING, sample.error_rate);
            health.response_ema = Ema::seeded(DEFAULT_SMOOTHING, sample.avg_response_time_ms);
            health.sample = sample;
        }
        self.evaluate_triggers();
    }

    /// Forces a level, bypassing triggers. Used for operator control.
    pub fn set_level(&self, level: DegradationLevel, reason: &str) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        self.commit_transition(&mut state, level, reason.to_string());
    }

    /// Runs `op` for `feature`, applying the level's degraded behavior.
    pub async fn execute<T, E, F, Fut>(
        &self,
        feature: &str,
        paths: DegradedPaths<T>,
        op: F,
    ) -> Result<Served<T>, DegradationError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        match self.feature_mode(feature) {
            None => {
                let started = Instant::now();
                let result = op().await;
                self.observe_execution(result.is_err(), started.elapsed());
                self.evaluate_triggers();
                result.map(Served::Normal).map_err(DegradationError::Inner)
            }
            Some(DegradedBehavior::Disable) => {
                let level = self.current_level();
                self.listeners.emit(&DegradationEvent::FeatureRefused {
                    name: self.name.clone(),
                    at: Instant::now(),
                    feature: feature.to_string(),
                    level,
                });
                Err(DegradationError::FeatureDisabled {
                    feature: feature.to_string(),
                    level,
                })
            }
            Some(DegradedBehavior::Simplify) => match &paths.simplified {
                Some(simplified) => match simplified().await {
                    Ok(value) => {
                        self.emit_degraded(feature, DegradedBehavior::Simplify);
                        Ok(Served::Simplified(value))
                    }
                    Err(reason) => Err(DegradationError::SimplifiedFailed {
                        feature: feature.to_string(),
                        reason,
                    }),
                },
                None => Err(DegradationError::DegradedPathMissing {
                    feature: feature.to_string(),
                    behavior: DegradedBehavior::Simplify,
                }),
            },
            Some(DegradedBehavior::Cache) => match paths.cached_value {
                Some(value) => {
                    self.emit_degraded(feature, DegradedBehavior::Cache);
                    Ok(Served::Cached(value))
                }
                None => Err(DegradationError::DegradedPathMissing {
                    feature: feature.to_string(),
                    behavior: DegradedBehavior::Cache,
                }),
            },
            Some(DegradedBehavior::Fallback) => match paths.fallback_value {
                Some(value) => {
                    self.emit_degraded(feature, DegradedBehavior::Fallback);
                    Ok(Served::Fallback(value))
                }
                None => Err(DegradationError::DegradedPathMissing {
                    feature: feature.to_string(),
                    behavior: DegradedBehavior::Fallback,
                }),
            },
        }
    }

    fn emit_degraded(&self, feature: &str, behavior: DegradedBehavior) {
        self.listeners.emit(&DegradationEvent::FeatureServedDegraded {
            name: self.name.clone(),
            at: Instant::now(),
            feature: feature.to_string(),
            behavior,
        });

        #[cfg(feature = "metrics")]
        metrics::counter!("aegis_degraded_serves_total", "manager" => self.name.clone())
            .increment(1);
    }

    fn observe_execution(&self, failed: bool, duration: Duration) {
        let mut health = self.health.lock().unwrap_or_else(|e| e.into_inner());
        let error_rate = health.error_ema.observe(if failed { 1.0 } else { 0.0 });
        let response = health.response_ema.observe(duration.as_secs_f64() * 1000.0);
        health.sample.error_rate = error_rate;
        health.sample.avg_response_time_ms = response;
    }

    /// Evaluates triggers against the latest health sample; transitions
    /// only downward (toward more degradation). Recovery is separate.
    pub fn evaluate_triggers(&self) {
        let sample = self.health();

        let firing = self
            .strategies
            .iter()
            .find(|s| s.trigger.fires(&sample))
            .map(|s| (s.level, s.trigger.describe()));

        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        // Track dwell below the current level's healthy ceiling for
        // health-based recovery.
        self.update_healthy_since(&mut state, &sample);

        if let Some((level, trigger)) = firing {
            if level.is_worse_than(state.current) {
                self.commit_transition(&mut state, level, trigger);
            }
        }
    }

    fn update_healthy_since(&self, state: &mut StateInner, sample: &HealthSample) {
        let Some(strategy) = self.strategy_for(state.current) else {
            return;
        };
        let ceiling = strategy.recovery.iter().find_map(|c| match c {
            RecoveryCondition::Health { max_error_rate, .. } => Some(*max_error_rate),
            _ => None,
        });
        if let Some(ceiling) = ceiling {
            if sample.error_rate <= ceiling {
                state.healthy_since.get_or_insert_with(Instant::now);
            } else {
                state.healthy_since = None;
            }
        }
    }

    fn strategy_for(&self, level: DegradationLevel) -> Option<&LevelStrategy> {
        self.strategies.iter().find(|s| s.level == level)
    }

    /// One recovery check: steps one level toward FULL when a recovery
    /// condition holds and the level's trigger no longer fires. Returns
    /// the new level when a step was taken.
    pub fn try_recover(&self) -> Option<DegradationLevel> {
        let sample = self.health();
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        if state.current == DegradationLevel::Full {
            return None;
        }
        let strategy = self.strategy_for(state.current)?;

        // Automatic transitions never move toward FULL while the
        // trigger still holds.
        if strategy.trigger.fires(&sample) {
            return None;
        }

        let satisfied = strategy.recovery.iter().any(|condition| match condition {
            RecoveryCondition::Time { after } => state.entered_at.elapsed() >= *after,
            RecoveryCondition::Health { hold_for, .. } => state
                .healthy_since
                .is_some_and(|since| since.elapsed() >= *hold_for),
            RecoveryCondition::Manual => false,
            RecoveryCondition::Metric { name, below } => sample
                .custom
                .get(name)
                .is_some_and(|value| value < below),
        });
        if !satisfied {
            return None;
        }

        let next = state.current.step_up()?;
        self.commit_transition(&mut state, next, "recovery".to_string());
        Some(next)
    }

    fn commit_transition(&self, state: &mut StateInner, level: DegradationLevel, trigger: String) {
        if state.current == level {
            return;
        }
        let from = state.current;
        let dwell = state.entered_at.elapsed();

        tracing::info!(
            manager = %self.name,
            from = from.as_str(),
            to = level.as_str(),
            %trigger,
            "degradation level change"
        );

        #[cfg(feature = "metrics")]
        metrics::counter!(
            "aegis_degradation_transitions_total",
            "manager" => self.name.clone(),
            "from" => from.as_str(),
            "to" => level.as_str()
        )
        .increment(1);

        state.current = level;
        state.entered_at = Instant::now();
        state.healthy_since = None;
        state.history.push_back(LevelTransition {
            at: Instant::now(),
            level,
            trigger: trigger.clone(),
            dwell,
        });
        while state.history.len() > self.history_limit {
            state.history.pop_front();
        }

        self.listeners.emit(&DegradationEvent::LevelChanged {
            name: self.name.clone(),
            at: Instant::now(),
            from,
            to: level,
            trigger,
            dwell,
        });
    }

    /// Spawns the recovery monitor. The handle aborts it when dropped.
    pub fn spawn_monitor(self: &Arc<Self>) -> MonitorHandle {
        let manager = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut tick = tokio::time::interval(manager.monitor_interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tick.tick().await;
                manager.try_recover();
            }
        });
        MonitorHandle { handle }
    }
}

/// Aborts the recovery monitor when dropped.
pub struct MonitorHandle {
    handle: JoinHandle<()>,
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
