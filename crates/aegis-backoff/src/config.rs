//! Retry configuration.

use crate::events::BackoffEvent;
use crate::strategy::{BackoffStrategy, JitterMode};
use aegis_core::{classify_message, ErrorClass, FnListener, Listeners};
use std::sync::Arc;
use std::time::Duration;

pub(crate) type SharedClassifier<E> = Arc<dyn Fn(&E) -> ErrorClass + Send + Sync>;

/// Which adaptive multipliers participate in delay computation.
#[derive(Debug, Clone, Copy)]
pub struct AdaptiveTuning {
    /// Scale by the class of the triggering failure.
    pub by_error_class: bool,
    /// Scale by the operation's EMA success rate.
    pub by_success_rate: bool,
    /// Scale by externally reported system load.
    pub by_system_load: bool,
}

impl Default for AdaptiveTuning {
    fn default() -> Self {
        Self {
            by_error_class: true,
            by_success_rate: true,
            by_system_load: true,
        }
    }
}

/// Configuration for one retried operation.
#[derive(Clone)]
pub struct BackoffConfig<E> {
    /// Total attempts, including the first. `3` means one initial call
    /// plus two retries.
    pub max_attempts: usize,
    /// Base delay fed into the strategy.
    pub base_delay: Duration,
    /// Multiplier for the exponential strategy.
    pub multiplier: f64,
    /// Cap applied to the pre-jitter delay.
    pub max_delay: Duration,
    /// Budget across all attempts and sleeps.
    pub total_timeout: Option<Duration>,
    /// Deadline for each individual attempt.
    pub operation_timeout: Option<Duration>,
    /// Delay strategy.
    pub strategy: BackoffStrategy,
    /// Jitter applied after capping.
    pub jitter: JitterMode,
    /// Adaptive multiplier switches.
    pub adaptive: AdaptiveTuning,
    pub(crate) classifier: SharedClassifier<E>,
    pub(crate) listeners: Listeners<BackoffEvent>,
    pub(crate) name: String,
}

impl<E> BackoffConfig<E> {
    /// Returns a builder with defaults.
    pub fn builder() -> BackoffConfigBuilder<E> {
        BackoffConfigBuilder::new()
    }
}

impl<E> Default for BackoffConfig<E> {
    fn default() -> Self {
        BackoffConfigBuilder::new().build()
    }
}

/// Builder for [`BackoffConfig`].
pub struct BackoffConfigBuilder<E> {
    max_attempts: usize,
    base_delay: Duration,
    multiplier: f64,
    max_delay: Duration,
    total_timeout: Option<Duration>,
    operation_timeout: Option<Duration>,
    strategy: BackoffStrategy,
    jitter: JitterMode,
    adaptive: AdaptiveTuning,
    classifier: SharedClassifier<E>,
    listeners: Listeners<BackoffEvent>,
    name: String,
}

impl<E> Default for BackoffConfigBuilder<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> BackoffConfigBuilder<E> {
    /// Defaults: 3 attempts, 100 ms base, ×2 exponential capped at 30 s,
    /// equal jitter, all adaptive factors on, unknown error class.
    pub fn new() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            total_timeout: None,
            operation_timeout: None,
            strategy: BackoffStrategy::Exponential,
            jitter: JitterMode::Equal,
            adaptive: AdaptiveTuning::default(),
            classifier: Arc::new(|_| ErrorClass::Unknown),
            listeners: Listeners::new(),
            name: "<unnamed>".to_string(),
        }
    }

    /// Total attempts, including the first.
    pub fn max_attempts(mut self, n: usize) -> Self {
        self.max_attempts = n.max(1);
        self
    }

    /// Base delay fed into the strategy.
    pub fn base_delay(mut self, d: Duration) -> Self {
        self.base_delay = d;
        self
    }

    /// Exponential multiplier.
    pub fn multiplier(mut self, m: f64) -> Self {
        self.multiplier = m;
        self
    }

    /// Pre-jitter delay cap.
    pub fn max_delay(mut self, d: Duration) -> Self {
        self.max_delay = d;
        self
    }

    /// Budget across all attempts and sleeps.
    pub fn total_timeout(mut self, d: Duration) -> Self {
        self.total_timeout = Some(d);
        self
    }

    /// Per-attempt deadline.
    pub fn operation_timeout(mut self, d: Duration) -> Self {
        self.operation_timeout = Some(d);
        self
    }

    /// Delay strategy.
    pub fn strategy(mut self, s: BackoffStrategy) -> Self {
        self.strategy = s;
        self
    }

    /// Jitter mode.
    pub fn jitter(mut self, j: JitterMode) -> Self {
        self.jitter = j;
        self
    }

    /// Adaptive multiplier switches.
    pub fn adaptive(mut self, tuning: AdaptiveTuning) -> Self {
        self.adaptive = tuning;
        self
    }

    /// Installs a typed failure classifier.
    pub fn classifier<F>(mut self, f: F) -> Self
    where
        F: Fn(&E) -> ErrorClass + Send + Sync + 'static,
    {
        self.classifier = Arc::new(f);
        self
    }

    /// Classifies failures from their `Display` rendering.
    pub fn classify_display(self) -> Self
    where
        E: std::fmt::Display,
    {
        self.classifier(|e| classify_message(&e.to_string()))
    }

    /// Name used in events, logs, and metrics.
    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }

    /// Registers a callback before each sleep.
    pub fn on_retry<F>(mut self, f: F) -> Self
    where
        F: Fn(usize, Duration) + Send + Sync + 'static,
    {
        self.listeners.add(FnListener::new(move |event| {
            if let BackoffEvent::RetryScheduled { attempt, delay, .. } = event {
                f(*attempt, *delay);
            }
        }));
        self
    }

    /// Registers a callback on terminal success.
    pub fn on_success<F>(mut self, f: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.listeners.add(FnListener::new(move |event| {
            if let BackoffEvent::Succeeded { attempts, .. } = event {
                f(*attempts);
            }
        }));
        self
    }

    /// Registers a callback when every attempt has failed.
    pub fn on_exhausted<F>(mut self, f: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.listeners.add(FnListener::new(move |event| {
            if let BackoffEvent::Exhausted { attempts, .. } = event {
                f(*attempts);
            }
        }));
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> BackoffConfig<E> {
        BackoffConfig {
            max_attempts: self.max_attempts,
            base_delay: self.base_delay,
            multiplier: self.multiplier,
            max_delay: self.max_delay,
            total_timeout: self.total_timeout,
            operation_timeout: self.operation_timeout,
            strategy: self.strategy,
            jitter: self.jitter,
            adaptive: self.adaptive,
            classifier: self.classifier,
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
        let config: BackoffConfig<String> = BackoffConfig::builder().build();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.strategy, BackoffStrategy::Exponential);
        assert_eq!(config.jitter, JitterMode::Equal);
    }

    #[test]
    fn display_classifier_picks_up_classes() {
        let config: BackoffConfig<String> = BackoffConfig::builder().classify_display().build();
        assert_eq!(
            (config.classifier)(&"connection refused".to_string()),
            ErrorClass::Network
        );
    }

    #[test]
    fn max_attempts_floor_is_one() {
        let config: BackoffConfig<()> = BackoffConfig::builder().max_attempts(0).build();
        assert_eq!(config.max_attempts, 1);
    }
}
