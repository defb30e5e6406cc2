//! Configuration surfaces consumed read-only by the core.
//!
//! Two surfaces:
//!
//! 1. A [`ConfigProvider`] trait handing component configurations to the
//!    orchestrator and admission gate. How the values are loaded
//!    (environment, files, watchers) is outside the core; the
//!    [`StaticConfigProvider`] serves fixed values and is what tests and
//!    embedders usually start from.
//! 2. A dynamic [`registry`] of downstream server definitions with typed
//!    change events and guarded `${VAR}` substitution.

pub mod registry;

pub use registry::{
    diff_registries, substitute_registry, RegistryEvent, SecuritySettings, ServerConfig,
    ServerRegistry,
};

use aegis_admission::{PenaltyConfig, RateLimitRule};
use aegis_backoff::{BackoffConfig, BackoffStrategy, JitterMode};
use aegis_circuitbreaker::BreakerConfig;
use aegis_degradation::LevelStrategy;
use aegis_timeout::TimeoutConfig;
use std::collections::HashMap;
use std::time::Duration;

/// Plain-data retry settings; turned into a typed [`BackoffConfig`] by
/// the caller, which owns classifier and listeners.
#[derive(Debug, Clone)]
pub struct BackoffSettings {
    pub max_attempts: usize,
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    pub total_timeout: Option<Duration>,
    pub operation_timeout: Option<Duration>,
    pub strategy: BackoffStrategy,
    pub jitter: JitterMode,
}

impl Default for BackoffSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            total_timeout: None,
            operation_timeout: None,
            strategy: BackoffStrategy::Exponential,
            jitter: JitterMode::Equal,
        }
    }
}

impl BackoffSettings {
    /// Builds a typed config from these settings.
    pub fn to_config<E>(&self) -> BackoffConfig<E> {
        let mut builder = BackoffConfig::builder()
            .max_attempts(self.max_attempts)
            .base_delay(self.base_delay)
            .multiplier(self.multiplier)
            .max_delay(self.max_delay)
            .strategy(self.strategy)
            .jitter(self.jitter);
        if let Some(total) = self.total_timeout {
            builder = builder.total_timeout(total);
        }
        if let Some(op) = self.operation_timeout {
            builder = builder.operation_timeout(op);
        }
        builder.build()
    }
}

/// Read-through access to component configuration.
pub trait ConfigProvider: Send + Sync {
    /// Penalty escalation tuning.
    fn penalty_config(&self) -> PenaltyConfig;

    /// Rate-limit rule for a job type; defaults apply when unknown.
    fn rate_limit_rule(&self, job_type: &str) -> RateLimitRule;

    /// Breaker configuration for a service.
    fn breaker_config(&self, service: &str) -> BreakerConfig;

    /// Backoff settings for an operation id.
    fn backoff_settings(&self, operation_id: &str) -> BackoffSettings;

    /// Timeout manager configuration.
    fn timeout_config(&self) -> TimeoutConfig;

    /// Degradation level strategies.
    fn degradation_strategies(&self) -> Vec<LevelStrategy>;
}

/// Provider serving fixed values installed at construction.
#[derive(Default)]
pub struct StaticConfigProvider {
    penalty: PenaltyConfig,
    rate_limit_rules: HashMap<String, RateLimitRule>,
    default_rate_limit: RateLimitRule,
    breaker_configs: HashMap<String, BreakerConfig>,
    default_breaker: BreakerConfig,
    backoff_settings: HashMap<String, BackoffSettings>,
    default_backoff: BackoffSettings,
    timeout: TimeoutConfig,
    degradation: Vec<LevelStrategy>,
}

impl StaticConfigProvider {
    /// Creates a provider with library defaults everywhere.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the penalty configuration.
    pub fn with_penalty(mut self, config: PenaltyConfig) -> Self {
        self.penalty = config;
        self
    }

    /// Installs a rate-limit rule for its job type.
    pub fn with_rate_limit_rule(mut self, rule: RateLimitRule) -> Self {
        self.rate_limit_rules.insert(rule.job_type.clone(), rule);
        self
    }

    /// Installs a breaker configuration for a service.
    pub fn with_breaker(mut self, service: impl Into<String>, config: BreakerConfig) -> Self {
        self.breaker_configs.insert(service.into(), config);
        self
    }

    /// Installs backoff settings for an operation id.
    pub fn with_backoff(mut self, operation_id: impl Into<String>, settings: BackoffSettings) -> Self {
        self.backoff_settings.insert(operation_id.into(), settings);
        self
    }

    /// Sets the timeout configuration.
    pub fn with_timeout(mut self, config: TimeoutConfig) -> Self {
        self.timeout = config;
        self
    }

    /// Installs the degradation strategies.
    pub fn with_degradation(mut self, strategies: Vec<LevelStrategy>) -> Self {
        self.degradation = strategies;
        self
    }
}

impl ConfigProvider for StaticConfigProvider {
    fn penalty_config(&self) -> PenaltyConfig {
        self.penalty.clone()
    }

    fn rate_limit_rule(&self, job_type: &str) -> RateLimitRule {
        self.rate_limit_rules
            .get(job_type)
            .cloned()
            .unwrap_or_else(|| self.default_rate_limit.clone())
    }

    fn breaker_config(&self, service: &str) -> BreakerConfig {
        self.breaker_configs
            .get(service)
            .cloned()
            .unwrap_or_else(|| self.default_breaker.clone())
    }

    fn backoff_settings(&self, operation_id: &str) -> BackoffSettings {
        self.backoff_settings
            .get(operation_id)
            .cloned()
            .unwrap_or_else(|| self.default_backoff.clone())
    }

    fn timeout_config(&self) -> TimeoutConfig {
        self.timeout.clone()
    }

    fn degradation_strategies(&self) -> Vec<LevelStrategy> {
        self.degradation.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_job_type_gets_the_default_rule() {
        let provider = StaticConfigProvider::new();
        assert_eq!(provider.rate_limit_rule("mystery").job_type, "default");
    }

    #[test]
    fn installed_rule_is_served() {
        let provider = StaticConfigProvider::new()
            .with_rate_limit_rule(RateLimitRule::new("deploy").max_requests(2));
        assert_eq!(provider.rate_limit_rule("deploy").max_requests_per_user, 2);
    }

    #[test]
    fn backoff_settings_round_trip_into_config() {
        let settings = BackoffSettings {
            max_attempts: 7,
            strategy: BackoffStrategy::Fibonacci,
            ..Default::default()
        };
        let config: BackoffConfig<String> = settings.to_config();
        assert_eq!(config.max_attempts, 7);
        assert_eq!(config.strategy, BackoffStrategy::Fibonacci);
    }
}
