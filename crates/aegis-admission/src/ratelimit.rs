//! Per-user rate limits and per-job cooldowns over the counter store.
//!
//! Two checks are short-circuited in order: the fixed-window count for
//! the user, then the per-`(user, job_type, job_name)` cooldown stamp.
//! Recording a trigger performs two store writes, increment then stamp;
//! they are not transactional, so brief over-admission is possible under
//! contention. Rate limits here are statistical, not hard caps.

use aegis_store::{keys, CounterStore, StoreError};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Limits for one job type.
#[derive(Debug, Clone)]
pub struct RateLimitRule {
    /// Job type this rule applies to.
    pub job_type: String,
    /// Requests a single user may make per window.
    pub max_requests_per_user: u32,
    /// Fixed window length.
    pub window: Duration,
    /// Minimum interval between accepted triggers of the same job.
    pub cooldown: Duration,
}

impl RateLimitRule {
    /// Creates a rule for a job type.
    pub fn new(job_type: impl Into<String>) -> Self {
        Self {
            job_type: job_type.into(),
            ..Default::default()
        }
    }

    /// Sets the per-window request ceiling.
    pub fn max_requests(mut self, n: u32) -> Self {
        self.max_requests_per_user = n;
        self
    }

    /// Sets the window length.
    pub fn window(mut self, d: Duration) -> Self {
        self.window = d;
        self
    }

    /// Sets the cooldown.
    pub fn cooldown(mut self, d: Duration) -> Self {
        self.cooldown = d;
        self
    }
}

impl Default for RateLimitRule {
    fn default() -> Self {
        Self {
            job_type: "default".to_string(),
            max_requests_per_user: 10,
            window: Duration::from_secs(60),
            cooldown: Duration::from_secs(30),
        }
    }
}

/// Window state when a trigger is rate limited.
#[derive(Debug, Clone)]
pub struct RateLimitStatus {
    /// Requests counted in the current window.
    pub count: u64,
    /// The configured ceiling.
    pub limit: u32,
    /// Time until the window rolls over.
    pub retry_after: Duration,
}

/// Cooldown state when a trigger arrives too soon.
#[derive(Debug, Clone)]
pub struct CooldownStatus {
    /// Time until the cooldown expires.
    pub remaining: Duration,
}

/// Combined result of both checks.
#[derive(Debug, Clone)]
pub struct TriggerDecision {
    /// Whether the trigger may proceed.
    pub can_proceed: bool,
    /// Populated when the window check failed.
    pub rate_limit: Option<RateLimitStatus>,
    /// Populated when the cooldown check failed.
    pub cooldown: Option<CooldownStatus>,
    /// Human-readable denial; the cooldown message wins when both hold.
    pub block_reason: Option<String>,
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Fixed-window limiter with per-job cooldowns.
pub struct RateLimiter {
    store: Arc<CounterStore>,
    rules: HashMap<String, RateLimitRule>,
    default_rule: RateLimitRule,
}

impl RateLimiter {
    /// Creates a limiter; job types without a rule use the default.
    pub fn new(store: Arc<CounterStore>, rules: Vec<RateLimitRule>) -> Self {
        Self {
            store,
            rules: rules
                .into_iter()
                .map(|r| (r.job_type.clone(), r))
                .collect(),
            default_rule: RateLimitRule::default(),
        }
    }

    /// Overrides the default rule.
    pub fn with_default_rule(mut self, rule: RateLimitRule) -> Self {
        self.default_rule = rule;
        self
    }

    /// Rule applied to a job type.
    pub fn rule_for(&self, job_type: &str) -> &RateLimitRule {
        self.rules.get(job_type).unwrap_or(&self.default_rule)
    }

    /// Runs both checks without recording anything.
    pub async fn check_job_trigger(
        &self,
        user_id: &str,
        job_type: &str,
        job_name: &str,
    ) -> Result<TriggerDecision, StoreError> {
        let rule = self.rule_for(job_type);
        let now = now_ms();

        // Window check.
        let count_key = keys::rate_limit(user_id, job_type, job_name);
        let count = self.store.get_count(&count_key).await?;
        let rate_limit = if count >= u64::from(rule.max_requests_per_user) {
            let window_key = keys::rate_limit_window(user_id, job_type, job_name);
            let window_start = self.store.get_window_start(&window_key).await?;
            let elapsed_ms = window_start.map(|start| now.saturating_sub(start)).unwrap_or(0);
            let retry_after = rule
                .window
                .saturating_sub(Duration::from_millis(elapsed_ms))
                .max(Duration::from_secs(1));
            Some(RateLimitStatus {
                count,
                limit: rule.max_requests_per_user,
                retry_after,
            })
        } else {
            None
        };

        // Cooldown check.
        let cooldown_key = keys::cooldown(user_id, job_type, job_name);
        let last_trigger = self.store.get_window_start(&cooldown_key).await?;
        let cooldown = last_trigger.and_then(|last| {
            let since = Duration::from_millis(now.saturating_sub(last));
            (since < rule.cooldown).then(|| CooldownStatus {
                remaining: rule.cooldown - since,
            })
        });

        let block_reason = match (&cooldown, &rate_limit) {
            (Some(cd), _) => Some(format!(
                "cooldown active for {job_type}/{job_name}; retry in {}s",
                cd.remaining.as_secs().max(1)
            )),
            (None, Some(rl)) => Some(format!(
                "rate-limit exceeded for {job_type}: {}/{} in window; retry in {}s",
                rl.count,
                rl.limit,
                rl.retry_after.as_secs().max(1)
            )),
            (None, None) => None,
        };

        Ok(TriggerDecision {
            can_proceed: rate_limit.is_none() && cooldown.is_none(),
            rate_limit,
            cooldown,
            block_reason,
        })
    }

    /// Records an accepted trigger: window increment, then cooldown
    /// stamp. Call only after `can_proceed`.
    pub async fn record_job_trigger(
        &self,
        user_id: &str,
        job_type: &str,
        job_name: &str,
    ) -> Result<(), StoreError> {
        let rule = self.rule_for(job_type);
        let now = now_ms();

        let count_key = keys::rate_limit(user_id, job_type, job_name);
        let count = self.store.increment(&count_key, Some(rule.window)).await?;
        if count == 1 {
            let window_key = keys::rate_limit_window(user_id, job_type, job_name);
            self.store
                .set_window_start(&window_key, now, Some(rule.window))
                .await?;
        }

        let cooldown_key = keys::cooldown(user_id, job_type, job_name);
        self.store
            .set_window_start(&cooldown_key, now, Some(rule.cooldown))
            .await?;
        Ok(())
    }
}
