//! The request-level admission gate.
//!
//! Composes the penalty manager, rate limiter, and activity monitor into
//! one decision per request. Internal errors never block a request: the
//! gate fails open, logs, and counts them.

use crate::activity::{ActivityMonitor, RequestPattern, SuspicionFlag};
use crate::events::{AdmissionEvent, AdmissionEventKind};
use crate::penalty::{PenaltyManager, PenaltySeverity, UserStanding};
use crate::ratelimit::RateLimiter;
use aegis_core::Listeners;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime};

/// An incoming request as the gate sees it.
#[derive(Debug, Clone)]
pub struct GateRequest {
    /// The requesting user.
    pub user_id: String,
    /// Logical action, e.g. `"job_trigger"`.
    pub action: String,
    /// Job type, when the request targets a job.
    pub job_type: Option<String>,
    /// Job name, when the request targets a job.
    pub job_name: Option<String>,
    /// Originating channel.
    pub channel: Option<String>,
}

impl GateRequest {
    /// Creates a request for an action.
    pub fn new(user_id: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            action: action.into(),
            job_type: None,
            job_name: None,
            channel: None,
        }
    }

    /// Sets the job target.
    pub fn with_job(mut self, job_type: impl Into<String>, job_name: impl Into<String>) -> Self {
        self.job_type = Some(job_type.into());
        self.job_name = Some(job_name.into());
        self
    }

    /// Sets the channel.
    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }
}

/// Why a request was denied.
#[derive(Debug, Clone)]
pub enum DenialReason {
    /// The user's window is full.
    RateLimitExceeded { retry_after: Duration },
    /// The job is cooling down.
    CooldownActive { retry_after: Duration },
    /// An active penalty blocks the user.
    TemporarilyBlocked {
        blocked_until: Option<SystemTime>,
        retry_after: Option<Duration>,
    },
    /// The user is permanently banned.
    PermanentlyBanned,
    /// The admission subsystem itself is unusable (fail-closed paths only).
    ServiceUnavailable,
}

impl DenialReason {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            DenialReason::RateLimitExceeded { .. } => "rate_limit_exceeded",
            DenialReason::CooldownActive { .. } => "cooldown_active",
            DenialReason::TemporarilyBlocked { .. } => "temporarily_blocked",
            DenialReason::PermanentlyBanned => "permanently_banned",
            DenialReason::ServiceUnavailable => "service_unavailable",
        }
    }

    /// Retry hint, when one is meaningful.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            DenialReason::RateLimitExceeded { retry_after }
            | DenialReason::CooldownActive { retry_after } => Some(*retry_after),
            DenialReason::TemporarilyBlocked { retry_after, .. } => *retry_after,
            DenialReason::PermanentlyBanned | DenialReason::ServiceUnavailable => None,
        }
    }
}

/// Denial rendered for an HTTP transport: status 429 with a body.
#[derive(Debug, Clone, Serialize)]
pub struct HttpDenial {
    /// HTTP status code.
    pub status: u16,
    /// Machine-readable error code.
    pub error: String,
    /// Human-readable message.
    pub message: String,
    /// Seconds until retry, when meaningful.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

/// Extra context attached to a decision.
#[derive(Debug, Clone, Default)]
pub struct GateDetails {
    /// User standing at decision time.
    pub standing: Option<UserStanding>,
    /// Suspiciousness score, when activity was analyzed.
    pub suspicious_score: Option<f64>,
    /// Flags raised by the activity monitor.
    pub flags: Vec<SuspicionFlag>,
    /// Human-readable denial message.
    pub message: Option<String>,
}

/// The gate's verdict on one request.
#[derive(Debug, Clone)]
pub struct GateDecision {
    /// Whether the request may proceed.
    pub allowed: bool,
    /// Denial reason, when not allowed.
    pub reason: Option<DenialReason>,
    /// Retry hint, when meaningful.
    pub retry_after: Option<Duration>,
    /// Extra context.
    pub details: GateDetails,
}

impl GateDecision {
    fn allowed(details: GateDetails) -> Self {
        Self {
            allowed: true,
            reason: None,
            retry_after: None,
            details,
        }
    }

    fn denied(reason: DenialReason, details: GateDetails) -> Self {
        let retry_after = reason.retry_after();
        Self {
            allowed: false,
            reason: Some(reason),
            retry_after,
            details,
        }
    }

    /// Renders a denial for an HTTP transport; `None` when allowed.
    pub fn to_http(&self) -> Option<HttpDenial> {
        let reason = self.reason.as_ref()?;
        Some(HttpDenial {
            status: 429,
            error: reason.code().to_string(),
            message: self
                .details
                .message
                .clone()
                .unwrap_or_else(|| reason.code().replace('_', " ")),
            retry_after: self.retry_after.map(|d| d.as_secs().max(1)),
        })
    }
}

/// Health of the admission subsystem derived from recent events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateHealth {
    Healthy,
    Degraded,
    Critical,
}

/// Aggregate counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct GateStats {
    pub allowed: u64,
    pub blocked: u64,
    pub penalties_applied: u64,
    pub suspicious_hits: u64,
    pub internal_errors: u64,
}

/// Tuning for the gate.
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Score at or above which a penalty is applied automatically.
    pub auto_penalty_threshold: f64,
    /// Score band lower bound for CRITICAL severity.
    pub critical_score: f64,
    /// Score band lower bound for HIGH severity.
    pub high_score: f64,
    /// Bounded event ring capacity.
    pub event_ring_capacity: usize,
    /// Recent events consulted for the health summary.
    pub health_window: usize,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            auto_penalty_threshold: 85.0,
            critical_score: 95.0,
            high_score: 85.0,
            event_ring_capacity: 500,
            health_window: 100,
        }
    }
}

/// Request-level gate composing penalties, rate limits, and activity.
pub struct AdmissionGate {
    penalties: Arc<PenaltyManager>,
    rate_limiter: Arc<RateLimiter>,
    activity: Arc<ActivityMonitor>,
    config: GateConfig,
    ring: Mutex<VecDeque<AdmissionEvent>>,
    stats: Mutex<GateStats>,
    listeners: Listeners<AdmissionEvent>,
}

impl AdmissionGate {
    /// Creates a gate over the three admission components.
    pub fn new(
        penalties: Arc<PenaltyManager>,
        rate_limiter: Arc<RateLimiter>,
        activity: Arc<ActivityMonitor>,
        config: GateConfig,
    ) -> Self {
        Self {
            penalties,
            rate_limiter,
            activity,
            config,
            ring: Mutex::new(VecDeque::new()),
            stats: Mutex::new(GateStats::default()),
            listeners: Listeners::new(),
        }
    }

    /// Registers a listener for admission events.
    pub fn add_listener<L>(&mut self, listener: L)
    where
        L: aegis_core::EventListener<AdmissionEvent> + 'static,
    {
        self.listeners.add(listener);
    }

    /// The penalty manager behind the gate.
    pub fn penalties(&self) -> &Arc<PenaltyManager> {
        &self.penalties
    }

    /// The rate limiter behind the gate.
    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    /// The activity monitor behind the gate.
    pub fn activity(&self) -> &Arc<ActivityMonitor> {
        &self.activity
    }

    /// Aggregate counters.
    pub fn stats(&self) -> GateStats {
        *self.stats.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// A copy of the recent event ring, oldest first.
    pub fn recent_events(&self) -> Vec<AdmissionEvent> {
        let ring = self.ring.lock().unwrap_or_else(|e| e.into_inner());
        ring.iter().cloned().collect()
    }

    /// Health summary from recent error and block rates.
    pub fn health(&self) -> GateHealth {
        let ring = self.ring.lock().unwrap_or_else(|e| e.into_inner());
        let recent: Vec<&AdmissionEvent> = ring
            .iter()
            .rev()
            .take(self.config.health_window)
            .collect();
        if recent.is_empty() {
            return GateHealth::Healthy;
        }
        let total = recent.len() as f64;
        let errors = recent
            .iter()
            .filter(|e| e.kind == AdmissionEventKind::Error)
            .count() as f64;
        let blocked = recent
            .iter()
            .filter(|e| e.kind == AdmissionEventKind::Blocked)
            .count() as f64;

        let error_rate = errors / total;
        let block_rate = blocked / total;
        if error_rate >= 0.3 {
            GateHealth::Critical
        } else if error_rate >= 0.1 || block_rate >= 0.8 {
            GateHealth::Degraded
        } else {
            GateHealth::Healthy
        }
    }

    fn record_event(&self, event: AdmissionEvent) {
        self.listeners.emit(&event);
        let mut ring = self.ring.lock().unwrap_or_else(|e| e.into_inner());
        ring.push_back(event);
        while ring.len() > self.config.event_ring_capacity {
            ring.pop_front();
        }
    }

    fn severity_for_score(&self, score: f64) -> PenaltySeverity {
        if score >= self.config.critical_score {
            PenaltySeverity::Critical
        } else if score >= self.config.high_score {
            PenaltySeverity::High
        } else {
            PenaltySeverity::Medium
        }
    }

    /// Decides whether one request may proceed.
    pub async fn gate(&self, request: GateRequest) -> GateDecision {
        let user_id = request.user_id.clone();
        let action = request.action.clone();

        // 1. Penalty and allow/deny list check.
        let admission = self.penalties.is_user_allowed(&user_id).await;
        if !admission.allowed {
            let reason = match admission.standing {
                UserStanding::PermBanned => DenialReason::PermanentlyBanned,
                _ => DenialReason::TemporarilyBlocked {
                    blocked_until: admission.blocked_until,
                    retry_after: admission.retry_after,
                },
            };
            return self.deny(&user_id, &action, reason, admission.reason);
        }

        // 2. Rate limit and cooldown.
        let job_type = request
            .job_type
            .clone()
            .unwrap_or_else(|| "default".to_string());
        let job_name = request.job_name.clone().unwrap_or_else(|| action.clone());

        match self
            .rate_limiter
            .check_job_trigger(&user_id, &job_type, &job_name)
            .await
        {
            Ok(decision) if !decision.can_proceed => {
                // Cooldown wins the message when both checks fail.
                let reason = if let Some(cooldown) = &decision.cooldown {
                    DenialReason::CooldownActive {
                        retry_after: cooldown.remaining.max(Duration::from_secs(1)),
                    }
                } else {
                    let retry_after = decision
                        .rate_limit
                        .as_ref()
                        .map(|rl| rl.retry_after)
                        .unwrap_or(Duration::from_secs(1));
                    DenialReason::RateLimitExceeded { retry_after }
                };
                return self.deny(&user_id, &action, reason, decision.block_reason);
            }
            Ok(_) => {
                if let Err(err) = self
                    .rate_limiter
                    .record_job_trigger(&user_id, &job_type, &job_name)
                    .await
                {
                    self.note_internal_error(&user_id, &action, &err.to_string());
                }
            }
            Err(err) => {
                // Fail open: an unusable store never blocks users.
                self.note_internal_error(&user_id, &action, &err.to_string());
            }
        }

        // 3. Activity scoring and automatic penalties.
        let mut pattern = RequestPattern::new(user_id.clone(), action.clone());
        pattern.job_type = Some(job_type);
        pattern.job_name = Some(job_name);
        pattern.channel = request.channel.clone();
        self.activity.record_request(pattern);

        let analysis = self.activity.analyze(&user_id);
        let mut details = GateDetails {
            standing: Some(admission.standing),
            suspicious_score: Some(analysis.score),
            flags: analysis.flags.clone(),
            message: None,
        };

        if analysis.is_suspicious {
            {
                let mut stats = self.stats.lock().unwrap_or_else(|e| e.into_inner());
                stats.suspicious_hits += 1;
            }
            self.record_event(AdmissionEvent {
                kind: AdmissionEventKind::Suspicious,
                user_id: user_id.clone(),
                action: action.clone(),
                at: Instant::now(),
                detail: Some(format!("score {:.0}", analysis.score)),
            });

            if admission.standing != UserStanding::Whitelisted
                && analysis.score >= self.config.auto_penalty_threshold
            {
                let severity = self.severity_for_score(analysis.score);
                let record = self
                    .penalties
                    .apply_penalty(
                        &user_id,
                        severity,
                        &format!("automated: suspicious activity score {:.0}", analysis.score),
                    )
                    .await;
                {
                    let mut stats = self.stats.lock().unwrap_or_else(|e| e.into_inner());
                    stats.penalties_applied += 1;
                }
                details.message = Some(format!("penalty applied: {:?}", record.penalty_type));
            }
        }

        {
            let mut stats = self.stats.lock().unwrap_or_else(|e| e.into_inner());
            stats.allowed += 1;
        }
        self.record_event(AdmissionEvent {
            kind: AdmissionEventKind::Allowed,
            user_id,
            action,
            at: Instant::now(),
            detail: None,
        });

        #[cfg(feature = "metrics")]
        metrics::counter!("aegis_gate_decisions_total", "outcome" => "allowed").increment(1);

        GateDecision::allowed(details)
    }

    fn deny(
        &self,
        user_id: &str,
        action: &str,
        reason: DenialReason,
        message: Option<String>,
    ) -> GateDecision {
        {
            let mut stats = self.stats.lock().unwrap_or_else(|e| e.into_inner());
            stats.blocked += 1;
        }
        tracing::debug!(user_id, action, code = reason.code(), "request denied");
        self.record_event(AdmissionEvent {
            kind: AdmissionEventKind::Blocked,
            user_id: user_id.to_string(),
            action: action.to_string(),
            at: Instant::now(),
            detail: Some(reason.code().to_string()),
        });

        #[cfg(feature = "metrics")]
        metrics::counter!("aegis_gate_decisions_total", "outcome" => "blocked").increment(1);

        GateDecision::denied(
            reason,
            GateDetails {
                message,
                ..Default::default()
            },
        )
    }

    fn note_internal_error(&self, user_id: &str, action: &str, detail: &str) {
        {
            let mut stats = self.stats.lock().unwrap_or_else(|e| e.into_inner());
            stats.internal_errors += 1;
        }
        tracing::warn!(user_id, action, detail, "admission internal error, failing open");
        self.record_event(AdmissionEvent {
            kind: AdmissionEventKind::Error,
            user_id: user_id.to_string(),
            action: action.to_string(),
            at: Instant::now(),
            detail: Some(detail.to_string()),
        });
    }
}
