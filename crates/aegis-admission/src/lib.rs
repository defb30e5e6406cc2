//! Admission control: rate limits, cooldowns, activity scoring, and
//! progressive penalties.
//!
//! The [`AdmissionGate`] decides, per request, whether it may proceed:
//!
//! 1. [`PenaltyManager::is_user_allowed`] — whitelist wins, blacklist
//!    denies, active blocks deny until they lapse.
//! 2. [`RateLimiter::check_job_trigger`] — fixed-window count per user,
//!    then per-job cooldown; accepted triggers are recorded.
//! 3. [`ActivityMonitor`] — the request joins the user's rolling pattern
//!    log; a suspicious score at or above the auto-penalty threshold
//!    applies a penalty with severity derived from score bands.
//!
//! Internal errors never deny a request: the gate fails open, logs, and
//! counts them. Decisions, penalties, and errors land in a bounded event
//! ring from which a health summary is derived.
//!
//! # Example
//!
//! ```rust
//! use aegis_admission::{
//!     ActivityConfig, ActivityMonitor, AdmissionGate, GateConfig, GateRequest,
//!     PenaltyConfig, PenaltyManager, RateLimitRule, RateLimiter,
//! };
//! use aegis_store::CounterStore;
//! use std::sync::Arc;
//!
//! # async fn example() {
//! let store = Arc::new(CounterStore::in_memory());
//! let gate = AdmissionGate::new(
//!     Arc::new(PenaltyManager::new(PenaltyConfig::default(), Arc::clone(&store))),
//!     Arc::new(RateLimiter::new(Arc::clone(&store), vec![RateLimitRule::new("deploy")])),
//!     Arc::new(ActivityMonitor::new(ActivityConfig::default())),
//!     GateConfig::default(),
//! );
//!
//! let decision = gate
//!     .gate(GateRequest::new("u1", "job_trigger").with_job("deploy", "api"))
//!     .await;
//! assert!(decision.allowed);
//! # }
//! ```
//!
//! With the `tower` feature, [`AdmissionLayer`] gates any tower service
//! and denials render as HTTP 429 via [`GateDecision::to_http`].

mod activity;
mod events;
mod gate;
#[cfg(feature = "tower")]
mod layer;
mod penalty;
mod ratelimit;

pub use activity::{
    ActivityAnalysis, ActivityConfig, ActivityMonitor, RequestPattern, SuspicionFlag,
};
pub use events::{AdmissionEvent, AdmissionEventKind};
pub use gate::{
    AdmissionGate, DenialReason, GateConfig, GateDecision, GateDetails, GateHealth, GateRequest,
    GateStats, HttpDenial,
};
#[cfg(feature = "tower")]
pub use layer::{Admission, AdmissionError, AdmissionLayer};
pub use penalty::{
    PenaltyConfig, PenaltyError, PenaltyManager, PenaltyRecord, PenaltySeverity, PenaltyType,
    UserAdmission, UserPenaltyState, UserStanding,
};
pub use ratelimit::{
    CooldownStatus, RateLimitRule, RateLimitStatus, RateLimiter, TriggerDecision,
};
