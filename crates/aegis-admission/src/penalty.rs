//! Progressive penalties: warn, block, extend, ban.
//!
//! Escalation is a function of the incoming severity and the user's
//! counters; block durations grow geometrically with the user's block
//! count and are capped. Permanent bans also set the blacklist flag in
//! the shared store so sibling processes observe them.

use crate::events::{AdmissionEvent, AdmissionEventKind};
use aegis_core::Listeners;
use aegis_store::{keys, CounterStore};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime};
use thiserror::Error;

/// Severity of a violation as judged by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PenaltySeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// Concrete penalty applied to a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PenaltyType {
    Warning,
    TemporaryBlock,
    ExtendedBlock,
    PermanentBan,
}

impl PenaltyType {
    /// Whether the penalty blocks requests.
    pub fn blocks(self) -> bool {
        !matches!(self, PenaltyType::Warning)
    }
}

/// A user's standing with the admission system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserStanding {
    Normal,
    Whitelisted,
    Warned,
    TempBlocked,
    PermBanned,
}

/// One issued penalty.
#[derive(Debug, Clone)]
pub struct PenaltyRecord {
    /// Stable id, unique within this manager.
    pub id: String,
    /// What was applied.
    pub penalty_type: PenaltyType,
    /// Severity that drove the escalation.
    pub severity: PenaltySeverity,
    /// Why it was applied.
    pub reason: String,
    /// When it was issued.
    pub issued_at: SystemTime,
    /// When it lapses; `None` for warnings and permanent bans.
    pub expires_at: Option<SystemTime>,
    /// Whether it currently binds.
    pub is_active: bool,
    /// Whether the user may appeal it.
    pub appealable: bool,
    /// Whether an appeal was filed.
    pub appealed: bool,
    /// When it was revoked, if ever.
    pub revoked_at: Option<SystemTime>,
    /// Who revoked it.
    pub revoked_by: Option<String>,
    /// Free-form annotations.
    pub metadata: HashMap<String, String>,
}

/// Mutable per-user penalty state.
#[derive(Debug, Clone)]
pub struct UserPenaltyState {
    pub user_id: String,
    pub standing: UserStanding,
    pub warning_count: u32,
    pub block_count: u32,
    pub total_violations: u32,
    pub current_penalty: Option<PenaltyRecord>,
    pub blocked_until: Option<SystemTime>,
    pub appeal_count: u32,
    pub history: Vec<PenaltyRecord>,
    last_violation: Option<Instant>,
}

impl UserPenaltyState {
    fn new(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            standing: UserStanding::Normal,
            warning_count: 0,
            block_count: 0,
            total_violations: 0,
            current_penalty: None,
            blocked_until: None,
            appeal_count: 0,
            history: Vec::new(),
            last_violation: None,
        }
    }
}

/// Outcome of an admission check for a user.
#[derive(Debug, Clone)]
pub struct UserAdmission {
    /// Whether the user may proceed.
    pub allowed: bool,
    /// Standing at decision time.
    pub standing: UserStanding,
    /// Denial explanation.
    pub reason: Option<String>,
    /// When a temporary block lapses.
    pub blocked_until: Option<SystemTime>,
    /// Seconds until the user may retry, when meaningful.
    pub retry_after: Option<Duration>,
}

impl UserAdmission {
    fn allowed(standing: UserStanding) -> Self {
        Self {
            allowed: true,
            standing,
            reason: None,
            blocked_until: None,
            retry_after: None,
        }
    }
}

/// Tuning for escalation and appeals.
#[derive(Debug, Clone)]
pub struct PenaltyConfig {
    /// Base block duration.
    pub base_timeout: Duration,
    /// Geometric growth factor per prior block.
    pub escalation_multiplier: f64,
    /// Ceiling on block duration.
    pub max_timeout: Duration,
    /// Total violations at which CRITICAL escalates to a permanent ban.
    pub permanent_ban_threshold: u32,
    /// Appeals a user may file across all penalties.
    pub max_appeals_per_user: u32,
    /// Violations older than this stop counting toward warnings.
    pub violation_window: Duration,
    /// Exponent offset for extended blocks.
    pub extended_block_offset: u32,
    /// Bound on retained history per user.
    pub history_limit: usize,
}

impl Default for PenaltyConfig {
    fn default() -> Self {
        Self {
            base_timeout: Duration::from_secs(300),
            escalation_multiplier: 2.0,
            max_timeout: Duration::from_secs(24 * 3600),
            permanent_ban_threshold: 10,
            max_appeals_per_user: 3,
            violation_window: Duration::from_secs(24 * 3600),
            extended_block_offset: 2,
            history_limit: 50,
        }
    }
}

/// Errors from penalty management operations.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PenaltyError {
    #[error("no penalty '{0}' on record")]
    NotFound(String),
    #[error("penalty '{0}' is not appealable")]
    NotAppealable(String),
    #[error("penalty '{0}' was already appealed")]
    AlreadyAppealed(String),
    #[error("appeal limit reached for user '{0}'")]
    AppealLimitReached(String),
}

/// State machine over user standings with allow/deny list overrides.
pub struct PenaltyManager {
    config: PenaltyConfig,
    store: Arc<CounterStore>,
    users: Mutex<HashMap<String, UserPenaltyState>>,
    whitelist: Mutex<HashSet<String>>,
    blacklist: Mutex<HashSet<String>>,
    next_id: AtomicU64,
    listeners: Listeners<AdmissionEvent>,
}

impl PenaltyManager {
    /// Creates a manager over the given store.
    pub fn new(config: PenaltyConfig, store: Arc<CounterStore>) -> Self {
        Self::with_listeners(config, store, Listeners::new())
    }

    /// Creates a manager with event listeners.
    pub fn with_listeners(
        config: PenaltyConfig,
        store: Arc<CounterStore>,
        listeners: Listeners<AdmissionEvent>,
    ) -> Self {
        Self {
            config,
            store,
            users: Mutex::new(HashMap::new()),
            whitelist: Mutex::new(HashSet::new()),
            blacklist: Mutex::new(HashSet::new()),
            next_id: AtomicU64::new(1),
            listeners,
        }
    }

    fn allocate_id(&self) -> String {
        format!("pen-{:08}", self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// A copy of a user's penalty state, if tracked.
    pub fn user_state(&self, user_id: &str) -> Option<UserPenaltyState> {
        let users = self.users.lock().unwrap_or_else(|e| e.into_inner());
        users.get(user_id).cloned()
    }

    fn escalate(&self, severity: PenaltySeverity, state: &UserPenaltyState) -> PenaltyType {
        match severity {
            PenaltySeverity::Critical => {
                if state.block_count >= 2
                    || state.total_violations >= self.config.permanent_ban_threshold
                {
                    PenaltyType::PermanentBan
                } else {
                    PenaltyType::ExtendedBlock
                }
            }
            PenaltySeverity::High => {
                if state.block_count >= 1 {
                    PenaltyType::ExtendedBlock
                } else {
                    PenaltyType::TemporaryBlock
                }
            }
            PenaltySeverity::Medium => {
                if state.warning_count >= 2 {
                    PenaltyType::TemporaryBlock
                } else {
                    PenaltyType::Warning
                }
            }
            PenaltySeverity::Low => PenaltyType::Warning,
        }
    }

    fn block_duration(&self, penalty_type: PenaltyType, block_count: u32) -> Option<Duration> {
        let exponent = match penalty_type {
            PenaltyType::TemporaryBlock => block_count,
            PenaltyType::ExtendedBlock => block_count + self.config.extended_block_offset,
            PenaltyType::Warning | PenaltyType::PermanentBan => return None,
        };
        let secs = self.config.base_timeout.as_secs_f64()
            * self.config.escalation_multiplier.powi(exponent as i32);
        let capped = secs.min(self.config.max_timeout.as_secs_f64());
        Some(Duration::from_secs_f64(capped))
    }

    /// Applies a penalty for a violation and returns the record.
    pub async fn apply_penalty(
        &self,
        user_id: &str,
        severity: PenaltySeverity,
        reason: &str,
    ) -> PenaltyRecord {
        let record = {
            let mut users = self.users.lock().unwrap_or_else(|e| e.into_inner());
            let state = users
                .entry(user_id.to_string())
                .or_insert_with(|| UserPenaltyState::new(user_id));

            // Old violations age out of the warning ladder.
            if state
                .last_violation
                .is_some_and(|at| at.elapsed() > self.config.violation_window)
            {
                state.warning_count = 0;
            }

            let penalty_type = self.escalate(severity, state);
            let duration = self.block_duration(penalty_type, state.block_count);
            let now = SystemTime::now();

            let record = PenaltyRecord {
                id: self.allocate_id(),
                penalty_type,
                severity,
                reason: reason.to_string(),
                issued_at: now,
                expires_at: duration.map(|d| now + d),
                is_active: true,
                appealable: penalty_type != PenaltyType::Warning,
                appealed: false,
                revoked_at: None,
                revoked_by: None,
                metadata: HashMap::new(),
            };

            state.total_violations += 1;
            state.last_violation = Some(Instant::now());
            match penalty_type {
                PenaltyType::Warning => {
                    state.warning_count += 1;
                    state.standing = UserStanding::Warned;
                    state.blocked_until = None;
                }
                PenaltyType::TemporaryBlock | PenaltyType::ExtendedBlock => {
                    state.block_count += 1;
                    state.standing = UserStanding::TempBlocked;
                    state.blocked_until = record.expires_at;
                }
                PenaltyType::PermanentBan => {
                    state.standing = UserStanding::PermBanned;
                    state.blocked_until = None;
                }
            }
            state.current_penalty = Some(record.clone());
            state.history.push(record.clone());
            while state.history.len() > self.config.history_limit {
                state.history.remove(0);
            }
            record
        };

        if record.penalty_type == PenaltyType::PermanentBan {
            self.add_to_blacklist(user_id).await;
        }

        tracing::info!(
            user_id,
            penalty = ?record.penalty_type,
            ?severity,
            reason,
            "penalty applied"
        );
        self.listeners.emit(&AdmissionEvent {
            kind: AdmissionEventKind::Penalty,
            user_id: user_id.to_string(),
            action: "apply_penalty".to_string(),
            at: Instant::now(),
            detail: Some(format!("{:?}: {reason}", record.penalty_type)),
        });

        #[cfg(feature = "metrics")]
        metrics::counter!("aegis_penalties_applied_total", "type" => match record.penalty_type {
            PenaltyType::Warning => "warning",
            PenaltyType::TemporaryBlock => "temporary_block",
            PenaltyType::ExtendedBlock => "extended_block",
            PenaltyType::PermanentBan => "permanent_ban",
        })
        .increment(1);

        record
    }

    /// Checks whether a user may proceed, clearing lapsed penalties.
    pub async fn is_user_allowed(&self, user_id: &str) -> UserAdmission {
        if self.is_whitelisted(user_id) {
            return UserAdmission::allowed(UserStanding::Whitelisted);
        }
        if self.is_blacklisted(user_id) {
            return UserAdmission {
                allowed: false,
                standing: UserStanding::PermBanned,
                reason: Some("permanently banned".to_string()),
                blocked_until: None,
                retry_after: None,
            };
        }

        let mut users = self.users.lock().unwrap_or_else(|e| e.into_inner());
        let Some(state) = users.get_mut(user_id) else {
            return UserAdmission::allowed(UserStanding::Normal);
        };

        // Age out lapsed blocks.
        if let Some(penalty) = &state.current_penalty {
            if penalty.penalty_type.blocks() {
                if let Some(expires_at) = penalty.expires_at {
                    if expires_at <= SystemTime::now() {
                        if let Some(p) = state.current_penalty.as_mut() {
                            p.is_active = false;
                        }
                        state.current_penalty = None;
                        state.blocked_until = None;
                        state.standing = if state.warning_count > 0 {
                            UserStanding::Warned
                        } else {
                            UserStanding::Normal
                        };
                    }
                }
            }
        }

        match &state.current_penalty {
            Some(penalty) if penalty.is_active && penalty.penalty_type.blocks() => {
                let retry_after = state.blocked_until.and_then(|until| {
                    until.duration_since(SystemTime::now()).ok()
                });
                UserAdmission {
                    allowed: false,
                    standing: state.standing,
                    reason: Some(format!("temporarily blocked: {}", penalty.reason)),
                    blocked_until: state.blocked_until,
                    retry_after,
                }
            }
            _ => UserAdmission::allowed(state.standing),
        }
    }

    /// Revokes a penalty and restores the user's standing.
    pub async fn revoke_penalty(
        &self,
        user_id: &str,
        penalty_id: &str,
        revoked_by: &str,
    ) -> Result<(), PenaltyError> {
        let was_ban = {
            let mut users = self.users.lock().unwrap_or_else(|e| e.into_inner());
            let state = users
                .get_mut(user_id)
                .ok_or_else(|| PenaltyError::NotFound(penalty_id.to_string()))?;

            let record = state
                .history
                .iter_mut()
                .find(|r| r.id == penalty_id)
                .ok_or_else(|| PenaltyError::NotFound(penalty_id.to_string()))?;
            record.is_active = false;
            record.revoked_at = Some(SystemTime::now());
            record.revoked_by = Some(revoked_by.to_string());
            let was_ban = record.penalty_type == PenaltyType::PermanentBan;

            if state
                .current_penalty
                .as_ref()
                .is_some_and(|p| p.id == penalty_id)
            {
                state.current_penalty = None;
                state.blocked_until = None;
                state.standing = UserStanding::Normal;
            }
            was_ban
        };

        if was_ban {
            self.remove_from_blacklist(user_id).await;
        }
        tracing::info!(user_id, penalty_id, revoked_by, "penalty revoked");
        Ok(())
    }

    /// Files an appeal against a penalty.
    pub fn appeal(&self, user_id: &str, penalty_id: &str) -> Result<(), PenaltyError> {
        let mut users = self.users.lock().unwrap_or_else(|e| e.into_inner());
        let state = users
            .get_mut(user_id)
            .ok_or_else(|| PenaltyError::NotFound(penalty_id.to_string()))?;

        if state.appeal_count >= self.config.max_appeals_per_user {
            return Err(PenaltyError::AppealLimitReached(user_id.to_string()));
        }
        let record = state
            .history
            .iter_mut()
            .find(|r| r.id == penalty_id)
            .ok_or_else(|| PenaltyError::NotFound(penalty_id.to_string()))?;
        if !record.appealable {
            return Err(PenaltyError::NotAppealable(penalty_id.to_string()));
        }
        if record.appealed {
            return Err(PenaltyError::AlreadyAppealed(penalty_id.to_string()));
        }

        record.appealed = true;
        state.appeal_count += 1;
        Ok(())
    }

    /// Appealed penalties awaiting review.
    pub fn pending_appeals(&self) -> Vec<(String, PenaltyRecord)> {
        let users = self.users.lock().unwrap_or_else(|e| e.into_inner());
        let mut out = Vec::new();
        for (user_id, state) in users.iter() {
            for record in &state.history {
                if record.appealed
                    && record.appealable
                    && record.is_active
                    && record.revoked_at.is_none()
                {
                    out.push((user_id.clone(), record.clone()));
                }
            }
        }
        out
    }

    /// Resolves an appeal; approval revokes the penalty.
    pub async fn resolve_appeal(
        &self,
        user_id: &str,
        penalty_id: &str,
        approve: bool,
        reviewer: &str,
    ) -> Result<(), PenaltyError> {
        if approve {
            self.revoke_penalty(user_id, penalty_id, reviewer).await
        } else {
            let mut users = self.users.lock().unwrap_or_else(|e| e.into_inner());
            let state = users
                .get_mut(user_id)
                .ok_or_else(|| PenaltyError::NotFound(penalty_id.to_string()))?;
            let record = state
                .history
                .iter_mut()
                .find(|r| r.id == penalty_id)
                .ok_or_else(|| PenaltyError::NotFound(penalty_id.to_string()))?;
            // A denied appeal is consumed; the record leaves the queue.
            record.appealable = false;
            tracing::info!(user_id, penalty_id, reviewer, "appeal denied");
            Ok(())
        }
    }

    /// Whether the user is whitelisted.
    pub fn is_whitelisted(&self, user_id: &str) -> bool {
        self.whitelist
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(user_id)
    }

    /// Whether the user is blacklisted.
    pub fn is_blacklisted(&self, user_id: &str) -> bool {
        self.blacklist
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(user_id)
    }

    /// Adds a user to the whitelist, mirrored to the store.
    pub async fn add_to_whitelist(&self, user_id: &str) {
        self.whitelist
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(user_id.to_string());
        if let Err(err) = self.store.increment(&keys::whitelist(user_id), None).await {
            tracing::warn!(user_id, %err, "whitelist write-through failed");
        }
    }

    /// Removes a user from the whitelist.
    pub async fn remove_from_whitelist(&self, user_id: &str) {
        self.whitelist
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(user_id);
        if let Err(err) = self.store.reset(&keys::whitelist(user_id)).await {
            tracing::warn!(user_id, %err, "whitelist write-through failed");
        }
    }

    /// Adds a user to the blacklist, mirrored to the store.
    pub async fn add_to_blacklist(&self, user_id: &str) {
        self.blacklist
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(user_id.to_string());
        if let Err(err) = self.store.increment(&keys::blacklist(user_id), None).await {
            tracing::warn!(user_id, %err, "blacklist write-through failed");
        }
    }

    /// Removes a user from the blacklist.
    pub async fn remove_from_blacklist(&self, user_id: &str) {
        self.blacklist
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(user_id);
        if let Err(err) = self.store.reset(&keys::blacklist(user_id)).await {
            tracing::warn!(user_id, %err, "blacklist write-through failed");
        }
    }
}
