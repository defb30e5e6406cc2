//! Named failure boundaries around the orchestrator.
//!
//! A boundary accumulates errors for one region of the service, degrades
//! and finally isolates itself when they pile up, and preserves request
//! context on failure for boundary types that support resumption.

use crate::result::{OperationDefinition, ResilienceResult, RunFn};
use crate::ResilienceOrchestrator;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime};

/// What a boundary guards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoundaryKind {
    /// Model invocations.
    AiProcessing,
    /// Tool invocations against external systems.
    ToolExecution,
    /// Responses back to the chat platform.
    SlackResponse,
    /// Server registry operations.
    Registry,
    /// Anything else.
    Custom(String),
}

impl BoundaryKind {
    /// Stable label.
    pub fn as_str(&self) -> &str {
        match self {
            BoundaryKind::AiProcessing => "ai_processing",
            BoundaryKind::ToolExecution => "tool_execution",
            BoundaryKind::SlackResponse => "slack_response",
            BoundaryKind::Registry => "registry",
            BoundaryKind::Custom(name) => name,
        }
    }

    /// Whether failures in this boundary snapshot request context for
    /// later resumption.
    pub fn preserves_context(&self) -> bool {
        matches!(
            self,
            BoundaryKind::AiProcessing | BoundaryKind::ToolExecution | BoundaryKind::Registry
        )
    }
}

/// Boundary health.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryState {
    Healthy,
    Degraded,
    Isolated,
}

/// How the boundary ran a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStyle {
    /// Only the boundary fallback ran; the orchestrator was not called.
    BoundaryFirst,
    /// The orchestrator ran the call.
    OrchestratorFirst,
    /// The orchestrator ran under boundary accounting with the boundary
    /// fallback as a last resort.
    Hybrid,
}

/// Boundary thresholds.
#[derive(Debug, Clone)]
pub struct BoundaryConfig {
    /// Errors at which the boundary reports itself degraded.
    pub max_errors_before_degradation: u32,
    /// Errors at which the boundary isolates.
    pub max_errors_before_isolation: u32,
    /// Quiet time after which the error count resets.
    pub recovery_timeout: Duration,
    /// How long isolation lasts.
    pub isolation_duration: Duration,
}

impl Default for BoundaryConfig {
    fn default() -> Self {
        Self {
            max_errors_before_degradation: 3,
            max_errors_before_isolation: 10,
            recovery_timeout: Duration::from_secs(60),
            isolation_duration: Duration::from_secs(300),
        }
    }
}

/// A preserved request context.
#[derive(Debug, Clone)]
pub struct ContextSnapshot {
    /// Stable id returned to the caller.
    pub id: String,
    /// Which boundary captured it.
    pub boundary: String,
    /// When it was captured.
    pub captured_at: SystemTime,
    /// Opaque request context.
    pub payload: Value,
}

/// External persistence for context snapshots.
#[async_trait]
pub trait ContextStore: Send + Sync {
    /// Persists a snapshot.
    async fn persist(&self, snapshot: ContextSnapshot) -> Result<(), String>;
}

/// In-process context store; useful for tests and single-node setups.
#[derive(Default)]
pub struct MemoryContextStore {
    snapshots: Mutex<HashMap<String, ContextSnapshot>>,
}

impl MemoryContextStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetches a snapshot by id.
    pub fn get(&self, id: &str) -> Option<ContextSnapshot> {
        self.snapshots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
    }

    /// Number of stored snapshots.
    pub fn len(&self) -> usize {
        self.snapshots.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ContextStore for MemoryContextStore {
    async fn persist(&self, snapshot: ContextSnapshot) -> Result<(), String> {
        self.snapshots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(snapshot.id.clone(), snapshot);
        Ok(())
    }
}

/// Result of a boundary-guarded call.
#[derive(Debug, Clone)]
pub struct BoundaryOutcome {
    /// Whether a value was produced.
    pub success: bool,
    /// Produced payload.
    pub result: Option<Value>,
    /// Terminal failure rendering.
    pub error: Option<String>,
    /// Boundary state after the call.
    pub state: BoundaryState,
    /// How the call was run.
    pub style: ExecutionStyle,
    /// Orchestrator result, when the orchestrator ran.
    pub orchestrated: Option<ResilienceResult>,
    /// Id of the preserved context, when one was captured.
    pub context_snapshot_id: Option<String>,
}

struct StateInner {
    status: BoundaryState,
    error_count: u32,
    last_error: Option<String>,
    last_error_at: Option<Instant>,
    last_state_change: Instant,
    isolated_until: Option<Instant>,
}

/// Error-accumulating region wrapping the orchestrator.
pub struct ResilienceBoundary {
    kind: BoundaryKind,
    config: BoundaryConfig,
    orchestrator: Arc<ResilienceOrchestrator>,
    context_store: Option<Arc<dyn ContextStore>>,
    state: Mutex<StateInner>,
    snapshot_seq: AtomicU64,
}

impl ResilienceBoundary {
    /// Creates a boundary of the given kind.
    pub fn new(
        kind: BoundaryKind,
        config: BoundaryConfig,
        orchestrator: Arc<ResilienceOrchestrator>,
    ) -> Self {
        Self {
            kind,
            config,
            orchestrator,
            context_store: None,
            state: Mutex::new(StateInner {
                status: BoundaryState::Healthy,
                error_count: 0,
                last_error: None,
                last_error_at: None,
                last_state_change: Instant::now(),
                isolated_until: None,
            }),
            snapshot_seq: AtomicU64::new(1),
        }
    }

    /// Installs a context store for preserved snapshots.
    pub fn with_context_store(mut self, store: Arc<dyn ContextStore>) -> Self {
        self.context_store = Some(store);
        self
    }

    /// The boundary's kind.
    pub fn kind(&self) -> &BoundaryKind {
        &self.kind
    }

    /// Current state, refreshing isolation expiry.
    pub fn state(&self) -> BoundaryState {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        self.refresh(&mut state);
        state.status
    }

    /// Current error count.
    pub fn error_count(&self) -> u32 {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .error_count
    }

    /// Last recorded error, if any.
    pub fn last_error(&self) -> Option<String> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .last_error
            .clone()
    }

    fn refresh(&self, state: &mut StateInner) {
        // Isolation lapses after its duration.
        if state.status == BoundaryState::Isolated {
            if let Some(until) = state.isolated_until {
                if Instant::now() >= until {
                    state.status = BoundaryState::Degraded;
                    state.isolated_until = None;
                    state.last_state_change = Instant::now();
                    tracing::info!(boundary = self.kind.as_str(), "isolation lapsed");
                }
            }
        }
        // A quiet boundary forgets its errors.
        if state.error_count > 0
            && state
                .last_error_at
                .is_some_and(|at| at.elapsed() >= self.config.recovery_timeout)
        {
            state.error_count = 0;
            if state.status != BoundaryState::Isolated {
                state.status = BoundaryState::Healthy;
                state.last_state_change = Instant::now();
            }
        }
    }

    fn record_failure(&self, error: &str) -> BoundaryState {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.error_count += 1;
        state.last_error = Some(error.to_string());
        state.last_error_at = Some(Instant::now());

        let next = if state.error_count >= self.config.max_errors_before_isolation {
            BoundaryState::Isolated
        } else if state.error_count >= self.config.max_errors_before_degradation {
            BoundaryState::Degraded
        } else {
            state.status
        };

        if next != state.status {
            tracing::warn!(
                boundary = self.kind.as_str(),
                from = ?state.status,
                to = ?next,
                errors = state.error_count,
                "boundary state change"
            );
            state.status = next;
            state.last_state_change = Instant::now();
            if next == BoundaryState::Isolated {
                state.isolated_until = Some(Instant::now() + self.config.isolation_duration);
            }
        }
        state.status
    }

    fn record_success(&self) -> BoundaryState {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.error_count = state.error_count.saturating_sub(1);
        if state.error_count == 0 && state.status == BoundaryState::Degraded {
            state.status = BoundaryState::Healthy;
            state.last_state_change = Instant::now();
        }
        state.status
    }

    async fn preserve_context(&self, context: Option<Value>) -> Option<String> {
        if !self.kind.preserves_context() {
            return None;
        }
        let payload = context?;
        let id = format!(
            "ctx-{}-{:08}",
            self.kind.as_str(),
            self.snapshot_seq.fetch_add(1, Ordering::Relaxed)
        );
        let snapshot = ContextSnapshot {
            id: id.clone(),
            boundary: self.kind.as_str().to_string(),
            captured_at: SystemTime::now(),
            payload,
        };
        if let Some(store) = &self.context_store {
            if let Err(err) = store.persist(snapshot).await {
                tracing::warn!(boundary = self.kind.as_str(), %err, "context persist failed");
            }
        }
        Some(id)
    }

    /// Runs an operation under boundary accounting.
    ///
    /// - ISOLATED runs only the fallback and never calls the
    ///   orchestrator.
    /// - Essential operations run hybrid: orchestrator first, boundary
    ///   fallback on failure.
    /// - Everything else is orchestrator-first.
    pub async fn execute(
        &self,
        op: RunFn,
        def: &OperationDefinition,
        fallback: Option<RunFn>,
        context: Option<Value>,
    ) -> BoundaryOutcome {
        let status = self.state();

        if status == BoundaryState::Isolated {
            return self.run_boundary_first(fallback, context).await;
        }

        let style = if def.essential {
            ExecutionStyle::Hybrid
        } else {
            ExecutionStyle::OrchestratorFirst
        };

        let orchestrated = self.orchestrator.execute(op, def).await;

        if orchestrated.success {
            let state = self.record_success();
            return BoundaryOutcome {
                success: true,
                result: orchestrated.result.clone(),
                error: None,
                state,
                style,
                orchestrated: Some(orchestrated),
                context_snapshot_id: None,
            };
        }

        let error = orchestrated
            .error
            .clone()
            .unwrap_or_else(|| "orchestrated execution failed".to_string());
        let state = self.record_failure(&error);

        // Hybrid: the boundary's own fallback is the last resort.
        if style == ExecutionStyle::Hybrid {
            if let Some(fallback) = &fallback {
                let token = aegis_timeout::CancellationToken::new();
                if let Ok(value) = fallback(token).await {
                    return BoundaryOutcome {
                        success: true,
                        result: Some(value),
                        error: Some(error),
                        state,
                        style,
                        orchestrated: Some(orchestrated),
                        context_snapshot_id: None,
                    };
                }
            }
        }

        let context_snapshot_id = self.preserve_context(context).await;
        BoundaryOutcome {
            success: false,
            result: None,
            error: Some(error),
            state,
            style,
            orchestrated: Some(orchestrated),
            context_snapshot_id,
        }
    }

    async fn run_boundary_first(
        &self,
        fallback: Option<RunFn>,
        context: Option<Value>,
    ) -> BoundaryOutcome {
        tracing::debug!(boundary = self.kind.as_str(), "isolated, serving fallback only");
        match fallback {
            Some(fallback) => {
                let token = aegis_timeout::CancellationToken::new();
                match fallback(token).await {
                    Ok(value) => BoundaryOutcome {
                        success: true,
                        result: Some(value),
                        error: None,
                        state: BoundaryState::Isolated,
                        style: ExecutionStyle::BoundaryFirst,
                        orchestrated: None,
                        context_snapshot_id: None,
                    },
                    Err(err) => {
                        let context_snapshot_id = self.preserve_context(context).await;
                        BoundaryOutcome {
                            success: false,
                            result: None,
                            error: Some(err),
                            state: BoundaryState::Isolated,
                            style: ExecutionStyle::BoundaryFirst,
                            orchestrated: None,
                            context_snapshot_id,
                        }
                    }
                }
            }
            None => {
                let context_snapshot_id = self.preserve_context(context).await;
                BoundaryOutcome {
                    success: false,
                    result: None,
                    error: Some(format!(
                        "boundary '{}' is isolated",
                        self.kind.as_str()
                    )),
                    state: BoundaryState::Isolated,
                    style: ExecutionStyle::BoundaryFirst,
                    orchestrated: None,
                    context_snapshot_id,
                }
            }
        }
    }
}
