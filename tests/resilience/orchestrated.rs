//! Orchestrated execution end to end, including boundary isolation.

use aegis_backoff::{BackoffExecutor, JitterMode};
use aegis_circuitbreaker::{BreakerConfig, BreakerManager, BreakerState};
use aegis_config::{BackoffSettings, StaticConfigProvider};
use aegis_degradation::DegradationManager;
use aegis_fallback::{FallbackChain, ToolCapability};
use aegis_orchestrator::{
    run_fn, BoundaryConfig, BoundaryKind, BoundaryState, MemoryContextStore, OperationDefinition,
    OrchestratorConfig, ResilienceBoundary, ResilienceOrchestrator, ResiliencePattern, RunFn,
    Strategy,
};
use aegis_timeout::{TimeoutConfig, TimeoutManager};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn orchestrator() -> Arc<ResilienceOrchestrator> {
    let mut config = OrchestratorConfig::default();
    config.default_backoff = BackoffSettings {
        max_attempts: 3,
        base_delay: Duration::from_millis(1),
        jitter: JitterMode::None,
        ..Default::default()
    };
    Arc::new(ResilienceOrchestrator::new(
        Arc::new(BreakerManager::new(
            BreakerConfig::builder()
                .failure_threshold(3)
                .recovery_timeout(Duration::from_millis(60))
                .success_threshold(1)
                .build(),
        )),
        Arc::new(BackoffExecutor::new()),
        Arc::new(TimeoutManager::new(TimeoutConfig::default())),
        Arc::new(DegradationManager::builder().build()),
        Arc::new(FallbackChain::new(Default::default())),
        config,
    ))
}

fn ok_op() -> RunFn {
    run_fn(|_| Box::pin(async { Ok(json!({"answer": 42})) }))
}

#[tokio::test]
async fn a_healthy_call_composes_all_three_primitives() {
    let orchestrator = orchestrator();
    let def = OperationDefinition::new("answer-1", "llm", "complete");

    let result = orchestrator.execute(ok_op(), &def).await;
    assert!(result.success);
    assert_eq!(result.final_strategy, Strategy::CircuitFirst);
    assert_eq!(result.result, Some(json!({"answer": 42})));
    for pattern in [
        ResiliencePattern::Backoff,
        ResiliencePattern::Timeout,
        ResiliencePattern::CircuitBreaker,
    ] {
        assert!(
            result.patterns_used.contains(&pattern),
            "missing {pattern:?} in {:?}",
            result.patterns_used
        );
    }
    assert!(!result.execution_path.is_empty());
}

#[tokio::test]
async fn transient_failures_recover_inside_the_composition() {
    let orchestrator = orchestrator();
    let def = OperationDefinition::new("retry-1", "llm", "complete");

    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = Arc::clone(&calls);
    let op = run_fn(move |_| {
        let n = calls_clone.fetch_add(1, Ordering::SeqCst) + 1;
        Box::pin(async move {
            if n < 3 {
                Err("connection refused".to_string())
            } else {
                Ok(json!({"attempt": n}))
            }
        })
    });

    let result = orchestrator.execute(op, &def).await;
    assert!(result.success);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    // The breaker saw one successful composed call.
    assert_eq!(
        orchestrator.breakers().state("llm"),
        Some(BreakerState::Closed)
    );
}

#[tokio::test]
async fn an_open_breaker_reroutes_through_the_emergency_fallback() {
    let orchestrator = orchestrator();
    let def = OperationDefinition::new("doomed", "registry", "lookup");
    orchestrator
        .fallbacks()
        .registry()
        .register(ToolCapability::new("registry").with_action("lookup"));

    for _ in 0..3 {
        orchestrator
            .execute(run_fn(|_| Box::pin(async { Err("503 unavailable".to_string()) })), &def)
            .await;
    }
    assert_eq!(
        orchestrator.breakers().state("registry"),
        Some(BreakerState::Open)
    );

    let result = orchestrator
        .execute(run_fn(|_| Box::pin(async { Err("still down".to_string()) })), &def)
        .await;
    assert_eq!(result.final_strategy, Strategy::TimeoutWithFallback);
    assert!(result.success);
    assert!(result.from_fallback);
}

#[tokio::test]
async fn provider_built_orchestrator_works_out_of_the_box() {
    let provider = StaticConfigProvider::new().with_backoff(
        "default",
        BackoffSettings {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
            jitter: JitterMode::None,
            ..Default::default()
        },
    );
    let orchestrator = ResilienceOrchestrator::from_provider(&provider);

    let def = OperationDefinition::new("p-1", "svc", "act");
    let result = orchestrator.execute(ok_op(), &def).await;
    assert!(result.success);
    assert_eq!(orchestrator.metrics().executions, 1);
}

#[tokio::test]
async fn boundary_isolates_and_preserves_context() {
    let store = Arc::new(MemoryContextStore::new());
    let boundary = ResilienceBoundary::new(
        BoundaryKind::ToolExecution,
        BoundaryConfig {
            max_errors_before_degradation: 1,
            max_errors_before_isolation: 2,
            isolation_duration: Duration::from_secs(60),
            ..Default::default()
        },
        orchestrator(),
    )
    .with_context_store(Arc::clone(&store) as Arc<dyn aegis_orchestrator::ContextStore>);

    let def = OperationDefinition::new("tool-1", "tools", "run");
    let failing = run_fn(|_| Box::pin(async { Err("tool crashed".to_string()) }));

    let first = boundary
        .execute(
            Arc::clone(&failing),
            &def,
            None,
            Some(json!({"tool": "grep", "args": ["-r", "todo"]})),
        )
        .await;
    assert!(!first.success);
    assert!(first.context_snapshot_id.is_some());

    boundary
        .execute(Arc::clone(&failing), &def, None, None)
        .await;
    assert_eq!(boundary.state(), BoundaryState::Isolated);

    // While isolated, only the fallback runs.
    let isolated = boundary
        .execute(
            ok_op(),
            &def,
            Some(run_fn(|_| Box::pin(async { Ok(json!("static")) }))),
            None,
        )
        .await;
    assert!(isolated.success);
    assert!(isolated.orchestrated.is_none());
    assert_eq!(isolated.result, Some(json!("static")));

    // The first failure's context is retrievable by id.
    let id = first.context_snapshot_id.unwrap();
    assert_eq!(store.get(&id).unwrap().payload["tool"], "grep");
}
