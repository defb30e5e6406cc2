//! Admission gate in front of a tower service whose handler executes
//! through the resilience orchestrator: the full request path.

use aegis_admission::{
    ActivityConfig, ActivityMonitor, AdmissionError, AdmissionGate, AdmissionLayer, GateConfig,
    GateRequest, PenaltyConfig, PenaltyManager, RateLimitRule, RateLimiter,
};
use aegis_config::StaticConfigProvider;
use aegis_orchestrator::{run_fn, OperationDefinition, ResilienceOrchestrator};
use aegis_store::CounterStore;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::{service_fn, Layer, Service, ServiceExt};

#[derive(Clone)]
struct JobRequest {
    user_id: String,
    job_name: String,
}

fn gate() -> Arc<AdmissionGate> {
    let store = Arc::new(CounterStore::in_memory());
    Arc::new(AdmissionGate::new(
        Arc::new(PenaltyManager::new(PenaltyConfig::default(), Arc::clone(&store))),
        Arc::new(RateLimiter::new(
            Arc::clone(&store),
            vec![RateLimitRule::new("tool")
                .max_requests(2)
                .window(Duration::from_secs(60))
                .cooldown(Duration::ZERO)],
        )),
        Arc::new(ActivityMonitor::new(ActivityConfig::default())),
        GateConfig::default(),
    ))
}

#[tokio::test]
async fn admitted_requests_run_through_the_orchestrator() {
    let orchestrator = Arc::new(ResilienceOrchestrator::from_provider(
        &StaticConfigProvider::new(),
    ));

    let layer = AdmissionLayer::new(gate(), |req: &JobRequest| {
        GateRequest::new(req.user_id.clone(), "job_trigger").with_job("tool", req.job_name.clone())
    });

    let handler_orchestrator = Arc::clone(&orchestrator);
    let mut service = layer.layer(service_fn(move |req: JobRequest| {
        let orchestrator = Arc::clone(&handler_orchestrator);
        async move {
            let def = OperationDefinition::new(
                format!("job-{}", req.job_name),
                "tool-runner",
                "run",
            );
            let result = orchestrator
                .execute(
                    run_fn(|_cancel| Box::pin(async { Ok(json!({"status": "done"})) })),
                    &def,
                )
                .await;
            result.result.ok_or_else(|| "no result".to_string())
        }
    }));

    let request = JobRequest {
        user_id: "u1".to_string(),
        job_name: "build".to_string(),
    };

    let first: Value = service
        .ready()
        .await
        .unwrap()
        .call(request.clone())
        .await
        .unwrap();
    assert_eq!(first["status"], "done");

    let second = service.ready().await.unwrap().call(request.clone()).await;
    assert!(second.is_ok());

    // The window holds two requests; the third is rejected before the
    // handler (and the orchestrator) ever see it.
    let executions_before = orchestrator.metrics().executions;
    let third = service.ready().await.unwrap().call(request).await;
    match third {
        Err(AdmissionError::Denied(decision)) => {
            let http = decision.to_http().unwrap();
            assert_eq!(http.status, 429);
        }
        other => panic!("expected a denial, got {other:?}"),
    }
    assert_eq!(orchestrator.metrics().executions, executions_before);
}
