//! Fixed-window limits across the full gate.

use super::gate;
use aegis_admission::{DenialReason, GateRequest, RateLimitRule};
use std::time::Duration;

#[tokio::test]
async fn five_per_minute_blocks_the_sixth() {
    let gate = gate(vec![RateLimitRule::new("job")
        .max_requests(5)
        .window(Duration::from_secs(60))
        .cooldown(Duration::ZERO)]);

    for i in 0..5 {
        let decision = gate
            .gate(GateRequest::new("u1", "job_trigger").with_job("job", "test"))
            .await;
        assert!(decision.allowed, "request {} should be admitted", i + 1);
    }

    let sixth = gate
        .gate(GateRequest::new("u1", "job_trigger").with_job("job", "test"))
        .await;
    assert!(!sixth.allowed);
    let reason = sixth.reason.as_ref().unwrap();
    assert!(matches!(reason, DenialReason::RateLimitExceeded { .. }));
    assert!(sixth.retry_after.unwrap() <= Duration::from_secs(60));
    assert!(sixth
        .details
        .message
        .as_ref()
        .unwrap()
        .contains("rate-limit exceeded"));
}

#[tokio::test]
async fn a_new_window_admits_again() {
    let gate = gate(vec![RateLimitRule::new("job")
        .max_requests(5)
        .window(Duration::from_millis(80))
        .cooldown(Duration::ZERO)]);

    for _ in 0..5 {
        assert!(
            gate.gate(GateRequest::new("u1", "job_trigger").with_job("job", "test"))
                .await
                .allowed
        );
    }
    assert!(
        !gate
            .gate(GateRequest::new("u1", "job_trigger").with_job("job", "test"))
            .await
            .allowed
    );

    tokio::time::sleep(Duration::from_millis(100)).await;
    let seventh = gate
        .gate(GateRequest::new("u1", "job_trigger").with_job("job", "test"))
        .await;
    assert!(seventh.allowed);
}

#[tokio::test]
async fn users_do_not_share_windows() {
    let gate = gate(vec![RateLimitRule::new("job")
        .max_requests(1)
        .window(Duration::from_secs(60))
        .cooldown(Duration::ZERO)]);

    assert!(
        gate.gate(GateRequest::new("u1", "job_trigger").with_job("job", "test"))
            .await
            .allowed
    );
    assert!(
        !gate
            .gate(GateRequest::new("u1", "job_trigger").with_job("job", "test"))
            .await
            .allowed
    );
    assert!(
        gate.gate(GateRequest::new("u2", "job_trigger").with_job("job", "test"))
            .await
            .allowed
    );
}

#[tokio::test]
async fn denials_render_as_http_429() {
    let gate = gate(vec![RateLimitRule::new("job")
        .max_requests(1)
        .cooldown(Duration::ZERO)]);

    gate.gate(GateRequest::new("u1", "job_trigger").with_job("job", "test"))
        .await;
    let denial = gate
        .gate(GateRequest::new("u1", "job_trigger").with_job("job", "test"))
        .await;

    let http = denial.to_http().unwrap();
    assert_eq!(http.status, 429);
    assert_eq!(http.error, "rate_limit_exceeded");
    assert!(http.retry_after.is_some());

    let body = serde_json::to_value(&http).unwrap();
    assert_eq!(body["status"], 429);
    assert!(body["message"].is_string());
}
