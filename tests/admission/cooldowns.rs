//! Per-job cooldowns across the full gate.

use super::gate;
use aegis_admission::{DenialReason, GateRequest, RateLimitRule};
use std::time::Duration;

#[tokio::test]
async fn immediate_retry_hits_the_cooldown() {
    let gate = gate(vec![RateLimitRule::new("job")
        .max_requests(100)
        .cooldown(Duration::from_secs(30))]);

    let first = gate
        .gate(GateRequest::new("u1", "job_trigger").with_job("job", "deploy"))
        .await;
    assert!(first.allowed);

    let retry = gate
        .gate(GateRequest::new("u1", "job_trigger").with_job("job", "deploy"))
        .await;
    assert!(!retry.allowed);
    assert!(matches!(
        retry.reason,
        Some(DenialReason::CooldownActive { .. })
    ));

    // retry_after is about the full cooldown for an immediate retry.
    let retry_after = retry.retry_after.unwrap();
    assert!(retry_after > Duration::from_secs(25));
    assert!(retry_after <= Duration::from_secs(30));
}

#[tokio::test]
async fn a_lapsed_cooldown_admits() {
    let gate = gate(vec![RateLimitRule::new("job")
        .max_requests(100)
        .cooldown(Duration::from_millis(60))]);

    assert!(
        gate.gate(GateRequest::new("u1", "job_trigger").with_job("job", "deploy"))
            .await
            .allowed
    );
    assert!(
        !gate
            .gate(GateRequest::new("u1", "job_trigger").with_job("job", "deploy"))
            .await
            .allowed
    );

    tokio::time::sleep(Duration::from_millis(80)).await;
    assert!(
        gate.gate(GateRequest::new("u1", "job_trigger").with_job("job", "deploy"))
            .await
            .allowed
    );
}

#[tokio::test]
async fn cooldown_wins_over_the_window_message() {
    let gate = gate(vec![RateLimitRule::new("job")
        .max_requests(1)
        .window(Duration::from_secs(60))
        .cooldown(Duration::from_secs(60))]);

    gate.gate(GateRequest::new("u1", "job_trigger").with_job("job", "x"))
        .await;
    let denial = gate
        .gate(GateRequest::new("u1", "job_trigger").with_job("job", "x"))
        .await;

    // Both checks failed; the cooldown shapes the denial.
    assert!(matches!(
        denial.reason,
        Some(DenialReason::CooldownActive { .. })
    ));
    assert!(denial
        .details
        .message
        .as_ref()
        .unwrap()
        .starts_with("cooldown"));
}

#[tokio::test]
async fn different_jobs_cool_down_independently() {
    let gate = gate(vec![RateLimitRule::new("job")
        .max_requests(100)
        .cooldown(Duration::from_secs(30))]);

    assert!(
        gate.gate(GateRequest::new("u1", "job_trigger").with_job("job", "deploy"))
            .await
            .allowed
    );
    assert!(
        gate.gate(GateRequest::new("u1", "job_trigger").with_job("job", "build"))
            .await
            .allowed
    );
}
