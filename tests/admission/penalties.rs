//! Suspicious traffic earns automatic penalties end to end.

use super::{gate, gate_with};
use aegis_admission::{
    GateConfig, GateRequest, PenaltyConfig, PenaltySeverity, RateLimitRule, UserStanding,
};
use std::time::Duration;

#[tokio::test]
async fn bot_burst_is_blocked_until_the_penalty_lapses() {
    let gate = gate_with(
        vec![RateLimitRule::new("build")
            .max_requests(1000)
            .cooldown(Duration::ZERO)],
        GateConfig {
            auto_penalty_threshold: 70.0,
            high_score: 70.0,
            ..Default::default()
        },
        PenaltyConfig {
            base_timeout: Duration::from_millis(500),
            ..Default::default()
        },
    );

    // 25 identical requests at machine pace.
    for _ in 0..25 {
        gate.gate(GateRequest::new("bot", "job_trigger").with_job("build", "same-job"))
            .await;
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    let stats = gate.stats();
    assert!(stats.suspicious_hits >= 1);
    assert!(stats.penalties_applied >= 1);

    let admission = gate.penalties().is_user_allowed("bot").await;
    assert!(!admission.allowed);
    assert_eq!(admission.standing, UserStanding::TempBlocked);
    assert!(admission.blocked_until.is_some());

    // After the block lapses the user is admitted again.
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert!(gate.penalties().is_user_allowed("bot").await.allowed);
}

#[tokio::test]
async fn manual_penalty_then_revocation_round_trips() {
    let gate = gate(vec![RateLimitRule::new("job")
        .max_requests(100)
        .cooldown(Duration::ZERO)]);

    let record = gate
        .penalties()
        .apply_penalty("u1", PenaltySeverity::High, "manual review")
        .await;

    let denied = gate
        .gate(GateRequest::new("u1", "job_trigger").with_job("job", "x"))
        .await;
    assert!(!denied.allowed);

    gate.penalties()
        .revoke_penalty("u1", &record.id, "moderator")
        .await
        .unwrap();
    let allowed = gate
        .gate(GateRequest::new("u1", "job_trigger").with_job("job", "x"))
        .await;
    assert!(allowed.allowed);
}

#[tokio::test]
async fn whitelist_round_trip_is_a_no_op_on_admission() {
    let gate = gate(vec![RateLimitRule::new("job")
        .max_requests(100)
        .cooldown(Duration::ZERO)]);

    let before = gate
        .gate(GateRequest::new("u1", "job_trigger").with_job("job", "x"))
        .await;
    assert!(before.allowed);

    gate.penalties().add_to_whitelist("u1").await;
    gate.penalties().remove_from_whitelist("u1").await;

    let after = gate
        .gate(GateRequest::new("u1", "job_trigger").with_job("job", "x"))
        .await;
    assert!(after.allowed);
}

#[tokio::test]
async fn internal_stats_and_events_accumulate() {
    let gate = gate(vec![RateLimitRule::new("job")
        .max_requests(2)
        .cooldown(Duration::ZERO)]);

    for _ in 0..4 {
        gate.gate(GateRequest::new("u1", "job_trigger").with_job("job", "x"))
            .await;
    }

    let stats = gate.stats();
    assert_eq!(stats.allowed, 2);
    assert_eq!(stats.blocked, 2);
    assert_eq!(gate.recent_events().len(), 4);
}
