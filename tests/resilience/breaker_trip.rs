//! Scenario: three failures trip the breaker; the fourth call is served
//! from the fallback.

use aegis_circuitbreaker::{BreakerConfig, BreakerManager, BreakerState, CircuitBreaker};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

fn breaker() -> CircuitBreaker {
    CircuitBreaker::new(
        BreakerConfig::builder()
            .name("s1")
            .failure_threshold(3)
            .recovery_timeout(Duration::from_millis(80))
            .success_threshold(1)
            .build(),
    )
}

#[tokio::test]
async fn three_failures_open_then_fallback_serves() {
    let breaker = breaker();

    for _ in 0..3 {
        let outcome = breaker
            .execute(|| async { Err::<String, _>("downstream exploded".to_string()) })
            .await;
        assert!(!outcome.success);
    }
    assert_eq!(breaker.state().await, BreakerState::Open);

    let invoked = AtomicUsize::new(0);
    let outcome = breaker
        .execute_with_fallback(
            || {
                invoked.fetch_add(1, Ordering::SeqCst);
                async { Err::<String, _>("never reached".to_string()) }
            },
            || async { Ok("cached answer".to_string()) },
        )
        .await;

    assert_eq!(invoked.load(Ordering::SeqCst), 0, "open circuit must not call the op");
    assert!(outcome.success);
    assert!(outcome.from_cache);
    assert_eq!(outcome.result.as_deref(), Some("cached answer"));
    assert!(outcome.circuit_open_time.is_some());
}

#[tokio::test]
async fn breaker_recovers_after_the_recovery_timeout() {
    let breaker = breaker();
    for _ in 0..3 {
        breaker
            .execute(|| async { Err::<(), _>("boom".to_string()) })
            .await;
    }
    assert_eq!(breaker.state().await, BreakerState::Open);

    tokio::time::sleep(Duration::from_millis(100)).await;
    let outcome = breaker.execute(|| async { Ok::<_, String>(()) }).await;
    assert!(outcome.success);
    assert_eq!(breaker.state().await, BreakerState::Closed);
}

#[tokio::test]
async fn manager_tracks_open_breakers_across_services() {
    let manager = BreakerManager::new(
        BreakerConfig::builder()
            .failure_threshold(1)
            .recovery_timeout(Duration::from_secs(60))
            .build(),
    );

    manager
        .breaker("payments")
        .execute(|| async { Err::<(), _>("down".to_string()) })
        .await;
    manager
        .breaker("search")
        .execute(|| async { Ok::<_, String>(()) })
        .await;

    assert_eq!(manager.open_count(), 1);
    assert_eq!(manager.state("payments"), Some(BreakerState::Open));
    assert_eq!(manager.state("search"), Some(BreakerState::Closed));

    let snapshot = manager.snapshot().await;
    assert_eq!(snapshot.len(), 2);
}
