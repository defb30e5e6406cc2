//! Scenario: a connection error clears on the fourth attempt; elapsed
//! time respects the exponential schedule with equal jitter.

use aegis_backoff::{
    AdaptiveTuning, BackoffConfig, BackoffExecutor, BackoffStrategy, JitterMode,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[tokio::test]
async fn recovers_on_the_fourth_attempt_within_jitter_bounds() {
    let executor = BackoffExecutor::new();
    let config = BackoffConfig::<String>::builder()
        .max_attempts(5)
        .base_delay(Duration::from_millis(100))
        .multiplier(2.0)
        .strategy(BackoffStrategy::Exponential)
        .jitter(JitterMode::Equal)
        .adaptive(AdaptiveTuning {
            by_error_class: false,
            by_success_rate: false,
            by_system_load: false,
        })
        .classify_display()
        .build();

    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = Arc::clone(&calls);
    let started = Instant::now();

    let outcome = executor
        .execute("flaky-fetch", &config, move || {
            let n = calls_clone.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n <= 3 {
                    Err("connection refused".to_string())
                } else {
                    Ok(n)
                }
            }
        })
        .await;
    let elapsed = started.elapsed();

    assert!(outcome.success);
    assert_eq!(outcome.attempts, 4);
    assert_eq!(outcome.result, Some(4));

    // Pre-jitter delays are 100, 200, 400 ms; equal jitter keeps each
    // within [d/2, d].
    assert!(
        elapsed >= Duration::from_millis(350),
        "elapsed {elapsed:?} below the jitter floor"
    );
    assert!(
        elapsed <= Duration::from_millis(1400),
        "elapsed {elapsed:?} above the jitter ceiling"
    );
    assert!(outcome.total_delay >= Duration::from_millis(350));
}

#[tokio::test]
async fn metrics_shape_the_recommended_strategy() {
    let executor = BackoffExecutor::new();
    let config = BackoffConfig::<String>::builder()
        .max_attempts(3)
        .base_delay(Duration::from_millis(1))
        .jitter(JitterMode::None)
        .classify_display()
        .build();

    let _outcome: aegis_backoff::BackoffOutcome<(), String> = executor
        .execute("net-op", &config, || async {
            Err("connection reset by peer".to_string())
        })
        .await;

    assert_eq!(
        executor.recommended_strategy("net-op"),
        BackoffStrategy::Decorrelated
    );
}
