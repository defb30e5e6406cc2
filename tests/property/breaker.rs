//! Breaker safety: once open, the wrapped operation is never invoked
//! until the state machine leaves OPEN.

use aegis_circuitbreaker::{BreakerConfig, BreakerState, CircuitBreaker};
use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(30))]

    #[test]
    fn open_circuits_never_invoke_the_operation(
        failure_threshold in 1usize..=6,
        rejected_calls in 1usize..=10,
    ) {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let breaker = CircuitBreaker::new(
                BreakerConfig::builder()
                    .failure_threshold(failure_threshold)
                    .recovery_timeout(Duration::from_secs(600))
                    .build(),
            );

            for _ in 0..failure_threshold {
                breaker
                    .execute(|| async { Err::<(), _>("boom".to_string()) })
                    .await;
            }
            prop_assert_eq!(breaker.state().await, BreakerState::Open);

            let invocations = Arc::new(AtomicUsize::new(0));
            for _ in 0..rejected_calls {
                let invocations = Arc::clone(&invocations);
                let outcome = breaker
                    .execute(move || {
                        invocations.fetch_add(1, Ordering::SeqCst);
                        async { Ok::<_, String>(()) }
                    })
                    .await;
                prop_assert!(!outcome.success);
            }
            prop_assert_eq!(invocations.load(Ordering::SeqCst), 0);
            Ok(())
        })?;
    }

    /// Consecutive successes below the threshold never trip the circuit.
    #[test]
    fn successes_never_open_the_circuit(calls in 1usize..=50) {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let breaker = CircuitBreaker::new(
                BreakerConfig::builder().failure_threshold(1).build(),
            );
            for _ in 0..calls {
                breaker.execute(|| async { Ok::<_, String>(()) }).await;
            }
            prop_assert_eq!(breaker.state().await, BreakerState::Closed);
            Ok(())
        })?;
    }
}
