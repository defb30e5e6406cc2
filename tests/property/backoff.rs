//! Delay and jitter bound invariants.

use aegis_backoff::{jitter_secs, strategy_delay_secs, BackoffStrategy, JitterMode};
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// The k-th exponential pre-jitter delay never exceeds
    /// min(base * m^(k-1), max_delay) once capped.
    #[test]
    fn exponential_delay_respects_its_bound(
        base_ms in 1u64..=1000,
        multiplier in 1.0f64..=4.0,
        attempt in 1usize..=12,
        max_delay_ms in 1u64..=60_000,
    ) {
        let base = base_ms as f64 / 1000.0;
        let max_delay = max_delay_ms as f64 / 1000.0;
        let mut rng = rand::rng();

        let raw = strategy_delay_secs(
            BackoffStrategy::Exponential,
            base,
            multiplier,
            attempt,
            0.0,
            &mut rng,
        );
        let expected = base * multiplier.powi(attempt as i32 - 1);
        prop_assert!((raw - expected).abs() <= expected * 1e-9 + 1e-12);

        let capped = raw.min(max_delay);
        prop_assert!(capped <= max_delay + 1e-12);
    }

    /// Linear, fixed, and fibonacci schedules obey their closed forms.
    #[test]
    fn other_strategies_follow_their_schedules(
        base_ms in 1u64..=1000,
        attempt in 1usize..=20,
    ) {
        let base = base_ms as f64 / 1000.0;
        let mut rng = rand::rng();

        let linear = strategy_delay_secs(BackoffStrategy::Linear, base, 2.0, attempt, 0.0, &mut rng);
        prop_assert!((linear - base * attempt as f64).abs() < 1e-9);

        let fixed = strategy_delay_secs(BackoffStrategy::Fixed, base, 2.0, attempt, 0.0, &mut rng);
        prop_assert!((fixed - base).abs() < 1e-12);

        // Fibonacci grows monotonically.
        let fib_now = strategy_delay_secs(BackoffStrategy::Fibonacci, base, 2.0, attempt, 0.0, &mut rng);
        let fib_next =
            strategy_delay_secs(BackoffStrategy::Fibonacci, base, 2.0, attempt + 1, 0.0, &mut rng);
        prop_assert!(fib_next >= fib_now);
    }

    /// Decorrelated delays stay within [base, base + prev].
    #[test]
    fn decorrelated_delay_is_bounded_by_base_plus_prev(
        base_ms in 1u64..=1000,
        prev_ms in 1u64..=10_000,
        attempt in 2usize..=10,
    ) {
        let base = base_ms as f64 / 1000.0;
        let prev = prev_ms as f64 / 1000.0;
        let mut rng = rand::rng();

        let delay =
            strategy_delay_secs(BackoffStrategy::Decorrelated, base, 2.0, attempt, prev, &mut rng);
        prop_assert!(delay >= base - 1e-12);
        prop_assert!(delay <= base + prev + 1e-12);
    }

    /// Equal jitter keeps [d/2, d]; full jitter keeps [0, d]; none is
    /// the identity.
    #[test]
    fn jitter_bounds_hold(delay_ms in 1u64..=60_000) {
        let delay = delay_ms as f64 / 1000.0;
        let mut rng = rand::rng();

        let equal = jitter_secs(JitterMode::Equal, delay, &mut rng);
        prop_assert!(equal >= delay / 2.0 - 1e-12);
        prop_assert!(equal <= delay + 1e-12);

        let full = jitter_secs(JitterMode::Full, delay, &mut rng);
        prop_assert!(full >= 0.0);
        prop_assert!(full <= delay + 1e-12);

        let none = jitter_secs(JitterMode::None, delay, &mut rng);
        prop_assert!((none - delay).abs() < 1e-12);

        let decorrelated = jitter_secs(JitterMode::Decorrelated, delay, &mut rng);
        prop_assert!(decorrelated >= 0.0);
        prop_assert!(decorrelated <= delay * 3.0 + 1e-12);
    }
}
