//! Delay computation: strategies, adaptive factors, jitter.
//!
//! All math is carried in `f64` seconds and converted to `Duration` once,
//! after capping, so large attempt numbers cannot overflow.

use aegis_core::ErrorClass;
use rand::Rng;
use std::time::Duration;

/// Rule for computing the pre-jitter delay of the `k`-th retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffStrategy {
    /// `base * multiplier^(attempt-1)`
    Exponential,
    /// `base * attempt`
    Linear,
    /// `base`
    Fixed,
    /// `base * fib(attempt)`
    Fibonacci,
    /// `base + U(0, prev_delay)`; the first attempt uses `base`.
    Decorrelated,
}

/// Randomization applied after the delay is capped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JitterMode {
    /// No jitter.
    None,
    /// `U(0, d)`
    Full,
    /// `d/2 + U(0, d/2)`
    Equal,
    /// `U(0, 3d)`
    Decorrelated,
}

/// `fib(1) = fib(2) = 1`, saturating.
pub(crate) fn fib(n: usize) -> f64 {
    let (mut a, mut b) = (1.0_f64, 1.0_f64);
    for _ in 2..n.max(1) {
        let next = a + b;
        a = b;
        b = next;
        if !b.is_finite() {
            return f64::MAX;
        }
    }
    if n <= 2 {
        1.0
    } else {
        b
    }
}

/// Pre-adaptive, pre-jitter delay in seconds for a 1-indexed attempt.
///
/// Exposed so callers can reason about schedules without running them.
pub fn strategy_delay_secs<R: Rng>(
    strategy: BackoffStrategy,
    base_secs: f64,
    multiplier: f64,
    attempt: usize,
    prev_delay_secs: f64,
    rng: &mut R,
) -> f64 {
    match strategy {
        BackoffStrategy::Exponential => base_secs * multiplier.powi(attempt.saturating_sub(1) as i32),
        BackoffStrategy::Linear => base_secs * attempt as f64,
        BackoffStrategy::Fixed => base_secs,
        BackoffStrategy::Fibonacci => base_secs * fib(attempt),
        BackoffStrategy::Decorrelated => {
            if attempt <= 1 || prev_delay_secs <= 0.0 {
                base_secs
            } else {
                base_secs + rng.random_range(0.0..prev_delay_secs)
            }
        }
    }
}

/// Multiplier for the class of the failure that triggered the retry.
pub(crate) fn error_class_factor(class: ErrorClass) -> f64 {
    match class {
        ErrorClass::Network => 1.5,
        ErrorClass::RateLimit => 3.0,
        ErrorClass::ServerError => 1.2,
        ErrorClass::AuthError => 0.5,
        _ => 1.0,
    }
}

/// Multiplier from the operation's EMA success rate.
pub(crate) fn success_rate_factor(rate: f64) -> f64 {
    if rate >= 0.9 {
        0.8
    } else if rate >= 0.7 {
        1.0
    } else if rate >= 0.5 {
        1.2
    } else if rate >= 0.3 {
        1.5
    } else {
        2.0
    }
}

/// Multiplier from the average of CPU and memory load (0.0..=1.0).
pub(crate) fn system_load_factor(load: f64) -> f64 {
    if load < 0.3 {
        0.7
    } else if load < 0.5 {
        1.0
    } else if load < 0.7 {
        1.3
    } else if load < 0.85 {
        1.8
    } else {
        2.5
    }
}

/// Applies jitter to a capped delay, in seconds.
pub fn jitter_secs<R: Rng>(mode: JitterMode, delay_secs: f64, rng: &mut R) -> f64 {
    if delay_secs <= 0.0 {
        return 0.0;
    }
    match mode {
        JitterMode::None => delay_secs,
        JitterMode::Full => rng.random_range(0.0..=delay_secs),
        JitterMode::Equal => delay_secs / 2.0 + rng.random_range(0.0..=(delay_secs / 2.0)),
        JitterMode::Decorrelated => rng.random_range(0.0..=(delay_secs * 3.0)),
    }
}

pub(crate) fn to_duration(secs: f64, cap: Duration) -> Duration {
    if !secs.is_finite() || secs < 0.0 {
        return cap;
    }
    Duration::try_from_secs_f64(secs).unwrap_or(cap)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rng() -> impl Rng {
        rand::rng()
    }

    #[test]
    fn fibonacci_sequence() {
        assert_eq!(fib(1), 1.0);
        assert_eq!(fib(2), 1.0);
        assert_eq!(fib(3), 2.0);
        assert_eq!(fib(4), 3.0);
        assert_eq!(fib(5), 5.0);
        assert_eq!(fib(6), 8.0);
    }

    #[test]
    fn exponential_doubles() {
        let mut r = rng();
        let d1 = strategy_delay_secs(BackoffStrategy::Exponential, 0.1, 2.0, 1, 0.0, &mut r);
        let d3 = strategy_delay_secs(BackoffStrategy::Exponential, 0.1, 2.0, 3, 0.0, &mut r);
        assert!((d1 - 0.1).abs() < 1e-9);
        assert!((d3 - 0.4).abs() < 1e-9);
    }

    #[test]
    fn linear_scales_with_attempt() {
        let mut r = rng();
        let d4 = strategy_delay_secs(BackoffStrategy::Linear, 0.5, 2.0, 4, 0.0, &mut r);
        assert!((d4 - 2.0).abs() < 1e-9);
    }

    #[test]
    fn decorrelated_first_attempt_is_base() {
        let mut r = rng();
        let d = strategy_delay_secs(BackoffStrategy::Decorrelated, 0.25, 2.0, 1, 0.0, &mut r);
        assert!((d - 0.25).abs() < 1e-9);
    }

    #[test]
    fn decorrelated_is_bounded_by_base_plus_prev() {
        let mut r = rng();
        for _ in 0..100 {
            let d = strategy_delay_secs(BackoffStrategy::Decorrelated, 0.1, 2.0, 3, 0.5, &mut r);
            assert!(d >= 0.1);
            assert!(d < 0.6 + 1e-9);
        }
    }

    #[test]
    fn adaptive_factor_bands() {
        assert_eq!(error_class_factor(ErrorClass::RateLimit), 3.0);
        assert_eq!(error_class_factor(ErrorClass::AuthError), 0.5);
        assert_eq!(success_rate_factor(0.95), 0.8);
        assert_eq!(success_rate_factor(0.1), 2.0);
        assert_eq!(system_load_factor(0.1), 0.7);
        assert_eq!(system_load_factor(0.95), 2.5);
    }

    #[test]
    fn equal_jitter_keeps_half() {
        let mut r = rng();
        for _ in 0..100 {
            let j = jitter_secs(JitterMode::Equal, 1.0, &mut r);
            assert!((0.5..=1.0).contains(&j));
        }
    }

    #[test]
    fn full_jitter_stays_within_delay() {
        let mut r = rng();
        for _ in 0..100 {
            let j = jitter_secs(JitterMode::Full, 1.0, &mut r);
            assert!((0.0..=1.0).contains(&j));
        }
    }

    #[test]
    fn conversion_falls_back_to_cap() {
        let cap = Duration::from_secs(30);
        assert_eq!(to_duration(f64::INFINITY, cap), cap);
        assert_eq!(to_duration(-1.0, cap), cap);
        assert_eq!(to_duration(0.5, cap), Duration::from_millis(500));
    }
}
