//! Breaker state machine.

use crate::config::BreakerConfig;
use crate::events::BreakerEvent;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// State of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BreakerState {
    /// Normal operation, calls pass through.
    Closed = 0,
    /// Fast-fail, calls are rejected.
    Open = 1,
    /// Probing recovery with a bounded number of calls.
    HalfOpen = 2,
}

impl BreakerState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => BreakerState::Open,
            2 => BreakerState::HalfOpen,
            _ => BreakerState::Closed,
        }
    }

    /// Stable label for logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half_open",
        }
    }
}

/// Point-in-time view of a breaker's counters.
#[derive(Debug, Clone)]
pub struct BreakerMetrics {
    pub state: BreakerState,
    /// Calls inside the configured time window.
    pub windowed_calls: usize,
    /// Failures inside the configured time window.
    pub windowed_failures: usize,
    /// Failure ratio inside the window (0 when no calls).
    pub failure_rate: f64,
    /// Consecutive failures since the last success.
    pub consecutive_failures: usize,
    /// Time since the last state change.
    pub since_state_change: Duration,
}

#[derive(Debug, Clone)]
struct CallRecord {
    at: Instant,
    ok: bool,
    #[allow(dead_code)]
    duration: Duration,
}

/// Outcome of asking the circuit for a permit.
pub(crate) enum Acquire {
    Permitted,
    Rejected { open_for: Duration },
}

pub(crate) struct Circuit {
    state: BreakerState,
    state_atomic: Arc<AtomicU8>,
    state_changed_at: Instant,
    consecutive_failures: usize,
    half_open_successes: usize,
    half_open_in_flight: usize,
    history: VecDeque<CallRecord>,
}

impl Circuit {
    pub(crate) fn new(state_atomic: Arc<AtomicU8>) -> Self {
        Self {
            state: BreakerState::Closed,
            state_atomic,
            state_changed_at: Instant::now(),
            consecutive_failures: 0,
            half_open_successes: 0,
            half_open_in_flight: 0,
            history: VecDeque::new(),
        }
    }

    pub(crate) fn state(&self) -> BreakerState {
        self.state
    }

    pub(crate) fn metrics(&self, config: &BreakerConfig) -> BreakerMetrics {
        let (calls, failures) = self.windowed_stats(config.time_window);
        let failure_rate = if calls > 0 {
            failures as f64 / calls as f64
        } else {
            0.0
        };
        BreakerMetrics {
            state: self.state,
            windowed_calls: calls,
            windowed_failures: failures,
            failure_rate,
            consecutive_failures: self.consecutive_failures,
            since_state_change: self.state_changed_at.elapsed(),
        }
    }

    fn windowed_stats(&self, window: Duration) -> (usize, usize) {
        let now = Instant::now();
        let mut calls = 0;
        let mut failures = 0;
        for record in &self.history {
            if now.duration_since(record.at) <= window {
                calls += 1;
                if !record.ok {
                    failures += 1;
                }
            }
        }
        (calls, failures)
    }

    fn push_record(&mut self, config: &BreakerConfig, ok: bool, duration: Duration) {
        self.history.push_back(CallRecord {
            at: Instant::now(),
            ok,
            duration,
        });
        while self.history.len() > config.history_limit {
            self.history.pop_front();
        }
    }

    /// Asks for a permit. Drives OPEN → HALF_OPEN once the recovery
    /// timeout has elapsed; no wrapped call runs while the circuit stays
    /// OPEN.
    pub(crate) fn try_acquire(&mut self, config: &BreakerConfig) -> Acquire {
        match self.state {
            BreakerState::Closed => {
                self.emit_permitted(config);
                Acquire::Permitted
            }
            BreakerState::Open => {
                let open_for = self.state_changed_at.elapsed();
                if open_for >= config.recovery_timeout {
                    self.transition_to(BreakerState::HalfOpen, config);
                    self.half_open_in_flight = 1;
                    self.emit_permitted(config);
                    Acquire::Permitted
                } else {
                    self.emit_rejected(config);
                    Acquire::Rejected { open_for }
                }
            }
            BreakerState::HalfOpen => {
                if self.half_open_in_flight < config.half_open_max_calls {
                    self.half_open_in_flight += 1;
                    self.emit_permitted(config);
                    Acquire::Permitted
                } else {
                    self.emit_rejected(config);
                    Acquire::Rejected {
                        open_for: self.state_changed_at.elapsed(),
                    }
                }
            }
        }
    }

    pub(crate) fn record_success(&mut self, config: &BreakerConfig, duration: Duration) {
        self.push_record(config, true, duration);
        self.consecutive_failures = 0;

        config.listeners.emit(&BreakerEvent::SuccessRecorded {
            name: config.name.clone(),
            at: Instant::now(),
            duration,
        });

        #[cfg(feature = "metrics")]
        metrics::counter!("aegis_breaker_calls_total", "breaker" => config.name.clone(), "outcome" => "success")
            .increment(1);

        if self.state == BreakerState::HalfOpen {
            self.half_open_in_flight = self.half_open_in_flight.saturating_sub(1);
            self.half_open_successes += 1;
            if self.half_open_successes >= config.success_threshold {
                self.transition_to(BreakerState::Closed, config);
            }
        }
    }

    pub(crate) fn record_failure(&mut self, config: &BreakerConfig, duration: Duration) {
        self.push_record(config, false, duration);
        self.consecutive_failures += 1;

        config.listeners.emit(&BreakerEvent::FailureRecorded {
            name: config.name.clone(),
            at: Instant::now(),
            duration,
        });

        #[cfg(feature = "metrics")]
        metrics::counter!("aegis_breaker_calls_total", "breaker" => config.name.clone(), "outcome" => "failure")
            .increment(1);

        match self.state {
            BreakerState::HalfOpen => {
                self.transition_to(BreakerState::Open, config);
            }
            BreakerState::Closed => {
                if self.consecutive_failures >= config.failure_threshold {
                    self.transition_to(BreakerState::Open, config);
                } else {
                    let (calls, failures) = self.windowed_stats(config.time_window);
                    if calls >= config.volume_threshold
                        && failures as f64 / calls as f64 >= config.error_rate
                    {
                        self.transition_to(BreakerState::Open, config);
                    }
                }
            }
            BreakerState::Open => {}
        }
    }

    pub(crate) fn force_open(&mut self, config: &BreakerConfig) {
        self.transition_to(BreakerState::Open, config);
    }

    pub(crate) fn force_closed(&mut self, config: &BreakerConfig) {
        self.transition_to(BreakerState::Closed, config);
    }

    pub(crate) fn reset(&mut self, config: &BreakerConfig) {
        self.history.clear();
        self.transition_to(BreakerState::Closed, config);
        self.consecutive_failures = 0;
    }

    fn transition_to(&mut self, state: BreakerState, config: &BreakerConfig) {
        if self.state == state {
            return;
        }
        let from = self.state;

        config.listeners.emit(&BreakerEvent::StateTransition {
            name: config.name.clone(),
            at: Instant::now(),
            from,
            to: state,
        });

        tracing::info!(
            breaker = %config.name,
            from = from.as_str(),
            to = state.as_str(),
            "circuit state transition"
        );

        #[cfg(feature = "metrics")]
        metrics::counter!(
            "aegis_breaker_transitions_total",
            "breaker" => config.name.clone(),
            "from" => from.as_str(),
            "to" => state.as_str()
        )
        .increment(1);

        self.state = state;
        self.state_atomic.store(state as u8, Ordering::Release);
        self.state_changed_at = Instant::now();
        self.consecutive_failures = 0;
        self.half_open_successes = 0;
        self.half_open_in_flight = 0;
    }

    fn emit_permitted(&self, config: &BreakerConfig) {
        config.listeners.emit(&BreakerEvent::CallPermitted {
            name: config.name.clone(),
            at: Instant::now(),
            state: self.state,
        });
    }

    fn emit_rejected(&self, config: &BreakerConfig) {
        config.listeners.emit(&BreakerEvent::CallRejected {
            name: config.name.clone(),
            at: Instant::now(),
        });

        #[cfg(feature = "metrics")]
        metrics::counter!("aegis_breaker_calls_total", "breaker" => config.name.clone(), "outcome" => "rejected")
            .increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn circuit() -> Circuit {
        Circuit::new(Arc::new(AtomicU8::new(BreakerState::Closed as u8)))
    }

    fn config(failure_threshold: usize) -> BreakerConfig {
        BreakerConfig::builder()
            .failure_threshold(failure_threshold)
            .recovery_timeout(Duration::from_millis(50))
            .success_threshold(2)
            .volume_threshold(100)
            .name("test")
            .build()
    }

    #[test]
    fn consecutive_failures_trip_the_circuit() {
        let mut circuit = circuit();
        let config = config(3);

        for _ in 0..3 {
            circuit.record_failure(&config, Duration::from_millis(5));
        }
        assert_eq!(circuit.state(), BreakerState::Open);
    }

    #[test]
    fn a_success_resets_the_consecutive_count() {
        let mut circuit = circuit();
        let config = config(3);

        circuit.record_failure(&config, Duration::from_millis(5));
        circuit.record_failure(&config, Duration::from_millis(5));
        circuit.record_success(&config, Duration::from_millis(5));
        circuit.record_failure(&config, Duration::from_millis(5));
        assert_eq!(circuit.state(), BreakerState::Closed);
    }

    #[test]
    fn error_rate_over_volume_trips_the_circuit() {
        let mut circuit = circuit();
        let config = BreakerConfig::builder()
            .failure_threshold(100)
            .volume_threshold(10)
            .error_rate(0.5)
            .name("test")
            .build();

        for i in 0..10 {
            if i % 2 == 0 {
                circuit.record_failure(&config, Duration::from_millis(5));
            } else {
                circuit.record_success(&config, Duration::from_millis(5));
            }
        }
        assert_eq!(circuit.state(), BreakerState::Open);
    }

    #[test]
    fn open_rejects_until_recovery_timeout() {
        let mut circuit = circuit();
        let config = config(1);

        circuit.record_failure(&config, Duration::from_millis(5));
        assert_eq!(circuit.state(), BreakerState::Open);
        assert!(matches!(
            circuit.try_acquire(&config),
            Acquire::Rejected { .. }
        ));

        std::thread::sleep(Duration::from_millis(60));
        assert!(matches!(circuit.try_acquire(&config), Acquire::Permitted));
        assert_eq!(circuit.state(), BreakerState::HalfOpen);
    }

    #[test]
    fn half_open_closes_after_success_threshold() {
        let mut circuit = circuit();
        let config = config(1);

        circuit.record_failure(&config, Duration::from_millis(5));
        std::thread::sleep(Duration::from_millis(60));
        assert!(matches!(circuit.try_acquire(&config), Acquire::Permitted));

        circuit.record_success(&config, Duration::from_millis(5));
        assert_eq!(circuit.state(), BreakerState::HalfOpen);
        assert!(matches!(circuit.try_acquire(&config), Acquire::Permitted));
        circuit.record_success(&config, Duration::from_millis(5));
        assert_eq!(circuit.state(), BreakerState::Closed);
    }

    #[test]
    fn half_open_reopens_on_any_failure() {
        let mut circuit = circuit();
        let config = config(1);

        circuit.record_failure(&config, Duration::from_millis(5));
        std::thread::sleep(Duration::from_millis(60));
        assert!(matches!(circuit.try_acquire(&config), Acquire::Permitted));
        circuit.record_failure(&config, Duration::from_millis(5));
        assert_eq!(circuit.state(), BreakerState::Open);
    }

    #[test]
    fn half_open_caps_concurrent_probes() {
        let mut circuit = circuit();
        let config = BreakerConfig::builder()
            .failure_threshold(1)
            .recovery_timeout(Duration::from_millis(10))
            .half_open_max_calls(2)
            .name("test")
            .build();

        circuit.record_failure(&config, Duration::from_millis(5));
        std::thread::sleep(Duration::from_millis(20));

        assert!(matches!(circuit.try_acquire(&config), Acquire::Permitted));
        assert!(matches!(circuit.try_acquire(&config), Acquire::Permitted));
        assert!(matches!(
            circuit.try_acquire(&config),
            Acquire::Rejected { .. }
        ));
    }
}
