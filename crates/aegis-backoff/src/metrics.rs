//! Per-operation EMA metrics.

use aegis_core::{Ema, ErrorClass, DEFAULT_SMOOTHING};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Rolling view of one operation's behavior.
#[derive(Debug, Clone)]
pub struct OperationSnapshot {
    /// EMA of attempt outcomes (1.0 success, 0.0 failure).
    pub success_rate: f64,
    /// EMA of attempt duration in milliseconds.
    pub avg_response_time_ms: f64,
    /// Tally of failure classes observed.
    pub error_counts: HashMap<ErrorClass, u64>,
    /// When the operation was last attempted.
    pub last_attempt: Option<Instant>,
}

#[derive(Debug)]
struct OperationMetrics {
    success_rate: Ema,
    avg_response_time_ms: Ema,
    error_counts: HashMap<ErrorClass, u64>,
    last_attempt: Option<Instant>,
}

impl OperationMetrics {
    fn new() -> Self {
        Self {
            success_rate: Ema::seeded(DEFAULT_SMOOTHING, 1.0),
            avg_response_time_ms: Ema::new(DEFAULT_SMOOTHING),
            error_counts: HashMap::new(),
            last_attempt: None,
        }
    }
}

/// Registry of per-operation metrics, keyed by operation id.
#[derive(Default)]
pub struct MetricsRegistry {
    inner: Mutex<HashMap<String, OperationMetrics>>,
}

impl MetricsRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a successful attempt.
    pub fn record_success(&self, operation: &str, duration: Duration) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let m = inner
            .entry(operation.to_string())
            .or_insert_with(OperationMetrics::new);
        m.success_rate.observe(1.0);
        m.avg_response_time_ms.observe(duration.as_secs_f64() * 1000.0);
        m.last_attempt = Some(Instant::now());
    }

    /// Records a failed attempt with its class.
    pub fn record_failure(&self, operation: &str, class: ErrorClass, duration: Duration) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let m = inner
            .entry(operation.to_string())
            .or_insert_with(OperationMetrics::new);
        m.success_rate.observe(0.0);
        m.avg_response_time_ms.observe(duration.as_secs_f64() * 1000.0);
        *m.error_counts.entry(class).or_insert(0) += 1;
        m.last_attempt = Some(Instant::now());
    }

    /// EMA success rate for an operation, if it has run.
    pub fn success_rate(&self, operation: &str) -> Option<f64> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.get(operation).map(|m| m.success_rate.value_or(1.0))
    }

    /// The failure class observed most often, if any.
    pub fn dominant_error(&self, operation: &str) -> Option<ErrorClass> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.get(operation).and_then(|m| {
            m.error_counts
                .iter()
                .max_by_key(|(_, count)| **count)
                .map(|(class, _)| *class)
        })
    }

    /// Full snapshot for an operation.
    pub fn snapshot(&self, operation: &str) -> Option<OperationSnapshot> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.get(operation).map(|m| OperationSnapshot {
            success_rate: m.success_rate.value_or(1.0),
            avg_response_time_ms: m.avg_response_time_ms.value_or(0.0),
            error_counts: m.error_counts.clone(),
            last_attempt: m.last_attempt,
        })
    }
}
