//! Time-windowed counter store with an in-memory fallback.
//!
//! The store maps opaque string keys to one of three value shapes: an
//! integer count with a TTL, a window-start timestamp with a TTL, or a
//! bounded timestamp-keyed sample buffer. The admission subsystem keeps its
//! rate-limit windows, cooldown stamps, and allow/deny flags here.
//!
//! # Failure policy
//!
//! All operations go to the primary [`CounterBackend`] while it is healthy.
//! On the first backend error the store flips to an in-process
//! [`MemoryBackend`] and reports itself degraded via
//! [`CounterStore::is_available`]; a background probe re-checks the primary
//! and flips back once a ping succeeds. A background sweep evicts expired
//! keys from the fallback every few seconds.
//!
//! # Example
//!
//! ```rust
//! use aegis_store::CounterStore;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), aegis_store::StoreError> {
//! let store = CounterStore::in_memory();
//! let n = store.increment("rl:u1:deploy:api", Some(Duration::from_secs(60))).await?;
//! assert_eq!(n, 1);
//! assert!(store.is_available());
//! # Ok(())
//! # }
//! ```

mod backend;
mod events;
pub mod keys;
mod memory;
#[cfg(feature = "redis")]
mod redis_backend;

pub use backend::{CounterBackend, Sample, SharedBackend};
pub use events::StoreEvent;
pub use memory::MemoryBackend;
#[cfg(feature = "redis")]
pub use redis_backend::RedisBackend;

use aegis_core::Listeners;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::task::JoinHandle;

/// Error returned by store operations.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The backend rejected or failed the operation.
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Default interval between fallback sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5);

/// Default interval between primary health probes while degraded.
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(10);

/// Counter store with automatic in-memory fallback.
pub struct CounterStore {
    primary: SharedBackend,
    fallback: Arc<MemoryBackend>,
    degraded: AtomicBool,
    listeners: Listeners<StoreEvent>,
}

impl CounterStore {
    /// Creates a store over the given primary backend.
    pub fn new(primary: SharedBackend) -> Self {
        Self::with_listeners(primary, Listeners::new())
    }

    /// Creates a store over the given primary backend with event listeners.
    pub fn with_listeners(primary: SharedBackend, listeners: Listeners<StoreEvent>) -> Self {
        Self {
            primary,
            fallback: Arc::new(MemoryBackend::new()),
            degraded: AtomicBool::new(false),
            listeners,
        }
    }

    /// Creates a purely in-process store. Useful for tests and single-node
    /// deployments without a shared backend.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()))
    }

    /// Whether the primary backend is currently serving operations.
    pub fn is_available(&self) -> bool {
        !self.degraded.load(Ordering::Acquire)
    }

    fn mark_degraded(&self, op: &str, err: &StoreError) {
        if !self.degraded.swap(true, Ordering::AcqRel) {
            tracing::warn!(%err, op, "counter backend degraded, switching to in-memory fallback");
            self.listeners.emit(&StoreEvent::BackendDegraded {
                at: Instant::now(),
                operation: op.to_string(),
            });

            #[cfg(feature = "metrics")]
            metrics::counter!("aegis_store_degradations_total").increment(1);
        }
    }

    fn mark_recovered(&self) {
        if self.degraded.swap(false, Ordering::AcqRel) {
            tracing::info!("counter backend recovered");
            self.listeners.emit(&StoreEvent::BackendRecovered { at: Instant::now() });
        }
    }

    fn active(&self) -> &dyn CounterBackend {
        if self.is_available() {
            self.primary.as_ref()
        } else {
            self.fallback.as_ref()
        }
    }

    /// Atomically increments the counter under `key`, creating it with the
    /// given TTL when absent, and returns the post-increment count.
    pub async fn increment(&self, key: &str, ttl: Option<Duration>) -> Result<u64, StoreError> {
        match self.active().increment(key, ttl).await {
            Ok(n) => Ok(n),
            Err(err) if self.is_available() => {
                self.mark_degraded("increment", &err);
                self.fallback.increment(key, ttl).await
            }
            Err(err) => Err(err),
        }
    }

    /// Current count under `key`; zero when absent or expired.
    pub async fn get_count(&self, key: &str) -> Result<u64, StoreError> {
        match self.active().get_count(key).await {
            Ok(n) => Ok(n),
            Err(err) if self.is_available() => {
                self.mark_degraded("get_count", &err);
                self.fallback.get_count(key).await
            }
            Err(err) => Err(err),
        }
    }

    /// Records a window-start timestamp (milliseconds since the epoch).
    pub async fn set_window_start(
        &self,
        key: &str,
        start_ms: u64,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        match self.active().set_window_start(key, start_ms, ttl).await {
            Ok(()) => Ok(()),
            Err(err) if self.is_available() => {
                self.mark_degraded("set_window_start", &err);
                self.fallback.set_window_start(key, start_ms, ttl).await
            }
            Err(err) => Err(err),
        }
    }

    /// Reads a previously recorded window-start timestamp.
    pub async fn get_window_start(&self, key: &str) -> Result<Option<u64>, StoreError> {
        match self.active().get_window_start(key).await {
            Ok(v) => Ok(v),
            Err(err) if self.is_available() => {
                self.mark_degraded("get_window_start", &err);
                self.fallback.get_window_start(key).await
            }
            Err(err) => Err(err),
        }
    }

    /// Appends a timestamped sample, keeping at most `cap` entries.
    pub async fn push_sample(
        &self,
        key: &str,
        ts_ms: u64,
        value: f64,
        cap: usize,
    ) -> Result<(), StoreError> {
        match self.active().push_sample(key, ts_ms, value, cap).await {
            Ok(()) => Ok(()),
            Err(err) if self.is_available() => {
                self.mark_degraded("push_sample", &err);
                self.fallback.push_sample(key, ts_ms, value, cap).await
            }
            Err(err) => Err(err),
        }
    }

    /// Returns samples at or after `from_ts_ms`, oldest first.
    pub async fn range_samples(&self, key: &str, from_ts_ms: u64) -> Result<Vec<Sample>, StoreError> {
        match self.active().range_samples(key, from_ts_ms).await {
            Ok(v) => Ok(v),
            Err(err) if self.is_available() => {
                self.mark_degraded("range_samples", &err);
                self.fallback.range_samples(key, from_ts_ms).await
            }
            Err(err) => Err(err),
        }
    }

    /// Removes `key` and any value stored under it.
    pub async fn reset(&self, key: &str) -> Result<(), StoreError> {
        match self.active().reset(key).await {
            Ok(()) => Ok(()),
            Err(err) if self.is_available() => {
                self.mark_degraded("reset", &err);
                self.fallback.reset(key).await
            }
            Err(err) => Err(err),
        }
    }

    /// Spawns the background sweep and probe tasks. The returned handle
    /// aborts both when dropped.
    pub fn spawn_maintenance(self: &Arc<Self>) -> MaintenanceHandle {
        self.spawn_maintenance_with(DEFAULT_SWEEP_INTERVAL, DEFAULT_PROBE_INTERVAL)
    }

    /// As [`spawn_maintenance`](Self::spawn_maintenance) with explicit intervals.
    pub fn spawn_maintenance_with(
        self: &Arc<Self>,
        sweep_interval: Duration,
        probe_interval: Duration,
    ) -> MaintenanceHandle {
        let sweeper = {
            let store = Arc::clone(self);
            tokio::spawn(async move {
                let mut tick = tokio::time::interval(sweep_interval);
                tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                loop {
                    tick.tick().await;
                    let evicted = store.fallback.sweep();
                    if evicted > 0 {
                        tracing::debug!(evicted, "swept expired fallback keys");
                        store.listeners.emit(&StoreEvent::SweepCompleted {
                            at: Instant::now(),
                            evicted,
                        });
                    }
                }
            })
        };

        let prober = {
            let store = Arc::clone(self);
            tokio::spawn(async move {
                let mut tick = tokio::time::interval(probe_interval);
                tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                loop {
                    tick.tick().await;
                    if !store.is_available() && store.primary.ping().await.is_ok() {
                        store.mark_recovered();
                    }
                }
            })
        };

        MaintenanceHandle { sweeper, prober }
    }
}

/// Aborts the store's background tasks when dropped.
pub struct MaintenanceHandle {
    sweeper: JoinHandle<()>,
    prober: JoinHandle<()>,
}

impl Drop for MaintenanceHandle {
    fn drop(&mut self) {
        self.sweeper.abort();
        self.prober.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    /// Backend that fails every call until `healthy` is set.
    struct FlakyBackend {
        healthy: AtomicBool,
        calls: AtomicUsize,
    }

    impl FlakyBackend {
        fn new() -> Self {
            Self {
                healthy: AtomicBool::new(false),
                calls: AtomicUsize::new(0),
            }
        }

        fn fail<T>(&self) -> Result<T, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Backend("connection refused".into()))
        }
    }

    #[async_trait]
    impl CounterBackend for FlakyBackend {
        async fn increment(&self, _key: &str, _ttl: Option<Duration>) -> Result<u64, StoreError> {
            self.fail()
        }

        async fn get_count(&self, _key: &str) -> Result<u64, StoreError> {
            self.fail()
        }

        async fn set_window_start(
            &self,
            _key: &str,
            _start_ms: u64,
            _ttl: Option<Duration>,
        ) -> Result<(), StoreError> {
            self.fail()
        }

        async fn get_window_start(&self, _key: &str) -> Result<Option<u64>, StoreError> {
            self.fail()
        }

        async fn push_sample(
            &self,
            _key: &str,
            _ts_ms: u64,
            _value: f64,
            _cap: usize,
        ) -> Result<(), StoreError> {
            self.fail()
        }

        async fn range_samples(&self, _key: &str, _from_ts_ms: u64) -> Result<Vec<Sample>, StoreError> {
            self.fail()
        }

        async fn reset(&self, _key: &str) -> Result<(), StoreError> {
            self.fail()
        }

        async fn ping(&self) -> Result<(), StoreError> {
            if self.healthy.load(Ordering::SeqCst) {
                Ok(())
            } else {
                self.fail()
            }
        }
    }

    #[tokio::test]
    async fn falls_back_on_backend_error_and_reports_degraded() {
        let store = CounterStore::new(Arc::new(FlakyBackend::new()));
        assert!(store.is_available());

        let n = store.increment("k", Some(Duration::from_secs(60))).await.unwrap();
        assert_eq!(n, 1);
        assert!(!store.is_available());

        // Subsequent operations go straight to the fallback.
        let n = store.increment("k", Some(Duration::from_secs(60))).await.unwrap();
        assert_eq!(n, 2);
        assert_eq!(store.get_count("k").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn probe_restores_availability() {
        let primary = Arc::new(FlakyBackend::new());
        let store = Arc::new(CounterStore::new(Arc::clone(&primary) as SharedBackend));
        let _maintenance =
            store.spawn_maintenance_with(Duration::from_millis(10), Duration::from_millis(10));

        store.increment("k", None).await.unwrap();
        assert!(!store.is_available());

        primary.healthy.store(true, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(store.is_available());
    }

    #[tokio::test]
    async fn reset_then_count_is_zero() {
        let store = CounterStore::in_memory();
        store.increment("k", Some(Duration::from_secs(60))).await.unwrap();
        store.reset("k").await.unwrap();
        assert_eq!(store.get_count("k").await.unwrap(), 0);
    }
}
