//! Backend contract for the counter store.

use crate::StoreError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// A timestamped sample in a bounded buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Milliseconds since the Unix epoch.
    pub ts_ms: u64,
    /// Recorded value.
    pub value: f64,
}

/// Shared handle to a backend implementation.
pub type SharedBackend = Arc<dyn CounterBackend>;

/// Point operations the counter store requires from a backend.
///
/// Counts are monotonic within a TTL window; a `ttl` of `None` means the
/// key does not expire. Implementations must make `increment` atomic with
/// respect to concurrent callers on the same key.
#[async_trait]
pub trait CounterBackend: Send + Sync {
    /// Increments the counter under `key` and returns the new count.
    /// Creates the key with `ttl` when absent.
    async fn increment(&self, key: &str, ttl: Option<Duration>) -> Result<u64, StoreError>;

    /// Current count under `key`; zero when absent or expired.
    async fn get_count(&self, key: &str) -> Result<u64, StoreError>;

    /// Stores a window-start timestamp under `key`.
    async fn set_window_start(
        &self,
        key: &str,
        start_ms: u64,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError>;

    /// Reads the window-start timestamp under `key`, if present.
    async fn get_window_start(&self, key: &str) -> Result<Option<u64>, StoreError>;

    /// Appends a sample to the buffer under `key`, evicting the oldest
    /// entries beyond `cap`.
    async fn push_sample(
        &self,
        key: &str,
        ts_ms: u64,
        value: f64,
        cap: usize,
    ) -> Result<(), StoreError>;

    /// Samples at or after `from_ts_ms`, oldest first.
    async fn range_samples(&self, key: &str, from_ts_ms: u64) -> Result<Vec<Sample>, StoreError>;

    /// Removes `key` entirely.
    async fn reset(&self, key: &str) -> Result<(), StoreError>;

    /// Cheap health probe.
    async fn ping(&self) -> Result<(), StoreError>;
}
