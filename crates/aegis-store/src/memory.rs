//! In-process backend, also used as the degradation fallback.

use crate::backend::{CounterBackend, Sample};
use crate::StoreError;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
enum Value {
    Count(u64),
    WindowStart(u64),
    Samples(VecDeque<Sample>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Hash-map backend guarded by a mutex.
///
/// Each operation is point-atomic under the lock; expired entries are
/// dropped lazily on access and eagerly by [`MemoryBackend::sweep`].
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Evicts expired entries, returning how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|_, entry| !entry.expired(now));
        before - entries.len()
    }

    /// Number of live entries (expired-but-unswept entries included).
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether the backend holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn expiry(ttl: Option<Duration>) -> Option<Instant> {
        ttl.and_then(|ttl| Instant::now().checked_add(ttl))
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CounterBackend for MemoryBackend {
    async fn increment(&self, key: &str, ttl: Option<Duration>) -> Result<u64, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());

        match entries.get_mut(key) {
            Some(entry) if !entry.expired(now) => {
                if let Value::Count(n) = &mut entry.value {
                    *n += 1;
                    return Ok(*n);
                }
                // Key held a different shape; restart it as a counter.
                entry.value = Value::Count(1);
                entry.expires_at = Self::expiry(ttl);
                Ok(1)
            }
            _ => {
                entries.insert(
                    key.to_string(),
                    Entry {
                        value: Value::Count(1),
                        expires_at: Self::expiry(ttl),
                    },
                );
                Ok(1)
            }
        }
    }

    async fn get_count(&self, key: &str) -> Result<u64, StoreError> {
        let now = Instant::now();
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(match entries.get(key) {
            Some(entry) if !entry.expired(now) => match entry.value {
                Value::Count(n) => n,
                _ => 0,
            },
            _ => 0,
        })
    }

    async fn set_window_start(
        &self,
        key: &str,
        start_ms: u64,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(
            key.to_string(),
            Entry {
                value: Value::WindowStart(start_ms),
                expires_at: Self::expiry(ttl),
            },
        );
        Ok(())
    }

    async fn get_window_start(&self, key: &str) -> Result<Option<u64>, StoreError> {
        let now = Instant::now();
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(match entries.get(key) {
            Some(entry) if !entry.expired(now) => match entry.value {
                Value::WindowStart(ms) => Some(ms),
                _ => None,
            },
            _ => None,
        })
    }

    async fn push_sample(
        &self,
        key: &str,
        ts_ms: u64,
        value: f64,
        cap: usize,
    ) -> Result<(), StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());

        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::Samples(VecDeque::new()),
            expires_at: None,
        });
        if entry.expired(now) || !matches!(entry.value, Value::Samples(_)) {
            entry.value = Value::Samples(VecDeque::new());
            entry.expires_at = None;
        }
        if let Value::Samples(buf) = &mut entry.value {
            buf.push_back(Sample { ts_ms, value });
            while buf.len() > cap {
                buf.pop_front();
            }
        }
        Ok(())
    }

    async fn range_samples(&self, key: &str, from_ts_ms: u64) -> Result<Vec<Sample>, StoreError> {
        let now = Instant::now();
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(match entries.get(key) {
            Some(entry) if !entry.expired(now) => match &entry.value {
                Value::Samples(buf) => buf
                    .iter()
                    .filter(|s| s.ts_ms >= from_ts_ms)
                    .copied()
                    .collect(),
                _ => Vec::new(),
            },
            _ => Vec::new(),
        })
    }

    async fn reset(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.remove(key);
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
