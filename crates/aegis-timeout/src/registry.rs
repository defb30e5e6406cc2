//! Resource registry and cleanup ordering.

use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Kind of an external resource tied to an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Connection,
    Stream,
    Timer,
    Process,
    Memory,
    File,
    Custom,
}

impl ResourceKind {
    /// Cleanup priority; higher runs first. Processes and connections
    /// hold external state and go before purely local kinds.
    pub(crate) fn priority(self) -> u8 {
        match self {
            ResourceKind::Process => 6,
            ResourceKind::Connection => 5,
            ResourceKind::Stream => 4,
            ResourceKind::File => 3,
            ResourceKind::Timer => 2,
            ResourceKind::Memory => 1,
            ResourceKind::Custom => 0,
        }
    }

    /// Stable label for logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Connection => "connection",
            ResourceKind::Stream => "stream",
            ResourceKind::Timer => "timer",
            ResourceKind::Process => "process",
            ResourceKind::Memory => "memory",
            ResourceKind::File => "file",
            ResourceKind::Custom => "custom",
        }
    }
}

/// Asynchronous destructor for a registered resource.
pub type CleanupFn = Arc<dyn Fn() -> BoxFuture<'static, Result<(), String>> + Send + Sync>;

/// A registered resource with its cleanup function.
#[derive(Clone)]
pub struct ResourceHandle {
    /// Unique id within the owning operation.
    pub id: String,
    /// Kind, used for cleanup ordering.
    pub kind: ResourceKind,
    pub(crate) cleanup: CleanupFn,
    /// When the resource was registered.
    pub created_at: Instant,
    /// Last time the owning operation touched the resource.
    pub last_accessed: Instant,
    /// Free-form annotations.
    pub metadata: HashMap<String, String>,
}

impl ResourceHandle {
    /// Creates a handle with the given cleanup function.
    pub fn new<F>(id: impl Into<String>, kind: ResourceKind, cleanup: F) -> Self
    where
        F: Fn() -> BoxFuture<'static, Result<(), String>> + Send + Sync + 'static,
    {
        let now = Instant::now();
        Self {
            id: id.into(),
            kind,
            cleanup: Arc::new(cleanup),
            created_at: now,
            last_accessed: now,
            metadata: HashMap::new(),
        }
    }

    /// Attaches a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

impl std::fmt::Debug for ResourceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceHandle")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("created_at", &self.created_at)
            .field("last_accessed", &self.last_accessed)
            .finish_non_exhaustive()
    }
}

/// Resources keyed by owning operation.
///
/// The lock is never held across a cleanup await; callers drain handles
/// out and run destructors outside the guard.
#[derive(Default)]
pub struct ResourceRegistry {
    resources: Mutex<HashMap<String, Vec<ResourceHandle>>>,
}

impl ResourceRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a resource under an operation.
    pub fn register(&self, operation_id: &str, handle: ResourceHandle) {
        let mut resources = self.resources.lock().unwrap_or_else(|e| e.into_inner());
        resources
            .entry(operation_id.to_string())
            .or_default()
            .push(handle);
    }

    /// Refreshes a resource's `last_accessed` stamp.
    pub fn touch(&self, operation_id: &str, resource_id: &str) {
        let mut resources = self.resources.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(handles) = resources.get_mut(operation_id) {
            if let Some(handle) = handles.iter_mut().find(|h| h.id == resource_id) {
                handle.last_accessed = Instant::now();
            }
        }
    }

    /// Removes and returns every resource of an operation, highest
    /// cleanup priority first.
    pub fn drain_operation(&self, operation_id: &str) -> Vec<ResourceHandle> {
        let mut resources = self.resources.lock().unwrap_or_else(|e| e.into_inner());
        let mut handles = resources.remove(operation_id).unwrap_or_default();
        handles.sort_by(|a, b| b.kind.priority().cmp(&a.kind.priority()));
        handles
    }

    /// Removes and returns resources idle beyond `stale_threshold`
    /// across all operations, highest cleanup priority first.
    pub fn drain_stale(&self, stale_threshold: Duration) -> Vec<ResourceHandle> {
        let now = Instant::now();
        let mut stale = Vec::new();
        {
            let mut resources = self.resources.lock().unwrap_or_else(|e| e.into_inner());
            for handles in resources.values_mut() {
                let mut i = 0;
                while i < handles.len() {
                    if now.duration_since(handles[i].last_accessed) >= stale_threshold {
                        stale.push(handles.swap_remove(i));
                    } else {
                        i += 1;
                    }
                }
            }
            resources.retain(|_, handles| !handles.is_empty());
        }
        stale.sort_by(|a, b| b.kind.priority().cmp(&a.kind.priority()));
        stale
    }

    /// Number of live resources across all operations.
    pub fn active_count(&self) -> usize {
        let resources = self.resources.lock().unwrap_or_else(|e| e.into_inner());
        resources.values().map(Vec::len).sum()
    }
}
