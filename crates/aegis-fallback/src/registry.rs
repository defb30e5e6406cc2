//! Tool capability registry and candidate ordering.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// A registered tool and what it can do.
#[derive(Debug, Clone)]
pub struct ToolCapability {
    /// Unique tool name.
    pub name: String,
    /// Actions the tool can perform.
    pub actions: Vec<String>,
    /// Observed reliability, 0.0..=1.0.
    pub reliability: f64,
    /// Typical response time.
    pub avg_response_time: Duration,
    /// Free-form capability tags matched against user intent.
    pub capabilities: Vec<String>,
    /// Tie-break priority; lower values are tried earlier.
    pub fallback_priority: u32,
}

impl ToolCapability {
    /// Creates a capability with neutral defaults.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            actions: Vec::new(),
            reliability: 1.0,
            avg_response_time: Duration::from_millis(100),
            capabilities: Vec::new(),
            fallback_priority: 10,
        }
    }

    /// Adds an action.
    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.actions.push(action.into());
        self
    }

    /// Sets the reliability score.
    pub fn with_reliability(mut self, reliability: f64) -> Self {
        self.reliability = reliability.clamp(0.0, 1.0);
        self
    }

    /// Adds a capability tag.
    pub fn with_capability(mut self, tag: impl Into<String>) -> Self {
        self.capabilities.push(tag.into());
        self
    }

    /// Sets the tie-break priority.
    pub fn with_priority(mut self, priority: u32) -> Self {
        self.fallback_priority = priority;
        self
    }

    /// Sets the typical response time.
    pub fn with_avg_response_time(mut self, d: Duration) -> Self {
        self.avg_response_time = d;
        self
    }

    fn supports(&self, action: &str) -> bool {
        self.actions.iter().any(|a| a == action)
    }

    fn matches_intent(&self, intent: &str) -> bool {
        let intent = intent.to_ascii_lowercase();
        self.capabilities
            .iter()
            .any(|tag| intent.contains(&tag.to_ascii_lowercase()))
    }
}

/// Registry of tools available as fallbacks.
#[derive(Default)]
pub struct CapabilityRegistry {
    tools: Mutex<HashMap<String, ToolCapability>>,
}

impl CapabilityRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers or replaces a tool.
    pub fn register(&self, tool: ToolCapability) {
        let mut tools = self.tools.lock().unwrap_or_else(|e| e.into_inner());
        tools.insert(tool.name.clone(), tool);
    }

    /// Removes a tool.
    pub fn remove(&self, name: &str) -> bool {
        let mut tools = self.tools.lock().unwrap_or_else(|e| e.into_inner());
        tools.remove(name).is_some()
    }

    /// Looks up a tool by name.
    pub fn get(&self, name: &str) -> Option<ToolCapability> {
        let tools = self.tools.lock().unwrap_or_else(|e| e.into_inner());
        tools.get(name).cloned()
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether no tools are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ordered candidates for `(service, action)`: the named service
    /// first, then every other tool supporting the action, preferring
    /// intent matches, higher reliability, lower priority value, and
    /// faster tools, capped at `limit`.
    pub fn candidates(
        &self,
        service: &str,
        action: &str,
        user_intent: Option<&str>,
        limit: usize,
    ) -> Vec<ToolCapability> {
        let tools = self.tools.lock().unwrap_or_else(|e| e.into_inner());

        let mut alternates: Vec<&ToolCapability> = tools
            .values()
            .filter(|t| t.name != service && t.supports(action))
            .collect();

        alternates.sort_by(|a, b| {
            let intent_a = user_intent.is_some_and(|i| a.matches_intent(i));
            let intent_b = user_intent.is_some_and(|i| b.matches_intent(i));
            intent_b
                .cmp(&intent_a)
                .then(
                    b.reliability
                        .partial_cmp(&a.reliability)
                        .unwrap_or(std::cmp::Ordering::Equal),
                )
                .then(a.fallback_priority.cmp(&b.fallback_priority))
                .then(a.avg_response_time.cmp(&b.avg_response_time))
        });

        let mut ordered = Vec::new();
        if let Some(primary) = tools.get(service) {
            ordered.push(primary.clone());
        }
        ordered.extend(alternates.into_iter().cloned());
        ordered.truncate(limit);
        ordered
    }
}
