//! Dynamic server registry: typed definitions, change events, guarded
//! `${VAR}` substitution.
//!
//! Watching files and reloading is the embedder's job; this module owns
//! the shape of the registry, the diff between two snapshots, and the
//! substitution rules.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Retry settings for a managed server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Attempts, including the first.
    pub max_attempts: u32,
    /// Base delay between attempts, in milliseconds.
    pub base_delay_ms: u64,
}

/// Health probing settings for a managed server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthSettings {
    /// Probe interval in milliseconds.
    pub interval_ms: u64,
    /// Consecutive failures before the server is considered down.
    pub failure_threshold: u32,
}

/// Resource limits for a managed server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Memory ceiling in megabytes.
    #[serde(default)]
    pub max_memory_mb: Option<u64>,
    /// Process count ceiling.
    #[serde(default)]
    pub max_processes: Option<u32>,
}

/// Substitution and path policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SecuritySettings {
    /// Whether `${VAR}` substitution is honored at all.
    #[serde(default)]
    pub use_env_substitution: bool,
    /// Prefixes a variable name must carry to be substituted.
    #[serde(default)]
    pub allowed_env_prefixes: Vec<String>,
}

/// One managed server definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Whether the server participates at all.
    pub enabled: bool,
    /// Startup/selection priority; lower starts earlier.
    #[serde(default)]
    pub priority: u32,
    /// Executable to launch.
    pub command: String,
    /// Arguments, subject to substitution.
    #[serde(default)]
    pub args: Vec<String>,
    /// Environment, subject to substitution on values.
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Startup timeout in milliseconds.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Retry settings.
    #[serde(default)]
    pub retry: Option<RetrySettings>,
    /// Health probing.
    #[serde(default)]
    pub health: Option<HealthSettings>,
    /// Resource limits.
    #[serde(default)]
    pub resources: Option<ResourceLimits>,
    /// Per-server security overrides.
    #[serde(default)]
    pub security: Option<SecuritySettings>,
    /// Declared capabilities.
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Free-form tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Result cache TTL in milliseconds.
    #[serde(default)]
    pub cache_ttl_ms: Option<u64>,
    /// Last modification stamp (ms since epoch), set by the loader.
    #[serde(default)]
    pub last_modified: Option<u64>,
    /// Where the definition came from, set by the loader.
    #[serde(default)]
    pub source: Option<String>,
}

/// Registry-wide settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryGlobals {
    /// Paths servers may touch.
    #[serde(default)]
    pub allowed_paths: Vec<String>,
    /// Process startup/shutdown timeout in milliseconds.
    #[serde(default = "default_process_timeout_ms")]
    pub process_timeout_ms: u64,
    /// Whether relative paths are accepted in `allowed_paths`.
    #[serde(default)]
    pub allow_relative_paths: bool,
    /// Ceiling on simultaneously connected servers.
    #[serde(default = "default_max_connections")]
    pub max_concurrent_connections: u32,
    /// Default substitution policy.
    #[serde(default)]
    pub security: SecuritySettings,
}

fn default_process_timeout_ms() -> u64 {
    30_000
}

fn default_max_connections() -> u32 {
    16
}

impl Default for RegistryGlobals {
    fn default() -> Self {
        Self {
            allowed_paths: Vec::new(),
            process_timeout_ms: default_process_timeout_ms(),
            allow_relative_paths: false,
            max_concurrent_connections: default_max_connections(),
            security: SecuritySettings::default(),
        }
    }
}

/// A full registry snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ServerRegistry {
    /// Managed servers keyed by id.
    #[serde(default)]
    pub servers: BTreeMap<String, ServerConfig>,
    /// Registry-wide settings.
    #[serde(default)]
    pub globals: RegistryGlobals,
}

/// Typed change between two registry snapshots.
#[derive(Debug, Clone, PartialEq)]
pub enum RegistryEvent {
    /// A server appeared.
    ServerAdded {
        id: String,
        config: Box<ServerConfig>,
    },
    /// A server disappeared.
    ServerRemoved {
        id: String,
        config: Box<ServerConfig>,
    },
    /// A server's definition changed.
    ServerUpdated {
        id: String,
        before: Box<ServerConfig>,
        after: Box<ServerConfig>,
    },
    /// A reload completed; emitted once per diff that found changes.
    ConfigReloaded {
        /// Servers in the new snapshot.
        server_count: usize,
    },
}

/// Diffs two snapshots into typed events, `ConfigReloaded` last.
pub fn diff_registries(old: &ServerRegistry, new: &ServerRegistry) -> Vec<RegistryEvent> {
    let mut events = Vec::new();

    for (id, config) in &new.servers {
        match old.servers.get(id) {
            None => events.push(RegistryEvent::ServerAdded {
                id: id.clone(),
                config: Box::new(config.clone()),
            }),
            Some(before) if before != config => events.push(RegistryEvent::ServerUpdated {
                id: id.clone(),
                before: Box::new(before.clone()),
                after: Box::new(config.clone()),
            }),
            Some(_) => {}
        }
    }
    for (id, config) in &old.servers {
        if !new.servers.contains_key(id) {
            events.push(RegistryEvent::ServerRemoved {
                id: id.clone(),
                config: Box::new(config.clone()),
            });
        }
    }

    if !events.is_empty() || old.globals != new.globals {
        events.push(RegistryEvent::ConfigReloaded {
            server_count: new.servers.len(),
        });
    }
    events
}

/// Replaces `${VAR}` occurrences in `input`.
///
/// Substitution happens only when the policy enables it and `VAR` starts
/// with one of the allowed prefixes; otherwise the occurrence is left
/// verbatim. Unknown variables are also left verbatim.
pub fn substitute_env(
    input: &str,
    security: &SecuritySettings,
    lookup: &dyn Fn(&str) -> Option<String>,
) -> String {
    if !security.use_env_substitution {
        return input.to_string();
    }

    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let var = &after[..end];
                let allowed = security
                    .allowed_env_prefixes
                    .iter()
                    .any(|prefix| var.starts_with(prefix.as_str()));
                match (allowed, lookup(var)) {
                    (true, Some(value)) => out.push_str(&value),
                    _ => {
                        out.push_str("${");
                        out.push_str(var);
                        out.push('}');
                    }
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                return out;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Applies substitution to every server's args and env values, using the
/// server's own security settings when present, else the globals'.
pub fn substitute_registry(
    registry: &mut ServerRegistry,
    lookup: &dyn Fn(&str) -> Option<String>,
) {
    let globals = registry.globals.security.clone();
    for config in registry.servers.values_mut() {
        let security = config.security.as_ref().unwrap_or(&globals).clone();
        for arg in &mut config.args {
            *arg = substitute_env(arg, &security, lookup);
        }
        for value in config.env.values_mut() {
            *value = substitute_env(value, &security, lookup);
        }
    }
}
