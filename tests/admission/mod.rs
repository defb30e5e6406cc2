pub mod cooldowns;
pub mod penalties;
pub mod window_limits;

use aegis_admission::{
    ActivityConfig, ActivityMonitor, AdmissionGate, GateConfig, PenaltyConfig, PenaltyManager,
    RateLimitRule, RateLimiter,
};
use aegis_store::CounterStore;
use std::sync::Arc;

/// Builds a gate over an in-memory store with the given rules.
pub fn gate(rules: Vec<RateLimitRule>) -> AdmissionGate {
    gate_with(rules, GateConfig::default(), PenaltyConfig::default())
}

pub fn gate_with(
    rules: Vec<RateLimitRule>,
    gate_config: GateConfig,
    penalty_config: PenaltyConfig,
) -> AdmissionGate {
    let store = Arc::new(CounterStore::in_memory());
    AdmissionGate::new(
        Arc::new(PenaltyManager::new(penalty_config, Arc::clone(&store))),
        Arc::new(RateLimiter::new(Arc::clone(&store), rules)),
        Arc::new(ActivityMonitor::new(ActivityConfig::default())),
        gate_config,
    )
}
