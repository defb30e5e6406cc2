//! End-to-end resilience scenarios: breaker trips, backoff recovery,
//! degradation cascades, and orchestrated execution.

mod resilience;
