pub mod backoff_recovery;
pub mod breaker_trip;
pub mod degradation_cascade;
pub mod orchestrated;
