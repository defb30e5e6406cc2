//! Property-based tests for the aegis patterns.
//!
//! Run with: cargo test --test property_tests
//!
//! These use proptest to verify the invariants that hold for all valid
//! inputs: delay bounds, jitter bounds, counter monotonicity, breaker
//! safety, and penalty escalation.

mod property;
