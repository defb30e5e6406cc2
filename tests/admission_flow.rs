//! End-to-end admission scenarios: window limits, cooldowns, and
//! automatic penalties for bot-like traffic.

mod admission;
