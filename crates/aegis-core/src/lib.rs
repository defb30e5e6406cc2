//! Core infrastructure shared by every aegis crate.
//!
//! This crate provides the pieces the admission and resilience patterns have
//! in common:
//!
//! - A typed event system ([`events`]) used by every pattern for
//!   observability. Patterns define their own event enums and expose
//!   `on_*` hooks on their builders.
//! - Error classification ([`ErrorClass`]) that maps dependency failures
//!   into retryable and non-retryable classes. The backoff engine and the
//!   orchestrator both key decisions off this.
//! - An exponentially-weighted moving average ([`Ema`]) used for success
//!   rates, response times, and cleanup durations throughout the workspace.

pub mod ema;
pub mod error;
pub mod events;

pub use ema::{Ema, DEFAULT_SMOOTHING};
pub use error::{classify_message, ErrorClass};
pub use events::{EventListener, FnListener, Listeners, PatternEvent};
