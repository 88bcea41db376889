//! rolegate
//!
//! A role-aware, fixed-window request rate limiter. Every inbound request
//! is checked against a per-client counter held in a pluggable counter
//! store; the quota applied depends on the client's role, with unknown and
//! missing roles limited like unauthenticated clients.

pub mod config;
pub mod error;
pub mod limiter;
pub mod metrics;
pub mod redis;
pub mod service;
pub mod store;
pub mod utils;

// Re-export main types
pub use config::{FailureMode, LimiterConfig, UNAUTHENTICATED_ROLE};
pub use error::{RateLimitError, Result};
pub use limiter::{Decision, RateLimiter};
pub use service::AdmissionService;
pub use store::{CounterEntry, CounterStore, InitOutcome, MemoryCounterStore};
