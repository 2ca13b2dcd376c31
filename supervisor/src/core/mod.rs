//! Core supervisor logic
//!
//! Pure lifecycle bookkeeping, free of I/O: the restart backoff schedule,
//! the startup planner, and the per-service state registry.

pub mod backoff;
pub mod planner;
pub mod state;

pub use state::{ProcessInstance, SupervisorState};
