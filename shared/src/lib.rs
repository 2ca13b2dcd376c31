//! Shared types for the supervisor workspace
//!
//! Contains the vocabulary used across the supervisor: service descriptors,
//! lifecycle states, signal/restart enums, and the tracing setup. Component
//! internals (state machine, services) live in the supervisor crate.

pub mod errors;
pub mod logging;
pub mod types;

pub use errors::*;
pub use types::*;
