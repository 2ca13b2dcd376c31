//! Init-style process supervisor for privileged container workloads
//!
//! Starts a configured set of long-running services (sshd, crond, dockerd and
//! the like) in priority order, keeps them alive with per-service restart
//! policies and exponential backoff, multiplexes their output into one log
//! stream, and tears everything down in reverse start order when the process
//! receives a termination signal.
//!
//! The crate is organised around dependency injection: the supervisor core in
//! [`supervisor`] drives the [`traits::ProcessRunner`] seam, production
//! implementations live in [`services`], and tests substitute mockall mocks.

pub mod core;
pub mod error;
pub mod services;
pub mod shutdown;
pub mod supervisor;
pub mod traits;

pub use error::{SupervisorError, SupervisorResult};
pub use supervisor::{RunSummary, Supervisor, SupervisorSettings};
