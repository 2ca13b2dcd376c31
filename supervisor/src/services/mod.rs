//! Service implementations
//!
//! Real implementations of the supervisor's OS-facing seams: configuration
//! loading, process spawning/signalling, and child output forwarding.

pub mod descriptor_store;
pub mod log_multiplexer;
pub mod process_runner;

// Re-export all service implementations
pub use descriptor_store::{DescriptorStore, SupervisorConfig};
pub use log_multiplexer::{LogMultiplexer, TracingLogSink};
pub use process_runner::RealProcessRunner;
