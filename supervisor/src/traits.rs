//! Trait definitions with mockall annotations for testing
//!
//! These traits are the seams between the supervisor core and the operating
//! system: process spawning/signalling and log output. Production
//! implementations live in `services`; tests inject mockall mocks so the
//! lifecycle state machine can be exercised without real child processes.

use crate::error::SupervisorResult;
use shared::{ExitStatus, ProcessDescriptor, StopSignal};
use tokio::sync::watch;

/// Handle for a spawned child process
///
/// `exit` is set exactly once, when the OS reports the child gone. Holders
/// may clone the receiver; the supervisor core is the only component that
/// interprets it.
#[derive(Debug)]
pub struct SpawnedChild {
    pub pid: u32,
    pub exit: watch::Receiver<Option<ExitStatus>>,
}

/// Which output stream of a child a log line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

impl std::fmt::Display for StreamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamKind::Stdout => write!(f, "stdout"),
            StreamKind::Stderr => write!(f, "stderr"),
        }
    }
}

/// One captured line of child output
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub service: String,
    pub stream: StreamKind,
    pub line: String,
}

/// Process boundary abstraction for dependency injection
///
/// Spawns OS-level children, runs readiness probes, and delivers signals.
/// The supervisor core never touches `tokio::process` directly.
#[mockall::automock]
#[async_trait::async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Spawn the described service with its declared environment and
    /// working directory, registering its output with the log multiplexer
    async fn spawn(&self, descriptor: &ProcessDescriptor) -> SupervisorResult<SpawnedChild>;

    /// Run the descriptor's readiness probe once; true means ready.
    /// Descriptors without a probe are ready as soon as they spawn.
    async fn probe_ready(&self, descriptor: &ProcessDescriptor) -> SupervisorResult<bool>;

    /// Deliver a signal to a child by pid
    async fn signal(&self, pid: u32, signal: StopSignal) -> SupervisorResult<()>;
}

/// Unified destination for multiplexed child output
#[mockall::automock]
pub trait LogSink: Send + Sync {
    fn write(&self, record: &LogRecord);
}
