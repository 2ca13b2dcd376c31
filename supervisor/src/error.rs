//! Supervisor-specific error types

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Failed to spawn '{service}': {source}")]
    Spawn {
        service: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{service}' readiness probe did not succeed within {timeout:?}")]
    ReadinessTimeout { service: String, timeout: Duration },

    #[error("'{service}' exhausted {attempts} consecutive restart attempts")]
    RestartExhausted { service: String, attempts: u32 },

    #[error("'{service}' ignored {signal} and was force-killed after {timeout:?}")]
    ShutdownTimeout {
        service: String,
        signal: shared::StopSignal,
        timeout: Duration,
    },

    #[error("Startup order for '{service}' is ambiguous")]
    Unorderable { service: String },

    #[error("Unknown service: {service}")]
    UnknownService { service: String },

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl SupervisorError {
    /// Convenience constructor for configuration errors
    pub fn config(message: impl Into<String>) -> Self {
        SupervisorError::Config {
            message: message.into(),
        }
    }

    /// Convenience constructor for spawn failures
    pub fn spawn(service: impl Into<String>, source: std::io::Error) -> Self {
        SupervisorError::Spawn {
            service: service.into(),
            source,
        }
    }
}

pub type SupervisorResult<T> = Result<T, SupervisorError>;
