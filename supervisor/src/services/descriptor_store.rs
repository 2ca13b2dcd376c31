//! Process descriptor store
//!
//! Loads the supervisor configuration document and validates every service
//! descriptor before anything spawns. Read-only after load: descriptors are
//! handed out as immutable records and never mutated again.

use crate::error::{SupervisorError, SupervisorResult};
use serde::Deserialize;
use shared::ProcessDescriptor;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// Top-level supervisor configuration
#[derive(Deserialize, Debug, Clone)]
pub struct SupervisorConfig {
    /// Consecutive failed runs before a service is parked in FailedRestart
    #[serde(default = "default_max_restarts")]
    pub max_restarts: u32,

    /// Global grace period for a full shutdown pass
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,

    /// Managed service descriptors
    pub services: Vec<ProcessDescriptor>,
}

fn default_max_restarts() -> u32 {
    5
}

fn default_shutdown_grace_secs() -> u64 {
    30
}

impl SupervisorConfig {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

/// Loader and validator for supervisor configuration files
pub struct DescriptorStore;

impl DescriptorStore {
    /// Load and validate a configuration file
    pub fn load(path: &Path) -> SupervisorResult<SupervisorConfig> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            SupervisorError::config(format!("cannot read {}: {e}", path.display()))
        })?;

        let config: SupervisorConfig = serde_json::from_str(&raw).map_err(|e| {
            SupervisorError::config(format!("cannot parse {}: {e}", path.display()))
        })?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate a parsed configuration without side effects
    pub fn validate(config: &SupervisorConfig) -> SupervisorResult<()> {
        let mut seen = HashSet::new();

        for descriptor in &config.services {
            if descriptor.name.trim().is_empty() {
                return Err(SupervisorError::config("service name must not be empty"));
            }
            if !seen.insert(descriptor.name.clone()) {
                return Err(SupervisorError::config(format!(
                    "duplicate service name '{}'",
                    descriptor.name
                )));
            }
            if descriptor.command.trim().is_empty() {
                return Err(SupervisorError::config(format!(
                    "service '{}' has an empty command",
                    descriptor.name
                )));
            }
            if !command_resolves(&descriptor.command) {
                return Err(SupervisorError::config(format!(
                    "command '{}' for service '{}' cannot be resolved",
                    descriptor.command, descriptor.name
                )));
            }
            if descriptor
                .readiness_probe
                .as_ref()
                .is_some_and(|probe| probe.is_empty())
            {
                return Err(SupervisorError::config(format!(
                    "service '{}' declares an empty readiness probe",
                    descriptor.name
                )));
            }
        }

        Ok(())
    }
}

/// Check that a command is launchable: an existing file for explicit paths,
/// or present in one of the PATH directories for bare names
fn command_resolves(command: &str) -> bool {
    let path = Path::new(command);
    if command.contains('/') {
        return path.is_file();
    }

    std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).any(|dir| dir.join(command).is_file()))
        .unwrap_or(false)
}
