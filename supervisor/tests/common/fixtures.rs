//! Test fixtures for supervisor tests
//!
//! Descriptor builders for the classic in-container daemon set plus a few
//! configuration documents.

use shared::ProcessDescriptor;

/// Standard test data and fixtures
pub struct TestFixtures;

impl TestFixtures {
    /// Priorities of the standard daemon set, lower starts first
    pub const SSHD_PRIORITY: i32 = 10;
    pub const CROND_PRIORITY: i32 = 20;
    pub const DOCKERD_PRIORITY: i32 = 30;

    /// Descriptor with the given restart policy and all other defaults
    pub fn descriptor(name: &str, priority: i32, restart: &str) -> ProcessDescriptor {
        serde_json::from_value(serde_json::json!({
            "name": name,
            "command": "/bin/sh",
            "args": ["-c", format!("exec {name}")],
            "priority": priority,
            "restart": restart,
        }))
        .unwrap()
    }

    /// Descriptor gated on a readiness probe
    pub fn probed_descriptor(
        name: &str,
        priority: i32,
        timeout_secs: u64,
        restart: &str,
    ) -> ProcessDescriptor {
        serde_json::from_value(serde_json::json!({
            "name": name,
            "command": "/bin/sh",
            "priority": priority,
            "restart": restart,
            "readiness_probe": ["/bin/sh", "-c", "true"],
            "readiness_timeout_secs": timeout_secs,
        }))
        .unwrap()
    }

    /// The classic privileged-container daemon set: sshd, crond, dockerd
    pub fn daemon_set() -> Vec<ProcessDescriptor> {
        vec![
            Self::descriptor("sshd", Self::SSHD_PRIORITY, "always"),
            Self::descriptor("crond", Self::CROND_PRIORITY, "always"),
            Self::descriptor("dockerd", Self::DOCKERD_PRIORITY, "on-failure"),
        ]
    }

    /// Configuration document containing the given services
    pub fn config_json(services: &[ProcessDescriptor]) -> String {
        serde_json::to_string_pretty(&serde_json::json!({
            "max_restarts": 5,
            "shutdown_grace_secs": 30,
            "services": services,
        }))
        .unwrap()
    }
}
