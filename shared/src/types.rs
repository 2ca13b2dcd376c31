//! Core vocabulary for managed services
//!
//! Descriptors are loaded once from configuration and immutable thereafter;
//! runtime state (`ProcessState`, `ExitStatus`) is owned by the supervisor
//! core and only ever mutated there.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tokio::time::Instant;

use crate::errors::SharedError;

/// Restart policy applied when a managed service exits unexpectedly
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicy {
    /// Stay down once exited
    Never,
    /// Restart only when the exit status is unsuccessful
    OnFailure,
    /// Restart regardless of exit status
    Always,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        RestartPolicy::Never
    }
}

impl fmt::Display for RestartPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RestartPolicy::Never => write!(f, "never"),
            RestartPolicy::OnFailure => write!(f, "on-failure"),
            RestartPolicy::Always => write!(f, "always"),
        }
    }
}

/// Signal used to request graceful termination of a service
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(try_from = "String", into = "String")]
pub enum StopSignal {
    Term,
    Int,
    Quit,
    Hup,
    Usr1,
    Usr2,
    Kill,
}

impl StopSignal {
    /// Raw signal number delivered to the child
    pub fn as_raw(&self) -> i32 {
        match self {
            StopSignal::Hup => 1,
            StopSignal::Int => 2,
            StopSignal::Quit => 3,
            StopSignal::Kill => 9,
            StopSignal::Usr1 => 10,
            StopSignal::Usr2 => 12,
            StopSignal::Term => 15,
        }
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        StopSignal::Term
    }
}

impl fmt::Display for StopSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StopSignal::Term => "SIGTERM",
            StopSignal::Int => "SIGINT",
            StopSignal::Quit => "SIGQUIT",
            StopSignal::Hup => "SIGHUP",
            StopSignal::Usr1 => "SIGUSR1",
            StopSignal::Usr2 => "SIGUSR2",
            StopSignal::Kill => "SIGKILL",
        };
        write!(f, "{name}")
    }
}

impl FromStr for StopSignal {
    type Err = SharedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase();
        let name = normalized.strip_prefix("SIG").unwrap_or(&normalized);
        match name {
            "TERM" => Ok(StopSignal::Term),
            "INT" => Ok(StopSignal::Int),
            "QUIT" => Ok(StopSignal::Quit),
            "HUP" => Ok(StopSignal::Hup),
            "USR1" => Ok(StopSignal::Usr1),
            "USR2" => Ok(StopSignal::Usr2),
            "KILL" => Ok(StopSignal::Kill),
            _ => Err(SharedError::InvalidSignal { name: s.to_string() }),
        }
    }
}

impl TryFrom<String> for StopSignal {
    type Error = SharedError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<StopSignal> for String {
    fn from(signal: StopSignal) -> Self {
        signal.to_string()
    }
}

/// Lifecycle state of a managed service instance
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessState {
    Pending,
    Starting,
    Running,
    Stopping,
    Exited,
    FailedRestart,
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProcessState::Pending => "pending",
            ProcessState::Starting => "starting",
            ProcessState::Running => "running",
            ProcessState::Stopping => "stopping",
            ProcessState::Exited => "exited",
            ProcessState::FailedRestart => "failed-restart",
        };
        write!(f, "{name}")
    }
}

/// Exit status of a child process, distinguishing exit codes from signals
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExitStatus {
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

impl ExitStatus {
    pub fn from_code(code: i32) -> Self {
        Self {
            code: Some(code),
            signal: None,
        }
    }

    pub fn from_signal(signal: i32) -> Self {
        Self {
            code: None,
            signal: Some(signal),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "exit code {code}"),
            (None, Some(signal)) => write!(f, "signal {signal}"),
            (None, None) => write!(f, "unknown exit status"),
        }
    }
}

/// Static configuration for one managed service
///
/// Loaded from the supervisor configuration document and never mutated
/// afterwards. Lower `priority` starts earlier; ties are broken by name.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ProcessDescriptor {
    /// Unique service name
    pub name: String,

    /// Executable path or bare command name resolved through PATH
    pub command: String,

    /// Arguments passed to the command
    #[serde(default)]
    pub args: Vec<String>,

    /// Working directory for the child, inherited when unset
    #[serde(default)]
    pub working_dir: Option<PathBuf>,

    /// Environment variables layered on top of the supervisor's own
    #[serde(default)]
    pub environment: HashMap<String, String>,

    /// Restart policy applied on unexpected exit
    #[serde(default)]
    pub restart: RestartPolicy,

    /// Startup priority, lower starts first
    pub priority: i32,

    /// Optional readiness probe: command plus args, zero exit means ready
    #[serde(default)]
    pub readiness_probe: Option<Vec<String>>,

    /// Bound on how long the readiness probe may keep failing
    #[serde(default = "default_readiness_timeout_secs")]
    pub readiness_timeout_secs: u64,

    /// Signal used for graceful stop
    #[serde(default)]
    pub stop_signal: StopSignal,

    /// Grace period before the service is force-killed on stop
    #[serde(default = "default_stop_timeout_secs")]
    pub stop_timeout_secs: u64,
}

fn default_readiness_timeout_secs() -> u64 {
    10
}

fn default_stop_timeout_secs() -> u64 {
    10
}

impl ProcessDescriptor {
    pub fn readiness_timeout(&self) -> Duration {
        Duration::from_secs(self.readiness_timeout_secs)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }
}

/// Why a shutdown was requested
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShutdownReason {
    Term,
    Interrupt,
    Manual,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownReason::Term => write!(f, "SIGTERM"),
            ShutdownReason::Interrupt => write!(f, "SIGINT"),
            ShutdownReason::Manual => write!(f, "manual"),
        }
    }
}

/// Transient request to stop all managed services
#[derive(Clone, Copy, Debug)]
pub struct ShutdownRequest {
    pub reason: ShutdownReason,
    /// Absolute time by which every service must be stopped
    pub deadline: Instant,
}

impl ShutdownRequest {
    pub fn new(reason: ShutdownReason, grace: Duration) -> Self {
        Self {
            reason,
            deadline: Instant::now() + grace,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_signal_parsing() {
        assert_eq!("SIGTERM".parse::<StopSignal>().unwrap(), StopSignal::Term);
        assert_eq!("term".parse::<StopSignal>().unwrap(), StopSignal::Term);
        assert_eq!("sigusr1".parse::<StopSignal>().unwrap(), StopSignal::Usr1);
        assert_eq!("KILL".parse::<StopSignal>().unwrap(), StopSignal::Kill);
        assert!("SIGWINCH".parse::<StopSignal>().is_err());
    }

    #[test]
    fn test_stop_signal_raw_numbers() {
        assert_eq!(StopSignal::Term.as_raw(), 15);
        assert_eq!(StopSignal::Kill.as_raw(), 9);
        assert_eq!(StopSignal::Int.as_raw(), 2);
    }

    #[test]
    fn test_restart_policy_serde() {
        let policy: RestartPolicy = serde_json::from_str("\"on-failure\"").unwrap();
        assert_eq!(policy, RestartPolicy::OnFailure);

        let policy: RestartPolicy = serde_json::from_str("\"always\"").unwrap();
        assert_eq!(policy, RestartPolicy::Always);

        assert!(serde_json::from_str::<RestartPolicy>("\"sometimes\"").is_err());
    }

    #[test]
    fn test_descriptor_defaults() {
        let descriptor: ProcessDescriptor = serde_json::from_str(
            r#"{"name": "sshd", "command": "/usr/sbin/sshd", "priority": 10}"#,
        )
        .unwrap();

        assert_eq!(descriptor.restart, RestartPolicy::Never);
        assert_eq!(descriptor.stop_signal, StopSignal::Term);
        assert_eq!(descriptor.stop_timeout(), Duration::from_secs(10));
        assert_eq!(descriptor.readiness_timeout(), Duration::from_secs(10));
        assert!(descriptor.args.is_empty());
        assert!(descriptor.environment.is_empty());
        assert!(descriptor.readiness_probe.is_none());
    }

    #[test]
    fn test_exit_status_success() {
        assert!(ExitStatus::from_code(0).success());
        assert!(!ExitStatus::from_code(1).success());
        assert!(!ExitStatus::from_signal(9).success());
    }
}
