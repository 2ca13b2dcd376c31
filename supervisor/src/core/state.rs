//! Supervisor state registry
//!
//! One `ProcessInstance` per descriptor, keyed by service name and kept in a
//! single registry behind one mutex in the supervisor. All state and pid
//! mutation funnels through here; no other component touches instances.

use shared::{ExitStatus, ProcessDescriptor, ProcessState};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Mutable runtime record for one managed service
///
/// Recreated pids across restarts belong to the same logical instance; the
/// instance itself lives as long as its descriptor is configured.
#[derive(Debug)]
pub struct ProcessInstance {
    pub descriptor: Arc<ProcessDescriptor>,
    pub state: ProcessState,
    pub pid: Option<u32>,
    pub restart_count: u32,
    pub last_exit: Option<ExitStatus>,
    pub last_started_at: Option<Instant>,
    /// Set while a child is alive; resolves once with the exit status
    pub exit_rx: Option<watch::Receiver<Option<ExitStatus>>>,
}

impl ProcessInstance {
    pub fn new(descriptor: Arc<ProcessDescriptor>) -> Self {
        Self {
            descriptor,
            state: ProcessState::Pending,
            pid: None,
            restart_count: 0,
            last_exit: None,
            last_started_at: None,
            exit_rx: None,
        }
    }

    pub fn mark_starting(&mut self, pid: u32, exit_rx: watch::Receiver<Option<ExitStatus>>) {
        self.state = ProcessState::Starting;
        self.pid = Some(pid);
        self.exit_rx = Some(exit_rx);
        self.last_started_at = Some(Instant::now());
    }

    pub fn mark_running(&mut self) {
        self.state = ProcessState::Running;
    }

    pub fn mark_stopping(&mut self) {
        self.state = ProcessState::Stopping;
    }

    pub fn mark_exited(&mut self, status: ExitStatus) {
        self.state = ProcessState::Exited;
        self.last_exit = Some(status);
        self.pid = None;
        self.exit_rx = None;
    }

    pub fn mark_failed(&mut self) {
        self.state = ProcessState::FailedRestart;
        self.pid = None;
        self.exit_rx = None;
    }

    /// Whether an OS process currently backs this instance
    pub fn is_live(&self) -> bool {
        matches!(
            self.state,
            ProcessState::Starting | ProcessState::Running | ProcessState::Stopping
        )
    }

    /// Time since the current run started
    pub fn uptime(&self) -> Option<Duration> {
        self.last_started_at.map(|started| started.elapsed())
    }
}

/// Registry of all managed instances plus shutdown bookkeeping
#[derive(Debug, Default)]
pub struct SupervisorState {
    instances: BTreeMap<String, ProcessInstance>,
    start_order: Vec<String>,
    restarts_disabled: bool,
    shutting_down: bool,
}

impl SupervisorState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a descriptor in start-plan order
    pub fn insert(&mut self, descriptor: Arc<ProcessDescriptor>) {
        let name = descriptor.name.clone();
        if !self.instances.contains_key(&name) {
            self.start_order.push(name.clone());
            self.instances.insert(name, ProcessInstance::new(descriptor));
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.instances.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&ProcessInstance> {
        self.instances.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut ProcessInstance> {
        self.instances.get_mut(name)
    }

    /// Names in the order services were started
    pub fn start_order(&self) -> &[String] {
        &self.start_order
    }

    /// Live services in reverse start order, the order they must stop in
    pub fn stop_order(&self) -> Vec<String> {
        self.start_order
            .iter()
            .rev()
            .filter(|name| self.instances.get(*name).is_some_and(|i| i.is_live()))
            .cloned()
            .collect()
    }

    pub fn service_state(&self, name: &str) -> Option<ProcessState> {
        self.instances.get(name).map(|i| i.state)
    }

    /// Services parked in FailedRestart
    pub fn failed_services(&self) -> Vec<String> {
        self.instances
            .iter()
            .filter(|(_, i)| i.state == ProcessState::FailedRestart)
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn restarts_disabled(&self) -> bool {
        self.restarts_disabled
    }

    /// Enter shutdown: disables restarts. Returns false if already begun.
    pub fn begin_shutdown(&mut self) -> bool {
        if self.shutting_down {
            return false;
        }
        self.shutting_down = true;
        self.restarts_disabled = true;
        true
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down
    }
}
