//! Test helpers and builder patterns for supervisor tests
//!
//! `ChildRegistry` scripts the lives of mock children: it hands out pids and
//! exit channels, records every spawn and signal, and lets a test kill any
//! child at will. `SupervisorBuilder` wires a registry-backed
//! `MockProcessRunner` into a supervisor with sensible defaults.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

use shared::{ExitStatus, ProcessState, ShutdownReason, ShutdownRequest, StopSignal};
use supervisor::core::SupervisorState;
use supervisor::traits::{MockProcessRunner, SpawnedChild};
use supervisor::{Supervisor, SupervisorError, SupervisorSettings};

#[derive(Default)]
struct RegistryInner {
    next_pid: u32,
    /// Service name per spawn, in spawn order
    spawns: Vec<String>,
    /// (service, signal) per delivery, in delivery order
    signals: Vec<(String, StopSignal)>,
    pids: HashMap<u32, String>,
    /// Exit channel of the latest child per service
    exits: HashMap<String, watch::Sender<Option<ExitStatus>>>,
    /// Services that ignore everything but SIGKILL
    stubborn: HashSet<String>,
}

/// Scripted child population shared between a mock runner and the test body
#[derive(Clone, Default)]
pub struct ChildRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

impl ChildRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new mock child for the service and record the spawn
    pub fn spawn_child(&self, service: &str) -> SpawnedChild {
        let mut inner = self.inner.lock().unwrap();
        inner.next_pid += 1;
        let pid = inner.next_pid;
        inner.spawns.push(service.to_string());
        inner.pids.insert(pid, service.to_string());

        let (tx, rx) = watch::channel(None);
        inner.exits.insert(service.to_string(), tx);
        SpawnedChild { pid, exit: rx }
    }

    /// Record a signal delivery; well-behaved children die on any signal,
    /// stubborn ones only on SIGKILL
    pub fn record_signal(&self, pid: u32, signal: StopSignal) {
        let mut inner = self.inner.lock().unwrap();
        let Some(service) = inner.pids.get(&pid).cloned() else {
            return;
        };
        inner.signals.push((service.clone(), signal));

        let dies = signal == StopSignal::Kill || !inner.stubborn.contains(&service);
        if dies {
            if let Some(tx) = inner.exits.get(&service) {
                let _ = tx.send(Some(ExitStatus::from_signal(signal.as_raw())));
            }
        }
    }

    /// Make the current child of a service exit with the given status
    pub fn exit(&self, service: &str, status: ExitStatus) {
        let inner = self.inner.lock().unwrap();
        if let Some(tx) = inner.exits.get(service) {
            let _ = tx.send(Some(status));
        }
    }

    pub fn mark_stubborn(&self, service: &str) {
        self.inner
            .lock()
            .unwrap()
            .stubborn
            .insert(service.to_string());
    }

    pub fn spawn_order(&self) -> Vec<String> {
        self.inner.lock().unwrap().spawns.clone()
    }

    pub fn spawn_count(&self, service: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .spawns
            .iter()
            .filter(|s| s.as_str() == service)
            .count()
    }

    pub fn signal_order(&self) -> Vec<(String, StopSignal)> {
        self.inner.lock().unwrap().signals.clone()
    }
}

/// Builder for supervisors driven by a registry-backed mock runner
pub struct SupervisorBuilder {
    registry: ChildRegistry,
    max_restarts: u32,
    shutdown_grace: Duration,
    config_path: Option<PathBuf>,
    failing_spawns: HashSet<String>,
    /// Failed probe attempts before a probed service reports ready
    ready_after: HashMap<String, usize>,
    /// Runs (by spawn count) after which a probe stops ever succeeding
    ready_runs: HashMap<String, usize>,
}

impl SupervisorBuilder {
    pub fn new() -> Self {
        Self {
            registry: ChildRegistry::new(),
            max_restarts: 5,
            shutdown_grace: Duration::from_secs(30),
            config_path: None,
            failing_spawns: HashSet::new(),
            ready_after: HashMap::new(),
            ready_runs: HashMap::new(),
        }
    }

    pub fn with_max_restarts(mut self, max_restarts: u32) -> Self {
        self.max_restarts = max_restarts;
        self
    }

    pub fn with_config_path(mut self, path: PathBuf) -> Self {
        self.config_path = Some(path);
        self
    }

    /// Make spawning this service fail with a spawn error
    pub fn with_failing_spawn(mut self, service: &str) -> Self {
        self.failing_spawns.insert(service.to_string());
        self
    }

    /// Make this service's readiness probe fail `attempts` times first
    pub fn with_probe_ready_after(mut self, service: &str, attempts: usize) -> Self {
        self.ready_after.insert(service.to_string(), attempts);
        self
    }

    /// Make this service's probe succeed only for its first `runs` spawns
    /// and hang unready on every later run
    pub fn with_probe_ready_runs(mut self, service: &str, runs: usize) -> Self {
        self.ready_runs.insert(service.to_string(), runs);
        self
    }

    /// Make this service ignore graceful stop signals
    pub fn with_stubborn(self, service: &str) -> Self {
        self.registry.mark_stubborn(service);
        self
    }

    /// Registry handle for scripting and asserting child behaviour
    pub fn registry(&self) -> ChildRegistry {
        self.registry.clone()
    }

    pub fn build(self) -> Supervisor<MockProcessRunner> {
        let mut runner = MockProcessRunner::new();

        {
            let registry = self.registry.clone();
            let failing = self.failing_spawns.clone();
            runner.expect_spawn().returning(move |descriptor| {
                if failing.contains(&descriptor.name) {
                    Err(SupervisorError::spawn(
                        &descriptor.name,
                        std::io::Error::new(std::io::ErrorKind::NotFound, "no such binary"),
                    ))
                } else {
                    Ok(registry.spawn_child(&descriptor.name))
                }
            });
        }

        {
            let registry = self.registry.clone();
            let ready_after = self.ready_after.clone();
            let ready_runs = self.ready_runs.clone();
            let attempts: Arc<Mutex<HashMap<String, usize>>> = Arc::default();
            runner.expect_probe_ready().returning(move |descriptor| {
                if let Some(runs) = ready_runs.get(&descriptor.name) {
                    return Ok(registry.spawn_count(&descriptor.name) <= *runs);
                }
                let mut attempts = attempts.lock().unwrap();
                let seen = attempts.entry(descriptor.name.clone()).or_insert(0);
                *seen += 1;
                let required = ready_after.get(&descriptor.name).copied().unwrap_or(0);
                Ok(*seen > required)
            });
        }

        {
            let registry = self.registry.clone();
            runner.expect_signal().returning(move |pid, signal| {
                registry.record_signal(pid, signal);
                Ok(())
            });
        }

        let settings = SupervisorSettings {
            max_restarts: self.max_restarts,
            shutdown_grace: self.shutdown_grace,
            config_path: self.config_path,
        };
        Supervisor::new(settings, runner)
    }
}

impl Default for SupervisorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Polling assertions over asynchronous supervisor state
pub struct TestHelpers;

impl TestHelpers {
    /// A manual shutdown request with a generous deadline
    pub fn shutdown_request() -> ShutdownRequest {
        ShutdownRequest::new(ShutdownReason::Manual, Duration::from_secs(30))
    }

    /// Wait until the service reaches the expected state
    pub async fn wait_for_state(
        state: &Arc<tokio::sync::Mutex<SupervisorState>>,
        service: &str,
        expected: ProcessState,
    ) {
        Self::wait_until(|| {
            let state = Arc::clone(state);
            let service = service.to_string();
            async move { state.lock().await.service_state(&service) == Some(expected) }
        })
        .await;
    }

    /// Poll a condition until it holds, panicking after a generous deadline.
    /// Paused-clock tests auto-advance through the poll sleeps.
    pub async fn wait_until<F, Fut>(condition: F)
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(60);
        loop {
            if condition().await {
                return;
            }
            if tokio::time::Instant::now() > deadline {
                panic!("condition not reached before deadline");
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}
