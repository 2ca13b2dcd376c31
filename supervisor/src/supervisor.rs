//! Supervisor core
//!
//! Owns the per-service lifecycle state machine: executes the start plan,
//! gates on readiness probes, reacts to child exits with the configured
//! restart policy and exponential backoff, and runs the reverse-order
//! shutdown pass. All state mutation happens here, driven by a single
//! `tokio::select!` event loop.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep, sleep_until, timeout_at, Instant};
use tracing::info;

use shared::{
    service_debug, service_info, service_warn, ExitStatus, ProcessDescriptor, ProcessState,
    RestartPolicy, ShutdownRequest, StopSignal,
};

use crate::core::{backoff, planner, SupervisorState};
use crate::error::{SupervisorError, SupervisorResult};
use crate::services::{DescriptorStore, SupervisorConfig};
use crate::shutdown::ControlEvent;
use crate::traits::ProcessRunner;

/// How often a readiness probe is retried while a service is Starting
const READINESS_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// How long a force-killed child gets to be reaped before we give up waiting
const FORCE_KILL_WAIT: Duration = Duration::from_secs(5);

/// Global tunables extracted from the configuration document
#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    /// Consecutive failed runs before a service is parked in FailedRestart
    pub max_restarts: u32,
    /// Budget for a full shutdown pass
    pub shutdown_grace: Duration,
    /// Where to re-read configuration from on reload
    pub config_path: Option<PathBuf>,
}

impl SupervisorSettings {
    pub fn from_config(config: &SupervisorConfig) -> Self {
        Self {
            max_restarts: config.max_restarts,
            shutdown_grace: config.shutdown_grace(),
            config_path: None,
        }
    }

    /// Configure the reload source (fluent API)
    pub fn with_config_path(mut self, path: PathBuf) -> Self {
        self.config_path = Some(path);
        self
    }
}

/// Outcome of a completed supervisor run
#[derive(Debug)]
pub struct RunSummary {
    /// Services that ended in FailedRestart
    pub failed_services: Vec<String>,
}

impl RunSummary {
    /// Shutdown was orderly but at least one service exhausted its restarts
    pub fn degraded(&self) -> bool {
        !self.failed_services.is_empty()
    }
}

/// Internal events driving the run loop
#[derive(Debug)]
enum SupervisorEvent {
    Exited { service: String, status: ExitStatus },
    RestartDue { service: String },
}

enum ReadinessOutcome {
    Ready,
    Died,
    TimedOut,
}

/// A launched child still waiting on its readiness probe
struct ReadinessGate {
    descriptor: Arc<ProcessDescriptor>,
    pid: u32,
    exit_rx: watch::Receiver<Option<ExitStatus>>,
}

/// Supervisor over a set of managed services
pub struct Supervisor<R: ProcessRunner + 'static> {
    settings: SupervisorSettings,
    runner: Arc<R>,

    /// Single mutual-exclusion domain for all instance state
    state: Arc<Mutex<SupervisorState>>,

    /// Child exit and restart-timer events
    events_tx: mpsc::Sender<SupervisorEvent>,
    events_rx: mpsc::Receiver<SupervisorEvent>,

    /// Shutdown/reload requests from the coordinator
    control_tx: mpsc::Sender<ControlEvent>,
    control_rx: mpsc::Receiver<ControlEvent>,

    /// In-flight backoff timers, aborted when a shutdown is triggered
    restart_timers: HashMap<String, JoinHandle<()>>,
}

impl<R: ProcessRunner + 'static> Supervisor<R> {
    pub fn new(settings: SupervisorSettings, runner: R) -> Self {
        let (events_tx, events_rx) = mpsc::channel(64);
        let (control_tx, control_rx) = mpsc::channel(4);

        Self {
            settings,
            runner: Arc::new(runner),
            state: Arc::new(Mutex::new(SupervisorState::new())),
            events_tx,
            events_rx,
            control_tx,
            control_rx,
            restart_timers: HashMap::new(),
        }
    }

    /// Sender the shutdown coordinator (or a test) feeds control events into
    pub fn control_sender(&self) -> mpsc::Sender<ControlEvent> {
        self.control_tx.clone()
    }

    /// Handle for observing instance state from outside the run loop
    pub fn state_handle(&self) -> Arc<Mutex<SupervisorState>> {
        Arc::clone(&self.state)
    }

    pub async fn service_state(&self, name: &str) -> Option<ProcessState> {
        self.state.lock().await.service_state(name)
    }

    /// Plan and execute startup of the full descriptor set
    ///
    /// A service that fails to spawn is reported and parked; it never aborts
    /// startup of the remaining plan.
    pub async fn start_all(&mut self, descriptors: Vec<ProcessDescriptor>) -> SupervisorResult<()> {
        let descriptors: Vec<Arc<ProcessDescriptor>> =
            descriptors.into_iter().map(Arc::new).collect();
        let order = planner::plan(&descriptors)?;

        {
            let mut state = self.state.lock().await;
            for descriptor in &order {
                state.insert(Arc::clone(descriptor));
            }
        }

        info!("Starting {} services", order.len());
        for descriptor in order {
            if let Err(e) = self.start_service(&descriptor.name).await {
                shared::logging::log_error(&format!("Startup of '{}'", descriptor.name), &e);
            }
        }
        Ok(())
    }

    /// Spawn one service and gate on its readiness probe
    async fn start_service(&self, name: &str) -> SupervisorResult<()> {
        match self.launch_service(name).await? {
            Some(gate) => {
                Self::settle_readiness(Arc::clone(&self.runner), Arc::clone(&self.state), gate)
                    .await
            }
            None => Ok(()),
        }
    }

    /// Spawn one service and register its exit bridge, without waiting for
    /// readiness. Returns `None` when the service is already live.
    async fn launch_service(&self, name: &str) -> SupervisorResult<Option<ReadinessGate>> {
        let descriptor = {
            let mut state = self.state.lock().await;
            let instance = state
                .get_mut(name)
                .ok_or_else(|| SupervisorError::UnknownService {
                    service: name.to_string(),
                })?;
            // One live OS process per name
            if instance.is_live() {
                return Ok(None);
            }
            Arc::clone(&instance.descriptor)
        };

        let spawned = match self.runner.spawn(&descriptor).await {
            Ok(child) => child,
            Err(e) => {
                let mut state = self.state.lock().await;
                if let Some(instance) = state.get_mut(name) {
                    instance.mark_failed();
                }
                return Err(e);
            }
        };

        let pid = spawned.pid;
        let exit_rx = spawned.exit;
        {
            let mut state = self.state.lock().await;
            if let Some(instance) = state.get_mut(name) {
                instance.mark_starting(pid, exit_rx.clone());
            }
        }
        service_debug!(name, "Spawned (pid {})", pid);

        self.bridge_exit_events(name, exit_rx.clone());

        Ok(Some(ReadinessGate {
            descriptor,
            pid,
            exit_rx,
        }))
    }

    /// Wait out the readiness probe of a freshly launched service and apply
    /// the resulting state transition
    async fn settle_readiness(
        runner: Arc<R>,
        state: Arc<Mutex<SupervisorState>>,
        gate: ReadinessGate,
    ) -> SupervisorResult<()> {
        let ReadinessGate {
            descriptor,
            pid,
            mut exit_rx,
        } = gate;
        let name = descriptor.name.as_str();

        match Self::await_readiness(runner.as_ref(), &descriptor, &mut exit_rx).await {
            ReadinessOutcome::Ready => {
                let mut state = state.lock().await;
                if let Some(instance) = state.get_mut(name) {
                    if instance.state == ProcessState::Starting {
                        instance.mark_running();
                        service_info!(name, "Running (pid {})", pid);
                    }
                }
                Ok(())
            }
            ReadinessOutcome::Died => {
                // The exit event applies the restart policy
                service_warn!(name, "Exited during startup");
                Ok(())
            }
            ReadinessOutcome::TimedOut => {
                let timeout = descriptor.readiness_timeout();
                let _ = runner.signal(pid, StopSignal::Kill).await;
                Err(SupervisorError::ReadinessTimeout {
                    service: name.to_string(),
                    timeout,
                })
            }
        }
    }

    /// Forward the one-shot exit notification into the event loop
    fn bridge_exit_events(&self, name: &str, mut exit_rx: watch::Receiver<Option<ExitStatus>>) {
        let events_tx = self.events_tx.clone();
        let service = name.to_string();
        tokio::spawn(async move {
            loop {
                let current = *exit_rx.borrow_and_update();
                if let Some(status) = current {
                    let _ = events_tx
                        .send(SupervisorEvent::Exited { service, status })
                        .await;
                    return;
                }
                if exit_rx.changed().await.is_err() {
                    return;
                }
            }
        });
    }

    async fn await_readiness(
        runner: &R,
        descriptor: &ProcessDescriptor,
        exit_rx: &mut watch::Receiver<Option<ExitStatus>>,
    ) -> ReadinessOutcome {
        if descriptor.readiness_probe.is_none() {
            return ReadinessOutcome::Ready;
        }

        let deadline = Instant::now() + descriptor.readiness_timeout();
        loop {
            if exit_rx.borrow_and_update().is_some() {
                return ReadinessOutcome::Died;
            }

            match runner.probe_ready(descriptor).await {
                Ok(true) => return ReadinessOutcome::Ready,
                Ok(false) => {}
                Err(e) => service_debug!(descriptor.name, "Readiness probe error: {}", e),
            }

            if Instant::now() >= deadline {
                return ReadinessOutcome::TimedOut;
            }
            let next_poll = (Instant::now() + READINESS_POLL_INTERVAL).min(deadline);
            tokio::select! {
                _ = sleep_until(next_poll) => {}
                changed = exit_rx.changed() => {
                    if changed.is_err() || exit_rx.borrow().is_some() {
                        return ReadinessOutcome::Died;
                    }
                }
            }
        }
    }

    /// Main event loop: monitors children until a shutdown request arrives
    pub async fn run(&mut self) -> SupervisorResult<RunSummary> {
        loop {
            tokio::select! {
                Some(event) = self.events_rx.recv() => match event {
                    SupervisorEvent::Exited { service, status } => {
                        self.handle_exit(service, status).await;
                    }
                    SupervisorEvent::RestartDue { service } => {
                        self.restart_timers.remove(&service);
                        if self.state.lock().await.restarts_disabled() {
                            continue;
                        }
                        service_info!(service, "Restart attempt");
                        // Readiness gating runs detached so a slow probe
                        // cannot stall the monitor loop
                        match self.launch_service(&service).await {
                            Ok(Some(gate)) => {
                                let runner = Arc::clone(&self.runner);
                                let state = Arc::clone(&self.state);
                                tokio::spawn(async move {
                                    if let Err(e) =
                                        Self::settle_readiness(runner, state, gate).await
                                    {
                                        shared::logging::log_error(
                                            &format!("Restart of '{service}'"),
                                            &e,
                                        );
                                    }
                                });
                            }
                            Ok(None) => {}
                            Err(e) => {
                                shared::logging::log_error(
                                    &format!("Restart of '{service}'"),
                                    &e,
                                );
                            }
                        }
                    }
                },
                Some(event) = self.control_rx.recv() => match event {
                    ControlEvent::Shutdown(request) => {
                        self.execute_shutdown(request).await;
                        break;
                    }
                    ControlEvent::Reload => {
                        if let Err(e) = self.reload().await {
                            shared::logging::log_error("Reload", &e);
                        }
                    }
                },
            }
        }

        let failed_services = self.state.lock().await.failed_services();
        Ok(RunSummary { failed_services })
    }

    /// Apply the restart policy to an exit event
    async fn handle_exit(&mut self, service: String, status: ExitStatus) {
        let restart_in = {
            let mut state = self.state.lock().await;
            let restarts_disabled = state.restarts_disabled();
            let Some(instance) = state.get_mut(&service) else {
                return;
            };

            match instance.state {
                ProcessState::Stopping => {
                    instance.mark_exited(status);
                    service_info!(service, "Stopped ({})", status);
                    None
                }
                ProcessState::Starting | ProcessState::Running => {
                    // A stable run clears the consecutive-failure streak
                    if instance
                        .uptime()
                        .is_some_and(|uptime| uptime >= backoff::STABLE_UPTIME)
                    {
                        instance.restart_count = 0;
                    }
                    instance.mark_exited(status);
                    service_warn!(service, "Exited unexpectedly ({})", status);

                    let wants_restart = match instance.descriptor.restart {
                        RestartPolicy::Always => true,
                        RestartPolicy::OnFailure => !status.success(),
                        RestartPolicy::Never => false,
                    };

                    if !wants_restart {
                        service_debug!(service, "No restart per policy");
                        None
                    } else if restarts_disabled {
                        service_debug!(service, "Restart suppressed during shutdown");
                        None
                    } else {
                        instance.restart_count += 1;
                        if instance.restart_count >= self.settings.max_restarts {
                            let attempts = instance.restart_count;
                            instance.mark_failed();
                            let err = SupervisorError::RestartExhausted {
                                service: service.clone(),
                                attempts,
                            };
                            shared::logging::log_error("Restart policy", &err);
                            None
                        } else {
                            Some(backoff::restart_delay(instance.restart_count))
                        }
                    }
                }
                // Late or duplicate exit notification
                _ => None,
            }
        };

        if let Some(delay) = restart_in {
            self.schedule_restart(service, delay);
        }
    }

    fn schedule_restart(&mut self, service: String, delay: Duration) {
        service_info!(service, "Restarting in {:?}", delay);
        let events_tx = self.events_tx.clone();
        let name = service.clone();
        let handle = tokio::spawn(async move {
            sleep(delay).await;
            let _ = events_tx
                .send(SupervisorEvent::RestartDue { service: name })
                .await;
        });
        if let Some(previous) = self.restart_timers.insert(service, handle) {
            previous.abort();
        }
    }

    /// Stop everything in reverse start order within the request's deadline
    async fn execute_shutdown(&mut self, request: ShutdownRequest) {
        {
            let mut state = self.state.lock().await;
            if !state.begin_shutdown() {
                service_debug!("supervisor", "Shutdown already in progress");
                return;
            }
        }

        // Cancel pending backoff timers before any stop is issued
        for (_, handle) in self.restart_timers.drain() {
            handle.abort();
        }

        let stop_order = self.state.lock().await.stop_order();
        info!(
            "Stopping {} services ({} requested)",
            stop_order.len(),
            request.reason
        );

        for service in stop_order {
            if let Err(e) = self.stop_service(&service, request.deadline).await {
                shared::logging::log_error("Graceful stop", &e);
            }
        }

        shared::logging::log_success("All services stopped");
    }

    /// Gracefully stop one service, force-killing it past its deadline
    ///
    /// Idempotent: stopping an instance that is not live succeeds without
    /// doing anything.
    pub async fn stop_service(
        &self,
        name: &str,
        global_deadline: Instant,
    ) -> SupervisorResult<()> {
        let (pid, mut exit_rx, stop_signal, stop_timeout) = {
            let mut state = self.state.lock().await;
            let Some(instance) = state.get_mut(name) else {
                return Err(SupervisorError::UnknownService {
                    service: name.to_string(),
                });
            };
            if !instance.is_live() {
                return Ok(());
            }
            let (Some(pid), Some(exit_rx)) = (instance.pid, instance.exit_rx.clone()) else {
                return Ok(());
            };
            instance.mark_stopping();
            (
                pid,
                exit_rx,
                instance.descriptor.stop_signal,
                instance.descriptor.stop_timeout(),
            )
        };

        service_info!(name, "Stopping with {}", stop_signal);
        self.runner.signal(pid, stop_signal).await?;

        let deadline = (Instant::now() + stop_timeout).min(global_deadline);
        let (status, forced) = match wait_for_exit(&mut exit_rx, deadline).await {
            Some(status) => (status, false),
            None => {
                service_warn!(name, "Ignored {}; force-killing", stop_signal);
                let _ = self.runner.signal(pid, StopSignal::Kill).await;
                let status = wait_for_exit(&mut exit_rx, Instant::now() + FORCE_KILL_WAIT)
                    .await
                    .unwrap_or(ExitStatus::from_signal(StopSignal::Kill.as_raw()));
                (status, true)
            }
        };

        {
            let mut state = self.state.lock().await;
            if let Some(instance) = state.get_mut(name) {
                instance.mark_exited(status);
            }
        }

        if forced {
            return Err(SupervisorError::ShutdownTimeout {
                service: name.to_string(),
                signal: stop_signal,
                timeout: stop_timeout,
            });
        }
        service_info!(name, "Stopped ({})", status);
        Ok(())
    }

    /// Re-read configuration and reconcile: start new services, leave
    /// running ones untouched, warn about removed ones
    async fn reload(&mut self) -> SupervisorResult<()> {
        let Some(path) = self.settings.config_path.clone() else {
            return Err(SupervisorError::config(
                "no configuration path to reload from",
            ));
        };
        let config = DescriptorStore::load(&path)?;
        let incoming: Vec<Arc<ProcessDescriptor>> =
            config.services.into_iter().map(Arc::new).collect();

        let (added, removed) = {
            let state = self.state.lock().await;
            let incoming_names: HashSet<&str> =
                incoming.iter().map(|d| d.name.as_str()).collect();
            let added: Vec<Arc<ProcessDescriptor>> = incoming
                .iter()
                .filter(|d| !state.contains(&d.name))
                .cloned()
                .collect();
            let removed: Vec<String> = state
                .start_order()
                .iter()
                .filter(|name| !incoming_names.contains(name.as_str()))
                .cloned()
                .collect();
            (added, removed)
        };

        for name in removed {
            service_warn!(name, "Dropped from configuration; left running");
        }

        if added.is_empty() {
            info!("Reload complete; no new services");
            return Ok(());
        }

        let order = planner::plan(&added)?;
        {
            let mut state = self.state.lock().await;
            for descriptor in &order {
                state.insert(Arc::clone(descriptor));
            }
        }
        for descriptor in order {
            if let Err(e) = self.start_service(&descriptor.name).await {
                shared::logging::log_error(&format!("Startup of '{}'", descriptor.name), &e);
            }
        }
        Ok(())
    }
}

async fn wait_for_exit(
    rx: &mut watch::Receiver<Option<ExitStatus>>,
    deadline: Instant,
) -> Option<ExitStatus> {
    timeout_at(deadline, async {
        loop {
            if let Some(status) = *rx.borrow_and_update() {
                return Some(status);
            }
            if rx.changed().await.is_err() {
                return None;
            }
        }
    })
    .await
    .ok()
    .flatten()
}
