//! Real process boundary implementation
//!
//! Spawns managed services as OS child processes with their declared
//! environment and working directory, registers their output with the log
//! multiplexer, and bridges OS exit notification into a watch channel the
//! supervisor core consumes. Signals are delivered by pid so a graceful stop
//! can use the descriptor's configured signal rather than a hard kill.

use async_trait::async_trait;
use shared::{service_debug, ExitStatus, ProcessDescriptor, StopSignal};
use std::process::Stdio;
use tokio::process::Command;
use tokio::sync::watch;

use crate::error::{SupervisorError, SupervisorResult};
use crate::services::log_multiplexer::LogMultiplexer;
use crate::traits::{ProcessRunner, SpawnedChild};

/// Production process runner backed by tokio::process
pub struct RealProcessRunner {
    multiplexer: LogMultiplexer,
}

impl RealProcessRunner {
    pub fn new(multiplexer: LogMultiplexer) -> Self {
        Self { multiplexer }
    }

    fn map_exit(status: std::process::ExitStatus) -> ExitStatus {
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return ExitStatus::from_signal(signal);
            }
        }
        ExitStatus {
            code: status.code(),
            signal: None,
        }
    }

    #[cfg(unix)]
    fn nix_signal(signal: StopSignal) -> nix::sys::signal::Signal {
        use nix::sys::signal::Signal;
        match signal {
            StopSignal::Term => Signal::SIGTERM,
            StopSignal::Int => Signal::SIGINT,
            StopSignal::Quit => Signal::SIGQUIT,
            StopSignal::Hup => Signal::SIGHUP,
            StopSignal::Usr1 => Signal::SIGUSR1,
            StopSignal::Usr2 => Signal::SIGUSR2,
            StopSignal::Kill => Signal::SIGKILL,
        }
    }
}

#[async_trait]
impl ProcessRunner for RealProcessRunner {
    async fn spawn(&self, descriptor: &ProcessDescriptor) -> SupervisorResult<SpawnedChild> {
        let mut cmd = Command::new(&descriptor.command);
        cmd.args(&descriptor.args)
            .envs(&descriptor.environment)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(Stdio::null());
        if let Some(dir) = &descriptor.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| SupervisorError::spawn(&descriptor.name, e))?;
        // The child has not been awaited yet, so its id must still exist
        let Some(pid) = child.id() else {
            return Err(SupervisorError::spawn(
                &descriptor.name,
                std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "child exited before its pid was captured",
                ),
            ));
        };

        self.multiplexer
            .attach(&descriptor.name, child.stdout.take(), child.stderr.take());

        let (exit_tx, exit_rx) = watch::channel(None);
        let service = descriptor.name.clone();
        tokio::spawn(async move {
            let status = match child.wait().await {
                Ok(status) => Self::map_exit(status),
                Err(e) => {
                    service_debug!(service, "wait failed: {}", e);
                    ExitStatus {
                        code: None,
                        signal: None,
                    }
                }
            };
            let _ = exit_tx.send(Some(status));
        });

        Ok(SpawnedChild { pid, exit: exit_rx })
    }

    async fn probe_ready(&self, descriptor: &ProcessDescriptor) -> SupervisorResult<bool> {
        let Some(probe) = &descriptor.readiness_probe else {
            return Ok(true);
        };
        let Some((program, args)) = probe.split_first() else {
            return Ok(true);
        };

        let status = Command::new(program)
            .args(args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .stdin(Stdio::null())
            .status()
            .await;

        match status {
            Ok(status) => Ok(status.success()),
            Err(e) => {
                service_debug!(descriptor.name, "readiness probe failed to run: {}", e);
                Ok(false)
            }
        }
    }

    async fn signal(&self, pid: u32, signal: StopSignal) -> SupervisorResult<()> {
        #[cfg(unix)]
        {
            use nix::errno::Errno;
            use nix::sys::signal::kill;
            use nix::unistd::Pid;

            match kill(Pid::from_raw(pid as i32), Self::nix_signal(signal)) {
                Ok(()) => Ok(()),
                // Already gone: signalling a dead process is a no-op
                Err(Errno::ESRCH) => Ok(()),
                Err(errno) => Err(SupervisorError::IoError(std::io::Error::from_raw_os_error(
                    errno as i32,
                ))),
            }
        }
        #[cfg(not(unix))]
        {
            let _ = (pid, signal);
            Err(SupervisorError::config(
                "signal delivery is only supported on unix",
            ))
        }
    }
}
