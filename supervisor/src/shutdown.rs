//! Signal and shutdown coordination
//!
//! Encapsulates process-wide signal handling: the rest of the system only
//! ever observes `ControlEvent` values, never raw signal numbers. SIGTERM
//! and SIGINT become a `ShutdownRequest` with an absolute deadline; SIGHUP
//! becomes a reload request. A second termination signal while a shutdown is
//! already in flight is suppressed at the source.

use shared::{ShutdownReason, ShutdownRequest};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Event delivered from the coordinator to the supervisor run loop
#[derive(Debug)]
pub enum ControlEvent {
    Shutdown(ShutdownRequest),
    Reload,
}

/// Listens for OS signals and feeds the supervisor's control channel
pub struct ShutdownCoordinator;

impl ShutdownCoordinator {
    /// Spawn the signal listener task
    ///
    /// `grace` is the global budget for a full shutdown pass; the emitted
    /// request carries `now + grace` as its absolute deadline.
    pub fn spawn(control_tx: mpsc::Sender<ControlEvent>, grace: Duration) {
        tokio::spawn(async move {
            Self::listen(control_tx, grace).await;
        });
    }

    #[cfg(unix)]
    async fn listen(control_tx: mpsc::Sender<ControlEvent>, grace: Duration) {
        use tokio::signal::unix::{signal, SignalKind};

        let mut term = match signal(SignalKind::terminate()) {
            Ok(stream) => stream,
            Err(e) => {
                shared::logging::log_error("SIGTERM handler setup", &e);
                return;
            }
        };
        let mut interrupt = match signal(SignalKind::interrupt()) {
            Ok(stream) => stream,
            Err(e) => {
                shared::logging::log_error("SIGINT handler setup", &e);
                return;
            }
        };
        let mut hangup = match signal(SignalKind::hangup()) {
            Ok(stream) => stream,
            Err(e) => {
                shared::logging::log_error("SIGHUP handler setup", &e);
                return;
            }
        };

        let mut shutdown_sent = false;
        loop {
            let event = tokio::select! {
                _ = term.recv() => Some(ShutdownReason::Term),
                _ = interrupt.recv() => Some(ShutdownReason::Interrupt),
                _ = hangup.recv() => None,
            };

            let event = match event {
                Some(reason) => {
                    if shutdown_sent {
                        debug!("Ignoring {reason}: shutdown already in progress");
                        continue;
                    }
                    shutdown_sent = true;
                    shared::logging::log_shutdown(&reason.to_string());
                    ControlEvent::Shutdown(ShutdownRequest::new(reason, grace))
                }
                None => {
                    if shutdown_sent {
                        debug!("Ignoring SIGHUP: shutdown already in progress");
                        continue;
                    }
                    ControlEvent::Reload
                }
            };

            if control_tx.send(event).await.is_err() {
                warn!("Control channel closed; signal listener exiting");
                return;
            }
        }
    }

    #[cfg(not(unix))]
    async fn listen(control_tx: mpsc::Sender<ControlEvent>, grace: Duration) {
        if tokio::signal::ctrl_c().await.is_ok() {
            shared::logging::log_shutdown(&ShutdownReason::Interrupt.to_string());
            let _ = control_tx
                .send(ControlEvent::Shutdown(ShutdownRequest::new(
                    ShutdownReason::Interrupt,
                    grace,
                )))
                .await;
        }
    }
}
