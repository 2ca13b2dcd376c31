//! Main entry point for the supervisor binary
//!
//! Wires the real service implementations together: configuration loading,
//! the log multiplexer, the OS process runner, and the signal-driven shutdown
//! coordinator around the supervisor core.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use shared::logging;
use supervisor::services::{DescriptorStore, LogMultiplexer, RealProcessRunner, TracingLogSink};
use supervisor::shutdown::ShutdownCoordinator;
use supervisor::{Supervisor, SupervisorSettings};

/// Minimal init-style supervisor for in-container system daemons
#[derive(Parser)]
#[command(name = "supervisor")]
#[command(about = "Starts and supervises a configured set of system services")]
pub struct Args {
    /// Path to the services configuration file
    #[arg(long, default_value = "/etc/supervisor/services.json")]
    pub config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Validate the configuration and exit without starting anything
    #[arg(long)]
    pub check: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    logging::init_tracing(Some(&args.log_level));

    let config = match DescriptorStore::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            logging::log_error("Configuration", &e);
            return ExitCode::from(1);
        }
    };

    if args.check {
        logging::log_success(&format!(
            "Configuration OK ({} services)",
            config.services.len()
        ));
        return ExitCode::SUCCESS;
    }

    logging::log_startup(&format!("supervisor ({} services)", config.services.len()));

    let settings =
        SupervisorSettings::from_config(&config).with_config_path(args.config.clone());
    let shutdown_grace = settings.shutdown_grace;

    let multiplexer = LogMultiplexer::new(Arc::new(TracingLogSink));
    let runner = RealProcessRunner::new(multiplexer.clone());
    let mut supervisor = Supervisor::new(settings, runner);

    ShutdownCoordinator::spawn(supervisor.control_sender(), shutdown_grace);

    if let Err(e) = supervisor.start_all(config.services).await {
        logging::log_error("Startup", &e);
        return ExitCode::from(1);
    }

    match supervisor.run().await {
        Ok(summary) => {
            let dropped = multiplexer.dropped_lines();
            if dropped > 0 {
                tracing::warn!("{dropped} child log lines were dropped under backpressure");
            }
            if summary.degraded() {
                tracing::warn!(
                    "Exiting degraded; failed services: {}",
                    summary.failed_services.join(", ")
                );
                ExitCode::from(2)
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            logging::log_error("Supervisor run", &e);
            ExitCode::from(1)
        }
    }
}
