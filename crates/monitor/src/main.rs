//! GPU idle monitor
//!
//! Runs on a shared GPU host, periodically inspecting compute processes and
//! warning about or terminating the ones that sit idle past the threshold.

use anyhow::{Context, Result};
use clap::Parser;
use gpu_idle_monitor::{api, config, logging};
use monitor_lib::{
    health::{components, HealthRegistry},
    logfile,
    sources::{DockerCli, NvidiaSmi, PsProcessSource, SigtermSignaller},
    CycleSchedulerBuilder, StructuredLogger,
};
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

const MONITOR_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    let cli = config::Cli::parse();
    let config = config::MonitorConfig::load(&cli)?;
    let settings = Arc::new(config.settings());

    // Rotation must happen before the sink is opened
    let prep = logfile::prepare_log_sink(&config.log_file, logfile::DEFAULT_RETENTION);
    let _log_guard = logging::init(&config.log_file, config.json_logs)?;

    for problem in &prep.errors {
        warn!(error = %problem, "Log rotation incomplete");
    }
    if let Some(rotated) = &prep.rotated_to {
        info!(path = %rotated.display(), "Rotated previous log file");
    }
    for pruned in &prep.pruned {
        info!(path = %pruned.display(), "Removed expired log file");
    }

    let logger = StructuredLogger::new(host_name());
    logger.log_startup(
        MONITOR_VERSION,
        &settings,
        &config.log_file.display().to_string(),
    );

    let health = HealthRegistry::new();
    health.register(components::ACCELERATOR_SOURCE).await;
    health.register(components::SCHEDULER).await;

    let timeout = settings.command_timeout;
    let mut builder = CycleSchedulerBuilder::new(settings.clone())
        .accelerator(Arc::new(NvidiaSmi::new(timeout)))
        .processes(Arc::new(PsProcessSource::new(timeout)))
        .signaller(Arc::new(SigtermSignaller))
        .logger(logger.clone())
        .health(health.clone());

    if settings.docker_enabled {
        let docker = match DockerCli::connect(timeout).await {
            Ok(docker) => docker,
            Err(e) => {
                error!(error = %e, "Failed to initialize Docker client");
                return Err(e).context("Failed to initialize Docker client");
            }
        };
        health.register(components::CONTAINER_SOURCE).await;
        builder = builder.containers(Arc::new(docker));
    }

    let scheduler = builder.build()?;

    if let Some(port) = config.api_port {
        let state = Arc::new(api::AppState::new(health.clone()));
        tokio::spawn(async move {
            if let Err(e) = api::serve(port, state).await {
                error!(error = %e, "API server stopped");
            }
        });
    }

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let monitor_handle = tokio::spawn(scheduler.run(shutdown_rx));

    let reason = wait_for_shutdown().await?;
    logger.log_shutdown(reason);

    // Receiver is gone only if the loop already exited
    let _ = shutdown_tx.send(());
    if let Err(e) = monitor_handle.await {
        error!(error = %e, "Monitor loop panicked");
    }

    Ok(())
}

/// Resolve on SIGINT or SIGTERM
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for SIGINT")?;
            Ok("SIGINT received")
        }
        _ = sigterm.recv() => Ok("SIGTERM received"),
    }
}

fn host_name() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .or_else(|| std::fs::read_to_string("/etc/hostname").ok())
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}
