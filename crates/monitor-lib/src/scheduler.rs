//! Polling cycle scheduler
//!
//! Runs gather → decide → act, then sleeps for the poll interval. Cycles
//! never overlap. A failed snapshot aborts the current cycle only.

use crate::engine::IdleDecisionEngine;
use crate::executor::{ActionExecutor, ActionOutcome};
use crate::health::{components, HealthRegistry};
use crate::models::{MonitorSettings, ProcessInfo};
use crate::observability::{MonitorMetrics, StructuredLogger};
use crate::sources::{
    parse_compute_apps, AcceleratorSource, ContainerSource, NoContainers, ProcessSource, Signaller,
};
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Counters for one completed cycle
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// Accelerator records in the snapshot
    pub records: usize,
    /// Decisions produced (targeted processes)
    pub decisions: usize,
    pub warned: usize,
    pub terminated: usize,
    pub termination_failures: usize,
    pub lookup_failures: usize,
}

/// Drives the decision engine at a fixed interval
pub struct CycleScheduler {
    settings: Arc<MonitorSettings>,
    engine: IdleDecisionEngine,
    accelerator: Arc<dyn AcceleratorSource>,
    processes: Arc<dyn ProcessSource>,
    containers: Arc<dyn ContainerSource>,
    executor: ActionExecutor,
    logger: StructuredLogger,
    metrics: MonitorMetrics,
    health: HealthRegistry,
}

impl CycleScheduler {
    /// Run cycles until a shutdown message arrives.
    ///
    /// An in-flight cycle is abandoned on shutdown.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.settings.poll_interval.as_secs(),
            "Starting GPU idle monitor loop"
        );
        self.health.set_healthy(components::SCHEDULER).await;

        let mut cycle_count = 0u64;

        loop {
            tokio::select! {
                result = self.run_cycle() => {
                    cycle_count += 1;
                    match result {
                        Ok(report) => debug!(
                            cycle = cycle_count,
                            records = report.records,
                            decisions = report.decisions,
                            warned = report.warned,
                            terminated = report.terminated,
                            failures = report.termination_failures + report.lookup_failures,
                            "Cycle complete"
                        ),
                        Err(e) => {
                            let reason = format!("{e:#}");
                            error!(cycle = cycle_count, error = %reason, "Cycle aborted");
                        }
                    }
                }
                _ = shutdown.recv() => break,
            }

            tokio::select! {
                _ = tokio::time::sleep(self.settings.poll_interval) => {}
                _ = shutdown.recv() => break,
            }
        }

        info!(cycles = cycle_count, "Shutting down GPU idle monitor loop");
        self.health
            .set_unhealthy(components::SCHEDULER, "monitor loop stopped")
            .await;
    }

    /// Perform one full cycle
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let start = Instant::now();
        self.metrics.inc_cycles();

        let result = self.cycle_inner().await;

        self.metrics
            .observe_cycle_latency(start.elapsed().as_secs_f64());
        match &result {
            Ok(_) => self.health.record_cycle().await,
            Err(_) => self.metrics.inc_cycle_failures(),
        }

        result
    }

    async fn cycle_inner(&self) -> Result<CycleReport> {
        let snapshot = match self.accelerator.raw_snapshot().await {
            Ok(lines) => {
                self.health.set_healthy(components::ACCELERATOR_SOURCE).await;
                lines
            }
            Err(e) => {
                self.health
                    .set_degraded(components::ACCELERATOR_SOURCE, e.to_string())
                    .await;
                return Err(e).context("Failed to query GPU processes");
            }
        };

        self.logger.log_snapshot(&snapshot);
        let records = parse_compute_apps(&snapshot.join("\n"));
        self.metrics.set_accelerator_processes(records.len() as i64);

        let mut report = CycleReport {
            records: records.len(),
            ..Default::default()
        };
        if records.is_empty() {
            return Ok(report);
        }

        // No partial bindings: a failed listing aborts the cycle
        let bindings = if self.settings.docker_enabled {
            match self.containers.list_bindings().await {
                Ok(bindings) => {
                    self.health.set_healthy(components::CONTAINER_SOURCE).await;
                    bindings
                }
                Err(e) => {
                    self.health
                        .set_degraded(components::CONTAINER_SOURCE, e.to_string())
                        .await;
                    return Err(e).context("Failed to get Docker container list");
                }
            }
        } else {
            Vec::new()
        };

        let mut infos: HashMap<u32, ProcessInfo> = HashMap::with_capacity(records.len());
        for record in &records {
            match self.processes.process_info(record.pid).await {
                Ok(Some(info)) => {
                    infos.insert(record.pid, info);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(pid = record.pid, error = %e, "Failed to get process info");
                    self.metrics.inc_lookup_failures();
                    report.lookup_failures += 1;
                }
            }
        }

        let now = chrono::Utc::now();
        let decisions = self
            .engine
            .evaluate(&records, |pid| infos.get(&pid).cloned(), &bindings, now);
        report.decisions = decisions.len();

        for decision in &decisions {
            match self.executor.execute(decision).await {
                ActionOutcome::NoAction => {}
                ActionOutcome::Warned => report.warned += 1,
                ActionOutcome::Terminated => report.terminated += 1,
                ActionOutcome::TerminationFailed(_) => report.termination_failures += 1,
            }
        }

        Ok(report)
    }
}

/// Builder for the cycle scheduler
pub struct CycleSchedulerBuilder {
    settings: Arc<MonitorSettings>,
    accelerator: Option<Arc<dyn AcceleratorSource>>,
    processes: Option<Arc<dyn ProcessSource>>,
    containers: Option<Arc<dyn ContainerSource>>,
    signaller: Option<Arc<dyn Signaller>>,
    logger: Option<StructuredLogger>,
    health: HealthRegistry,
}

impl CycleSchedulerBuilder {
    pub fn new(settings: Arc<MonitorSettings>) -> Self {
        Self {
            settings,
            accelerator: None,
            processes: None,
            containers: None,
            signaller: None,
            logger: None,
            health: HealthRegistry::new(),
        }
    }

    pub fn accelerator(mut self, source: Arc<dyn AcceleratorSource>) -> Self {
        self.accelerator = Some(source);
        self
    }

    pub fn processes(mut self, source: Arc<dyn ProcessSource>) -> Self {
        self.processes = Some(source);
        self
    }

    /// Required when container tracking is enabled
    pub fn containers(mut self, source: Arc<dyn ContainerSource>) -> Self {
        self.containers = Some(source);
        self
    }

    pub fn signaller(mut self, signaller: Arc<dyn Signaller>) -> Self {
        self.signaller = Some(signaller);
        self
    }

    pub fn logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Share a health registry with the HTTP endpoint
    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = health;
        self
    }

    pub fn build(self) -> Result<CycleScheduler> {
        let accelerator = self
            .accelerator
            .ok_or_else(|| anyhow::anyhow!("Accelerator source is required"))?;
        let processes = self
            .processes
            .ok_or_else(|| anyhow::anyhow!("Process source is required"))?;
        let signaller = self
            .signaller
            .ok_or_else(|| anyhow::anyhow!("Signaller is required"))?;
        let containers: Arc<dyn ContainerSource> = match self.containers {
            Some(containers) => containers,
            None if self.settings.docker_enabled => {
                anyhow::bail!("Container source is required when container tracking is enabled")
            }
            None => Arc::new(NoContainers),
        };

        let logger = self
            .logger
            .unwrap_or_else(|| StructuredLogger::new("localhost"));
        let metrics = MonitorMetrics::new();
        let executor = ActionExecutor::new(
            signaller,
            logger.clone(),
            metrics.clone(),
            self.settings.idle_time_threshold_secs,
        );

        Ok(CycleScheduler {
            engine: IdleDecisionEngine::new(self.settings.clone()),
            settings: self.settings,
            accelerator,
            processes,
            containers,
            executor,
            logger,
            metrics,
            health: self.health,
        })
    }
}
