//! Observability infrastructure for the idle monitor
//!
//! Provides:
//! - Prometheus metrics (cycle latency, visible processes, actions taken, failures)
//! - Structured logging of warnings and terminations with tracing

use crate::models::{Decision, MonitorSettings};
use prometheus::{register_histogram, register_int_counter, register_int_gauge, Histogram, IntCounter, IntGauge};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for cycle latency (in seconds); cycles shell out per PID
const CYCLE_LATENCY_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<MonitorMetricsInner> = OnceLock::new();

struct MonitorMetricsInner {
    cycle_latency_seconds: Histogram,
    cycles: IntCounter,
    cycle_failures: IntCounter,
    accelerator_processes: IntGauge,
    idle_warnings: IntCounter,
    terminations: IntCounter,
    termination_failures: IntCounter,
    lookup_failures: IntCounter,
}

impl MonitorMetricsInner {
    fn new() -> Self {
        Self {
            cycle_latency_seconds: register_histogram!(
                "gpu_idle_monitor_cycle_latency_seconds",
                "Time spent on one gather-decide-act cycle",
                CYCLE_LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register cycle_latency_seconds"),

            cycles: register_int_counter!(
                "gpu_idle_monitor_cycles_total",
                "Number of polling cycles started"
            )
            .expect("Failed to register cycles"),

            cycle_failures: register_int_counter!(
                "gpu_idle_monitor_cycle_failures_total",
                "Cycles aborted because a snapshot could not be obtained"
            )
            .expect("Failed to register cycle_failures"),

            accelerator_processes: register_int_gauge!(
                "gpu_idle_monitor_accelerator_processes",
                "Compute processes visible in the last accelerator snapshot"
            )
            .expect("Failed to register accelerator_processes"),

            idle_warnings: register_int_counter!(
                "gpu_idle_monitor_idle_warnings_total",
                "Idle processes reported in warning-only mode"
            )
            .expect("Failed to register idle_warnings"),

            terminations: register_int_counter!(
                "gpu_idle_monitor_terminations_total",
                "Idle processes sent a termination signal"
            )
            .expect("Failed to register terminations"),

            termination_failures: register_int_counter!(
                "gpu_idle_monitor_termination_failures_total",
                "Termination signals that could not be delivered"
            )
            .expect("Failed to register termination_failures"),

            lookup_failures: register_int_counter!(
                "gpu_idle_monitor_lookup_failures_total",
                "Per-process metadata lookups that failed"
            )
            .expect("Failed to register lookup_failures"),
        }
    }
}

/// Handle to the global Prometheus metrics.
///
/// Clones share the same underlying metrics.
#[derive(Clone)]
pub struct MonitorMetrics {
    _private: (),
}

impl Default for MonitorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl MonitorMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(MonitorMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &MonitorMetricsInner {
        GLOBAL_METRICS.get_or_init(MonitorMetricsInner::new)
    }

    pub fn observe_cycle_latency(&self, duration_secs: f64) {
        self.inner().cycle_latency_seconds.observe(duration_secs);
    }

    pub fn inc_cycles(&self) {
        self.inner().cycles.inc();
    }

    pub fn inc_cycle_failures(&self) {
        self.inner().cycle_failures.inc();
    }

    pub fn set_accelerator_processes(&self, count: i64) {
        self.inner().accelerator_processes.set(count);
    }

    pub fn inc_idle_warnings(&self) {
        self.inner().idle_warnings.inc();
    }

    pub fn inc_terminations(&self) {
        self.inner().terminations.inc();
    }

    pub fn inc_termination_failures(&self) {
        self.inner().termination_failures.inc();
    }

    pub fn inc_lookup_failures(&self) {
        self.inner().lookup_failures.inc();
    }
}

/// Structured logger for monitor events
///
/// Every warning and termination line carries pid, command, container and
/// idle duration as fields so the log file can be grepped or shipped as-is.
#[derive(Clone)]
pub struct StructuredLogger {
    host: String,
}

impl StructuredLogger {
    pub fn new(host: impl Into<String>) -> Self {
        Self { host: host.into() }
    }

    /// Log monitor startup together with the effective configuration
    pub fn log_startup(&self, version: &str, settings: &MonitorSettings, log_file: &str) {
        info!(
            event = "monitor_started",
            host = %self.host,
            version = %version,
            current_date = %chrono::Local::now().format("%a %b %e %H:%M:%S %Y"),
            idle_time_threshold_secs = settings.idle_time_threshold_secs,
            warning_only = settings.warning_only,
            target_workloads = ?settings.target_workloads,
            whitelist = ?settings.whitelist,
            log_file = %log_file,
            poll_interval_secs = settings.poll_interval.as_secs(),
            docker_enabled = settings.docker_enabled,
            command_timeout_secs = settings.command_timeout.as_secs(),
            "Starting GPU idle monitor"
        );
    }

    /// Log the raw accelerator snapshot of a cycle
    pub fn log_snapshot(&self, lines: &[String]) {
        info!(
            event = "accelerator_snapshot",
            host = %self.host,
            processes = lines.len(),
            "Current GPU processes:\n{}",
            lines.join("\n")
        );
    }

    /// Log an idle process in warning-only mode
    pub fn log_idle_warning(&self, decision: &Decision, threshold_secs: i64) {
        warn!(
            event = "idle_warning",
            host = %self.host,
            pid = decision.pid,
            command = %decision.command_name,
            container = %decision.container_label(),
            idle_seconds = decision.idle_seconds.unwrap_or_default(),
            threshold_secs = threshold_secs,
            "Process has been idle for more than the threshold"
        );
    }

    /// Log a delivered termination signal
    pub fn log_termination(&self, decision: &Decision, threshold_secs: i64) {
        warn!(
            event = "process_terminated",
            host = %self.host,
            pid = decision.pid,
            command = %decision.command_name,
            container = %decision.container_label(),
            idle_seconds = decision.idle_seconds.unwrap_or_default(),
            threshold_secs = threshold_secs,
            "Sent SIGTERM to idle process"
        );
    }

    /// Log a termination signal that could not be delivered
    pub fn log_termination_failed(&self, decision: &Decision, reason: &str) {
        warn!(
            event = "termination_failed",
            host = %self.host,
            pid = decision.pid,
            command = %decision.command_name,
            container = %decision.container_label(),
            idle_seconds = decision.idle_seconds.unwrap_or_default(),
            reason = %reason,
            "Failed to send SIGTERM"
        );
    }

    /// Log monitor shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "monitor_shutdown",
            host = %self.host,
            reason = %reason,
            "GPU idle monitor shutting down"
        );
    }
}
