//! Idle decision engine
//!
//! Turns one cycle's snapshots into decisions. Evaluation is a pure function
//! of its inputs and the immutable settings: the same snapshots and `now`
//! always give the same decisions.
//!
//! Idle time is measured from process start, not from the last moment the
//! process held device memory. A process that was briefly active is still
//! judged by its whole lifetime once it reports zero memory again.

use crate::models::{
    AcceleratorProcessRecord, Action, ContainerBinding, Decision, MonitorSettings, ProcessInfo,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Classifies accelerator processes as exempt, active or idle
#[derive(Debug, Clone)]
pub struct IdleDecisionEngine {
    settings: Arc<MonitorSettings>,
}

impl IdleDecisionEngine {
    pub fn new(settings: Arc<MonitorSettings>) -> Self {
        Self { settings }
    }

    /// Evaluate every record in source order.
    ///
    /// Records whose process is gone, is not a target workload, or whose idle
    /// time cannot be computed produce no decision. A missing lookup never
    /// affects the other records.
    pub fn evaluate<F>(
        &self,
        records: &[AcceleratorProcessRecord],
        lookup: F,
        bindings: &[ContainerBinding],
        now: DateTime<Utc>,
    ) -> Vec<Decision>
    where
        F: Fn(u32) -> Option<ProcessInfo>,
    {
        records
            .iter()
            .filter_map(|record| {
                let Some(info) = lookup(record.pid) else {
                    debug!(pid = record.pid, "Process exited before it could be inspected");
                    return None;
                };
                self.decide(record, &info, bindings, now)
            })
            .collect()
    }

    /// Evaluate a single record whose process metadata is known
    pub fn decide(
        &self,
        record: &AcceleratorProcessRecord,
        info: &ProcessInfo,
        bindings: &[ContainerBinding],
        now: DateTime<Utc>,
    ) -> Option<Decision> {
        let container_name = if self.settings.docker_enabled {
            resolve_container(record.pid, bindings).map(str::to_string)
        } else {
            None
        };

        if !self.is_target(&info.command_name) {
            trace!(pid = record.pid, command = %info.command_name, "Not a target workload");
            return None;
        }

        let mut decision = Decision {
            pid: record.pid,
            command_name: info.command_name.clone(),
            container_name,
            idle_seconds: None,
            action: Action::None,
        };

        if self.is_whitelisted(&decision.command_name, decision.container_name.as_deref()) {
            trace!(pid = record.pid, "Whitelisted, exempt from action");
            return Some(decision);
        }

        if record.used_memory != 0 {
            trace!(pid = record.pid, used_memory = record.used_memory, "Process is active");
            return Some(decision);
        }

        let Some(start_time) = info.start_time else {
            warn!(
                pid = record.pid,
                command = %info.command_name,
                "Unknown process start time, cannot compute idle duration"
            );
            return None;
        };

        let idle_seconds = (now - start_time).num_seconds();
        decision.idle_seconds = Some(idle_seconds);

        if idle_seconds > self.settings.idle_time_threshold_secs {
            decision.action = if self.settings.warning_only {
                Action::Warn
            } else {
                Action::Terminate
            };
        }

        Some(decision)
    }

    /// Substring match so that decorated names like `python3.11` still match
    fn is_target(&self, command_name: &str) -> bool {
        self.settings
            .target_workloads
            .iter()
            .filter(|t| !t.is_empty())
            .any(|t| command_name.contains(t.as_str()))
    }

    fn is_whitelisted(&self, command_name: &str, container_name: Option<&str>) -> bool {
        self.settings
            .whitelist
            .iter()
            .filter(|w| !w.is_empty())
            .any(|w| w == command_name || Some(w.as_str()) == container_name)
    }
}

/// First container, in enumeration order, whose root process is `pid`
pub fn resolve_container(pid: u32, bindings: &[ContainerBinding]) -> Option<&str> {
    bindings
        .iter()
        .find(|b| b.root_pid == pid)
        .map(|b| b.container_name.as_str())
}
