//! Core data models for the idle monitor

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One `pid,used_memory` row reported by the accelerator query tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceleratorProcessRecord {
    pub pid: u32,
    /// Memory currently held on the device, as reported by the tool
    pub used_memory: u64,
}

/// OS metadata for a process holding a GPU context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub pid: u32,
    pub command_name: String,
    /// `None` when the start time could not be obtained or parsed
    pub start_time: Option<DateTime<Utc>>,
}

/// A running container and the PID of its root process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerBinding {
    pub container_name: String,
    pub root_pid: u32,
}

/// Response chosen for a targeted process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    None,
    Warn,
    Terminate,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::None => write!(f, "none"),
            Action::Warn => write!(f, "warn"),
            Action::Terminate => write!(f, "terminate"),
        }
    }
}

/// Outcome of evaluating one targeted process in one cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub pid: u32,
    pub command_name: String,
    pub container_name: Option<String>,
    /// Seconds since process start; `None` if exempt or active before it was computed
    pub idle_seconds: Option<i64>,
    pub action: Action,
}

impl Decision {
    /// Container name for log lines
    pub fn container_label(&self) -> &str {
        self.container_name.as_deref().unwrap_or("none")
    }
}

/// Immutable monitor configuration, built once at startup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorSettings {
    /// A zero-memory process older than this is acted on
    pub idle_time_threshold_secs: i64,
    /// Log idle processes instead of signalling them
    pub warning_only: bool,
    /// Command-name substrings that select processes of interest
    pub target_workloads: Vec<String>,
    /// Exact process or container names that are never acted on
    pub whitelist: Vec<String>,
    pub poll_interval: Duration,
    pub docker_enabled: bool,
    /// Upper bound on every external command invocation
    pub command_timeout: Duration,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            idle_time_threshold_secs: 300,
            warning_only: true,
            target_workloads: split_list("python,tensorflow,cuda,pytorch"),
            whitelist: split_list("whitelisted_process,whitelisted_container,nvidia-smi,nvidler.sh"),
            poll_interval: Duration::from_secs(60),
            docker_enabled: true,
            command_timeout: Duration::from_secs(30),
        }
    }
}

/// Split a comma-separated option value, dropping blank entries
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_list_drops_blank_entries() {
        assert_eq!(split_list("python, cuda,,"), vec!["python", "cuda"]);
        assert!(split_list("").is_empty());
    }

    #[test]
    fn test_default_settings() {
        let settings = MonitorSettings::default();
        assert_eq!(settings.idle_time_threshold_secs, 300);
        assert!(settings.warning_only);
        assert_eq!(settings.target_workloads.len(), 4);
        assert!(settings.whitelist.contains(&"nvidia-smi".to_string()));
        assert_eq!(settings.poll_interval, Duration::from_secs(60));
    }

    #[test]
    fn test_container_label() {
        let decision = Decision {
            pid: 1,
            command_name: "python3".to_string(),
            container_name: None,
            idle_seconds: Some(10),
            action: Action::Warn,
        };
        assert_eq!(decision.container_label(), "none");
    }
}
