//! Monitor configuration
//!
//! Layered, lowest priority first: built-in defaults, an optional TOML file,
//! `GPU_IDLE_*` environment variables, command-line flags.

use anyhow::{ensure, Context, Result};
use clap::{ArgAction, Parser};
use monitor_lib::models::{split_list, MonitorSettings};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

const ENV_PREFIX: &str = "GPU_IDLE";

/// Watches GPU compute processes and warns about or terminates idle ones
#[derive(Parser, Debug, Default)]
#[command(name = "gpu-idle-monitor")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional TOML configuration file
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Seconds a zero-memory process may live before action is taken
    #[arg(long, alias = "idleTimeThreshold")]
    pub idle_time_threshold: Option<i64>,

    /// Only log idle processes instead of terminating them
    #[arg(long, alias = "warningOnly", num_args = 0..=1, default_missing_value = "true", action = ArgAction::Set)]
    pub warning_only: Option<bool>,

    /// Comma-separated command-name substrings to monitor
    #[arg(long, alias = "targetWorkloads")]
    pub target_workloads: Option<String>,

    /// Comma-separated process or container names never acted on
    #[arg(long)]
    pub whitelist: Option<String>,

    /// Log file, rotated at startup
    #[arg(long, alias = "logFile")]
    pub log_file: Option<PathBuf>,

    /// Seconds between polling cycles
    #[arg(long, alias = "sleepInterval")]
    pub sleep_interval: Option<u32>,

    /// Resolve container names through the Docker CLI
    #[arg(long, num_args = 0..=1, default_missing_value = "true", action = ArgAction::Set)]
    pub docker: Option<bool>,

    /// Seconds before an external command is abandoned
    #[arg(long)]
    pub command_timeout: Option<u32>,

    /// Serve /healthz, /readyz and /metrics on this port
    #[arg(long)]
    pub api_port: Option<u16>,

    /// Emit JSON log lines
    #[arg(long, num_args = 0..=1, default_missing_value = "true", action = ArgAction::Set)]
    pub json_logs: Option<bool>,
}

/// Effective monitor configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    pub idle_time_threshold_secs: i64,
    pub warning_only: bool,
    /// Comma-separated
    pub target_workloads: String,
    /// Comma-separated
    pub whitelist: String,
    pub log_file: PathBuf,
    pub poll_interval_secs: u64,
    pub docker_enabled: bool,
    pub command_timeout_secs: u64,
    #[serde(default)]
    pub api_port: Option<u16>,
    pub json_logs: bool,
}

impl MonitorConfig {
    /// Load configuration from all layers and validate it
    pub fn load(cli: &Cli) -> Result<Self> {
        let mut builder = config::Config::builder()
            .set_default("idle_time_threshold_secs", 300_i64)?
            .set_default("warning_only", true)?
            .set_default("target_workloads", "python,tensorflow,cuda,pytorch")?
            .set_default(
                "whitelist",
                "whitelisted_process,whitelisted_container,nvidia-smi,nvidler.sh",
            )?
            .set_default("log_file", "/var/log/gpu_idle_monitor.log")?
            .set_default("poll_interval_secs", 60_i64)?
            .set_default("docker_enabled", true)?
            .set_default("command_timeout_secs", 30_i64)?
            .set_default("json_logs", false)?;

        if let Some(path) = &cli.config {
            builder = builder.add_source(config::File::from(path.as_path()).required(true));
        }

        let config = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .set_override_option("idle_time_threshold_secs", cli.idle_time_threshold)?
            .set_override_option("warning_only", cli.warning_only)?
            .set_override_option("target_workloads", cli.target_workloads.clone())?
            .set_override_option("whitelist", cli.whitelist.clone())?
            .set_override_option(
                "log_file",
                cli.log_file
                    .as_ref()
                    .map(|p| p.to_string_lossy().into_owned()),
            )?
            .set_override_option("poll_interval_secs", cli.sleep_interval.map(i64::from))?
            .set_override_option("docker_enabled", cli.docker)?
            .set_override_option("command_timeout_secs", cli.command_timeout.map(i64::from))?
            .set_override_option("api_port", cli.api_port.map(i64::from))?
            .set_override_option("json_logs", cli.json_logs)?
            .build()
            .context("Failed to read configuration")?;

        let config: Self = config
            .try_deserialize()
            .context("Invalid configuration")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        ensure!(
            self.idle_time_threshold_secs >= 0,
            "idle_time_threshold_secs must not be negative"
        );
        ensure!(self.poll_interval_secs > 0, "poll_interval_secs must be positive");
        ensure!(self.command_timeout_secs > 0, "command_timeout_secs must be positive");
        ensure!(
            !split_list(&self.target_workloads).is_empty(),
            "target_workloads must name at least one workload"
        );
        Ok(())
    }

    /// Immutable settings handed to the scheduler and engine
    pub fn settings(&self) -> MonitorSettings {
        MonitorSettings {
            idle_time_threshold_secs: self.idle_time_threshold_secs,
            warning_only: self.warning_only,
            target_workloads: split_list(&self.target_workloads),
            whitelist: split_list(&self.whitelist),
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            docker_enabled: self.docker_enabled,
            command_timeout: Duration::from_secs(self.command_timeout_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = MonitorConfig::load(&Cli::default()).unwrap();
        let settings = config.settings();

        assert_eq!(settings, MonitorSettings::default());
        assert_eq!(config.log_file, PathBuf::from("/var/log/gpu_idle_monitor.log"));
        assert_eq!(config.api_port, None);
    }

    #[test]
    fn test_flags_override_defaults() {
        let cli = Cli::parse_from([
            "gpu-idle-monitor",
            "--idleTimeThreshold",
            "600",
            "--warning-only=false",
            "--target-workloads",
            "python, jax",
            "--sleep-interval",
            "5",
            "--docker",
            "false",
            "--api-port",
            "9400",
        ]);
        let config = MonitorConfig::load(&cli).unwrap();
        let settings = config.settings();

        assert_eq!(settings.idle_time_threshold_secs, 600);
        assert!(!settings.warning_only);
        assert_eq!(settings.target_workloads, vec!["python", "jax"]);
        assert_eq!(settings.poll_interval, Duration::from_secs(5));
        assert!(!settings.docker_enabled);
        assert_eq!(config.api_port, Some(9400));
    }

    #[test]
    fn test_bare_boolean_flag_means_true() {
        let cli = Cli::parse_from(["gpu-idle-monitor", "--json-logs"]);
        assert_eq!(cli.json_logs, Some(true));
    }

    #[test]
    fn test_file_layer_below_flags() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "idle_time_threshold_secs = 120\nwhitelist = \"jupyter\"\npoll_interval_secs = 15"
        )
        .unwrap();

        let cli = Cli {
            config: Some(file.path().to_path_buf()),
            sleep_interval: Some(30),
            ..Cli::default()
        };
        let settings = MonitorConfig::load(&cli).unwrap().settings();

        assert_eq!(settings.idle_time_threshold_secs, 120);
        assert_eq!(settings.whitelist, vec!["jupyter"]);
        assert_eq!(settings.poll_interval, Duration::from_secs(30));
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        let cli = Cli {
            config: Some(PathBuf::from("/nonexistent/monitor.toml")),
            ..Cli::default()
        };
        assert!(MonitorConfig::load(&cli).is_err());
    }

    #[test]
    fn test_zero_interval_rejected() {
        let cli = Cli {
            sleep_interval: Some(0),
            ..Cli::default()
        };
        assert!(MonitorConfig::load(&cli).is_err());
    }

    #[test]
    fn test_empty_targets_rejected() {
        let cli = Cli {
            target_workloads: Some(" , ".to_string()),
            ..Cli::default()
        };
        assert!(MonitorConfig::load(&cli).is_err());
    }
}
