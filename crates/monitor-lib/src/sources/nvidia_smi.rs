//! Accelerator usage from `nvidia-smi`
//!
//! Queries compute applications as headerless CSV:
//! ```text
//! 1234, 0
//! 5678, 512
//! ```

use super::{run_command, AcceleratorSource};
use crate::error::SourceResult;
use crate::models::AcceleratorProcessRecord;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

const NVIDIA_SMI: &str = "nvidia-smi";
const QUERY_ARGS: &[&str] = &[
    "--query-compute-apps=pid,used_memory",
    "--format=csv,noheader,nounits",
];

/// `nvidia-smi` backed accelerator source
pub struct NvidiaSmi {
    binary: String,
    timeout: Duration,
}

impl NvidiaSmi {
    pub fn new(timeout: Duration) -> Self {
        Self {
            binary: NVIDIA_SMI.to_string(),
            timeout,
        }
    }
}

#[async_trait]
impl AcceleratorSource for NvidiaSmi {
    async fn raw_snapshot(&self) -> SourceResult<Vec<String>> {
        let stdout = run_command(&self.binary, QUERY_ARGS, self.timeout).await?;
        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }
}

/// Parse `pid,used_memory` lines.
///
/// Blank lines are ignored. Lines that do not carry two integers (including
/// `[N/A]` memory readings) are skipped: treating an unknown reading as zero
/// would make the process look idle.
pub fn parse_compute_apps(output: &str) -> Vec<AcceleratorProcessRecord> {
    let mut records = Vec::new();

    for line in output.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with("No running") {
            debug!("No compute processes reported");
            continue;
        }

        match parse_line(line) {
            Some(record) => records.push(record),
            None => warn!(line = %line, "Skipping malformed accelerator record"),
        }
    }

    records
}

fn parse_line(line: &str) -> Option<AcceleratorProcessRecord> {
    let mut fields = line.split(',').map(str::trim);
    let pid = fields.next()?.parse().ok()?;
    let used_memory = fields.next()?.parse().ok()?;
    Some(AcceleratorProcessRecord { pid, used_memory })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_compute_apps() {
        let output = "1234, 0\n5678, 512\n\n\n";
        let records = parse_compute_apps(output);

        assert_eq!(
            records,
            vec![
                AcceleratorProcessRecord { pid: 1234, used_memory: 0 },
                AcceleratorProcessRecord { pid: 5678, used_memory: 512 },
            ]
        );
    }

    #[test]
    fn test_parse_trims_whitespace() {
        let records = parse_compute_apps("   42 ,   7   \r\n");
        assert_eq!(records, vec![AcceleratorProcessRecord { pid: 42, used_memory: 7 }]);
    }

    #[test]
    fn test_parse_skips_malformed_lines() {
        let output = "1234,0\ngarbage\n99,[N/A]\n,\n5678,1";
        let records = parse_compute_apps(output);

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].pid, 1234);
        assert_eq!(records[1].pid, 5678);
    }

    #[test]
    fn test_parse_empty_output() {
        assert!(parse_compute_apps("").is_empty());
        assert!(parse_compute_apps("No running processes found\n").is_empty());
    }

    #[tokio::test]
    async fn test_missing_binary_is_an_error() {
        let source = NvidiaSmi {
            binary: "nvidia-smi-not-installed".to_string(),
            timeout: Duration::from_secs(1),
        };
        assert!(source.raw_snapshot().await.is_err());
    }
}
