//! Process metadata from `ps`

use super::{run_command, ProcessSource};
use crate::error::{SourceError, SourceResult};
use crate::models::ProcessInfo;
use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use std::time::Duration;
use tracing::debug;

/// `ps -o lstart=` layout, e.g. `Mon Jan  2 15:04:05 2006`
const LSTART_FORMAT: &str = "%a %b %d %H:%M:%S %Y";

/// Looks up command name and start time with `ps`
pub struct PsProcessSource {
    timeout: Duration,
}

impl PsProcessSource {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn query(&self, pid: u32, field: &str) -> SourceResult<Option<String>> {
        let pid_arg = pid.to_string();
        match run_command("ps", &["-p", &pid_arg, "-o", field], self.timeout).await {
            Ok(out) => {
                let value = out.trim();
                Ok((!value.is_empty()).then(|| value.to_string()))
            }
            // ps exits non-zero when no process matches
            Err(SourceError::CommandFailed { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl ProcessSource for PsProcessSource {
    async fn process_info(&self, pid: u32) -> SourceResult<Option<ProcessInfo>> {
        let Some(command_name) = self.query(pid, "comm=").await? else {
            return Ok(None);
        };

        let start_time = match self.query(pid, "lstart=").await {
            Ok(Some(raw)) => {
                let parsed = parse_lstart(&raw);
                if parsed.is_none() {
                    debug!(pid, raw = %raw, "Unparseable process start time");
                }
                parsed
            }
            Ok(None) => None,
            Err(e) => {
                debug!(pid, error = %e, "Failed to query process start time");
                None
            }
        };

        Ok(Some(ProcessInfo {
            pid,
            command_name,
            start_time,
        }))
    }
}

/// Parse a `ps` long start time, interpreted in the host's local zone.
///
/// `ps` pads single-digit days with an extra space, so runs of whitespace
/// are collapsed before parsing.
pub fn parse_lstart(raw: &str) -> Option<DateTime<Utc>> {
    let normalized = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    let naive = NaiveDateTime::parse_from_str(&normalized, LSTART_FORMAT).ok()?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}
