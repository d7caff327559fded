//! External collaborators the monitor consumes
//!
//! Each tool the monitor shells out to sits behind a narrow trait so the
//! decision engine and scheduler can be driven by deterministic fakes:
//! - accelerator usage (`nvidia-smi`)
//! - process metadata (`ps`)
//! - container identity (`docker`)
//! - process termination (`kill(2)`)

mod docker;
mod nvidia_smi;
mod ps;
mod signal;

pub use docker::{parse_inspect_line, DockerCli, NoContainers};
pub use nvidia_smi::{parse_compute_apps, NvidiaSmi};
pub use ps::{parse_lstart, PsProcessSource};
pub use signal::SigtermSignaller;

use crate::error::{SourceError, SourceResult};
use crate::models::{ContainerBinding, ProcessInfo};
use async_trait::async_trait;
use std::time::Duration;
use tokio::process::Command;

/// Lists processes currently holding GPU compute contexts
#[async_trait]
pub trait AcceleratorSource: Send + Sync {
    /// Raw snapshot lines, written to the log sink and then parsed with
    /// [`parse_compute_apps`]
    async fn raw_snapshot(&self) -> SourceResult<Vec<String>>;
}

/// Resolves OS metadata for a PID
#[async_trait]
pub trait ProcessSource: Send + Sync {
    /// `Ok(None)` when the process no longer exists
    async fn process_info(&self, pid: u32) -> SourceResult<Option<ProcessInfo>>;
}

/// Maps running containers to their root PIDs
#[async_trait]
pub trait ContainerSource: Send + Sync {
    async fn list_bindings(&self) -> SourceResult<Vec<ContainerBinding>>;
}

/// Delivers a graceful termination request to a process
#[async_trait]
pub trait Signaller: Send + Sync {
    async fn terminate(&self, pid: u32) -> SourceResult<()>;
}

/// Run an external command with a hard deadline and return its stdout.
///
/// The child is killed if the deadline passes.
pub(crate) async fn run_command(
    program: &str,
    args: &[&str],
    timeout: Duration,
) -> SourceResult<String> {
    let display = std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ");

    let mut command = Command::new(program);
    command.args(args).env("LC_ALL", "C").kill_on_drop(true);

    let output = match tokio::time::timeout(timeout, command.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(source)) => {
            return Err(SourceError::Spawn {
                command: display,
                source,
            })
        }
        Err(_) => {
            return Err(SourceError::Timeout {
                command: display,
                timeout,
            })
        }
    };

    if !output.status.success() {
        return Err(SourceError::CommandFailed {
            command: display,
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
