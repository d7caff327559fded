//! Container identity from the Docker CLI
//!
//! Lists running containers with `docker ps` and inspects each one for the
//! PID of its root process and its primary name.

use super::{run_command, ContainerSource};
use crate::error::SourceResult;
use crate::models::ContainerBinding;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info, warn};

const DOCKER: &str = "docker";
const INSPECT_FORMAT: &str = "{{.State.Pid}} {{.Name}}";

/// Docker CLI backed container source
pub struct DockerCli {
    binary: String,
    timeout: Duration,
}

impl DockerCli {
    /// Verify the daemon is reachable and build the source.
    ///
    /// Called once at startup; an unreachable daemon is fatal there.
    pub async fn connect(timeout: Duration) -> SourceResult<Self> {
        Self::connect_with_binary(DOCKER, timeout).await
    }

    pub async fn connect_with_binary(
        binary: impl Into<String>,
        timeout: Duration,
    ) -> SourceResult<Self> {
        let binary = binary.into();
        let version = run_command(
            &binary,
            &["version", "--format", "{{.Server.Version}}"],
            timeout,
        )
        .await?;
        info!(server_version = %version.trim(), "Connected to Docker daemon");

        Ok(Self { binary, timeout })
    }

    async fn running_container_ids(&self) -> SourceResult<Vec<String>> {
        let out = run_command(&self.binary, &["ps", "-q", "--no-trunc"], self.timeout).await?;
        Ok(out
            .lines()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect())
    }
}

#[async_trait]
impl ContainerSource for DockerCli {
    async fn list_bindings(&self) -> SourceResult<Vec<ContainerBinding>> {
        let ids = self.running_container_ids().await?;
        let mut bindings = Vec::with_capacity(ids.len());

        for id in &ids {
            let out = match run_command(
                &self.binary,
                &["inspect", "--format", INSPECT_FORMAT, id],
                self.timeout,
            )
            .await
            {
                Ok(out) => out,
                Err(e) => {
                    warn!(container_id = %id, error = %e, "Failed to inspect container");
                    continue;
                }
            };

            match parse_inspect_line(&out) {
                Some(binding) => {
                    debug!(
                        container_id = %id,
                        container = %binding.container_name,
                        root_pid = binding.root_pid,
                        "Resolved container root process"
                    );
                    bindings.push(binding);
                }
                None => debug!(container_id = %id, output = %out.trim(), "Container has no root process"),
            }
        }

        Ok(bindings)
    }
}

/// Parse `<pid> <name>` as produced by the inspect format.
///
/// A PID of 0 means the container stopped between listing and inspection.
pub fn parse_inspect_line(line: &str) -> Option<ContainerBinding> {
    let (pid, name) = line.trim().split_once(' ')?;
    let root_pid: u32 = pid.trim().parse().ok()?;
    let container_name = name.trim().trim_start_matches('/');

    if root_pid == 0 || container_name.is_empty() {
        return None;
    }

    Some(ContainerBinding {
        container_name: container_name.to_string(),
        root_pid,
    })
}

/// Container source used when container tracking is disabled
#[derive(Debug, Default, Clone, Copy)]
pub struct NoContainers;

#[async_trait]
impl ContainerSource for NoContainers {
    async fn list_bindings(&self) -> SourceResult<Vec<ContainerBinding>> {
        Ok(Vec::new())
    }
}
