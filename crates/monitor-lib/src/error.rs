//! Errors raised at the boundary with external tools

use std::time::Duration;
use thiserror::Error;

/// Failure of a single call into an external collaborator.
///
/// Every variant is transient from the monitor's point of view: it aborts
/// the record or cycle that needed the data and nothing more.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{command}` did not finish within {timeout:?}")]
    Timeout { command: String, timeout: Duration },
    #[error("`{command}` exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },
    #[error("unparseable output: {0}")]
    Parse(String),
    #[error("failed to signal pid {pid}: {source}")]
    Signal {
        pid: u32,
        #[source]
        source: std::io::Error,
    },
}

pub type SourceResult<T> = Result<T, SourceError>;
