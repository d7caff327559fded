//! Graceful termination via `kill(2)`

use super::Signaller;
use crate::error::{SourceError, SourceResult};
use async_trait::async_trait;

/// Sends `SIGTERM`. Delivery is not confirmed; the target may ignore it.
#[derive(Debug, Default, Clone, Copy)]
pub struct SigtermSignaller;

#[async_trait]
impl Signaller for SigtermSignaller {
    async fn terminate(&self, pid: u32) -> SourceResult<()> {
        let raw = libc::pid_t::try_from(pid).map_err(|_| SourceError::Signal {
            pid,
            source: std::io::Error::from_raw_os_error(libc::ESRCH),
        })?;
        // pid 0 and negative values address process groups
        if raw <= 0 {
            return Err(SourceError::Signal {
                pid,
                source: std::io::Error::from_raw_os_error(libc::EINVAL),
            });
        }

        let rc = unsafe { libc::kill(raw, libc::SIGTERM) };
        if rc != 0 {
            return Err(SourceError::Signal {
                pid,
                source: std::io::Error::last_os_error(),
            });
        }

        Ok(())
    }
}
