//! Carries out decisions
//!
//! Every failure is contained here: a signal that cannot be delivered is
//! logged and counted, never propagated.

use crate::models::{Action, Decision};
use crate::observability::{MonitorMetrics, StructuredLogger};
use crate::sources::Signaller;
use std::sync::Arc;
use tracing::trace;

/// What happened when a decision was executed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    NoAction,
    Warned,
    Terminated,
    TerminationFailed(String),
}

/// Applies decisions: logs warnings, signals idle processes
pub struct ActionExecutor {
    signaller: Arc<dyn Signaller>,
    logger: StructuredLogger,
    metrics: MonitorMetrics,
    threshold_secs: i64,
}

impl ActionExecutor {
    pub fn new(
        signaller: Arc<dyn Signaller>,
        logger: StructuredLogger,
        metrics: MonitorMetrics,
        threshold_secs: i64,
    ) -> Self {
        Self {
            signaller,
            logger,
            metrics,
            threshold_secs,
        }
    }

    pub async fn execute(&self, decision: &Decision) -> ActionOutcome {
        match decision.action {
            Action::None => {
                trace!(pid = decision.pid, command = %decision.command_name, "No action");
                ActionOutcome::NoAction
            }
            Action::Warn => {
                self.logger.log_idle_warning(decision, self.threshold_secs);
                self.metrics.inc_idle_warnings();
                ActionOutcome::Warned
            }
            Action::Terminate => match self.signaller.terminate(decision.pid).await {
                Ok(()) => {
                    self.logger.log_termination(decision, self.threshold_secs);
                    self.metrics.inc_terminations();
                    ActionOutcome::Terminated
                }
                Err(e) => {
                    let reason = e.to_string();
                    self.logger.log_termination_failed(decision, &reason);
                    self.metrics.inc_termination_failures();
                    ActionOutcome::TerminationFailed(reason)
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{SourceError, SourceResult};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records signalled PIDs; fails for PIDs in `gone`
    #[derive(Default)]
    struct MockSignaller {
        signalled: Mutex<Vec<u32>>,
        gone: Vec<u32>,
    }

    #[async_trait]
    impl Signaller for MockSignaller {
        async fn terminate(&self, pid: u32) -> SourceResult<()> {
            if self.gone.contains(&pid) {
                return Err(SourceError::Signal {
                    pid,
                    source: std::io::Error::from_raw_os_error(libc::ESRCH),
                });
            }
            self.signalled.lock().unwrap().push(pid);
            Ok(())
        }
    }

    fn decision(pid: u32, action: Action) -> Decision {
        Decision {
            pid,
            command_name: "python3".to_string(),
            container_name: Some("job".to_string()),
            idle_seconds: Some(400),
            action,
        }
    }

    fn executor(signaller: Arc<MockSignaller>) -> ActionExecutor {
        ActionExecutor::new(
            signaller,
            StructuredLogger::new("test-host"),
            MonitorMetrics::new(),
            300,
        )
    }

    #[tokio::test]
    async fn test_warn_sends_no_signal() {
        let signaller = Arc::new(MockSignaller::default());
        let outcome = executor(signaller.clone())
            .execute(&decision(1234, Action::Warn))
            .await;

        assert_eq!(outcome, ActionOutcome::Warned);
        assert!(signaller.signalled.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_terminate_signals_pid() {
        let signaller = Arc::new(MockSignaller::default());
        let outcome = executor(signaller.clone())
            .execute(&decision(1234, Action::Terminate))
            .await;

        assert_eq!(outcome, ActionOutcome::Terminated);
        assert_eq!(*signaller.signalled.lock().unwrap(), vec![1234]);
    }

    #[tokio::test]
    async fn test_failed_signal_is_contained() {
        let signaller = Arc::new(MockSignaller {
            gone: vec![1234],
            ..Default::default()
        });
        let outcome = executor(signaller).execute(&decision(1234, Action::Terminate)).await;

        assert!(matches!(outcome, ActionOutcome::TerminationFailed(_)));
    }

    #[tokio::test]
    async fn test_none_has_no_effect() {
        let signaller = Arc::new(MockSignaller::default());
        let outcome = executor(signaller.clone())
            .execute(&decision(1234, Action::None))
            .await;

        assert_eq!(outcome, ActionOutcome::NoAction);
        assert!(signaller.signalled.lock().unwrap().is_empty());
    }
}
