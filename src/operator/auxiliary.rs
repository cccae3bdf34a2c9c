//! Failure signal from auxiliary subsystems.
//!
//! Auxiliary subsystems (the periodic stats reporter, a metrics exporter, ...) run beside
//! the event loop. They cannot be recovered from inside the loop, so their only channel
//! back is "I failed": the first report ends the loop with
//! [`OperatorError::AuxiliaryFailure`](crate::error::OperatorError::AuxiliaryFailure).

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::error;

/// One auxiliary subsystem gave up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuxiliaryFailure {
    pub subsystem: String,
    pub reason: String,
}

/// Receiving side, consumed by the event loop
#[derive(Debug)]
pub struct AuxiliaryMonitor {
    failures: Option<mpsc::Receiver<AuxiliaryFailure>>,
}

/// Sending side, cloned into each auxiliary subsystem
#[derive(Debug, Clone)]
pub struct AuxiliaryReporter {
    failures: mpsc::Sender<AuxiliaryFailure>,
}

impl AuxiliaryMonitor {
    /// A monitor that never fires
    pub fn disabled() -> Self {
        Self { failures: None }
    }

    pub fn channel() -> (AuxiliaryReporter, AuxiliaryMonitor) {
        let (sender, receiver) = mpsc::channel(8);
        (
            AuxiliaryReporter { failures: sender },
            AuxiliaryMonitor {
                failures: Some(receiver),
            },
        )
    }

    /// Wait for the first failure.
    ///
    /// Pends forever when disabled or once every reporter is gone without reporting.
    pub async fn failed(&mut self) -> AuxiliaryFailure {
        let Some(failures) = self.failures.as_mut() else {
            return std::future::pending().await;
        };
        match failures.recv().await {
            Some(failure) => failure,
            None => {
                self.failures = None;
                std::future::pending().await
            }
        }
    }
}

impl AuxiliaryReporter {
    pub fn report(&self, subsystem: impl Into<String>, reason: impl Into<String>) {
        let failure = AuxiliaryFailure {
            subsystem: subsystem.into(),
            reason: reason.into(),
        };
        error!(subsystem = %failure.subsystem, reason = %failure.reason, "Auxiliary subsystem failed");
        // a full channel already holds a failure the loop will act on
        let _ = self.failures.try_send(failure);
    }

    /// Watch a subsystem task; if it ever stops, report it as failed
    pub fn supervise(&self, subsystem: &'static str, task: JoinHandle<()>) -> JoinHandle<()> {
        let reporter = self.clone();
        tokio::spawn(async move {
            let reason = match task.await {
                Ok(()) => "exited unexpectedly".to_string(),
                Err(e) if e.is_panic() => "task panicked".to_string(),
                Err(e) => format!("task aborted: {e}"),
            };
            reporter.report(subsystem, reason);
        })
    }
}
