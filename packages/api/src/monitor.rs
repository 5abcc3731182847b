//! Tracks whether the dispatcher task is still consuming.

use tokio::sync::watch;
use tokio::task::JoinHandle;
use workers::DispatchError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatcherState {
    Running,
    /// The broker closed and the receive loop returned.
    Stopped,
    /// The receive loop returned an error or the task panicked.
    Failed(String),
}

impl DispatcherState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatcherState::Running => "running",
            DispatcherState::Stopped => "stopped",
            DispatcherState::Failed(_) => "failed",
        }
    }
}

/// Read side of the dispatcher's run state. Cheap to clone.
#[derive(Clone)]
pub struct DispatcherMonitor {
    rx: watch::Receiver<DispatcherState>,
}

impl DispatcherMonitor {
    /// Watch `worker` on a separate task that records how it ended.
    pub(crate) fn watch(worker: JoinHandle<Result<(), DispatchError>>) -> (Self, JoinHandle<()>) {
        let (tx, rx) = watch::channel(DispatcherState::Running);

        let task = tokio::spawn(async move {
            let state = match worker.await {
                Ok(Ok(())) => {
                    tracing::info!("Dispatcher stopped");
                    DispatcherState::Stopped
                }
                Ok(Err(e)) => {
                    tracing::error!(error = %e, "Dispatcher exited with error");
                    DispatcherState::Failed(e.to_string())
                }
                Err(e) => {
                    tracing::error!(error = %e, "Dispatcher task failed");
                    DispatcherState::Failed(e.to_string())
                }
            };
            tx.send_replace(state);
        });

        (Self { rx }, task)
    }

    pub fn state(&self) -> DispatcherState {
        self.rx.borrow().clone()
    }

    pub fn is_running(&self) -> bool {
        *self.rx.borrow() == DispatcherState::Running
    }

    /// Wait until the dispatcher is no longer running.
    pub async fn stopped(&self) -> DispatcherState {
        let mut rx = self.rx.clone();
        match rx.wait_for(|state| *state != DispatcherState::Running).await {
            Ok(state) => state.clone(),
            Err(_) => DispatcherState::Failed("dispatcher monitor ended".to_string()),
        }
    }
}
