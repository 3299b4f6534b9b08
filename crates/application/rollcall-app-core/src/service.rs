use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::orchestrator::{CycleExit, SyncOrchestrator};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Sync is already running")]
    AlreadyRunning,
    #[error("Sync is not running")]
    NotRunning,
    #[error("Sync task failed: {0}")]
    Task(String),
}

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<(SyncOrchestrator, CycleExit)>,
}

/// Start/stop handle around one [`SyncOrchestrator`]. The orchestrator moves
/// onto a background task while running and comes back when it ends, so its
/// fault counter survives restarts.
pub struct SyncService {
    idle: Option<SyncOrchestrator>,
    running: Option<Running>,
}

impl SyncService {
    pub fn new(orchestrator: SyncOrchestrator) -> Self {
        Self {
            idle: Some(orchestrator),
            running: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }

    pub async fn start(&mut self) -> Result<(), ServiceError> {
        if self.is_running() {
            return Err(ServiceError::AlreadyRunning);
        }
        // A loop that halted on its own still has to be collected.
        if self.running.is_some() {
            self.wait().await?;
        }
        let mut orchestrator = self.idle.take().ok_or(ServiceError::NotRunning)?;

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            let exit = orchestrator.run(token).await;
            (orchestrator, exit)
        });
        info!("Sync service started");
        self.running = Some(Running { cancel, handle });
        Ok(())
    }

    /// Cancels the loop and waits until it has released everything.
    pub async fn stop(&mut self) -> Result<CycleExit, ServiceError> {
        let running = self.running.as_ref().ok_or(ServiceError::NotRunning)?;
        running.cancel.cancel();
        self.wait().await
    }

    /// Waits for the loop to end by itself.
    pub async fn wait(&mut self) -> Result<CycleExit, ServiceError> {
        let running = self.running.take().ok_or(ServiceError::NotRunning)?;
        match running.handle.await {
            Ok((orchestrator, exit)) => {
                info!("Sync service ended: {:?}", exit);
                self.idle = Some(orchestrator);
                Ok(exit)
            }
            Err(e) => Err(ServiceError::Task(e.to_string())),
        }
    }

    /// The orchestrator, while it is not running.
    pub fn orchestrator(&self) -> Option<&SyncOrchestrator> {
        self.idle.as_ref()
    }
}

impl Drop for SyncService {
    fn drop(&mut self) {
        if let Some(running) = &self.running {
            running.cancel.cancel();
        }
    }
}
