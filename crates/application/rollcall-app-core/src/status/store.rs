use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tracing::debug;

use super::events::SyncEvent;
use super::reducer::{reduce, SyncStatus};

#[derive(Clone, Default)]
pub struct StatusStore {
    inner: Arc<Mutex<SyncStatus>>,
}

impl StatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> SyncStatus {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn apply(&self, ev: SyncEvent) {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let next = reduce(guard.clone(), ev);
        *guard = next;
    }

    /// Applies events until every sender is gone.
    pub async fn pump(&self, mut rx: mpsc::Receiver<SyncEvent>) {
        while let Some(ev) = rx.recv().await {
            debug!("Sync event: {:?}", ev);
            self.apply(ev);
        }
    }
}
