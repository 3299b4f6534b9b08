//! Broadcast-channel discovery of counterpart devices.
//!
//! A [`DiscoveryScanner`] owns at most one open [`ScanSession`]. Scanning
//! runs on its own task until it is stopped, the installed stop condition
//! matches, or the backend ends the scan. The session is closed on every one
//! of those paths before the task finishes.

use std::sync::Arc;

use rollcall_core::radio::{Advertisement, DiscoveryBackend, ScanSession};
use rollcall_core::{PeerRecord, SERVICE_UUID};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum ScannerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("A scan is already running")]
    AlreadyScanning,
    #[error("Scan task failed: {0}")]
    Task(String),
}

/// Why a scan task finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanEnd {
    Stopped,
    ConditionMet,
    BackendClosed,
    /// The consumer of a channel scan dropped its receiver.
    ReceiverGone,
}

pub type StopCondition = Arc<dyn Fn(&PeerRecord) -> bool + Send + Sync>;

struct ActiveScan {
    cancel: CancellationToken,
    handle: JoinHandle<Result<ScanEnd, ScannerError>>,
}

pub struct DiscoveryScanner {
    backend: Arc<dyn DiscoveryBackend>,
    service_id: Uuid,
    stop_when: Option<StopCondition>,
    active: Option<ActiveScan>,
}

impl DiscoveryScanner {
    pub fn new(backend: Arc<dyn DiscoveryBackend>) -> Self {
        Self {
            backend,
            service_id: SERVICE_UUID,
            stop_when: None,
            active: None,
        }
    }

    pub fn with_service_id(mut self, service_id: Uuid) -> Self {
        self.service_id = service_id;
        self
    }

    /// Installs a predicate checked after each reported peer. When it holds,
    /// the scan ends by itself and releases the radio.
    pub fn set_stop_condition<F>(&mut self, condition: F)
    where
        F: Fn(&PeerRecord) -> bool + Send + Sync + 'static,
    {
        self.stop_when = Some(Arc::new(condition));
    }

    pub fn clear_stop_condition(&mut self) {
        self.stop_when = None;
    }

    /// True while a scan task is alive.
    pub fn is_scanning(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| !active.handle.is_finished())
    }

    /// Starts scanning and calls `on_found` once per qualifying advertisement.
    /// Repeated advertisements from the same peer are reported again.
    pub async fn start_scanning<F>(&mut self, mut on_found: F) -> Result<(), ScannerError>
    where
        F: FnMut(PeerRecord) + Send + 'static,
    {
        self.spawn_scan(move |peer| {
            on_found(peer);
            true
        })
        .await
    }

    /// Channel flavour of [`start_scanning`](Self::start_scanning). The
    /// receiver yields `None` once the scan has ended for any reason.
    pub async fn start_channel(
        &mut self,
        capacity: usize,
    ) -> Result<mpsc::Receiver<PeerRecord>, ScannerError> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        self.spawn_scan(move |peer| match tx.try_send(peer) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(peer)) => {
                debug!("Discovery channel full, dropping {}", peer.address);
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        })
        .await?;
        Ok(rx)
    }

    /// Cancels the running scan and waits until its session is closed.
    /// Calling this with no scan running is a no-op.
    pub async fn stop_scanning(&mut self) -> Result<ScanEnd, ScannerError> {
        let Some(active) = self.active.take() else {
            return Ok(ScanEnd::Stopped);
        };
        active.cancel.cancel();
        match active.handle.await {
            Ok(result) => result,
            Err(e) => Err(ScannerError::Task(e.to_string())),
        }
    }

    async fn spawn_scan<D>(&mut self, deliver: D) -> Result<(), ScannerError>
    where
        D: FnMut(PeerRecord) -> bool + Send + 'static,
    {
        if self.is_scanning() {
            return Err(ScannerError::AlreadyScanning);
        }
        // Reap a task that already ended on its own.
        if let Some(done) = self.active.take() {
            let _ = done.handle.await;
        }

        let session = self.backend.open_scan().await?;
        let cancel = CancellationToken::new();
        info!("Discovery started for service {}", self.service_id);

        let handle = tokio::spawn(run_scan(
            session,
            self.service_id,
            self.stop_when.clone(),
            cancel.clone(),
            deliver,
        ));
        self.active = Some(ActiveScan { cancel, handle });
        Ok(())
    }
}

impl Drop for DiscoveryScanner {
    fn drop(&mut self) {
        // The task still closes its session after observing the cancellation.
        if let Some(active) = &self.active {
            active.cancel.cancel();
        }
    }
}

pub fn peer_from(ad: Advertisement) -> PeerRecord {
    PeerRecord {
        address: ad.address,
        display_name: ad.local_name,
        discovered_at: ad.received_at,
    }
}

async fn run_scan<D>(
    mut session: Box<dyn ScanSession>,
    service_id: Uuid,
    stop_when: Option<StopCondition>,
    cancel: CancellationToken,
    mut deliver: D,
) -> Result<ScanEnd, ScannerError>
where
    D: FnMut(PeerRecord) -> bool + Send,
{
    let outcome = scan_loop(session.as_mut(), service_id, stop_when, &cancel, &mut deliver).await;

    if let Err(e) = session.close().await {
        warn!("Failed to close scan session: {}", e);
        if outcome.is_ok() {
            return Err(e.into());
        }
    }
    match &outcome {
        Ok(end) => info!("Discovery ended ({:?})", end),
        Err(e) => warn!("Discovery failed: {}", e),
    }
    outcome
}

async fn scan_loop<D>(
    session: &mut dyn ScanSession,
    service_id: Uuid,
    stop_when: Option<StopCondition>,
    cancel: &CancellationToken,
    deliver: &mut D,
) -> Result<ScanEnd, ScannerError>
where
    D: FnMut(PeerRecord) -> bool + Send,
{
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => return Ok(ScanEnd::Stopped),
            next = session.next_advertisement() => next?,
        };

        let Some(ad) = next else {
            return Ok(ScanEnd::BackendClosed);
        };
        if !ad.advertises(&service_id) {
            continue;
        }

        let peer = peer_from(ad);
        debug!("Discovered {} ({:?})", peer.address, peer.display_name);
        let matched = stop_when.as_ref().is_some_and(|cond| cond(&peer));
        if !deliver(peer) {
            return Ok(ScanEnd::ReceiverGone);
        }
        if matched {
            return Ok(ScanEnd::ConditionMet);
        }
    }
}
