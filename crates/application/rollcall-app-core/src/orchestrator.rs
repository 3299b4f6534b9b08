//! Background receive loop.
//!
//! ```text
//! Scanning -> Connecting -> Receiving -> Cooldown -> Scanning ...
//!                                    \-> Halted
//! ```
//!
//! Transport failures cool down for a few seconds and go round again.
//! Anything else that goes wrong is a fault: faults wait longer and are
//! budgeted, and running out of budget halts the loop.

use std::sync::Arc;
use std::time::Duration;

use rollcall_core::radio::LinkConnector;
use rollcall_core::PeerRecord;
use rollcall_pipeline::{FailureReason, ReceiverSession, SessionOutcome};
use rollcall_scanner::{DiscoveryScanner, ScannerError};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::ports::LogSink;
use crate::slot::{SessionSlot, SlotError};
use crate::status::{SyncEvent, SyncState};

const PEER_QUEUE: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub discovery_timeout: Duration,
    pub cooldown: Duration,
    pub fault_delay: Duration,
    pub max_faults: u32,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            discovery_timeout: rollcall_config::DISCOVERY_TIMEOUT,
            cooldown: rollcall_config::TRANSFER_COOLDOWN,
            fault_delay: rollcall_config::FAULT_RETRY_DELAY,
            max_faults: rollcall_config::MAX_FAULT_RETRIES,
            connect_timeout: rollcall_config::CONNECT_TIMEOUT,
            read_timeout: rollcall_config::FRAME_READ_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaltReason {
    /// The peer had nothing to send.
    NoLogs,
    FaultBudgetExhausted,
}

/// How [`SyncOrchestrator::run`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleExit {
    Halted(HaltReason),
    Cancelled,
}

/// Unexpected faults. Each one is counted against the fault budget.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("Discovery failed: {0}")]
    Discovery(#[from] ScannerError),
    #[error("Discovery ended without a peer")]
    DiscoveryEnded,
    #[error("Failed to store received logs: {0}")]
    Persist(anyhow::Error),
    #[error(transparent)]
    Slot(#[from] SlotError),
}

enum Step {
    Next,
    Halt(HaltReason),
    Cancelled,
}

pub struct SyncOrchestrator {
    scanner: DiscoveryScanner,
    connector: Arc<dyn LinkConnector>,
    sink: Arc<dyn LogSink>,
    slot: SessionSlot,
    policy: RetryPolicy,
    events: mpsc::Sender<SyncEvent>,
    faults: u32,
    attempt: u32,
    state: SyncState,
}

impl SyncOrchestrator {
    pub fn new(
        scanner: DiscoveryScanner,
        connector: Arc<dyn LinkConnector>,
        sink: Arc<dyn LogSink>,
        events: mpsc::Sender<SyncEvent>,
    ) -> Self {
        Self {
            scanner,
            connector,
            sink,
            slot: SessionSlot::new(),
            policy: RetryPolicy::default(),
            events,
            faults: 0,
            attempt: 0,
            state: SyncState::Idle,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Shares a transfer slot with other roles in the same process.
    pub fn with_slot(mut self, slot: SessionSlot) -> Self {
        self.slot = slot;
        self
    }

    pub fn slot(&self) -> SessionSlot {
        self.slot.clone()
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    /// Faults since the last completed transfer or halt.
    pub fn fault_count(&self) -> u32 {
        self.faults
    }

    /// Loops until halted or cancelled. Every exit path leaves the scanner
    /// stopped and no link open.
    pub async fn run(&mut self, cancel: CancellationToken) -> CycleExit {
        info!("Sync loop started");
        let exit = loop {
            let step = self.cycle(&cancel).await;
            self.stop_scanner().await;

            match step {
                Ok(Step::Next) => continue,
                Ok(Step::Halt(reason)) => break CycleExit::Halted(reason),
                Ok(Step::Cancelled) => break CycleExit::Cancelled,
                Err(e) => {
                    self.faults += 1;
                    error!(
                        "Sync fault {}/{}: {}",
                        self.faults, self.policy.max_faults, e
                    );
                    self.emit(SyncEvent::Fault {
                        attempt: self.faults,
                        message: e.to_string(),
                    })
                    .await;

                    if self.faults >= self.policy.max_faults {
                        self.faults = 0;
                        break CycleExit::Halted(HaltReason::FaultBudgetExhausted);
                    }
                    if !pause(self.policy.fault_delay, &cancel).await {
                        break CycleExit::Cancelled;
                    }
                }
            }
        };

        match exit {
            CycleExit::Halted(reason) => {
                warn!("Sync loop halted: {:?}", reason);
                self.state = SyncState::Halted;
                self.emit(SyncEvent::Halted(reason)).await;
            }
            CycleExit::Cancelled => {
                info!("Sync loop stopped");
                self.state = SyncState::Idle;
                self.emit(SyncEvent::Stopped).await;
            }
        }
        exit
    }

    async fn cycle(&mut self, cancel: &CancellationToken) -> Result<Step, OrchestratorError> {
        self.enter(SyncState::Scanning).await;
        let Some(peer) = self.discover(cancel).await? else {
            return Ok(Step::Cancelled);
        };
        self.scanner.stop_scanning().await?;
        info!("Found peer {}", peer.address);
        self.emit(SyncEvent::PeerFound(peer.clone())).await;

        self.enter(SyncState::Connecting).await;
        let guard = self.slot.try_acquire(&peer.address)?;
        self.attempt += 1;
        let mut session = ReceiverSession::new(peer.address.clone(), self.attempt)
            .with_timeouts(self.policy.connect_timeout, self.policy.read_timeout);

        let outcome = match session.connect(self.connector.as_ref(), cancel).await {
            Ok(link) => {
                self.enter(SyncState::Receiving).await;
                session.run_on(link, self.sink.as_ref(), cancel).await
            }
            Err(outcome) => outcome,
        };
        drop(guard);

        match outcome {
            SessionOutcome::Completed { records, stored } => {
                info!(
                    "Stored {} of {} received logs from {}",
                    stored,
                    records.len(),
                    peer.address
                );
                self.faults = 0;
                self.emit(SyncEvent::TransferCompleted {
                    peer: peer.address,
                    received: records.len(),
                    stored,
                })
                .await;
                self.cooldown(cancel).await
            }
            SessionOutcome::Failed { reason, detail } => {
                self.emit(SyncEvent::TransferFailed {
                    peer: peer.address,
                    reason,
                    detail,
                })
                .await;
                if reason == FailureReason::NoLogs {
                    Ok(Step::Halt(HaltReason::NoLogs))
                } else {
                    self.cooldown(cancel).await
                }
            }
            SessionOutcome::Unstored { error, .. } => Err(OrchestratorError::Persist(error)),
            SessionOutcome::Cancelled => Ok(Step::Cancelled),
        }
    }

    /// Waits for the first peer. `None` means cancelled.
    async fn discover(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<Option<PeerRecord>, OrchestratorError> {
        let mut peers = self.scanner.start_channel(PEER_QUEUE).await?;
        let waited = self.policy.discovery_timeout;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(None),
                found = peers.recv() => {
                    return match found {
                        Some(peer) => Ok(Some(peer)),
                        None => Err(OrchestratorError::DiscoveryEnded),
                    };
                }
                _ = tokio::time::sleep(waited) => {
                    info!("No peer after {:?}, still scanning", waited);
                    self.emit(SyncEvent::DiscoveryTimeout { waited }).await;
                }
            }
        }
    }

    async fn cooldown(&mut self, cancel: &CancellationToken) -> Result<Step, OrchestratorError> {
        self.enter(SyncState::Cooldown).await;
        if pause(self.policy.cooldown, cancel).await {
            Ok(Step::Next)
        } else {
            Ok(Step::Cancelled)
        }
    }

    async fn stop_scanner(&mut self) {
        if let Err(e) = self.scanner.stop_scanning().await {
            warn!("Stopping discovery failed: {}", e);
        }
    }

    async fn enter(&mut self, state: SyncState) {
        if self.state != state {
            debug!("Sync state {} -> {}", self.state, state);
        }
        self.state = state;
        self.emit(SyncEvent::StateChanged(state)).await;
    }

    async fn emit(&self, ev: SyncEvent) {
        let _ = self.events.send(ev).await;
    }
}

/// False when cancelled before `delay` elapsed.
async fn pause(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
