use chrono::{DateTime, Utc};

use crate::orchestrator::HaltReason;

use super::events::{SyncEvent, SyncState};

/// What the status notification shows. Rebuilt from [`SyncEvent`]s only.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncStatus {
    pub state: SyncState,
    pub last_reason: Option<String>,
    pub peer: Option<String>,
    pub transfers_completed: u32,
    pub transfers_failed: u32,
    pub records_received: usize,
    pub faults: u32,
    pub discovery_timeouts: u32,
    pub halted: Option<HaltReason>,
    pub last_sync_at: Option<DateTime<Utc>>,
}

impl SyncStatus {
    /// One line of plain text for the user.
    pub fn describe(&self) -> String {
        match self.state {
            SyncState::Idle => "Sync is off".to_string(),
            SyncState::Scanning if self.discovery_timeouts > 0 => {
                "Still looking for a nearby scanner".to_string()
            }
            SyncState::Scanning => "Looking for a nearby scanner".to_string(),
            SyncState::Connecting => match &self.peer {
                Some(peer) => format!("Connecting to {peer}"),
                None => "Connecting".to_string(),
            },
            SyncState::Receiving => "Receiving attendance logs".to_string(),
            SyncState::Cooldown => match &self.last_reason {
                Some(reason) => format!("Waiting before the next sync ({reason})"),
                None => "Waiting before the next sync".to_string(),
            },
            SyncState::Halted => match self.halted {
                Some(HaltReason::NoLogs) => {
                    "Sync stopped: the scanner has no new logs".to_string()
                }
                Some(HaltReason::FaultBudgetExhausted) => {
                    "Sync stopped after repeated errors".to_string()
                }
                None => "Sync stopped".to_string(),
            },
        }
    }
}

pub fn reduce(mut status: SyncStatus, ev: SyncEvent) -> SyncStatus {
    match ev {
        SyncEvent::StateChanged(state) => {
            if state == SyncState::Scanning {
                status.halted = None;
                status.peer = None;
            }
            status.state = state;
        }

        SyncEvent::DiscoveryTimeout { .. } => status.discovery_timeouts += 1,

        SyncEvent::PeerFound(peer) => {
            status.discovery_timeouts = 0;
            status.peer = Some(peer.display_name.unwrap_or(peer.address));
        }

        SyncEvent::TransferCompleted { received, .. } => {
            status.transfers_completed += 1;
            status.records_received += received;
            status.faults = 0;
            status.last_reason = Some(format!("received {received} logs"));
            status.last_sync_at = Some(Utc::now());
        }

        SyncEvent::TransferFailed { reason, .. } => {
            status.transfers_failed += 1;
            status.last_reason = Some(match reason {
                rollcall_pipeline::FailureReason::ConnectError => "could not connect".to_string(),
                rollcall_pipeline::FailureReason::NoLogs => "no new logs".to_string(),
                rollcall_pipeline::FailureReason::TransferError => {
                    "transfer interrupted".to_string()
                }
            });
        }

        SyncEvent::Fault { attempt, .. } => {
            status.faults = attempt;
            status.last_reason = Some("unexpected error".to_string());
        }

        SyncEvent::Halted(reason) => {
            status.state = SyncState::Halted;
            status.halted = Some(reason);
            if reason == HaltReason::FaultBudgetExhausted {
                status.faults = 0;
            }
        }

        SyncEvent::Stopped => {
            status.state = SyncState::Idle;
            status.peer = None;
        }
    }
    status
}
