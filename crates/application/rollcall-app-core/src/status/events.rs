use std::fmt;
use std::time::Duration;

use rollcall_core::PeerRecord;
use rollcall_pipeline::FailureReason;

use crate::orchestrator::HaltReason;

/// Coarse state of the background receive loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncState {
    #[default]
    Idle,
    Scanning,
    Connecting,
    Receiving,
    Cooldown,
    Halted,
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SyncState::Idle => "idle",
            SyncState::Scanning => "scanning",
            SyncState::Connecting => "connecting",
            SyncState::Receiving => "receiving",
            SyncState::Cooldown => "cooling down",
            SyncState::Halted => "halted",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub enum SyncEvent {
    StateChanged(SyncState),
    DiscoveryTimeout {
        waited: Duration,
    },
    PeerFound(PeerRecord),
    TransferCompleted {
        peer: String,
        received: usize,
        stored: usize,
    },
    TransferFailed {
        peer: String,
        reason: FailureReason,
        detail: String,
    },
    Fault {
        attempt: u32,
        message: String,
    },
    Halted(HaltReason),
    Stopped,
}
