pub mod adapters;
pub mod domain;
pub mod orchestrator;
pub mod pairing;
pub mod persistence;
pub mod ports;
pub mod recorder;
pub mod service;
pub mod slot;
pub mod status;

pub use adapters::{SettingsSnapshot, StoreAdapter};
pub use domain::AppSettings;
pub use orchestrator::{CycleExit, HaltReason, OrchestratorError, RetryPolicy, SyncOrchestrator};
pub use pairing::{Paired, PairingError, PairingFlow};
pub use persistence::FilePersistence;
pub use ports::*;
pub use recorder::{AttendanceRecorder, RecordError, RecordOutcome};
pub use service::{ServiceError, SyncService};
pub use slot::{SessionSlot, SlotError, SlotGuard};
pub use status::{reduce, StatusStore, SyncEvent, SyncState, SyncStatus};
