pub mod events;
pub mod reducer;
pub mod store;

pub use events::{SyncEvent, SyncState};
pub use reducer::{reduce, SyncStatus};
pub use store::StatusStore;
