//! Connection-oriented transfer of scan logs between a host and a receiver.

pub mod frame;
pub mod host;
pub mod receiver;
pub mod session;

pub use host::{serve_links, HostOutcome, HostSession, Outbox};
pub use receiver::{LogSink, ReceiverSession, SessionOutcome};
pub use session::{FailureReason, Role, SessionState, TransferSession};

use rollcall_core::CodecError;

/// Anything that breaks an open transfer. All of these surface to the
/// orchestrator as [`FailureReason::TransferError`].
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Frame error: {0}")]
    Frame(#[from] tokio_util::codec::LinesCodecError),
    #[error("No frame within {0:?}")]
    Timeout(std::time::Duration),
    #[error("Peer closed the link")]
    Closed,
    #[error("Protocol error: {0}")]
    Protocol(String),
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
    #[error("Outbox error: {0}")]
    Outbox(anyhow::Error),
}
