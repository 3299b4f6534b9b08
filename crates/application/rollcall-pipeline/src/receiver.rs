use std::time::Duration;

use rollcall_core::radio::{BoxedLink, LinkConnector};
use rollcall_core::{ChunkCodec, ScanLogRecord};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::frame::{Control, FrameStream};
use crate::session::{FailureReason, Role, SessionState, TransferSession};
use crate::SessionError;

/// Where the receiver stores decoded records before acknowledging them.
pub trait LogSink: Send + Sync + 'static {
    /// Returns how many records were new.
    fn persist(&self, records: &[ScanLogRecord]) -> anyhow::Result<usize>;
}

#[derive(Debug)]
pub enum SessionOutcome {
    Completed {
        records: Vec<ScanLogRecord>,
        stored: usize,
    },
    /// Decoded but not stored. No ACK was sent, so the host keeps them queued.
    Unstored {
        received: usize,
        error: anyhow::Error,
    },
    Failed {
        reason: FailureReason,
        detail: String,
    },
    Cancelled,
}

enum Exchange {
    Stored(Vec<ScanLogRecord>, usize),
    Unstored(usize, anyhow::Error),
    NoLogs,
}

/// Receiver role: connects to a host, requests its unsent records, stores
/// them and only then acknowledges.
pub struct ReceiverSession {
    session: TransferSession,
    codec: ChunkCodec,
    connect_timeout: Duration,
    read_timeout: Duration,
}

impl ReceiverSession {
    pub fn new(peer_address: impl Into<String>, attempt: u32) -> Self {
        Self {
            session: TransferSession::new(Role::Receiver, peer_address, attempt),
            codec: ChunkCodec::default(),
            connect_timeout: rollcall_config::CONNECT_TIMEOUT,
            read_timeout: rollcall_config::FRAME_READ_TIMEOUT,
        }
    }

    pub fn with_timeouts(mut self, connect: Duration, read: Duration) -> Self {
        self.connect_timeout = connect;
        self.read_timeout = read;
        self
    }

    pub fn session(&self) -> &TransferSession {
        &self.session
    }

    /// Connects and runs the whole exchange.
    pub async fn run(
        &mut self,
        connector: &dyn LinkConnector,
        sink: &dyn LogSink,
        cancel: &CancellationToken,
    ) -> SessionOutcome {
        match self.connect(connector, cancel).await {
            Ok(link) => self.run_on(link, sink, cancel).await,
            Err(outcome) => outcome,
        }
    }

    /// Opens the link. On failure the session is already terminal and the
    /// returned outcome says why.
    pub async fn connect(
        &mut self,
        connector: &dyn LinkConnector,
        cancel: &CancellationToken,
    ) -> Result<BoxedLink, SessionOutcome> {
        self.session.advance(SessionState::Connecting);
        let address = self.session.peer_address.clone();

        let connect = tokio::time::timeout(self.connect_timeout, connector.connect(&address));
        let link = tokio::select! {
            _ = cancel.cancelled() => {
                self.session.fail(None);
                return Err(SessionOutcome::Cancelled);
            }
            res = connect => match res {
                Ok(Ok(link)) => link,
                Ok(Err(e)) => return Err(self.failed(FailureReason::ConnectError, e.to_string())),
                Err(_) => {
                    let detail = format!("no link after {:?}", self.connect_timeout);
                    return Err(self.failed(FailureReason::ConnectError, detail));
                }
            },
        };

        self.session.advance(SessionState::Connected);
        Ok(link)
    }

    /// Runs the exchange over an already open stream. The stream is closed
    /// before this returns, whatever the outcome.
    pub async fn run_on<T>(
        &mut self,
        stream: T,
        sink: &dyn LogSink,
        cancel: &CancellationToken,
    ) -> SessionOutcome
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        if self.session.state() == SessionState::Idle {
            self.session.advance(SessionState::Connected);
        }
        let mut frames = FrameStream::new(stream, self.read_timeout);

        let result = tokio::select! {
            _ = cancel.cancelled() => None,
            res = self.exchange(&mut frames, sink) => Some(res),
        };

        if let Err(e) = frames.close().await {
            warn!("Closing link to {} failed: {}", self.session.peer_address, e);
        }
        drop(frames);

        match result {
            None => {
                info!("Transfer from {} cancelled", self.session.peer_address);
                self.session.fail(None);
                SessionOutcome::Cancelled
            }
            Some(Ok(Exchange::Stored(records, stored))) => {
                self.session.advance(SessionState::Completed);
                info!(
                    "Received {} records from {} in {} chunks ({} new)",
                    records.len(),
                    self.session.peer_address,
                    self.session.chunks.len(),
                    stored
                );
                SessionOutcome::Completed { records, stored }
            }
            Some(Ok(Exchange::Unstored(received, error))) => {
                warn!(
                    "Dropped {} records from {} unacknowledged: {:#}",
                    received, self.session.peer_address, error
                );
                self.session.fail(None);
                SessionOutcome::Unstored { received, error }
            }
            Some(Ok(Exchange::NoLogs)) => {
                self.failed(FailureReason::NoLogs, "host has no unsent logs".into())
            }
            Some(Err(e)) => self.failed(FailureReason::TransferError, e.to_string()),
        }
    }

    async fn exchange<T>(
        &mut self,
        frames: &mut FrameStream<T>,
        sink: &dyn LogSink,
    ) -> Result<Exchange, SessionError>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        self.session.advance(SessionState::Transferring);
        frames.send_control(Control::Request).await?;

        let expected = match frames.read_control().await? {
            Control::NoLogs => return Ok(Exchange::NoLogs),
            Control::Begin(n) => n,
            other => return Err(SessionError::Protocol(format!("expected BEGIN, got {other}"))),
        };

        self.session.chunks.clear();
        self.session.chunks.reserve(expected.min(1024));
        for _ in 0..expected {
            let chunk = frames.read_line().await?;
            self.session.chunks.push(chunk);
        }
        match frames.read_control().await? {
            Control::End => {}
            other => return Err(SessionError::Protocol(format!("expected END, got {other}"))),
        }

        let records = self.codec.decode_records(&self.session.chunks)?;
        let stored = match sink.persist(&records) {
            Ok(stored) => stored,
            Err(e) => return Ok(Exchange::Unstored(records.len(), e)),
        };
        frames.send_control(Control::Ack(records.len())).await?;
        Ok(Exchange::Stored(records, stored))
    }

    fn failed(&mut self, reason: FailureReason, detail: String) -> SessionOutcome {
        warn!(
            "Transfer from {} failed ({}): {}",
            self.session.peer_address, reason, detail
        );
        self.session.fail(Some(reason));
        SessionOutcome::Failed { reason, detail }
    }
}
