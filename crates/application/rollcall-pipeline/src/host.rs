use std::sync::Arc;
use std::time::Duration;

use rollcall_core::radio::LinkListener;
use rollcall_core::{sort_newest_first, ChunkCodec, RecordId, ScanLogRecord};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::frame::{Control, FrameStream};
use crate::session::{Role, SessionState, TransferSession};
use crate::SessionError;

/// Records waiting to be handed to a receiver.
pub trait Outbox: Send + Sync {
    fn pending(&self) -> anyhow::Result<Vec<ScanLogRecord>>;
    /// Returns how many of `ids` were still pending.
    fn mark_sent(&self, ids: &[RecordId]) -> anyhow::Result<usize>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostOutcome {
    Delivered(usize),
    NoLogs,
    Cancelled,
}

/// Host role: answers one receiver request from the outbox.
pub struct HostSession {
    session: TransferSession,
    codec: ChunkCodec,
    read_timeout: Duration,
}

impl HostSession {
    pub fn new(peer_address: impl Into<String>) -> Self {
        let mut session = TransferSession::new(Role::Host, peer_address, 1);
        session.advance(SessionState::Connected);
        Self {
            session,
            codec: ChunkCodec::default(),
            read_timeout: rollcall_config::FRAME_READ_TIMEOUT,
        }
    }

    pub fn with_codec(mut self, codec: ChunkCodec) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    pub fn session(&self) -> &TransferSession {
        &self.session
    }

    /// Serves a single request on `stream` and closes it.
    pub async fn serve<T>(
        &mut self,
        stream: T,
        outbox: &dyn Outbox,
        cancel: &CancellationToken,
    ) -> Result<HostOutcome, SessionError>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        let mut frames = FrameStream::new(stream, self.read_timeout);
        let result = tokio::select! {
            _ = cancel.cancelled() => Ok(HostOutcome::Cancelled),
            res = self.exchange(&mut frames, outbox) => res,
        };
        if let Err(e) = frames.close().await {
            debug!("Closing link to {} failed: {}", self.session.peer_address, e);
        }

        match &result {
            Ok(HostOutcome::Delivered(_)) => self.session.advance(SessionState::Completed),
            Ok(HostOutcome::NoLogs) => self.session.advance(SessionState::Completed),
            Ok(HostOutcome::Cancelled) => self.session.fail(None),
            Err(e) => {
                warn!("Serving {} failed: {}", self.session.peer_address, e);
                self.session.fail(Some(crate::FailureReason::TransferError));
            }
        }
        result
    }

    async fn exchange<T>(
        &mut self,
        frames: &mut FrameStream<T>,
        outbox: &dyn Outbox,
    ) -> Result<HostOutcome, SessionError>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        match frames.read_control().await? {
            Control::Request => {}
            other => return Err(SessionError::Protocol(format!("expected REQ, got {other}"))),
        }
        self.session.advance(SessionState::Transferring);

        let mut records = outbox.pending().map_err(SessionError::Outbox)?;
        if records.is_empty() {
            info!("No unsent logs for {}", self.session.peer_address);
            frames.send_control(Control::NoLogs).await?;
            return Ok(HostOutcome::NoLogs);
        }
        sort_newest_first(&mut records);

        self.session.chunks = self.codec.encode_records(&records)?;
        frames
            .send_control(Control::Begin(self.session.chunks.len()))
            .await?;
        for chunk in &self.session.chunks {
            frames.send_line(chunk).await?;
        }
        frames.send_control(Control::End).await?;

        match frames.read_control().await? {
            Control::Ack(n) if n == records.len() => {}
            Control::Ack(n) => {
                return Err(SessionError::Protocol(format!(
                    "receiver acknowledged {n} of {} records",
                    records.len()
                )))
            }
            other => return Err(SessionError::Protocol(format!("expected ACK, got {other}"))),
        }

        let ids: Vec<RecordId> = records.iter().map(|r| r.id.clone()).collect();
        let marked = outbox.mark_sent(&ids).map_err(SessionError::Outbox)?;
        info!(
            "Delivered {} records to {} ({} newly marked sent)",
            records.len(),
            self.session.peer_address,
            marked
        );
        Ok(HostOutcome::Delivered(records.len()))
    }
}

/// Accepts links one at a time and serves each to completion before the
/// next, so a host never runs two transfers at once.
pub async fn serve_links(
    listener: &mut dyn LinkListener,
    outbox: Arc<dyn Outbox>,
    cancel: CancellationToken,
) -> Result<(), SessionError> {
    loop {
        let (link, peer) = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            accepted = listener.accept() => accepted?,
        };
        info!("Link from {}", peer);
        let mut host = HostSession::new(peer);
        // A broken transfer only ends that link; unacknowledged records stay pending.
        if let Ok(HostOutcome::Cancelled) = host.serve(link, outbox.as_ref(), &cancel).await {
            return Ok(());
        }
    }
}
