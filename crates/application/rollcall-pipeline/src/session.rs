use std::fmt;

use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Host,
    Receiver,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Connected,
    Transferring,
    Completed,
    Failed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Failed)
    }
}

/// Terminal failure classes reported to the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    ConnectError,
    /// Host had nothing to send. Not transient; never retried.
    NoLogs,
    TransferError,
}

impl FailureReason {
    pub fn code(self) -> &'static str {
        match self {
            FailureReason::ConnectError => "CONNECT_ERROR",
            FailureReason::NoLogs => "NO_LOGS",
            FailureReason::TransferError => "TRANSFER_ERROR",
        }
    }

    pub fn is_retryable(self) -> bool {
        !matches!(self, FailureReason::NoLogs)
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Bookkeeping for one transfer. Lives for a single sync cycle.
#[derive(Debug, Clone)]
pub struct TransferSession {
    pub role: Role,
    pub peer_address: String,
    pub attempt: u32,
    /// Chunk frames accumulated so far, in arrival (or send) order.
    pub chunks: Vec<String>,
    state: SessionState,
    result_reason: Option<FailureReason>,
}

impl TransferSession {
    pub fn new(role: Role, peer_address: impl Into<String>, attempt: u32) -> Self {
        Self {
            role,
            peer_address: peer_address.into(),
            attempt,
            chunks: Vec::new(),
            state: SessionState::Idle,
            result_reason: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn result_reason(&self) -> Option<FailureReason> {
        self.result_reason
    }

    pub(crate) fn advance(&mut self, next: SessionState) {
        if self.state.is_terminal() {
            return;
        }
        debug!(
            "{:?} session with {}: {:?} -> {:?}",
            self.role, self.peer_address, self.state, next
        );
        self.state = next;
    }

    /// `reason` is `None` when the session was cancelled rather than failed.
    pub(crate) fn fail(&mut self, reason: Option<FailureReason>) {
        self.advance(SessionState::Failed);
        if self.result_reason.is_none() {
            self.result_reason = reason;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_state_is_sticky() {
        let mut s = TransferSession::new(Role::Receiver, "aa", 1);
        s.advance(SessionState::Connecting);
        s.fail(Some(FailureReason::ConnectError));
        s.advance(SessionState::Connected);
        assert_eq!(s.state(), SessionState::Failed);
        assert_eq!(s.result_reason(), Some(FailureReason::ConnectError));
    }

    #[test]
    fn reason_codes() {
        assert_eq!(FailureReason::NoLogs.code(), "NO_LOGS");
        assert!(!FailureReason::NoLogs.is_retryable());
        assert!(FailureReason::TransferError.is_retryable());
    }
}
