use std::collections::BTreeSet;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use rollcall_core::radio::{BoxedLink, LinkConnector};
use rollcall_core::{EntryExitStatus, RecordId, ScanLogRecord, Student};
use rollcall_pipeline::frame::{Control, FrameStream};
use rollcall_pipeline::{
    FailureReason, HostOutcome, HostSession, LogSink, Outbox, ReceiverSession, SessionError,
    SessionOutcome, SessionState,
};
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct MemoryOutbox {
    records: Vec<ScanLogRecord>,
    sent: Mutex<BTreeSet<RecordId>>,
}

impl MemoryOutbox {
    fn with(records: Vec<ScanLogRecord>) -> Self {
        Self {
            records,
            sent: Mutex::default(),
        }
    }

    fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

impl Outbox for MemoryOutbox {
    fn pending(&self) -> anyhow::Result<Vec<ScanLogRecord>> {
        let sent = self.sent.lock().unwrap();
        Ok(self
            .records
            .iter()
            .filter(|r| !sent.contains(&r.id))
            .cloned()
            .collect())
    }

    fn mark_sent(&self, ids: &[RecordId]) -> anyhow::Result<usize> {
        let mut sent = self.sent.lock().unwrap();
        Ok(ids.iter().filter(|id| sent.insert((*id).clone())).count())
    }
}

#[derive(Default)]
struct MemorySink {
    stored: Mutex<Vec<ScanLogRecord>>,
    failing: AtomicBool,
}

impl LogSink for MemorySink {
    fn persist(&self, records: &[ScanLogRecord]) -> anyhow::Result<usize> {
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("disk full");
        }
        self.stored.lock().unwrap().extend_from_slice(records);
        Ok(records.len())
    }
}

fn records(n: usize) -> Vec<ScanLogRecord> {
    let student = Student {
        id: "s-1".into(),
        name: "Ana Cruz".into(),
        grade_level: "7".into(),
        section: "Rizal".into(),
    };
    (0..n)
        .map(|i| {
            let ts = Utc.with_ymd_and_hms(2024, 5, 2, 8, 0, 0).unwrap() + chrono::Duration::minutes(i as i64);
            ScanLogRecord::new(&student, EntryExitStatus::In, ts)
        })
        .collect()
}

const READ: Duration = Duration::from_secs(2);

#[tokio::test]
async fn receiver_gets_every_record_and_host_marks_them_sent() {
    let outbox = MemoryOutbox::with(records(40));
    let (host_end, recv_end) = tokio::io::duplex(1024);
    let cancel = CancellationToken::new();
    let sink = MemorySink::default();

    let mut host = HostSession::new("receiver").with_read_timeout(READ);
    let mut receiver = ReceiverSession::new("host", 1).with_timeouts(READ, READ);

    let (served, received) = tokio::join!(
        host.serve(host_end, &outbox, &cancel),
        receiver.run_on(recv_end, &sink, &cancel)
    );

    assert_eq!(served.unwrap(), HostOutcome::Delivered(40));
    let SessionOutcome::Completed { records: got, stored } = received else {
        panic!("unexpected outcome {received:?}");
    };
    assert_eq!(got.len(), 40);
    assert_eq!(stored, 40);
    assert_eq!(sink.stored.lock().unwrap().len(), 40);
    assert!(got.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));
    assert!(receiver.session().chunks.len() > 1);
    assert_eq!(receiver.session().state(), SessionState::Completed);
    assert_eq!(outbox.sent_count(), 40);
}

#[tokio::test]
async fn empty_outbox_reports_no_logs() {
    let outbox = MemoryOutbox::default();
    let (host_end, recv_end) = tokio::io::duplex(1024);
    let cancel = CancellationToken::new();
    let sink = MemorySink::default();

    let mut host = HostSession::new("receiver").with_read_timeout(READ);
    let mut receiver = ReceiverSession::new("host", 1).with_timeouts(READ, READ);
    let (served, received) = tokio::join!(
        host.serve(host_end, &outbox, &cancel),
        receiver.run_on(recv_end, &sink, &cancel)
    );

    assert_eq!(served.unwrap(), HostOutcome::NoLogs);
    assert!(matches!(
        received,
        SessionOutcome::Failed {
            reason: FailureReason::NoLogs,
            ..
        }
    ));
    assert_eq!(receiver.session().result_reason(), Some(FailureReason::NoLogs));
}

#[tokio::test]
async fn link_dropped_mid_transfer_is_a_transfer_error() {
    let (host_end, recv_end) = tokio::io::duplex(1024);
    let cancel = CancellationToken::new();
    let sink = MemorySink::default();

    let fake_host = async move {
        let mut frames = FrameStream::new(host_end, READ);
        assert_eq!(frames.read_control().await.unwrap(), Control::Request);
        frames.send_control(Control::Begin(3)).await.unwrap();
        frames.send_line("W10=").await.unwrap();
        // dropped here, two chunks short
    };

    let mut receiver = ReceiverSession::new("host", 1).with_timeouts(READ, READ);
    let (_, received) = tokio::join!(
        fake_host,
        receiver.run_on(recv_end, &sink, &cancel)
    );

    assert!(matches!(
        received,
        SessionOutcome::Failed {
            reason: FailureReason::TransferError,
            ..
        }
    ));
    assert_eq!(receiver.session().chunks.len(), 1);
}

#[tokio::test]
async fn malformed_chunk_fails_decode_without_ack() {
    let (host_end, recv_end) = tokio::io::duplex(1024);
    let cancel = CancellationToken::new();
    let sink = MemorySink::default();

    let fake_host = async move {
        let mut frames = FrameStream::new(host_end, READ);
        frames.read_control().await.unwrap();
        frames.send_control(Control::Begin(1)).await.unwrap();
        frames.send_line("%%%").await.unwrap();
        frames.send_control(Control::End).await.unwrap();
        // The receiver closes instead of acknowledging.
        frames.read_line().await
    };

    let mut receiver = ReceiverSession::new("host", 1).with_timeouts(READ, READ);
    let (after_end, received) = tokio::join!(
        fake_host,
        receiver.run_on(recv_end, &sink, &cancel)
    );

    assert!(matches!(after_end, Err(SessionError::Closed)));
    assert!(matches!(
        received,
        SessionOutcome::Failed {
            reason: FailureReason::TransferError,
            ..
        }
    ));
}

#[tokio::test]
async fn unacknowledged_delivery_stays_pending() {
    let outbox = MemoryOutbox::with(records(3));
    let (host_end, recv_end) = tokio::io::duplex(1024);
    let cancel = CancellationToken::new();

    let silent_receiver = async move {
        let mut frames = FrameStream::new(recv_end, READ);
        frames.send_control(Control::Request).await.unwrap();
        loop {
            if frames.read_line().await.unwrap() == "END" {
                break;
            }
        }
        // dropped without ACK
    };

    let mut host = HostSession::new("receiver").with_read_timeout(READ);
    let (served, _) = tokio::join!(host.serve(host_end, &outbox, &cancel), silent_receiver);

    assert!(served.is_err());
    assert_eq!(outbox.sent_count(), 0);
    assert_eq!(outbox.pending().unwrap().len(), 3);
}

#[tokio::test]
async fn cancel_while_transferring_closes_the_stream() {
    let (host_end, recv_end) = tokio::io::duplex(1024);
    let cancel = CancellationToken::new();
    let sink = MemorySink::default();

    let stalled_host = {
        let cancel = cancel.clone();
        async move {
            let mut frames = FrameStream::new(host_end, Duration::from_secs(30));
            frames.read_control().await.unwrap();
            frames.send_control(Control::Begin(2)).await.unwrap();
            cancel.cancel();
            // The receiver must hang up rather than wait for the rest.
            frames.read_line().await
        }
    };

    let mut receiver =
        ReceiverSession::new("host", 1).with_timeouts(READ, Duration::from_secs(30));
    let (host_side, received) = tokio::join!(
        stalled_host,
        receiver.run_on(recv_end, &sink, &cancel)
    );

    assert!(matches!(received, SessionOutcome::Cancelled));
    assert!(matches!(host_side, Err(SessionError::Closed)));
    assert_eq!(receiver.session().state(), SessionState::Failed);
    assert_eq!(receiver.session().result_reason(), None);
}

#[tokio::test]
async fn failed_store_withholds_ack_and_the_host_keeps_its_records() {
    let outbox = MemoryOutbox::with(records(5));
    let sink = MemorySink::default();
    sink.failing.store(true, Ordering::SeqCst);
    let cancel = CancellationToken::new();

    let (host_end, recv_end) = tokio::io::duplex(1024);
    let mut host = HostSession::new("receiver").with_read_timeout(READ);
    let mut receiver = ReceiverSession::new("host", 1).with_timeouts(READ, READ);
    let (served, received) = tokio::join!(
        host.serve(host_end, &outbox, &cancel),
        receiver.run_on(recv_end, &sink, &cancel)
    );

    assert!(served.is_err());
    assert!(matches!(received, SessionOutcome::Unstored { received: 5, .. }));
    assert_eq!(receiver.session().state(), SessionState::Failed);
    assert_eq!(outbox.sent_count(), 0);
    assert_eq!(outbox.pending().unwrap().len(), 5);

    // The next attempt resends the same records.
    sink.failing.store(false, Ordering::SeqCst);
    let (host_end, recv_end) = tokio::io::duplex(1024);
    let mut host = HostSession::new("receiver").with_read_timeout(READ);
    let mut receiver = ReceiverSession::new("host", 2).with_timeouts(READ, READ);
    let (served, received) = tokio::join!(
        host.serve(host_end, &outbox, &cancel),
        receiver.run_on(recv_end, &sink, &cancel)
    );

    assert_eq!(served.unwrap(), HostOutcome::Delivered(5));
    assert!(matches!(received, SessionOutcome::Completed { stored: 5, .. }));
    assert_eq!(sink.stored.lock().unwrap().len(), 5);
    assert!(outbox.pending().unwrap().is_empty());
}

struct RefusingConnector;

#[async_trait]
impl LinkConnector for RefusingConnector {
    async fn connect(&self, _address: &str) -> io::Result<BoxedLink> {
        Err(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"))
    }
}

#[tokio::test]
async fn refused_connection_is_a_connect_error() {
    let mut receiver = ReceiverSession::new("host", 2);
    let outcome = receiver
        .run(
            &RefusingConnector,
            &MemorySink::default(),
            &CancellationToken::new(),
        )
        .await;
    assert!(matches!(
        outcome,
        SessionOutcome::Failed {
            reason: FailureReason::ConnectError,
            ..
        }
    ));
    assert_eq!(receiver.session().attempt, 2);
}
