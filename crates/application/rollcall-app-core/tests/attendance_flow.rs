use std::sync::Arc;
use std::time::Duration;

use camino::Utf8PathBuf;
use chrono::{DateTime, TimeZone, Utc};
use rollcall_app_core::{
    AttendanceRecorder, CycleExit, FilePersistence, HaltReason, RecordError, RecordOutcome,
    RetryPolicy, SettingsRepo, SettingsSnapshot, StoreAdapter, SyncOrchestrator,
};
use rollcall_core::{Direction, DuplicateScanDetector, EntryExitStatus, Student, SERVICE_UUID};
use rollcall_infra::{Beacon, BeaconAdvertiser, TcpLinkConnector, TcpLinkListener, UdpDiscovery};
use rollcall_persistence::{LogStore, RedbLogStore};
use rollcall_pipeline::serve_links;
use rollcall_scanner::DiscoveryScanner;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn store_in(dir: &tempfile::TempDir, name: &str) -> Arc<RedbLogStore> {
    let root = Utf8PathBuf::from_path_buf(dir.path().join(name)).unwrap();
    std::fs::create_dir_all(&root).unwrap();
    Arc::new(RedbLogStore::new(root))
}

fn at(day: u32, h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, day, h, m, 0).unwrap()
}

fn ana() -> Student {
    Student {
        id: "s-1".into(),
        name: "Ana Cruz".into(),
        grade_level: "7".into(),
        section: "Rizal".into(),
    }
}

fn recorder(dir: &tempfile::TempDir, store: Arc<RedbLogStore>) -> (AttendanceRecorder, FilePersistence) {
    let files = FilePersistence::in_dir(dir.path().join("config"));
    let mut settings = files.load_or_init().unwrap();
    settings
        .school
        .set_window(Direction::Entry, "08:00", "08:30")
        .unwrap();
    files.save(&settings).unwrap();

    let detector = DuplicateScanDetector::new(
        Arc::new(StoreAdapter::new(store.clone())),
        Arc::new(SettingsSnapshot(Arc::new(files.clone()))),
    );
    (AttendanceRecorder::new(store, detector), files)
}

#[test]
fn repeated_taps_inside_the_window_are_recorded_once() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir, "scanner");
    store.upsert_student(&ana()).unwrap();
    let (recorder, _files) = recorder(&dir, store.clone());

    let first = recorder.record("s-1", Direction::Entry, at(2, 8, 5)).unwrap();
    let RecordOutcome::Recorded(rec) = first else {
        panic!("first tap should be recorded");
    };
    assert_eq!(rec.student_name, "Ana Cruz");
    assert_eq!(rec.entry_exit_status, EntryExitStatus::In);

    assert_eq!(
        recorder.record("s-1", Direction::Entry, at(2, 8, 20)).unwrap(),
        RecordOutcome::Duplicate
    );
    assert!(matches!(
        recorder.record("s-1", Direction::Entry, at(2, 8, 35)).unwrap(),
        RecordOutcome::Recorded(_)
    ));
    assert!(matches!(
        recorder.record("s-1", Direction::Entry, at(3, 8, 5)).unwrap(),
        RecordOutcome::Recorded(_)
    ));

    assert_eq!(store.unsent_logs().unwrap().len(), 3);
}

#[test]
fn window_edits_apply_to_the_next_tap() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir, "scanner");
    store.upsert_student(&ana()).unwrap();
    let (recorder, files) = recorder(&dir, store);

    recorder.record("s-1", Direction::Entry, at(2, 8, 45)).unwrap();
    assert!(matches!(
        recorder.record("s-1", Direction::Entry, at(2, 8, 50)).unwrap(),
        RecordOutcome::Recorded(_)
    ));

    let mut settings = files.load().unwrap();
    settings
        .school
        .set_window(Direction::Entry, "08:00", "09:00")
        .unwrap();
    files.save(&settings).unwrap();

    assert_eq!(
        recorder.record("s-1", Direction::Entry, at(2, 8, 55)).unwrap(),
        RecordOutcome::Duplicate
    );
}

#[test]
fn unknown_student_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir, "scanner");
    let (recorder, _files) = recorder(&dir, store.clone());

    let err = recorder
        .record("nobody", Direction::Exit, at(2, 15, 0))
        .unwrap_err();
    assert!(matches!(err, RecordError::UnknownStudent(id) if id == "nobody"));
    assert!(store.load_logs().unwrap().is_empty());
}

#[tokio::test]
async fn records_travel_from_scanner_to_receiver_over_loopback() {
    let dir = tempfile::tempdir().unwrap();
    let scanner_store = store_in(&dir, "scanner");
    let receiver_store = store_in(&dir, "receiver");
    scanner_store.upsert_student(&ana()).unwrap();
    let (recorder, _files) = recorder(&dir, scanner_store.clone());
    recorder.record("s-1", Direction::Entry, at(2, 8, 5)).unwrap();
    recorder.record("s-1", Direction::Exit, at(2, 15, 5)).unwrap();

    let cancel = CancellationToken::new();

    // Scanner side: serve the outbox and advertise it.
    let mut listener = TcpLinkListener::bind("127.0.0.1:0".parse().unwrap())
        .await
        .unwrap();
    let link = listener.local_addr().unwrap();
    let outbox = Arc::new(StoreAdapter::new(scanner_store.clone()));
    let serving = {
        let cancel = cancel.clone();
        tokio::spawn(async move { serve_links(&mut listener, outbox, cancel).await })
    };

    let scan_port = std::net::UdpSocket::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let scan_addr = format!("127.0.0.1:{scan_port}").parse().unwrap();
    let discovery = Arc::new(UdpDiscovery::new(scan_addr));

    let beacon = Beacon {
        service_ids: vec![SERVICE_UUID],
        name: Some("gate".into()),
        link,
    };
    let advertiser = BeaconAdvertiser::bind("127.0.0.1:0".parse().unwrap(), scan_addr, &beacon)
        .await
        .unwrap()
        .with_interval(Duration::from_millis(50));
    let advertising = tokio::spawn(advertiser.run(cancel.clone()));

    // Receiver side.
    let (tx, mut events) = mpsc::channel(256);
    let mut orchestrator = SyncOrchestrator::new(
        DiscoveryScanner::new(discovery),
        Arc::new(TcpLinkConnector),
        Arc::new(StoreAdapter::new(receiver_store.clone())),
        tx,
    )
    .with_policy(RetryPolicy {
        cooldown: Duration::from_millis(50),
        fault_delay: Duration::from_millis(50),
        ..RetryPolicy::default()
    });
    let drain = tokio::spawn(async move { while events.recv().await.is_some() {} });

    let exit = tokio::time::timeout(Duration::from_secs(20), orchestrator.run(CancellationToken::new()))
        .await
        .unwrap();

    // First cycle moves both records, the second finds the outbox empty.
    assert_eq!(exit, CycleExit::Halted(HaltReason::NoLogs));
    let received = receiver_store.load_logs().unwrap();
    assert_eq!(received.len(), 2);
    assert_eq!(received[0].entry_exit_status, EntryExitStatus::Out);
    assert!(scanner_store.unsent_logs().unwrap().is_empty());

    cancel.cancel();
    serving.await.unwrap().unwrap();
    advertising.await.unwrap().unwrap();
    drop(orchestrator);
    drain.await.unwrap();
}
