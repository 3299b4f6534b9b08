use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rollcall_core::radio::{Advertisement, DiscoveryBackend, ScanSession};
use rollcall_core::SERVICE_UUID;
use rollcall_scanner::{DiscoveryScanner, ScanEnd, ScannerError};
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Default)]
struct Counters {
    opened: AtomicUsize,
    closed: AtomicUsize,
}

struct ScriptedBackend {
    feed: Mutex<Option<mpsc::UnboundedReceiver<Advertisement>>>,
    counters: Arc<Counters>,
}

struct ScriptedSession {
    feed: mpsc::UnboundedReceiver<Advertisement>,
    counters: Arc<Counters>,
}

#[async_trait]
impl DiscoveryBackend for ScriptedBackend {
    async fn open_scan(&self) -> io::Result<Box<dyn ScanSession>> {
        let feed = self
            .feed
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "radio busy"))?;
        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedSession {
            feed,
            counters: self.counters.clone(),
        }))
    }
}

#[async_trait]
impl ScanSession for ScriptedSession {
    async fn next_advertisement(&mut self) -> io::Result<Option<Advertisement>> {
        Ok(self.feed.recv().await)
    }

    async fn close(&mut self) -> io::Result<()> {
        self.counters.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn backend() -> (
    Arc<ScriptedBackend>,
    mpsc::UnboundedSender<Advertisement>,
    Arc<Counters>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let counters = Arc::new(Counters::default());
    let backend = Arc::new(ScriptedBackend {
        feed: Mutex::new(Some(rx)),
        counters: counters.clone(),
    });
    (backend, tx, counters)
}

fn ad(address: &str, service: Uuid) -> Advertisement {
    Advertisement {
        address: address.into(),
        local_name: Some(format!("host-{address}")),
        service_ids: vec![service],
        received_at: chrono::Utc::now(),
    }
}

#[tokio::test]
async fn only_matching_service_is_reported() {
    let (backend, feed, counters) = backend();
    let mut scanner = DiscoveryScanner::new(backend);
    let mut peers = scanner.start_channel(8).await.unwrap();

    feed.send(ad("aa", Uuid::new_v4())).unwrap();
    feed.send(ad("bb", SERVICE_UUID)).unwrap();
    feed.send(ad("bb", SERVICE_UUID)).unwrap();

    assert_eq!(peers.recv().await.unwrap().address, "bb");
    // Repeats are passed through, not suppressed.
    assert_eq!(peers.recv().await.unwrap().address, "bb");

    assert_eq!(scanner.stop_scanning().await.unwrap(), ScanEnd::Stopped);
    assert_eq!(counters.closed.load(Ordering::SeqCst), 1);
    assert!(peers.recv().await.is_none());
}

#[tokio::test]
async fn custom_service_id_ignores_the_default_beacon() {
    let (backend, feed, _counters) = backend();
    let other = Uuid::new_v4();
    let mut scanner = DiscoveryScanner::new(backend).with_service_id(other);
    let mut peers = scanner.start_channel(8).await.unwrap();

    feed.send(ad("aa", SERVICE_UUID)).unwrap();
    feed.send(ad("bb", other)).unwrap();

    assert_eq!(peers.recv().await.unwrap().address, "bb");
    scanner.stop_scanning().await.unwrap();
}

#[tokio::test]
async fn stop_condition_ends_scan_and_releases_session() {
    let (backend, feed, counters) = backend();
    let mut scanner = DiscoveryScanner::new(backend);
    scanner.set_stop_condition(|peer| peer.address == "cc");

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    scanner
        .start_scanning(move |peer| sink.lock().unwrap().push(peer.address))
        .await
        .unwrap();

    feed.send(ad("bb", SERVICE_UUID)).unwrap();
    feed.send(ad("cc", SERVICE_UUID)).unwrap();
    feed.send(ad("dd", SERVICE_UUID)).unwrap();

    tokio::time::timeout(Duration::from_secs(5), async {
        while scanner.is_scanning() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();

    assert_eq!(*seen.lock().unwrap(), vec!["bb".to_string(), "cc".to_string()]);
    assert_eq!(counters.closed.load(Ordering::SeqCst), 1);
    assert_eq!(scanner.stop_scanning().await.unwrap(), ScanEnd::ConditionMet);
}

#[tokio::test]
async fn second_start_while_running_is_rejected() {
    let (backend, _feed, counters) = backend();
    let mut scanner = DiscoveryScanner::new(backend);
    scanner.start_scanning(|_| {}).await.unwrap();

    let err = scanner.start_scanning(|_| {}).await.unwrap_err();
    assert!(matches!(err, ScannerError::AlreadyScanning));
    assert_eq!(counters.opened.load(Ordering::SeqCst), 1);

    scanner.stop_scanning().await.unwrap();
    assert_eq!(counters.closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn backend_end_closes_session() {
    let (backend, feed, counters) = backend();
    let mut scanner = DiscoveryScanner::new(backend);
    let mut peers = scanner.start_channel(1).await.unwrap();
    drop(feed);

    assert!(peers.recv().await.is_none());
    assert_eq!(scanner.stop_scanning().await.unwrap(), ScanEnd::BackendClosed);
    assert_eq!(counters.closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn open_failure_is_reported_synchronously() {
    let (backend, _feed, _counters) = backend();
    let mut scanner = DiscoveryScanner::new(backend);
    scanner.start_scanning(|_| {}).await.unwrap();
    scanner.stop_scanning().await.unwrap();

    // The scripted radio only opens once.
    let err = scanner.start_scanning(|_| {}).await.unwrap_err();
    assert!(matches!(err, ScannerError::Io(_)));
    assert!(!scanner.is_scanning());
}
