//! UDP broadcast beacons standing in for radio advertisements.
//!
//! A host periodically broadcasts a small JSON datagram naming the services
//! it offers and the address its link listener accepts on. Scanners bind the
//! beacon port and turn each datagram into an [`Advertisement`].

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use rollcall_core::radio::{Advertisement, DiscoveryBackend, ScanSession};
use serde::{Deserialize, Serialize};
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

const MAX_DATAGRAM: usize = 1024;

#[derive(Debug, thiserror::Error)]
pub enum BeaconError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Malformed beacon: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("Beacon too large ({0} bytes)")]
    TooLarge(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Beacon {
    #[serde(rename = "svc")]
    pub service_ids: Vec<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// `host:port` of the link listener. An unspecified host means "the
    /// address this beacon came from".
    pub link: SocketAddr,
}

impl Beacon {
    pub fn encode(&self) -> Result<Vec<u8>, BeaconError> {
        let bytes = serde_json::to_vec(self)?;
        if bytes.len() > MAX_DATAGRAM {
            return Err(BeaconError::TooLarge(bytes.len()));
        }
        Ok(bytes)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, BeaconError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Link address as seen by a scanner that received this beacon from `source`.
    pub fn resolve_link(&self, source: IpAddr) -> SocketAddr {
        if self.link.ip().is_unspecified() {
            SocketAddr::new(source, self.link.port())
        } else {
            self.link
        }
    }
}

/// Broadcasts one beacon on a fixed interval until cancelled.
pub struct BeaconAdvertiser {
    socket: UdpSocket,
    target: SocketAddr,
    payload: Vec<u8>,
    interval: Duration,
}

impl BeaconAdvertiser {
    pub async fn bind(
        bind: SocketAddr,
        target: SocketAddr,
        beacon: &Beacon,
    ) -> Result<Self, BeaconError> {
        let socket = UdpSocket::bind(bind).await?;
        if target.ip().is_unspecified() || is_broadcast(target.ip()) {
            socket.set_broadcast(true)?;
        }
        Ok(Self {
            socket,
            target,
            payload: beacon.encode()?,
            interval: rollcall_config::BEACON_INTERVAL,
        })
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub async fn run(self, cancel: CancellationToken) -> Result<(), BeaconError> {
        info!("Advertising to {} every {:?}", self.target, self.interval);
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Advertising stopped");
                    return Ok(());
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.socket.send_to(&self.payload, self.target).await {
                        // A down interface should not end advertising for good.
                        warn!("Beacon send to {} failed: {}", self.target, e);
                    }
                }
            }
        }
    }
}

fn is_broadcast(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_broadcast() || v4.octets()[3] == 255,
        IpAddr::V6(_) => false,
    }
}

/// [`DiscoveryBackend`] that listens for beacons on a UDP address.
#[derive(Debug, Clone)]
pub struct UdpDiscovery {
    bind: SocketAddr,
}

impl UdpDiscovery {
    pub fn new(bind: SocketAddr) -> Self {
        Self { bind }
    }

    pub fn on_port(port: u16) -> Self {
        Self::new(SocketAddr::from(([0, 0, 0, 0], port)))
    }
}

impl Default for UdpDiscovery {
    fn default() -> Self {
        Self::on_port(rollcall_config::DEFAULT_BEACON_PORT)
    }
}

#[async_trait]
impl DiscoveryBackend for UdpDiscovery {
    async fn open_scan(&self) -> io::Result<Box<dyn ScanSession>> {
        let socket = UdpSocket::bind(self.bind).await?;
        debug!("Beacon scan bound to {}", socket.local_addr()?);
        Ok(Box::new(UdpScanSession {
            socket: Some(socket),
            buf: vec![0; MAX_DATAGRAM],
        }))
    }
}

struct UdpScanSession {
    socket: Option<UdpSocket>,
    buf: Vec<u8>,
}

#[async_trait]
impl ScanSession for UdpScanSession {
    async fn next_advertisement(&mut self) -> io::Result<Option<Advertisement>> {
        let Some(socket) = self.socket.as_ref() else {
            return Ok(None);
        };
        loop {
            let (len, from) = socket.recv_from(&mut self.buf).await?;
            match Beacon::decode(&self.buf[..len]) {
                Ok(beacon) => {
                    let link = beacon.resolve_link(from.ip());
                    return Ok(Some(Advertisement {
                        address: link.to_string(),
                        local_name: beacon.name,
                        service_ids: beacon.service_ids,
                        received_at: chrono::Utc::now(),
                    }));
                }
                Err(e) => debug!("Ignoring datagram from {}: {}", from, e),
            }
        }
    }

    async fn close(&mut self) -> io::Result<()> {
        if self.socket.take().is_some() {
            debug!("Beacon scan socket released");
        }
        Ok(())
    }
}
