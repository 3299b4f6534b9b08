//! Port traits for the two radio channels: a broadcast channel used for
//! discovery and a connection-oriented link used for bulk transfer.

use std::io;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::io::{AsyncRead, AsyncWrite};
use uuid::Uuid;

/// [`rollcall_config::SERVICE_ID`] as a typed value.
pub const SERVICE_UUID: Uuid = Uuid::from_u128(0x6e40_0001_b5a3_f393_e0a9_e50e_24dc_ca9e);

/// One advertisement heard on the broadcast channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    /// Hardware (or link) address the advertiser can be reached at.
    pub address: String,
    pub local_name: Option<String>,
    pub service_ids: Vec<Uuid>,
    pub received_at: DateTime<Utc>,
}

impl Advertisement {
    pub fn advertises(&self, service: &Uuid) -> bool {
        self.service_ids.iter().any(|s| s == service)
    }
}

#[async_trait]
pub trait DiscoveryBackend: Send + Sync {
    async fn open_scan(&self) -> io::Result<Box<dyn ScanSession>>;
}

/// An open scan. `close` must release the underlying radio handle; callers
/// invoke it exactly once, on every exit path.
#[async_trait]
pub trait ScanSession: Send {
    /// `Ok(None)` means the backend ended the scan on its own.
    async fn next_advertisement(&mut self) -> io::Result<Option<Advertisement>>;
    async fn close(&mut self) -> io::Result<()>;
}

pub trait LinkStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> LinkStream for T {}

pub type BoxedLink = Box<dyn LinkStream>;

#[async_trait]
pub trait LinkConnector: Send + Sync {
    async fn connect(&self, address: &str) -> io::Result<BoxedLink>;
}

#[async_trait]
pub trait LinkListener: Send {
    /// Waits for the next inbound link and returns it with the peer address.
    async fn accept(&mut self) -> io::Result<(BoxedLink, String)>;
}
