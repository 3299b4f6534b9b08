pub mod beacon;
pub mod link;

// Re-exports for convenience
pub use beacon::{Beacon, BeaconAdvertiser, BeaconError, UdpDiscovery};
pub use link::{TcpLinkConnector, TcpLinkListener};
