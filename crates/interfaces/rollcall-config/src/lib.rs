//! Central configuration constants for radio, transfer and retry behaviour.

use std::time::Duration;

/// Application service identifier every counterpart advertises.
/// Discovery ignores any device that does not carry it.
pub const SERVICE_ID: &str = "6e400001-b5a3-f393-e0a9-e50e24dcca9e";

/// Largest binary block carried by one transport message.
pub const DEFAULT_CHUNK_SIZE: usize = 512;

/// Upper bound for a single text frame on the link (base64 of a block plus framing).
pub const MAX_FRAME_LEN: usize = 4 * 1024;

/// How long discovery may run without a qualifying peer before a timeout is logged.
pub const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Delay between a finished (or transport-failed) cycle and the next scan.
pub const TRANSFER_COOLDOWN: Duration = Duration::from_secs(5);

/// Delay before restarting after an unexpected fault.
pub const FAULT_RETRY_DELAY: Duration = Duration::from_secs(10);

/// Unexpected faults tolerated before the background cycle halts.
pub const MAX_FAULT_RETRIES: u32 = 3;

/// Opening a link to a discovered peer gives up after this long.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Silence on an open link longer than this fails the transfer.
pub const FRAME_READ_TIMEOUT: Duration = Duration::from_secs(15);

/// Oldest acceptable legacy pairing token.
pub const TOKEN_MAX_AGE: Duration = Duration::from_secs(5 * 60);

/// How far in the future a legacy pairing token may be dated.
pub const TOKEN_MAX_SKEW: Duration = Duration::from_secs(60);

/// UDP port the beacon advertiser broadcasts on and discovery listens on.
pub const DEFAULT_BEACON_PORT: u16 = 47_810;

/// TCP port the host listens on for link connections.
pub const DEFAULT_LINK_PORT: u16 = 47_811;

/// Interval between two beacon broadcasts.
pub const BEACON_INTERVAL: Duration = Duration::from_secs(2);
