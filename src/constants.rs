//! Protocol constants and tuning parameters.
//!
//! Wire-format values are fixed by the protocol; the timing and threshold
//! values are the defaults [`SwarmConfig`](crate::config::SwarmConfig) starts
//! from.

use std::time::Duration;

// ============================================================================
// Client identification
// ============================================================================

/// Client ID prefix for peer ID generation (Azureus-style)
pub const CLIENT_PREFIX: &str = "-RS0001-";

/// User agent string for HTTP tracker requests
pub const USER_AGENT: &str = "rswarm/0.1.0";

/// Default listen port reported to trackers and bound for inbound peers
pub const DEFAULT_PORT: u16 = 6881;

// ============================================================================
// Wire protocol
// ============================================================================

/// BitTorrent protocol string
pub const PROTOCOL_STRING: &[u8; 19] = b"BitTorrent protocol";

/// Handshake length: pstrlen + pstr + reserved + info hash + peer id
pub const HANDSHAKE_LEN: usize = 1 + 19 + 8 + 20 + 20;

/// Segment size requested per `request` message (16 KiB)
pub const BLOCK_SIZE: u32 = 16384;

/// Largest `request` length we will serve (128 KiB)
pub const MAX_REQUEST_LENGTH: u32 = 131072;

/// Maximum accepted frame size (16 MiB)
pub const MAX_MESSAGE_SIZE: usize = 16777216;

/// Initial capacity of a session's read buffer
pub const READ_BUFFER_SIZE: usize = 65536;

// ============================================================================
// Peer session timing
// ============================================================================

/// TCP connect timeout for outbound peers
pub const PEER_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Time allowed for the remote handshake to arrive
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(15);

/// Time allowed for the first possession message after the handshake
pub const BITFIELD_TIMEOUT: Duration = Duration::from_secs(2);

/// Keep-alive and interested re-send interval
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(120);

/// Time allowed for one outgoing frame to drain
pub const PEER_WRITE_TIMEOUT: Duration = Duration::from_secs(30);

/// A peer silent for this long is dropped
pub const PEER_READ_TIMEOUT: Duration = Duration::from_secs(180);

/// A claimed piece with no block for this long is given up
pub const PIECE_STALL_TIMEOUT: Duration = Duration::from_secs(60);

/// How often a session without a target asks the allocator again
pub const TARGET_RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// Replacement sessions spawned for an address that delivered pieces
pub const MAX_PEER_RECONNECTS: u32 = 3;

// ============================================================================
// Tracker policy
// ============================================================================

/// Below this many live peers, trackers re-announce asking for more
pub const MIN_PEERS: usize = 30;

/// Peers requested per announce
pub const DEFAULT_NUMWANT: u32 = 50;

/// How often each tracker loop checks peer count and interval
pub const TRACKER_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Interval assumed when a tracker does not advertise one
pub const DEFAULT_ANNOUNCE_INTERVAL: Duration = Duration::from_secs(1800);

/// HTTP tracker request timeout
pub const HTTP_TRACKER_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound on the farewell `completed`/`stopped` announce
pub const TRACKER_STOP_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// UDP tracker protocol constants
// ============================================================================

/// UDP tracker protocol ID (magic number)
pub const UDP_TRACKER_PROTOCOL_ID: i64 = 0x41727101980;

/// Base timeout for a UDP request; doubled per retry
pub const UDP_TRACKER_BASE_TIMEOUT: Duration = Duration::from_secs(15);

/// UDP attempts per exchange before a tracker is abandoned
pub const UDP_TRACKER_MAX_RETRIES: u32 = 8;

/// How long a UDP connection id may be reused
pub const UDP_CONNECTION_ID_LIFETIME: Duration = Duration::from_secs(60);

/// Maximum UDP datagram we expect from a tracker
pub const UDP_MAX_PACKET_SIZE: usize = 65536;
