//! Swarm configuration.

use std::time::Duration;

use crate::constants::*;
use crate::peer::PeerId;
use crate::tracker::Backoff;

/// Tunables for one running swarm.
///
/// `Default` gives the values in [`constants`](crate::constants); the
/// `with_*` methods adjust the handful callers usually touch.
///
/// ```
/// use rswarm::SwarmConfig;
/// use std::time::Duration;
///
/// let config = SwarmConfig::default()
///     .with_listen_port(7000)
///     .with_min_peers(10)
///     .with_poll_interval(Duration::from_secs(1));
/// assert_eq!(config.listen_port, 7000);
/// assert_eq!(config.numwant, 50);
/// ```
#[derive(Debug, Clone)]
pub struct SwarmConfig {
    /// Port announced to trackers and bound for inbound peers.
    pub listen_port: u16,
    /// Whether to accept inbound peer connections.
    pub accept_inbound: bool,
    pub peer_id: PeerId,
    /// Live peer count below which trackers ask for more peers.
    pub min_peers: usize,
    pub numwant: u32,
    pub tracker_poll_interval: Duration,
    pub http_timeout: Duration,
    pub udp_backoff: Backoff,
    pub connect_timeout: Duration,
    pub handshake_timeout: Duration,
    pub bitfield_timeout: Duration,
    pub keepalive_interval: Duration,
    pub read_timeout: Duration,
    /// How long a claimed piece may go without a block before the session
    /// gives it up.
    pub request_timeout: Duration,
    /// Replacement sessions allowed per address after a productive drop.
    pub max_reconnects: u32,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            listen_port: DEFAULT_PORT,
            accept_inbound: true,
            peer_id: PeerId::generate(),
            min_peers: MIN_PEERS,
            numwant: DEFAULT_NUMWANT,
            tracker_poll_interval: TRACKER_POLL_INTERVAL,
            http_timeout: HTTP_TRACKER_TIMEOUT,
            udp_backoff: Backoff::new(UDP_TRACKER_BASE_TIMEOUT, UDP_TRACKER_MAX_RETRIES),
            connect_timeout: PEER_CONNECT_TIMEOUT,
            handshake_timeout: HANDSHAKE_TIMEOUT,
            bitfield_timeout: BITFIELD_TIMEOUT,
            keepalive_interval: KEEPALIVE_INTERVAL,
            read_timeout: PEER_READ_TIMEOUT,
            request_timeout: PIECE_STALL_TIMEOUT,
            max_reconnects: MAX_PEER_RECONNECTS,
        }
    }
}

impl SwarmConfig {
    pub fn with_listen_port(mut self, port: u16) -> Self {
        self.listen_port = port;
        self
    }

    pub fn with_accept_inbound(mut self, accept: bool) -> Self {
        self.accept_inbound = accept;
        self
    }

    pub fn with_peer_id(mut self, peer_id: PeerId) -> Self {
        self.peer_id = peer_id;
        self
    }

    pub fn with_min_peers(mut self, min_peers: usize) -> Self {
        self.min_peers = min_peers;
        self
    }

    pub fn with_numwant(mut self, numwant: u32) -> Self {
        self.numwant = numwant;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.tracker_poll_interval = interval;
        self
    }

    pub fn with_udp_backoff(mut self, backoff: Backoff) -> Self {
        self.udp_backoff = backoff;
        self
    }

    pub fn with_max_reconnects(mut self, max: u32) -> Self {
        self.max_reconnects = max;
        self
    }
}
