use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::error::TrackerError;
use super::http::HttpTracker;
use super::response::{AnnounceRequest, AnnounceResponse, TrackerEvent};
use super::udp::UdpTracker;
use crate::allocator::Allocator;
use crate::config::SwarmConfig;
use crate::constants::TRACKER_STOP_TIMEOUT;
use crate::peer::stopped;

/// Receives the peers trackers hand out.
pub trait PeerSink: Send + Sync {
    /// Peers currently connected across the whole swarm.
    fn live_peers(&self) -> usize;

    /// Starts sessions for `peers`.
    fn connect_peers(&self, peers: Vec<SocketAddr>);
}

enum Transport {
    Http(HttpTracker),
    Udp(UdpTracker),
}

impl Transport {
    async fn open(url: &str, config: &SwarmConfig) -> Result<Self, TrackerError> {
        if url.starts_with("http://") || url.starts_with("https://") {
            Ok(Transport::Http(HttpTracker::new(url, config.http_timeout)?))
        } else if url.starts_with("udp://") {
            Ok(Transport::Udp(UdpTracker::connect(url, config.udp_backoff).await?))
        } else {
            let scheme = url.split("://").next().unwrap_or(url);
            Err(TrackerError::UnsupportedProtocol(scheme.to_string()))
        }
    }

    async fn announce(&mut self, request: &AnnounceRequest) -> Result<AnnounceResponse, TrackerError> {
        match self {
            Transport::Http(tracker) => tracker.announce(request).await,
            Transport::Udp(tracker) => tracker.announce(request).await,
        }
    }
}

/// The announce loop for one tracker URL.
///
/// Announces `started`, then every poll interval re-announces if the swarm
/// is short of peers, or sends a zero-`numwant` announce once the tracker's
/// own interval has passed. Any failed announce ends the loop. On a stop a
/// single `completed` or `stopped` announce is attempted.
pub struct TrackerClient {
    url: String,
    allocator: Arc<Allocator>,
    config: Arc<SwarmConfig>,
    sink: Arc<dyn PeerSink>,
    shutdown: watch::Receiver<bool>,
    interval: Duration,
    min_interval: Duration,
    last_announce: Instant,
}

impl TrackerClient {
    pub fn new(
        url: impl Into<String>,
        allocator: Arc<Allocator>,
        config: Arc<SwarmConfig>,
        sink: Arc<dyn PeerSink>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            url: url.into(),
            allocator,
            config,
            sink,
            shutdown,
            interval: Duration::ZERO,
            min_interval: Duration::ZERO,
            last_announce: Instant::now(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Runs until the swarm stops (`Ok`) or the tracker fails (`Err`).
    pub async fn run(mut self) -> Result<(), TrackerError> {
        let mut transport = tokio::select! {
            transport = Transport::open(&self.url, &self.config) => transport?,
            _ = stopped(&mut self.shutdown) => return Ok(()),
        };

        match self
            .announce(&mut transport, TrackerEvent::Started, self.config.numwant)
            .await
        {
            Some(response) => self.accept(response?),
            None => return Ok(()),
        }

        let period = self.config.tracker_poll_interval;
        let mut poll = interval_at(Instant::now() + period, period);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = stopped(&mut self.shutdown) => break,
                _ = poll.tick() => {}
            }

            let since = self.last_announce.elapsed();
            let numwant = if self.sink.live_peers() < self.config.min_peers
                && since >= self.min_interval
            {
                self.config.numwant
            } else if since >= self.interval {
                0
            } else {
                continue;
            };

            match self.announce(&mut transport, TrackerEvent::None, numwant).await {
                Some(response) => self.accept(response?),
                None => break,
            }
        }

        self.farewell(&mut transport).await;
        Ok(())
    }

    fn request(&self, event: TrackerEvent, numwant: Option<u32>) -> AnnounceRequest {
        AnnounceRequest {
            info_hash: self.allocator.metainfo().info_hash,
            peer_id: self.config.peer_id,
            port: self.config.listen_port,
            uploaded: self.allocator.bytes_uploaded(),
            downloaded: self.allocator.bytes_downloaded(),
            left: self.allocator.bytes_left(),
            event,
            numwant,
        }
    }

    /// Announces unless the swarm stops first (`None`).
    async fn announce(
        &mut self,
        transport: &mut Transport,
        event: TrackerEvent,
        numwant: u32,
    ) -> Option<Result<AnnounceResponse, TrackerError>> {
        let request = self.request(event, Some(numwant));
        tokio::select! {
            result = transport.announce(&request) => Some(result),
            _ = stopped(&mut self.shutdown) => None,
        }
    }

    fn accept(&mut self, response: AnnounceResponse) {
        self.last_announce = Instant::now();
        self.interval = response.interval();
        self.min_interval = Duration::from_secs(response.min_interval.unwrap_or(0) as u64);

        info!(
            tracker = %self.url,
            peers = response.peers.len(),
            interval = response.interval,
            "announce ok"
        );
        if !response.peers.is_empty() {
            self.sink.connect_peers(response.peers);
        }
    }

    async fn farewell(&self, transport: &mut Transport) {
        let event = if self.allocator.is_complete() {
            TrackerEvent::Completed
        } else {
            TrackerEvent::Stopped
        };
        let request = self.request(event, Some(0));

        match timeout(TRACKER_STOP_TIMEOUT, transport.announce(&request)).await {
            Ok(Ok(_)) => debug!(tracker = %self.url, event = event.as_str(), "final announce sent"),
            Ok(Err(e)) => warn!(tracker = %self.url, error = %e, "final announce failed"),
            Err(_) => debug!(tracker = %self.url, "final announce timed out"),
        }
    }
}
