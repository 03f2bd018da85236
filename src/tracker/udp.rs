use std::net::SocketAddr;

use bytes::{Buf, BufMut, BytesMut};
use rand::Rng as _;
use tokio::net::{lookup_host, UdpSocket};
use tokio::time::{sleep_until, timeout_at, Instant};
use tracing::{debug, trace};

use super::backoff::Backoff;
use super::error::TrackerError;
use super::response::{parse_compact_peers, AnnounceRequest, AnnounceResponse};
use crate::constants::{UDP_CONNECTION_ID_LIFETIME, UDP_MAX_PACKET_SIZE, UDP_TRACKER_PROTOCOL_ID};

const ACTION_CONNECT: u32 = 0;
const ACTION_ANNOUNCE: u32 = 1;
const ACTION_ERROR: u32 = 3;

/// What one received datagram means for the exchange in progress.
enum Reply<T> {
    Done(T),
    /// Wrong transaction, wrong action or bad length: try again.
    Mismatch(&'static str),
}

/// A UDP tracker ([BEP-15](http://bittorrent.org/beps/bep_0015.html)).
///
/// The connection id from the connect phase is reused for announces until it
/// is a minute old.
pub struct UdpTracker {
    socket: UdpSocket,
    addr: SocketAddr,
    url: String,
    backoff: Backoff,
    connection: Option<(u64, Instant)>,
}

impl UdpTracker {
    /// Resolves the tracker host and binds a local socket to talk to it.
    pub async fn connect(url: &str, backoff: Backoff) -> Result<Self, TrackerError> {
        let host = parse_udp_url(url)?;

        let addr = lookup_host(host)
            .await
            .map_err(|e| TrackerError::Unreachable(format!("{}: {}", host, e)))?
            .find(SocketAddr::is_ipv4)
            .ok_or_else(|| TrackerError::Unreachable(format!("{}: no IPv4 address", host)))?;

        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect(addr).await?;

        Ok(Self {
            socket,
            addr,
            url: url.to_string(),
            backoff,
            connection: None,
        })
    }

    pub async fn announce(&mut self, request: &AnnounceRequest) -> Result<AnnounceResponse, TrackerError> {
        let connection_id = self.connection_id().await?;

        let transaction_id: u32 = rand::rng().random();
        let numwant = request.numwant.map_or(-1, |n| n.min(i32::MAX as u32) as i32);

        let mut packet = BytesMut::with_capacity(98);
        packet.put_u64(connection_id);
        packet.put_u32(ACTION_ANNOUNCE);
        packet.put_u32(transaction_id);
        packet.put_slice(request.info_hash.as_bytes());
        packet.put_slice(request.peer_id.as_bytes());
        packet.put_u64(request.downloaded);
        packet.put_u64(request.left);
        packet.put_u64(request.uploaded);
        packet.put_u32(request.event.as_udp_id());
        packet.put_u32(0); // IP address (0 = sender's)
        packet.put_u32(0); // key
        packet.put_i32(numwant);
        packet.put_u16(request.port);

        debug!(tracker = %self.url, event = request.event.as_str(), "udp announce");

        let result = self
            .exchange(&packet, transaction_id, |mut reply| {
                if reply.len() < 20 || (reply.len() - 20) % 6 != 0 {
                    return Reply::Mismatch("bad announce length");
                }
                if reply.get_u32() != ACTION_ANNOUNCE || reply.get_u32() != transaction_id {
                    return Reply::Mismatch("announce response mismatch");
                }

                let mut response = AnnounceResponse::new(reply.get_u32());
                response.incomplete = Some(reply.get_u32());
                response.complete = Some(reply.get_u32());
                response.peers = parse_compact_peers(reply);
                Reply::Done(response)
            })
            .await;

        if result.is_err() {
            self.connection = None;
        }
        result
    }

    async fn connection_id(&mut self) -> Result<u64, TrackerError> {
        if let Some((id, obtained)) = self.connection {
            if obtained.elapsed() < UDP_CONNECTION_ID_LIFETIME {
                return Ok(id);
            }
        }

        let transaction_id: u32 = rand::rng().random();
        let mut packet = BytesMut::with_capacity(16);
        packet.put_i64(UDP_TRACKER_PROTOCOL_ID);
        packet.put_u32(ACTION_CONNECT);
        packet.put_u32(transaction_id);

        let id = self
            .exchange(&packet, transaction_id, |mut reply| {
                if reply.len() < 16 {
                    return Reply::Mismatch("connect response too short");
                }
                if reply.get_u32() != ACTION_CONNECT || reply.get_u32() != transaction_id {
                    return Reply::Mismatch("connect response mismatch");
                }
                Reply::Done(reply.get_u64())
            })
            .await?;

        trace!(tracker = %self.url, "udp connection id obtained");
        self.connection = Some((id, Instant::now()));
        Ok(id)
    }

    /// Sends `packet` and waits for a reply `parse` accepts, resending with
    /// a growing timeout on silence or mismatch.
    async fn exchange<T>(
        &self,
        packet: &[u8],
        transaction_id: u32,
        parse: impl Fn(&[u8]) -> Reply<T>,
    ) -> Result<T, TrackerError> {
        let mut buf = vec![0u8; UDP_MAX_PACKET_SIZE];

        for attempt in 0..self.backoff.max_retries {
            let wait = self.backoff.delay(attempt);
            let deadline = Instant::now() + wait;

            // A refused port surfaces as an io error on this connected
            // socket. It costs the attempt, like silence, and the attempt
            // still lasts its full window.
            if let Err(e) = self.socket.send(packet).await {
                debug!(tracker = %self.url, attempt, error = %e, "udp send failed");
                sleep_until(deadline).await;
                continue;
            }

            let n = match timeout_at(deadline, self.socket.recv(&mut buf)).await {
                Ok(Ok(n)) => n,
                Ok(Err(e)) => {
                    debug!(tracker = %self.url, attempt, error = %e, "udp receive failed");
                    sleep_until(deadline).await;
                    continue;
                }
                Err(_) => {
                    trace!(tracker = %self.url, attempt, ?wait, "udp tracker timed out");
                    continue;
                }
            };
            let reply = &buf[..n];

            if let Some(message) = error_reply(reply, transaction_id) {
                return Err(TrackerError::Failure(message));
            }

            match parse(reply) {
                Reply::Done(value) => return Ok(value),
                Reply::Mismatch(reason) => {
                    debug!(tracker = %self.url, attempt, reason, "retrying udp exchange");
                }
            }
        }

        Err(TrackerError::Abandoned(self.backoff.max_retries))
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// The tracker's message if `reply` is an error action for our transaction.
fn error_reply(mut reply: &[u8], transaction_id: u32) -> Option<String> {
    if reply.len() < 8 {
        return None;
    }
    if reply.get_u32() != ACTION_ERROR || reply.get_u32() != transaction_id {
        return None;
    }
    Some(String::from_utf8_lossy(reply).into_owned())
}

/// Extracts `host:port` from `udp://host:port[/path]`.
fn parse_udp_url(url: &str) -> Result<&str, TrackerError> {
    let rest = url
        .strip_prefix("udp://")
        .ok_or_else(|| TrackerError::InvalidUrl(url.to_string()))?;

    let host = rest.split('/').next().unwrap_or(rest);
    if host.is_empty() || !host.contains(':') {
        return Err(TrackerError::InvalidUrl(url.to_string()));
    }
    Ok(host)
}
