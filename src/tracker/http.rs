use std::net::SocketAddr;
use std::time::Duration;

use reqwest::Client;
use tracing::{debug, warn};

use super::error::TrackerError;
use super::response::{parse_compact_peers, AnnounceRequest, AnnounceResponse};
use crate::bencode::{decode, Value};
use crate::constants::{DEFAULT_ANNOUNCE_INTERVAL, USER_AGENT};

/// An HTTP(S) tracker ([BEP-3](http://bittorrent.org/beps/bep_0003.html),
/// compact peers per [BEP-23](http://bittorrent.org/beps/bep_0023.html)).
pub struct HttpTracker {
    client: Client,
    url: String,
}

impl HttpTracker {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, TrackerError> {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(TrackerError::InvalidUrl(url.to_string()));
        }

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    /// The full GET URL for `request`.
    pub fn announce_url(&self, request: &AnnounceRequest) -> String {
        let separator = if self.url.contains('?') { '&' } else { '?' };
        let mut url = format!(
            "{}{}info_hash={}&peer_id={}&port={}&uploaded={}&downloaded={}&left={}&compact=1",
            self.url,
            separator,
            url_encode(request.info_hash.as_bytes()),
            url_encode(request.peer_id.as_bytes()),
            request.port,
            request.uploaded,
            request.downloaded,
            request.left
        );

        let event = request.event.as_str();
        if !event.is_empty() {
            url.push_str(&format!("&event={}", event));
        }
        if let Some(numwant) = request.numwant {
            url.push_str(&format!("&numwant={}", numwant));
        }
        url
    }

    pub async fn announce(&self, request: &AnnounceRequest) -> Result<AnnounceResponse, TrackerError> {
        let url = self.announce_url(request);
        debug!(tracker = %self.url, event = request.event.as_str(), "http announce");

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TrackerError::Unreachable(format!("{} returned {}", self.url, status)));
        }

        let body = response.bytes().await?;
        parse_announce(&body)
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Parses a bencoded announce reply.
pub fn parse_announce(body: &[u8]) -> Result<AnnounceResponse, TrackerError> {
    let value = decode(body)?;
    let dict = value
        .as_dict()
        .ok_or_else(|| TrackerError::InvalidResponse("expected dict".into()))?;

    if let Some(failure) = dict.get(b"failure reason".as_slice()) {
        let reason = failure
            .as_bytes()
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .unwrap_or_default();
        return Err(TrackerError::Failure(reason));
    }

    let interval = dict
        .get(b"interval".as_slice())
        .and_then(|v| v.as_u64())
        .map(|v| v.min(u32::MAX as u64) as u32)
        .unwrap_or(DEFAULT_ANNOUNCE_INTERVAL.as_secs() as u32);

    let mut response = AnnounceResponse::new(interval);
    response.min_interval = optional_u32(dict.get(b"min interval".as_slice()));
    response.complete = optional_u32(dict.get(b"complete".as_slice()));
    response.incomplete = optional_u32(dict.get(b"incomplete".as_slice()));
    response.warning_message = dict
        .get(b"warning message".as_slice())
        .and_then(|v| v.as_str())
        .map(String::from);

    if let Some(warning) = &response.warning_message {
        warn!(warning = %warning, "tracker warning");
    }

    match dict.get(b"peers".as_slice()) {
        Some(Value::Bytes(blob)) => response.peers = parse_compact_peers(blob),
        Some(Value::List(list)) => {
            for peer in list {
                let ip = peer
                    .get(b"ip")
                    .and_then(|v| v.as_str())
                    .and_then(|s| s.parse().ok());
                let port = peer
                    .get(b"port")
                    .and_then(|v| v.as_u64())
                    .and_then(|p| u16::try_from(p).ok());

                if let (Some(ip), Some(port)) = (ip, port) {
                    response.peers.push(SocketAddr::new(ip, port));
                }
            }
        }
        _ => {}
    }

    Ok(response)
}

fn optional_u32(value: Option<&Value>) -> Option<u32> {
    value
        .and_then(|v| v.as_u64())
        .and_then(|v| u32::try_from(v).ok())
}

fn url_encode(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| {
            if b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b'.' || b == b'~' {
                format!("{}", b as char)
            } else {
                format!("%{:02X}", b)
            }
        })
        .collect()
}
