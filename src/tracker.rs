//! Tracker protocol (BEP-3, BEP-15, BEP-23)
//!
//! This module implements the HTTP and UDP announce protocols and the
//! per-tracker announce loop that feeds peers into the swarm.
//!
//! # Transports
//!
//! - [`HttpTracker`] - a GET with the announce parameters; the bencoded
//!   reply may carry compact or dictionary peers
//! - [`UdpTracker`] - connect then announce, retried on silence or garbage
//!   with the timeouts of a [`Backoff`]
//!
//! # Announce loop
//!
//! [`TrackerClient`] owns one transport. It hands every peer list to a
//! [`PeerSink`] and leaves deduplication and session spawning to it.

mod backoff;
mod client;
mod error;
mod http;
mod response;
mod udp;

pub use backoff::Backoff;
pub use client::{PeerSink, TrackerClient};
pub use error::TrackerError;
pub use http::{parse_announce, HttpTracker};
pub use response::{parse_compact_peers, AnnounceRequest, AnnounceResponse, CompactPeer, TrackerEvent};
pub use udp::UdpTracker;
