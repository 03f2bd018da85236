//! rswarm - A BitTorrent swarm client library
//!
//! This library downloads the payload of a `.torrent` file from a swarm of
//! peers found through HTTP and UDP trackers, verifying every piece before
//! it reaches disk and serving verified pieces back to peers that ask.
//!
//! # Modules
//!
//! - [`bencode`] - BEP-3 Bencode encoding/decoding
//! - [`metainfo`] - BEP-3 torrent metainfo and info-hash
//! - [`storage`] - Mapping pieces onto files on disk
//! - [`allocator`] - Rarest-first piece scheduling and completion tracking
//! - [`peer`] - BEP-3 peer wire protocol and per-connection sessions
//! - [`tracker`] - BEP-3/15/23 HTTP and UDP tracker protocols
//! - [`swarm`] - Tracker and peer coordination
//!
//! # Example
//!
//! ```no_run
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let metainfo = rswarm::load_torrent("example.torrent")?;
//! let handle = rswarm::start_swarm(metainfo, "downloads").await?;
//!
//! println!("{} bytes to go", handle.bytes_left());
//! handle.wait().await?;
//! # Ok(())
//! # }
//! ```

pub mod allocator;
pub mod bencode;
pub mod config;
pub mod constants;
pub mod metainfo;
pub mod peer;
pub mod storage;
pub mod swarm;
pub mod tracker;

#[cfg(test)]
mod testutil;

pub use allocator::{Allocator, AllocatorError, PeerHandle, PieceTarget, Selection};
pub use bencode::{decode, encode, BencodeError, Value};
pub use config::SwarmConfig;
pub use metainfo::{load_torrent, FileRecord, Info, InfoHash, Metainfo, MetainfoError};
pub use peer::{Bitfield, Handshake, Message, PeerError, PeerId, PeerSession};
pub use storage::{StorageError, TorrentStorage};
pub use swarm::{start_swarm, Swarm, SwarmError, SwarmHandle, SwarmOutcome};
pub use tracker::{
    AnnounceResponse, Backoff, HttpTracker, TrackerClient, TrackerError, TrackerEvent, UdpTracker,
};
