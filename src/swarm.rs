//! Tracker and peer coordination for one torrent.
//!
//! A running swarm is a set of tokio tasks sharing one
//! [`Allocator`](crate::allocator::Allocator):
//!
//! - one [`TrackerClient`](crate::tracker::TrackerClient) per announce URL
//! - one [`PeerSession`](crate::peer::PeerSession) per peer address, at most
//!   one per address at a time
//! - an optional listener for inbound peers
//! - the coordinator, which decides how the swarm ends
//!
//! The swarm ends when the download completes, when
//! [`SwarmHandle::stop`] is called, or with [`SwarmError::Exhausted`] once
//! no tracker is still running and no peer is still connected. Every task
//! watches the same stop flag, so whichever way it ends they all wind down.

mod context;
mod error;
mod handle;

pub use error::SwarmError;
pub use handle::{start_swarm, Swarm, SwarmHandle, SwarmOutcome};
