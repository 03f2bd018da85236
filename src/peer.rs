//! Peer wire protocol (BEP-3)
//!
//! This module implements the base peer protocol: the 68-byte handshake,
//! length-prefixed message framing, and the per-connection session that
//! downloads pieces for the [`Allocator`](crate::allocator::Allocator) and
//! serves verified ones back.
//!
//! A session keeps one block request in flight at a time. A full piece is
//! checked against its SHA-1 before it reaches storage; a mismatch just
//! releases the claim so the piece can be fetched again.

mod bitfield;
mod error;
mod message;
mod peer_id;
mod session;
mod transport;

pub use bitfield::Bitfield;
pub use error::PeerError;
pub use message::{Handshake, Message, MessageId};
pub use peer_id::PeerId;
pub use session::{CloseReason, PeerSession, SessionOutcome};
pub(crate) use session::stopped;
pub use transport::{split, PeerReader, PeerWriter};

#[cfg(test)]
mod tests;
