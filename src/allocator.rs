//! Rarest-first piece scheduling.
//!
//! The [`Allocator`] is the single owner of piece state for a torrent. Each
//! piece moves through
//!
//! ```text
//! Missing ──select──▶ Assigned(peer) ──save──▶ Verified
//!    ▲                     │
//!    └── release / peer removed / write failed
//! ```
//!
//! and at most one peer holds a claim on a piece at any time. Peers are
//! identified by an opaque [`PeerHandle`] handed out at registration, so
//! sessions never alias each other's state.
//!
//! # Selection
//!
//! [`Allocator::select_target`] picks, among the pieces a peer has that are
//! still missing, unclaimed, and overlap a selected file, the one fewest
//! known peers hold; ties go to the lowest index. The result is a
//! [`Selection`]:
//!
//! - `Assigned` - fetch this piece
//! - `Wait` - nothing this peer has is useful now, but other pieces are
//!   still unclaimed, so a later `have` may change that
//! - `NoTarget` - nothing is left to claim anywhere; close the session
//!
//! # Completion
//!
//! The byte-left counter starts at the total size of selected files and
//! drops by the bytes actually written per saved piece. When it reaches
//! zero the [`completion`](Allocator::completion) watch flips to `true` and
//! never flips back.

mod error;
mod manager;
mod table;

use std::fmt;

pub use error::AllocatorError;
pub use manager::Allocator;

/// Opaque identity of one registered peer session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerHandle(u64);

impl fmt::Display for PeerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A piece to download and its length in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PieceTarget {
    pub index: u32,
    pub length: u32,
}

/// Outcome of [`Allocator::select_target`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    Assigned(PieceTarget),
    Wait,
    NoTarget,
}
