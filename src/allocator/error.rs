use thiserror::Error;

use super::PeerHandle;
use crate::storage::StorageError;

/// Errors returned by the [`Allocator`](super::Allocator).
///
/// Apart from `Storage`, these all describe a misbehaving peer: the session
/// logs them and ignores the offending message.
#[derive(Debug, Error)]
pub enum AllocatorError {
    #[error("peer {0} sent a second bitfield")]
    DuplicateBitfield(PeerHandle),

    #[error("bitfield is {actual} bytes, expected {expected}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("invalid piece index: {0}")]
    InvalidPieceIndex(u32),

    #[error("peer {0} is not registered")]
    UnknownPeer(PeerHandle),

    #[error("piece {0} is not available")]
    Unavailable(u32),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}
