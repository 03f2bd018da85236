use thiserror::Error;

use crate::allocator::AllocatorError;

/// Errors that can occur during peer communication.
#[derive(Debug, Error)]
pub enum PeerError {
    /// Network I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer's handshake did not start with the protocol string.
    #[error("invalid handshake")]
    InvalidHandshake,

    /// The peer's info hash doesn't match ours.
    #[error("info hash mismatch")]
    InfoHashMismatch,

    /// A well-framed message with a malformed payload. The frame is
    /// discarded and the connection continues.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// A frame length beyond what we are willing to buffer.
    #[error("message too large: {0} bytes")]
    MessageTooLarge(usize),

    /// The connection was closed by the peer.
    #[error("connection closed")]
    ConnectionClosed,

    /// Operation timed out.
    #[error("timeout")]
    Timeout,

    #[error("allocator error: {0}")]
    Allocator(#[from] AllocatorError),
}

impl PeerError {
    /// Whether the session may log this and keep going.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, PeerError::InvalidMessage(_))
    }
}
