use std::path::PathBuf;

use thiserror::Error;

/// Errors returned by [`TorrentStorage`](super::TorrentStorage).
///
/// Each one fails only the operation that raised it; the allocator treats a
/// failed write as an unsaved piece.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("offset {offset} beyond end of torrent ({total} bytes)")]
    OffsetOutOfRange { offset: u64, total: u64 },

    #[error("short read from {path}: wanted {expected} bytes at {offset}, got {actual}")]
    ShortRead {
        path: PathBuf,
        offset: u64,
        expected: u64,
        actual: u64,
    },

    #[error("invalid piece index: {0}")]
    InvalidPieceIndex(u32),

    #[error("piece {piece}: expected {expected} bytes, got {actual}")]
    InvalidPieceLength {
        piece: u32,
        expected: u64,
        actual: u64,
    },

    #[error("invalid block offset: piece {piece}, offset {offset}")]
    InvalidBlockOffset { piece: u32, offset: u32 },

    #[error("invalid file index: {0}")]
    InvalidFileIndex(usize),

    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("path traversal detected in file path: {0}")]
    PathTraversal(String),
}
