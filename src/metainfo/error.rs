use thiserror::Error;

use crate::bencode::BencodeError;

/// Errors that can occur when loading a torrent file.
///
/// `MissingField` and `InvalidField` name the offending key; both mean the
/// torrent is unusable.
#[derive(Debug, Error)]
pub enum MetainfoError {
    /// The torrent file contains invalid bencode.
    #[error("bencode error: {0}")]
    Bencode(#[from] BencodeError),

    /// A required field is missing from the torrent file.
    #[error("missing field: {0}")]
    MissingField(&'static str),

    /// A field has an invalid value or type.
    #[error("invalid field: {0}")]
    InvalidField(&'static str),

    /// A file selection referred to a file the torrent does not have.
    #[error("file index {index} out of range ({count} files)")]
    InvalidFileIndex { index: usize, count: usize },

    /// An I/O error occurred while reading the torrent file.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
