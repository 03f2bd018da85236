//! Disk storage for torrent payloads.
//!
//! A torrent's payload is one contiguous byte stream split into pieces, but
//! on disk it is a list of files laid end to end. [`TorrentStorage`] maps
//! between the two: a global offset becomes a [`FileLocation`], and a piece
//! becomes the [`FileSpan`]s it overlaps.
//!
//! Only files flagged as selected are created and written. Bytes of a piece
//! that fall in a deselected file are dropped, and
//! [`TorrentStorage::write_piece`] reports how many bytes actually landed so
//! callers can keep their byte-left accounting exact.
//!
//! # Examples
//!
//! ```no_run
//! use rswarm::metainfo::load_torrent;
//! use rswarm::storage::TorrentStorage;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let torrent = load_torrent("example.torrent")?;
//! let storage = TorrentStorage::new("./downloads", &torrent.info)?;
//!
//! storage.ensure_layout().await?;
//! let located = storage.map_offset(1_000_000)?;
//! println!("byte 1000000 is in file {} at {}", located.file_index, located.file_offset);
//! # Ok(())
//! # }
//! ```
//!
//! # Security
//!
//! File paths containing `..` or absolute roots are rejected at
//! construction.

mod error;
mod file;
mod manager;

pub use error::StorageError;
pub use file::{FileLocation, FileSpan};
pub use manager::TorrentStorage;
