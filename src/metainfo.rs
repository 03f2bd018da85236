//! Torrent metainfo handling ([BEP-3]).
//!
//! A `.torrent` file is a bencoded dictionary holding tracker URLs and an
//! `info` dictionary describing the payload: a name, the piece length, one
//! SHA-1 per piece, and either a single `length` or a `files` list.
//!
//! [`Metainfo`] is the parsed form. Each file becomes a [`FileRecord`] with
//! its global byte offset and the range of pieces it overlaps, computed at
//! load time. The [`InfoHash`] is the SHA-1 of the *re-encoded* `info`
//! dictionary, so keys are hashed in canonical order even when the source
//! file was not.
//!
//! # Examples
//!
//! ```no_run
//! use rswarm::metainfo::load_torrent;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let torrent = load_torrent("example.torrent")?;
//!
//! println!("Info hash: {}", torrent.info_hash);
//! for file in &torrent.info.files {
//!     println!("  {} ({} bytes, pieces {}..={})", file.path.display(),
//!         file.length, file.first_piece, file.last_piece);
//! }
//! for tracker in torrent.trackers() {
//!     println!("Tracker: {}", tracker);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! [BEP-3]: http://bittorrent.org/beps/bep_0003.html

mod error;
mod info_hash;
mod torrent;

pub use error::MetainfoError;
pub use info_hash::InfoHash;
pub use torrent::{load_torrent, FileRecord, Info, Metainfo};

#[cfg(test)]
mod tests;
