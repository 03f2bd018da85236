use super::error::MetainfoError;
use super::info_hash::InfoHash;
use crate::bencode::{decode, encode, Value};
use bytes::Bytes;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// A parsed torrent file.
///
/// Offsets and piece ranges are derived once here and never change. Only
/// the per-file selection flag is mutable, and only until the metainfo is
/// handed to a running swarm.
///
/// # Examples
///
/// ```no_run
/// use rswarm::metainfo::Metainfo;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let data = std::fs::read("example.torrent")?;
/// let mut metainfo = Metainfo::from_bytes(&data)?;
///
/// println!("{} ({} bytes, {} pieces)", metainfo.info.name,
///     metainfo.info.total_length, metainfo.info.piece_count());
/// metainfo.select_file(0, false)?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Metainfo {
    pub info: Info,
    pub info_hash: InfoHash,
    /// Primary tracker URL.
    pub announce: String,
    /// Tracker tiers ([BEP-12](http://bittorrent.org/beps/bep_0012.html)).
    pub announce_list: Vec<Vec<String>>,
    pub creation_date: Option<i64>,
    pub comment: Option<String>,
    pub created_by: Option<String>,
}

/// The `info` dictionary.
#[derive(Debug, Clone)]
pub struct Info {
    /// Suggested name for the file or root directory.
    pub name: String,
    /// Bytes per piece; only the last piece may be shorter. Always fits a
    /// `u32`, as wire messages require.
    pub piece_length: u64,
    /// SHA-1 of each piece, indexed by piece number.
    pub pieces: Vec<[u8; 20]>,
    pub files: Vec<FileRecord>,
    pub total_length: u64,
    pub private: bool,
}

/// One file of the torrent payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Path relative to the download directory. Multi-file torrents start
    /// with the torrent's root directory name.
    pub path: PathBuf,
    pub length: u64,
    /// Global byte offset of the file's first byte.
    pub offset: u64,
    /// First piece overlapping the file.
    pub first_piece: u32,
    /// Last piece overlapping the file (equal to `first_piece` when empty).
    pub last_piece: u32,
    /// Whether the file should be written to disk.
    pub selected: bool,
}

impl FileRecord {
    /// One past the file's last global byte.
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }
}

impl Metainfo {
    /// Parses a torrent file from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the data is not valid bencode, a required field
    /// (`announce`, `info`, `name`, `piece length`, `pieces`) is missing, or
    /// the piece list does not match the payload length.
    pub fn from_bytes(data: &[u8]) -> Result<Self, MetainfoError> {
        Self::from_value(&decode(data)?)
    }

    /// Builds the metainfo from an already decoded top-level dictionary.
    pub fn from_value(value: &Value) -> Result<Self, MetainfoError> {
        let dict = value.as_dict().ok_or(MetainfoError::InvalidField("root"))?;

        let announce = dict
            .get(b"announce".as_slice())
            .ok_or(MetainfoError::MissingField("announce"))?
            .as_str()
            .ok_or(MetainfoError::InvalidField("announce"))?
            .to_string();

        let info_value = dict
            .get(b"info".as_slice())
            .ok_or(MetainfoError::MissingField("info"))?;

        let info_hash = InfoHash::from_info_bytes(&encode(info_value)?);
        let info = parse_info(info_value)?;

        let announce_list = dict
            .get(b"announce-list".as_slice())
            .and_then(|v| v.as_list())
            .map(|tiers| {
                tiers
                    .iter()
                    .filter_map(|tier| tier.as_list())
                    .map(|urls| {
                        urls.iter()
                            .filter_map(|u| u.as_str().map(String::from))
                            .collect::<Vec<_>>()
                    })
                    .filter(|tier| !tier.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            info,
            info_hash,
            announce,
            announce_list,
            creation_date: dict
                .get(b"creation date".as_slice())
                .and_then(|v| v.as_integer()),
            comment: optional_string(dict, b"comment"),
            created_by: optional_string(dict, b"created by"),
        })
    }

    /// Returns all tracker URLs: `announce` first, then every
    /// `announce-list` tier in order, without duplicates.
    pub fn trackers(&self) -> Vec<String> {
        let mut trackers = vec![self.announce.clone()];

        for url in self.announce_list.iter().flatten() {
            if !trackers.contains(url) {
                trackers.push(url.clone());
            }
        }

        trackers
    }

    /// Marks a file for download or skips it.
    ///
    /// Takes `&mut self`, so it can only be called before the metainfo is
    /// shared with a running swarm.
    pub fn select_file(&mut self, index: usize, selected: bool) -> Result<(), MetainfoError> {
        let count = self.info.files.len();
        let file = self
            .info
            .files
            .get_mut(index)
            .ok_or(MetainfoError::InvalidFileIndex { index, count })?;
        file.selected = selected;
        Ok(())
    }
}

impl Info {
    pub fn piece_count(&self) -> usize {
        self.pieces.len()
    }

    /// Length of piece `index`; the last piece holds the remainder.
    ///
    /// Returns 0 for an index past the end.
    pub fn piece_size(&self, index: u32) -> u64 {
        let start = index as u64 * self.piece_length;
        if start >= self.total_length {
            return 0;
        }
        (self.total_length - start).min(self.piece_length)
    }

    /// Global byte range `[start, end)` covered by piece `index`.
    pub fn piece_range(&self, index: u32) -> (u64, u64) {
        let start = index as u64 * self.piece_length;
        (start, start + self.piece_size(index))
    }

    pub fn piece_hash(&self, index: u32) -> Option<&[u8; 20]> {
        self.pieces.get(index as usize)
    }

    /// Whether piece `index` overlaps at least one non-empty selected file.
    pub fn piece_is_wanted(&self, index: u32) -> bool {
        self.files.iter().any(|f| {
            f.selected && f.length > 0 && f.first_piece <= index && index <= f.last_piece
        })
    }

    /// Sum of the lengths of all selected files.
    pub fn selected_length(&self) -> u64 {
        self.files
            .iter()
            .filter(|f| f.selected)
            .map(|f| f.length)
            .sum()
    }
}

/// Reads and parses a `.torrent` file.
pub fn load_torrent(path: impl AsRef<Path>) -> Result<Metainfo, MetainfoError> {
    let data = std::fs::read(path)?;
    Metainfo::from_bytes(&data)
}

fn optional_string(dict: &BTreeMap<Bytes, Value>, key: &[u8]) -> Option<String> {
    dict.get(key).and_then(|v| v.as_str()).map(String::from)
}

fn parse_info(value: &Value) -> Result<Info, MetainfoError> {
    let dict = value.as_dict().ok_or(MetainfoError::InvalidField("info"))?;

    let name = dict
        .get(b"name".as_slice())
        .ok_or(MetainfoError::MissingField("name"))?
        .as_str()
        .ok_or(MetainfoError::InvalidField("name"))?
        .to_string();

    let piece_length = dict
        .get(b"piece length".as_slice())
        .ok_or(MetainfoError::MissingField("piece length"))?
        .as_u64()
        .filter(|&len| len > 0 && len <= u32::MAX as u64)
        .ok_or(MetainfoError::InvalidField("piece length"))?;

    let pieces_bytes = dict
        .get(b"pieces".as_slice())
        .ok_or(MetainfoError::MissingField("pieces"))?
        .as_bytes()
        .ok_or(MetainfoError::InvalidField("pieces"))?;

    if pieces_bytes.len() % 20 != 0 {
        return Err(MetainfoError::InvalidField("pieces"));
    }

    let pieces: Vec<[u8; 20]> = pieces_bytes
        .chunks_exact(20)
        .map(|chunk| {
            let mut arr = [0u8; 20];
            arr.copy_from_slice(chunk);
            arr
        })
        .collect();

    let private = dict
        .get(b"private".as_slice())
        .and_then(|v| v.as_integer())
        .is_some_and(|v| v == 1);

    // (relative path, length) pairs; offsets and piece ranges come after.
    let entries: Vec<(PathBuf, u64)> = if let Some(length) = dict.get(b"length".as_slice()) {
        let length = length
            .as_u64()
            .ok_or(MetainfoError::InvalidField("length"))?;
        vec![(PathBuf::from(&name), length)]
    } else if let Some(files) = dict.get(b"files".as_slice()) {
        let files = files.as_list().ok_or(MetainfoError::InvalidField("files"))?;
        let mut entries = Vec::with_capacity(files.len());

        for file in files {
            let length = file
                .get(b"length")
                .ok_or(MetainfoError::MissingField("file length"))?
                .as_u64()
                .ok_or(MetainfoError::InvalidField("file length"))?;

            let components = file
                .get(b"path")
                .and_then(|v| v.as_list())
                .ok_or(MetainfoError::MissingField("file path"))?;
            if components.is_empty() {
                return Err(MetainfoError::InvalidField("file path"));
            }

            let mut path = PathBuf::from(&name);
            for component in components {
                path.push(
                    component
                        .as_str()
                        .ok_or(MetainfoError::InvalidField("file path"))?,
                );
            }
            entries.push((path, length));
        }
        entries
    } else {
        return Err(MetainfoError::MissingField("length or files"));
    };

    // Offsets below are bounded by this sum, so only it needs checking.
    let total_length = entries
        .iter()
        .try_fold(0u64, |total, (_, len)| total.checked_add(*len))
        .ok_or(MetainfoError::InvalidField("length"))?;

    if pieces.len() as u64 != total_length.div_ceil(piece_length) {
        return Err(MetainfoError::InvalidField("pieces"));
    }

    let last_index = pieces.len().saturating_sub(1) as u64;
    let mut offset = 0u64;
    let files = entries
        .into_iter()
        .map(|(path, length)| {
            let first_piece = (offset / piece_length).min(last_index);
            let last_piece = if length == 0 {
                first_piece
            } else {
                (offset + length - 1) / piece_length
            };
            let record = FileRecord {
                path,
                length,
                offset,
                first_piece: first_piece as u32,
                last_piece: last_piece as u32,
                selected: true,
            };
            offset += length;
            record
        })
        .collect();

    Ok(Info {
        name,
        piece_length,
        pieces,
        files,
        total_length,
        private,
    })
}
