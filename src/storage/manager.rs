use super::error::StorageError;
use super::file::{FileLocation, FileSpan};
use crate::metainfo::{FileRecord, Info};
use bytes::{Bytes, BytesMut};
use dashmap::DashMap;
use std::io::SeekFrom;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex as TokioMutex;
use tracing::{debug, trace};

fn validate_file_path(file_path: &Path) -> Result<(), StorageError> {
    for component in file_path.components() {
        match component {
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(StorageError::PathTraversal(file_path.display().to_string()));
            }
            _ => {}
        }
    }
    Ok(())
}

/// One open handle per file. The mutex covers seek plus read/write, so all
/// I/O against a given file is serialized while different files proceed in
/// parallel.
struct PerFileHandle {
    file: TokioMutex<File>,
}

struct FileHandleCache {
    handles: DashMap<usize, Arc<PerFileHandle>>,
}

impl FileHandleCache {
    fn new() -> Self {
        Self {
            handles: DashMap::new(),
        }
    }

    async fn get_or_open(
        &self,
        file_index: usize,
        path: &Path,
        create: bool,
    ) -> Result<Arc<PerFileHandle>, StorageError> {
        if let Some(handle) = self.handles.get(&file_index) {
            return Ok(handle.clone());
        }

        if create {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let file = OpenOptions::new()
            .create(create)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    StorageError::FileNotFound(path.display().to_string())
                }
                _ => StorageError::Io(e),
            })?;

        let handle = Arc::new(PerFileHandle {
            file: TokioMutex::new(file),
        });

        // A concurrent opener may have won; keep whichever handle landed first.
        Ok(self.handles.entry(file_index).or_insert(handle).clone())
    }

    async fn flush_all(&self) -> Result<(), StorageError> {
        let handles: Vec<Arc<PerFileHandle>> =
            self.handles.iter().map(|r| r.value().clone()).collect();
        for handle in handles {
            handle.file.lock().await.sync_data().await?;
        }
        Ok(())
    }
}

/// Maps piece data onto the files of one torrent under a download directory.
pub struct TorrentStorage {
    base_path: PathBuf,
    files: Vec<FileRecord>,
    piece_length: u64,
    piece_count: u32,
    total_length: u64,
    handle_cache: FileHandleCache,
}

impl TorrentStorage {
    /// Prepares storage for `info` rooted at `base_path`.
    ///
    /// File selection is captured here; later changes to `info` are not
    /// seen.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::PathTraversal`] if any file path would leave
    /// `base_path`.
    pub fn new(base_path: impl Into<PathBuf>, info: &Info) -> Result<Self, StorageError> {
        for file in &info.files {
            validate_file_path(&file.path)?;
        }

        Ok(Self {
            base_path: base_path.into(),
            files: info.files.clone(),
            piece_length: info.piece_length,
            piece_count: info.piece_count() as u32,
            total_length: info.total_length,
            handle_cache: FileHandleCache::new(),
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn files(&self) -> &[FileRecord] {
        &self.files
    }

    pub fn total_length(&self) -> u64 {
        self.total_length
    }

    /// Absolute on-disk path of file `index`.
    pub fn file_path(&self, index: usize) -> Option<PathBuf> {
        self.files.get(index).map(|f| self.base_path.join(&f.path))
    }

    fn piece_size(&self, index: u32) -> Result<u64, StorageError> {
        if index >= self.piece_count {
            return Err(StorageError::InvalidPieceIndex(index));
        }
        let start = index as u64 * self.piece_length;
        Ok((self.total_length - start).min(self.piece_length))
    }

    /// Finds the file and intra-file offset holding global byte `offset`.
    ///
    /// Zero-length files never match.
    pub fn map_offset(&self, offset: u64) -> Result<FileLocation, StorageError> {
        self.files
            .iter()
            .enumerate()
            .find(|(_, f)| offset >= f.offset && offset < f.end())
            .map(|(file_index, f)| FileLocation {
                file_index,
                file_offset: offset - f.offset,
            })
            .ok_or(StorageError::OffsetOutOfRange {
                offset,
                total: self.total_length,
            })
    }

    /// Splits the global range `[start, start + length)` across files.
    fn spans(&self, start: u64, length: u64) -> Vec<FileSpan> {
        let mut spans = Vec::new();
        let mut remaining = length;
        let mut current = start;

        for (file_index, file) in self.files.iter().enumerate() {
            if remaining == 0 {
                break;
            }

            if current >= file.offset && current < file.end() {
                let take = remaining.min(file.end() - current);
                spans.push(FileSpan {
                    file_index,
                    file_offset: current - file.offset,
                    length: take,
                });
                current += take;
                remaining -= take;
            }
        }

        spans
    }

    /// Creates every selected file at its full length.
    ///
    /// Missing files are created zero-filled; short files are extended;
    /// existing bytes are never truncated or rewritten, so running this
    /// twice leaves the same files as running it once.
    pub async fn ensure_layout(&self) -> Result<(), StorageError> {
        for (index, file) in self.files.iter().enumerate() {
            if !file.selected {
                continue;
            }

            let path = self.base_path.join(&file.path);
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }

            let current = match tokio::fs::metadata(&path).await {
                Ok(meta) => Some(meta.len()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
                Err(e) => return Err(e.into()),
            };

            match current {
                Some(len) if len >= file.length => {
                    trace!(file = index, "already laid out");
                }
                _ => {
                    let f = OpenOptions::new()
                        .create(true)
                        .write(true)
                        .truncate(false)
                        .open(&path)
                        .await?;
                    f.set_len(file.length).await?;
                    debug!(file = index, path = %path.display(), length = file.length, "allocated file");
                }
            }
        }

        Ok(())
    }

    /// Writes a full piece, skipping bytes that belong to deselected files.
    ///
    /// Returns the number of bytes that reached disk.
    pub async fn write_piece(&self, index: u32, data: &[u8]) -> Result<u64, StorageError> {
        let expected = self.piece_size(index)?;
        if data.len() as u64 != expected {
            return Err(StorageError::InvalidPieceLength {
                piece: index,
                expected,
                actual: data.len() as u64,
            });
        }

        let start = index as u64 * self.piece_length;
        let mut written = 0u64;
        let mut data_offset = 0usize;

        for span in self.spans(start, expected) {
            let chunk = &data[data_offset..data_offset + span.length as usize];
            data_offset += span.length as usize;

            let file = &self.files[span.file_index];
            if !file.selected {
                continue;
            }

            let path = self.base_path.join(&file.path);
            let handle = self
                .handle_cache
                .get_or_open(span.file_index, &path, true)
                .await?;
            let mut f = handle.file.lock().await;
            f.seek(SeekFrom::Start(span.file_offset)).await?;
            f.write_all(chunk).await?;
            f.flush().await?;

            written += span.length;
        }

        Ok(written)
    }

    /// Reads `length` bytes at `offset` within file `file_index`.
    ///
    /// # Errors
    ///
    /// [`StorageError::ShortRead`] when the file ends first.
    pub async fn read_range(
        &self,
        file_index: usize,
        offset: u64,
        length: u64,
    ) -> Result<Bytes, StorageError> {
        let file = self
            .files
            .get(file_index)
            .ok_or(StorageError::InvalidFileIndex(file_index))?;
        let path = self.base_path.join(&file.path);

        let handle = self
            .handle_cache
            .get_or_open(file_index, &path, false)
            .await?;
        let mut f = handle.file.lock().await;
        f.seek(SeekFrom::Start(offset)).await?;

        let mut buf = vec![0u8; length as usize];
        let mut filled = 0usize;
        while filled < buf.len() {
            let n = f.read(&mut buf[filled..]).await?;
            if n == 0 {
                return Err(StorageError::ShortRead {
                    path,
                    offset,
                    expected: length,
                    actual: filled as u64,
                });
            }
            filled += n;
        }

        Ok(Bytes::from(buf))
    }

    /// Reads `length` bytes starting `begin` bytes into piece `index`.
    pub async fn read_block(&self, index: u32, begin: u32, length: u32) -> Result<Bytes, StorageError> {
        let size = self.piece_size(index)?;
        if begin as u64 + length as u64 > size {
            return Err(StorageError::InvalidBlockOffset {
                piece: index,
                offset: begin,
            });
        }

        let start = index as u64 * self.piece_length + begin as u64;
        let mut data = BytesMut::with_capacity(length as usize);

        for span in self.spans(start, length as u64) {
            let chunk = self
                .read_range(span.file_index, span.file_offset, span.length)
                .await?;
            data.extend_from_slice(&chunk);
        }

        Ok(data.freeze())
    }

    /// Syncs every open file to disk.
    pub async fn flush(&self) -> Result<(), StorageError> {
        self.handle_cache.flush_all().await
    }
}
