use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::error::AllocatorError;
use super::table::{PieceState, PieceTable};
use super::{PeerHandle, Selection};
use crate::metainfo::Metainfo;
use crate::peer::Bitfield;
use crate::storage::TorrentStorage;

/// Shared piece scheduler for one torrent.
///
/// Every session holds an `Arc<Allocator>` and a [`PeerHandle`]; the
/// allocator owns all piece state. The table lock is never held across an
/// `.await`: storage I/O happens between a claim and its completion, with
/// the piece parked in an intermediate state so no other peer can take it.
pub struct Allocator {
    metainfo: Arc<Metainfo>,
    storage: Arc<TorrentStorage>,
    table: Mutex<PieceTable>,
    next_peer: AtomicU64,
    uploaded: AtomicU64,
    complete_tx: watch::Sender<bool>,
}

impl Allocator {
    pub fn new(metainfo: Arc<Metainfo>, storage: Arc<TorrentStorage>) -> Self {
        let table = PieceTable::new(&metainfo.info);
        let (complete_tx, _) = watch::channel(table.bytes_left() == 0);

        Self {
            metainfo,
            storage,
            table: Mutex::new(table),
            next_peer: AtomicU64::new(1),
            uploaded: AtomicU64::new(0),
            complete_tx,
        }
    }

    pub fn metainfo(&self) -> &Arc<Metainfo> {
        &self.metainfo
    }

    pub fn storage(&self) -> &Arc<TorrentStorage> {
        &self.storage
    }

    /// Registers a new peer.
    ///
    /// The receiver yields, in verification order, every piece saved
    /// through some *other* peer while this one stays registered.
    pub fn register_peer(&self) -> (PeerHandle, mpsc::UnboundedReceiver<u32>) {
        let peer = PeerHandle(self.next_peer.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::unbounded_channel();
        self.table.lock().add_peer(peer, tx);
        (peer, rx)
    }

    /// Records a peer's `bitfield` message.
    ///
    /// # Errors
    ///
    /// [`AllocatorError::DuplicateBitfield`] on a second call for the same
    /// peer and [`AllocatorError::LengthMismatch`] when `bits` is not
    /// exactly `ceil(piece_count / 8)` bytes. Either way nothing changes.
    pub fn register_bitfield(&self, peer: PeerHandle, bits: &[u8]) -> Result<(), AllocatorError> {
        self.table.lock().register_bitfield(peer, bits)
    }

    /// Records a peer's `have` message.
    pub fn register_have(&self, peer: PeerHandle, index: u32) -> Result<(), AllocatorError> {
        self.table.lock().register_have(peer, index)
    }

    /// Picks the rarest piece `peer` has that nobody is fetching.
    ///
    /// Any piece previously assigned to `peer` is released first. Ties on
    /// rarity go to the lowest index.
    pub fn select_target(&self, peer: PeerHandle) -> Result<Selection, AllocatorError> {
        let selection = self.table.lock().select(peer)?;
        if let Selection::Assigned(target) = selection {
            debug!(%peer, piece = target.index, length = target.length, "selected piece");
        }
        Ok(selection)
    }

    /// Gives up `peer`'s claim on `index`, e.g. after a hash mismatch.
    pub fn release(&self, peer: PeerHandle, index: u32) {
        self.table.lock().release(peer, index);
    }

    /// Writes a verified piece and announces it to every other peer.
    ///
    /// Returns `Ok(false)` without touching disk if the piece is already
    /// verified or being saved. On a storage error the piece goes back to
    /// missing so another peer can fetch it.
    pub async fn save_piece(
        &self,
        index: u32,
        data: Bytes,
        peer: PeerHandle,
    ) -> Result<bool, AllocatorError> {
        if !self.table.lock().begin_write(index, peer)? {
            debug!(%peer, piece = index, "piece already saved");
            return Ok(false);
        }

        let written = match self.storage.write_piece(index, &data).await {
            Ok(written) => written,
            Err(e) => {
                self.table.lock().abort_write(index);
                warn!(%peer, piece = index, error = %e, "failed to save piece");
                return Err(e.into());
            }
        };

        let (complete, left) = {
            let mut table = self.table.lock();
            let complete = table.finish_write(index, peer, written);
            (complete, table.bytes_left())
        };

        info!(piece = index, bytes_left = left, "piece verified");
        if complete {
            info!("download complete");
            self.complete_tx.send_replace(true);
        }
        Ok(true)
    }

    /// Reads a block of a verified piece for upload.
    pub async fn read_segment(&self, index: u32, begin: u32, length: u32) -> Result<Bytes, AllocatorError> {
        if self.table.lock().state(index) != Some(PieceState::Verified) {
            return Err(AllocatorError::Unavailable(index));
        }
        Ok(self.storage.read_block(index, begin, length).await?)
    }

    /// Forgets `peer`, undoing its rarity contributions and releasing its
    /// assignment. Calling it again for the same peer does nothing.
    pub fn remove_peer(&self, peer: PeerHandle) {
        if self.table.lock().remove_peer(peer) {
            debug!(%peer, "peer removed");
        }
    }

    /// Our verified pieces, or `None` while we have none to advertise.
    pub fn our_bitfield(&self) -> Option<Bitfield> {
        let table = self.table.lock();
        (!table.have().is_empty()).then(|| table.have().clone())
    }

    pub fn is_verified(&self, index: u32) -> bool {
        self.table.lock().state(index) == Some(PieceState::Verified)
    }

    pub fn bytes_left(&self) -> u64 {
        self.table.lock().bytes_left()
    }

    /// Bytes written to disk this session.
    pub fn bytes_downloaded(&self) -> u64 {
        self.table.lock().downloaded()
    }

    pub fn bytes_uploaded(&self) -> u64 {
        self.uploaded.load(Ordering::Relaxed)
    }

    pub fn add_uploaded(&self, bytes: u64) {
        self.uploaded.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Number of currently registered peers.
    pub fn peer_count(&self) -> usize {
        self.table.lock().peer_count()
    }

    /// Once true, stays true.
    pub fn is_complete(&self) -> bool {
        *self.complete_tx.borrow()
    }

    /// Watches for completion.
    pub fn completion(&self) -> watch::Receiver<bool> {
        self.complete_tx.subscribe()
    }

    #[cfg(test)]
    pub(crate) fn rarity(&self, index: u32) -> Option<u32> {
        self.table.lock().rarity(index)
    }

    #[cfg(test)]
    pub(crate) fn assignee(&self, index: u32) -> Option<PeerHandle> {
        match self.table.lock().state(index)? {
            PieceState::Assigned(peer) => Some(peer),
            _ => None,
        }
    }
}
