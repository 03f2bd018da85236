use std::collections::HashMap;

use tokio::sync::mpsc::UnboundedSender;
use tracing::trace;

use super::error::AllocatorError;
use super::{PeerHandle, PieceTarget, Selection};
use crate::metainfo::Info;
use crate::peer::Bitfield;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum PieceState {
    Missing,
    Assigned(PeerHandle),
    /// Verified bytes are on their way to disk.
    Writing(PeerHandle),
    Verified,
}

#[derive(Debug)]
struct Piece {
    state: PieceState,
    rarity: u32,
    /// Overlaps at least one selected file.
    wanted: bool,
    length: u32,
}

#[derive(Debug)]
struct PeerEntry {
    bitfield: Bitfield,
    bitfield_received: bool,
    assigned: Option<u32>,
    have_tx: UnboundedSender<u32>,
}

/// Piece and peer bookkeeping. Everything here is synchronous and runs
/// under the allocator's mutex.
#[derive(Debug)]
pub(super) struct PieceTable {
    pieces: Vec<Piece>,
    peers: HashMap<PeerHandle, PeerEntry>,
    have: Bitfield,
    bytes_left: u64,
    downloaded: u64,
}

impl PieceTable {
    pub(super) fn new(info: &Info) -> Self {
        let pieces = (0..info.piece_count() as u32)
            .map(|index| Piece {
                state: PieceState::Missing,
                rarity: 0,
                wanted: info.piece_is_wanted(index),
                length: info.piece_size(index) as u32,
            })
            .collect();

        Self {
            pieces,
            peers: HashMap::new(),
            have: Bitfield::new(info.piece_count()),
            bytes_left: info.selected_length(),
            downloaded: 0,
        }
    }

    pub(super) fn bytes_left(&self) -> u64 {
        self.bytes_left
    }

    pub(super) fn downloaded(&self) -> u64 {
        self.downloaded
    }

    pub(super) fn have(&self) -> &Bitfield {
        &self.have
    }

    pub(super) fn state(&self, index: u32) -> Option<PieceState> {
        self.pieces.get(index as usize).map(|p| p.state)
    }

    pub(super) fn rarity(&self, index: u32) -> Option<u32> {
        self.pieces.get(index as usize).map(|p| p.rarity)
    }

    pub(super) fn peer_count(&self) -> usize {
        self.peers.len()
    }

    pub(super) fn add_peer(&mut self, peer: PeerHandle, have_tx: UnboundedSender<u32>) {
        self.peers.insert(
            peer,
            PeerEntry {
                bitfield: Bitfield::new(self.pieces.len()),
                bitfield_received: false,
                assigned: None,
                have_tx,
            },
        );
    }

    fn peer_mut(&mut self, peer: PeerHandle) -> Result<&mut PeerEntry, AllocatorError> {
        self.peers
            .get_mut(&peer)
            .ok_or(AllocatorError::UnknownPeer(peer))
    }

    pub(super) fn register_bitfield(
        &mut self,
        peer: PeerHandle,
        bits: &[u8],
    ) -> Result<(), AllocatorError> {
        let piece_count = self.pieces.len();
        let entry = self
            .peers
            .get_mut(&peer)
            .ok_or(AllocatorError::UnknownPeer(peer))?;

        if entry.bitfield_received {
            return Err(AllocatorError::DuplicateBitfield(peer));
        }

        let incoming =
            Bitfield::from_bytes(bits, piece_count).ok_or(AllocatorError::LengthMismatch {
                expected: Bitfield::byte_len(piece_count),
                actual: bits.len(),
            })?;

        entry.bitfield_received = true;
        // Bits already learned from `have` messages are not counted twice.
        for index in incoming.ones() {
            if entry.bitfield.set(index) {
                self.pieces[index].rarity += 1;
            }
        }

        Ok(())
    }

    pub(super) fn register_have(&mut self, peer: PeerHandle, index: u32) -> Result<(), AllocatorError> {
        if index as usize >= self.pieces.len() {
            return Err(AllocatorError::InvalidPieceIndex(index));
        }

        if self.peer_mut(peer)?.bitfield.set(index as usize) {
            self.pieces[index as usize].rarity += 1;
        }
        Ok(())
    }

    /// Drops `peer`'s claim on `index` if it still holds one.
    pub(super) fn release(&mut self, peer: PeerHandle, index: u32) {
        if let Some(piece) = self.pieces.get_mut(index as usize) {
            if piece.state == PieceState::Assigned(peer) {
                piece.state = PieceState::Missing;
            }
        }
        if let Some(entry) = self.peers.get_mut(&peer) {
            if entry.assigned == Some(index) {
                entry.assigned = None;
            }
        }
    }

    pub(super) fn select(&mut self, peer: PeerHandle) -> Result<Selection, AllocatorError> {
        let previous = self.peer_mut(peer)?.assigned.take();
        if let Some(index) = previous {
            self.release(peer, index);
        }

        let entry = self
            .peers
            .get(&peer)
            .ok_or(AllocatorError::UnknownPeer(peer))?;

        let best = self
            .pieces
            .iter()
            .enumerate()
            .filter(|(i, p)| p.wanted && p.state == PieceState::Missing && entry.bitfield.has(*i))
            .min_by_key(|(i, p)| (p.rarity, *i))
            .map(|(i, p)| PieceTarget {
                index: i as u32,
                length: p.length,
            });

        match best {
            Some(target) => {
                self.pieces[target.index as usize].state = PieceState::Assigned(peer);
                self.peer_mut(peer)?.assigned = Some(target.index);
                trace!(%peer, piece = target.index, "assigned piece");
                Ok(Selection::Assigned(target))
            }
            None if self
                .pieces
                .iter()
                .any(|p| p.wanted && p.state == PieceState::Missing) =>
            {
                Ok(Selection::Wait)
            }
            None => Ok(Selection::NoTarget),
        }
    }

    /// Claims `index` for writing. Returns `false` if it is already verified
    /// or being written, in which case the caller does nothing.
    pub(super) fn begin_write(&mut self, index: u32, peer: PeerHandle) -> Result<bool, AllocatorError> {
        let piece = self
            .pieces
            .get_mut(index as usize)
            .ok_or(AllocatorError::InvalidPieceIndex(index))?;

        let holder = match piece.state {
            PieceState::Verified | PieceState::Writing(_) => return Ok(false),
            PieceState::Assigned(holder) => Some(holder),
            PieceState::Missing => None,
        };
        piece.state = PieceState::Writing(peer);

        for id in holder.into_iter().chain([peer]) {
            if let Some(entry) = self.peers.get_mut(&id) {
                if entry.assigned == Some(index) {
                    entry.assigned = None;
                }
            }
        }
        Ok(true)
    }

    /// Marks a written piece verified, queues `have` for every other peer,
    /// and returns `true` once nothing is left to download.
    pub(super) fn finish_write(&mut self, index: u32, peer: PeerHandle, written: u64) -> bool {
        self.pieces[index as usize].state = PieceState::Verified;
        self.have.set(index as usize);
        self.bytes_left = self.bytes_left.saturating_sub(written);
        self.downloaded += written;

        for (id, entry) in &self.peers {
            if *id != peer {
                // A closed receiver means the session is on its way out.
                let _ = entry.have_tx.send(index);
            }
        }

        self.bytes_left == 0
    }

    pub(super) fn abort_write(&mut self, index: u32) {
        if let Some(piece) = self.pieces.get_mut(index as usize) {
            if matches!(piece.state, PieceState::Writing(_)) {
                piece.state = PieceState::Missing;
            }
        }
    }

    /// Forgets `peer`. Returns `false` if it was already gone.
    pub(super) fn remove_peer(&mut self, peer: PeerHandle) -> bool {
        let Some(entry) = self.peers.remove(&peer) else {
            return false;
        };

        for index in entry.bitfield.ones() {
            let piece = &mut self.pieces[index];
            piece.rarity = piece.rarity.saturating_sub(1);
        }

        if let Some(index) = entry.assigned {
            let piece = &mut self.pieces[index as usize];
            if piece.state == PieceState::Assigned(peer) {
                piece.state = PieceState::Missing;
            }
        }
        true
    }
}
