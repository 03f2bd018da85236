use std::net::SocketAddr;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use sha1::{Digest, Sha1};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, sleep_until, timeout, Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use super::error::PeerError;
use super::message::{Handshake, Message};
use super::transport::{split, PeerReader, PeerWriter};
use crate::allocator::{Allocator, PeerHandle, PieceTarget, Selection};
use crate::config::SwarmConfig;
use crate::constants::{BLOCK_SIZE, MAX_REQUEST_LENGTH, TARGET_RETRY_INTERVAL};

/// Why a session ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Nothing is left for this peer to give us.
    NoTarget,
    /// The peer said nothing about its pieces in time.
    BitfieldTimeout,
    /// The swarm is shutting down.
    Cancelled,
    /// The claimed piece made no progress in time; the claim is released.
    Stalled,
}

/// What a finished session reports back to whoever spawned it.
#[derive(Debug)]
pub struct SessionOutcome {
    pub addr: SocketAddr,
    /// Pieces verified and saved through this connection.
    pub saved_pieces: u32,
    pub result: Result<CloseReason, PeerError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    AwaitBitfield,
    NeedTarget,
    AwaitUnchoke,
    AwaitPiece,
}

/// The piece currently being fetched.
struct Download {
    target: PieceTarget,
    /// Bytes received so far; also where the next request starts.
    buffer: BytesMut,
    /// `(begin, length)` of the one request in flight.
    pending: Option<(u32, u32)>,
}

impl Download {
    fn new(target: PieceTarget) -> Self {
        Self {
            target,
            buffer: BytesMut::with_capacity(target.length as usize),
            pending: None,
        }
    }

    fn cursor(&self) -> u32 {
        self.buffer.len() as u32
    }
}

/// One connection to one remote peer.
///
/// A session drives a single TCP stream through handshake, possession
/// exchange and piece download, one outstanding request at a time. It
/// registers with the [`Allocator`] only after a good handshake and always
/// deregisters exactly once on the way out.
pub struct PeerSession {
    addr: SocketAddr,
    allocator: Arc<Allocator>,
    config: Arc<SwarmConfig>,
    shutdown: watch::Receiver<bool>,
}

impl PeerSession {
    pub fn new(
        addr: SocketAddr,
        allocator: Arc<Allocator>,
        config: Arc<SwarmConfig>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            addr,
            allocator,
            config,
            shutdown,
        }
    }

    /// Dials the peer and runs the session to completion.
    pub async fn connect(self) -> SessionOutcome {
        let stream = match timeout(self.config.connect_timeout, TcpStream::connect(self.addr)).await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return self.outcome(0, Err(e.into())),
            Err(_) => return self.outcome(0, Err(PeerError::Timeout)),
        };
        self.run(stream, true).await
    }

    /// Runs the session over an accepted stream. The remote speaks first.
    pub async fn accept(self, stream: TcpStream) -> SessionOutcome {
        self.run(stream, false).await
    }

    fn outcome(&self, saved_pieces: u32, result: Result<CloseReason, PeerError>) -> SessionOutcome {
        SessionOutcome {
            addr: self.addr,
            saved_pieces,
            result,
        }
    }

    async fn run(self, stream: TcpStream, outbound: bool) -> SessionOutcome {
        let mut shutdown = self.shutdown.clone();
        let handshake = tokio::select! {
            result = self.handshake(stream, outbound) => result,
            _ = stopped(&mut shutdown) => return self.outcome(0, Ok(CloseReason::Cancelled)),
        };
        let (reader, writer) = match handshake {
            Ok(halves) => halves,
            Err(e) => return self.outcome(0, Err(e)),
        };

        let (peer, have_rx) = self.allocator.register_peer();
        debug!(addr = %self.addr, %peer, "handshake complete");

        let mut conn = Connection {
            addr: self.addr,
            peer,
            allocator: &self.allocator,
            config: &self.config,
            reader,
            writer,
            have_rx,
            phase: Phase::AwaitBitfield,
            peer_choking: true,
            peer_interested: false,
            download: None,
            saved_pieces: 0,
            last_activity: Instant::now(),
            progress_at: Instant::now(),
        };
        let result = conn.run(&mut shutdown).await;
        let saved = conn.saved_pieces;

        self.allocator.remove_peer(peer);
        self.outcome(saved, result)
    }

    async fn handshake(
        &self,
        stream: TcpStream,
        outbound: bool,
    ) -> Result<(PeerReader, PeerWriter), PeerError> {
        let (mut reader, mut writer) = split(stream);
        let metainfo = self.allocator.metainfo();
        let ours = Handshake::new(metainfo.info_hash, self.config.peer_id);

        if outbound {
            writer.send_handshake(&ours).await?;
        }

        let theirs = timeout(self.config.handshake_timeout, reader.receive_handshake())
            .await
            .map_err(|_| PeerError::Timeout)??;
        if theirs.info_hash != metainfo.info_hash {
            return Err(PeerError::InfoHashMismatch);
        }

        if !outbound {
            writer.send_handshake(&ours).await?;
        }

        trace!(addr = %self.addr, remote = %theirs.peer_id, "handshake received");
        Ok((reader, writer))
    }
}

/// Resolves once the stop flag is raised or its sender is gone.
pub(crate) async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

/// Main-loop state of an established session.
struct Connection<'a> {
    addr: SocketAddr,
    peer: PeerHandle,
    allocator: &'a Arc<Allocator>,
    config: &'a SwarmConfig,
    reader: PeerReader,
    writer: PeerWriter,
    have_rx: mpsc::UnboundedReceiver<u32>,
    phase: Phase,
    /// The remote is refusing our requests.
    peer_choking: bool,
    peer_interested: bool,
    download: Option<Download>,
    saved_pieces: u32,
    /// Last frame sent or received; keep-alives fire after a quiet period.
    last_activity: Instant,
    /// Last time the current piece was assigned or grew.
    progress_at: Instant,
}

impl Connection<'_> {
    async fn run(&mut self, shutdown: &mut watch::Receiver<bool>) -> Result<CloseReason, PeerError> {
        if let Some(ours) = self.allocator.our_bitfield() {
            self.send(&Message::Bitfield(ours.to_bytes())).await?;
        }
        self.send(&Message::Unchoke).await?;
        self.send(&Message::Interested).await?;

        let bitfield_deadline = Instant::now() + self.config.bitfield_timeout;
        let mut last_received = Instant::now();

        let mut retry = interval_at(Instant::now() + TARGET_RETRY_INTERVAL, TARGET_RETRY_INTERVAL);
        retry.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow() {
                return Ok(CloseReason::Cancelled);
            }

            while let Ok(index) = self.have_rx.try_recv() {
                self.send(&Message::Have { piece: index }).await?;
            }

            if self.phase == Phase::NeedTarget {
                if let Some(reason) = self.pick_target().await? {
                    return Ok(reason);
                }
            }

            let stalling = matches!(self.phase, Phase::AwaitUnchoke | Phase::AwaitPiece);

            tokio::select! {
                _ = stopped(shutdown) => return Ok(CloseReason::Cancelled),
                received = self.reader.receive() => {
                    last_received = Instant::now();
                    self.last_activity = last_received;
                    match received {
                        Ok(message) => self.handle(message).await?,
                        Err(e) if e.is_recoverable() => {
                            warn!(addr = %self.addr, error = %e, "discarding malformed message");
                        }
                        Err(e) => return Err(e),
                    }
                }
                Some(index) = self.have_rx.recv() => {
                    self.send(&Message::Have { piece: index }).await?;
                }
                _ = sleep_until(bitfield_deadline), if self.phase == Phase::AwaitBitfield => {
                    return Ok(CloseReason::BitfieldTimeout);
                }
                _ = sleep_until(last_received + self.config.read_timeout) => {
                    return Err(PeerError::Timeout);
                }
                _ = sleep_until(self.last_activity + self.config.keepalive_interval) => {
                    trace!(addr = %self.addr, "keep-alive");
                    self.send(&Message::KeepAlive).await?;
                    self.send(&Message::Interested).await?;
                }
                _ = sleep_until(self.progress_at + self.config.request_timeout), if stalling => {
                    debug!(addr = %self.addr, phase = ?self.phase, "piece stalled, releasing claim");
                    return Ok(CloseReason::Stalled);
                }
                _ = retry.tick(), if self.phase == Phase::NeedTarget => {}
            }
        }
    }

    async fn send(&mut self, message: &Message) -> Result<(), PeerError> {
        self.writer.send(message).await?;
        self.last_activity = Instant::now();
        Ok(())
    }

    /// Asks the allocator for work. `Some` means the session should close.
    async fn pick_target(&mut self) -> Result<Option<CloseReason>, PeerError> {
        match self.allocator.select_target(self.peer)? {
            Selection::Assigned(target) => {
                self.download = Some(Download::new(target));
                self.progress_at = Instant::now();
                if self.peer_choking {
                    self.phase = Phase::AwaitUnchoke;
                } else {
                    self.request_next().await?;
                }
                Ok(None)
            }
            Selection::Wait => Ok(None),
            Selection::NoTarget => Ok(Some(CloseReason::NoTarget)),
        }
    }

    async fn request_next(&mut self) -> Result<(), PeerError> {
        let Some(download) = self.download.as_mut() else {
            self.phase = Phase::NeedTarget;
            return Ok(());
        };

        let begin = download.cursor();
        let length = BLOCK_SIZE.min(download.target.length - begin);
        download.pending = Some((begin, length));
        let index = download.target.index;

        self.phase = Phase::AwaitPiece;
        self.send(&Message::Request {
            index,
            begin,
            length,
        })
        .await
    }

    async fn handle(&mut self, message: Message) -> Result<(), PeerError> {
        match message {
            Message::KeepAlive => trace!(addr = %self.addr, "keep-alive received"),
            Message::Choke => {
                self.peer_choking = true;
                if self.phase == Phase::AwaitPiece {
                    // The remote drops queued requests on choke; ask again
                    // from the same offset after unchoke.
                    if let Some(download) = self.download.as_mut() {
                        download.pending = None;
                    }
                    self.phase = Phase::AwaitUnchoke;
                }
            }
            Message::Unchoke => {
                self.peer_choking = false;
                if self.phase == Phase::AwaitUnchoke {
                    self.request_next().await?;
                }
            }
            Message::Interested => self.peer_interested = true,
            Message::NotInterested => self.peer_interested = false,
            Message::Have { piece } => match self.allocator.register_have(self.peer, piece) {
                Ok(()) => self.possession_known(),
                Err(e) => warn!(addr = %self.addr, error = %e, "ignoring have"),
            },
            Message::Bitfield(bits) => match self.allocator.register_bitfield(self.peer, &bits) {
                Ok(()) => self.possession_known(),
                Err(e) => warn!(addr = %self.addr, error = %e, "ignoring bitfield"),
            },
            Message::Request {
                index,
                begin,
                length,
            } => self.serve(index, begin, length).await?,
            Message::Piece { index, begin, data } => self.receive_block(index, begin, data).await?,
            Message::Cancel { index, begin, .. } => {
                trace!(addr = %self.addr, index, begin, "cancel ignored");
            }
            Message::Unknown { id, payload } => {
                debug!(addr = %self.addr, id, len = payload.len(), "unknown message discarded");
            }
        }
        Ok(())
    }

    fn possession_known(&mut self) {
        if self.phase == Phase::AwaitBitfield {
            self.phase = Phase::NeedTarget;
        }
    }

    async fn serve(&mut self, index: u32, begin: u32, length: u32) -> Result<(), PeerError> {
        if length == 0 || length > MAX_REQUEST_LENGTH {
            debug!(addr = %self.addr, index, begin, length, "ignoring oversized request");
            return Ok(());
        }

        match self.allocator.read_segment(index, begin, length).await {
            Ok(data) => {
                self.send(&Message::Piece { index, begin, data }).await?;
                self.allocator.add_uploaded(length as u64);
                trace!(addr = %self.addr, index, begin, length, "served block");
            }
            Err(e) => debug!(addr = %self.addr, index, begin, error = %e, "cannot serve request"),
        }
        Ok(())
    }

    async fn receive_block(&mut self, index: u32, begin: u32, data: Bytes) -> Result<(), PeerError> {
        let accepted = self.phase == Phase::AwaitPiece
            && self.download.as_ref().is_some_and(|d| {
                d.target.index == index && d.pending == Some((begin, data.len() as u32))
            });
        if !accepted {
            trace!(addr = %self.addr, index, begin, len = data.len(), "unexpected block dropped");
            return Ok(());
        }

        let Some(download) = self.download.as_mut() else {
            return Ok(());
        };
        download.buffer.extend_from_slice(&data);
        download.pending = None;
        self.progress_at = Instant::now();

        if download.cursor() < download.target.length {
            if self.peer_choking {
                self.phase = Phase::AwaitUnchoke;
                Ok(())
            } else {
                self.request_next().await
            }
        } else {
            self.finish_piece().await
        }
    }

    async fn finish_piece(&mut self) -> Result<(), PeerError> {
        self.phase = Phase::NeedTarget;
        let Some(download) = self.download.take() else {
            return Ok(());
        };

        let index = download.target.index;
        let data = download.buffer.freeze();
        let expected = self
            .allocator
            .metainfo()
            .info
            .piece_hash(index)
            .copied();

        let hashed = data.clone();
        let actual = tokio::task::spawn_blocking(move || {
            let mut digest = [0u8; 20];
            digest.copy_from_slice(&Sha1::digest(&hashed));
            digest
        })
        .await
        .map_err(|e| PeerError::Io(std::io::Error::other(e)))?;

        if expected != Some(actual) {
            warn!(addr = %self.addr, piece = index, "hash mismatch, piece discarded");
            self.allocator.release(self.peer, index);
            return Ok(());
        }

        match self.allocator.save_piece(index, data, self.peer).await {
            Ok(true) => {
                self.saved_pieces += 1;
                info!(addr = %self.addr, piece = index, "piece saved");
            }
            Ok(false) => {}
            Err(e) => warn!(addr = %self.addr, piece = index, error = %e, "piece save failed"),
        }
        Ok(())
    }
}
