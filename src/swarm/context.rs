use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashSet;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Notify};
use tracing::{debug, info, trace, warn};

use crate::allocator::Allocator;
use crate::config::SwarmConfig;
use crate::peer::{stopped, PeerSession, SessionOutcome};
use crate::tracker::PeerSink;

/// State shared by the coordinator, every tracker loop and every peer task.
pub(crate) struct SwarmContext {
    me: Weak<SwarmContext>,
    pub(crate) allocator: Arc<Allocator>,
    pub(crate) config: Arc<SwarmConfig>,
    live_peers: AtomicUsize,
    active_trackers: AtomicUsize,
    /// Addresses with a session running, inbound or outbound.
    connected: DashSet<SocketAddr>,
    /// Woken whenever a peer or tracker finishes.
    pub(crate) changed: Notify,
    shutdown: watch::Sender<bool>,
}

impl SwarmContext {
    pub(crate) fn new(allocator: Arc<Allocator>, config: Arc<SwarmConfig>) -> Arc<Self> {
        let (shutdown, _) = watch::channel(false);
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            allocator,
            config,
            live_peers: AtomicUsize::new(0),
            active_trackers: AtomicUsize::new(0),
            connected: DashSet::new(),
            changed: Notify::new(),
            shutdown,
        })
    }

    pub(crate) fn shutdown(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    pub(crate) fn stop(&self) {
        self.shutdown.send_replace(true);
        self.changed.notify_one();
    }

    pub(crate) fn is_stopped(&self) -> bool {
        *self.shutdown.borrow()
    }

    pub(crate) fn live_peer_count(&self) -> usize {
        self.live_peers.load(Ordering::Acquire)
    }

    pub(crate) fn active_tracker_count(&self) -> usize {
        self.active_trackers.load(Ordering::Acquire)
    }

    /// Both counts are zero: nobody is left to find or serve peers.
    pub(crate) fn is_exhausted(&self) -> bool {
        self.active_tracker_count() == 0 && self.live_peer_count() == 0
    }

    /// Counts a tracker loop as active until the returned slot drops.
    pub(crate) fn tracker_slot(self: &Arc<Self>) -> TrackerSlot {
        self.active_trackers.fetch_add(1, Ordering::AcqRel);
        TrackerSlot { ctx: self.clone() }
    }

    /// Claims `addr` for a new session, or `None` if one is already running
    /// or the swarm is stopping.
    fn peer_slot(self: &Arc<Self>, addr: SocketAddr) -> Option<PeerSlot> {
        if self.is_stopped() || !self.connected.insert(addr) {
            return None;
        }
        self.live_peers.fetch_add(1, Ordering::AcqRel);
        Some(PeerSlot {
            ctx: self.clone(),
            addr,
        })
    }

    fn session(&self, addr: SocketAddr) -> PeerSession {
        PeerSession::new(
            addr,
            self.allocator.clone(),
            self.config.clone(),
            self.shutdown(),
        )
    }

    /// Starts an outbound session to `addr` unless one is already running.
    pub(crate) fn connect_peer(self: &Arc<Self>, addr: SocketAddr) {
        let Some(slot) = self.peer_slot(addr) else {
            trace!(peer = %addr, "skipping duplicate or late peer");
            return;
        };

        let ctx = self.clone();
        tokio::spawn(async move {
            let _slot = slot;
            let mut reconnects = 0;
            loop {
                let outcome = ctx.session(addr).connect().await;
                let productive = outcome.saved_pieces > 0 && outcome.result.is_err();
                log_outcome(&outcome);

                if !productive || ctx.is_stopped() || reconnects >= ctx.config.max_reconnects {
                    break;
                }
                reconnects += 1;
                debug!(peer = %addr, attempt = reconnects, "reconnecting to productive peer");
            }
        });
    }

    /// Runs a session on an accepted stream.
    pub(crate) fn accept_peer(self: &Arc<Self>, stream: TcpStream, addr: SocketAddr) {
        let Some(slot) = self.peer_slot(addr) else {
            trace!(peer = %addr, "dropping duplicate inbound peer");
            return;
        };

        let ctx = self.clone();
        tokio::spawn(async move {
            let _slot = slot;
            log_outcome(&ctx.session(addr).accept(stream).await);
        });
    }

    /// Accepts inbound peers until the swarm stops.
    pub(crate) async fn listen(self: Arc<Self>, listener: TcpListener) {
        let mut shutdown = self.shutdown();
        loop {
            tokio::select! {
                _ = stopped(&mut shutdown) => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        debug!(peer = %addr, "inbound connection");
                        self.accept_peer(stream, addr);
                    }
                    Err(e) => warn!(error = %e, "accept failed"),
                },
            }
        }
    }
}

impl PeerSink for SwarmContext {
    fn live_peers(&self) -> usize {
        self.live_peer_count()
    }

    fn connect_peers(&self, peers: Vec<SocketAddr>) {
        let Some(ctx) = self.me.upgrade() else {
            return;
        };
        for addr in peers {
            ctx.connect_peer(addr);
        }
    }
}

fn log_outcome(outcome: &SessionOutcome) {
    match &outcome.result {
        Ok(reason) => debug!(
            peer = %outcome.addr,
            ?reason,
            saved = outcome.saved_pieces,
            "peer session closed"
        ),
        Err(e) => debug!(
            peer = %outcome.addr,
            error = %e,
            saved = outcome.saved_pieces,
            "peer session failed"
        ),
    }
}

/// Keeps a tracker counted as active while alive.
pub(crate) struct TrackerSlot {
    ctx: Arc<SwarmContext>,
}

impl Drop for TrackerSlot {
    fn drop(&mut self) {
        let left = self.ctx.active_trackers.fetch_sub(1, Ordering::AcqRel) - 1;
        info!(active_trackers = left, "tracker finished");
        self.ctx.changed.notify_one();
    }
}

/// Keeps a peer address claimed and counted while its session task runs.
struct PeerSlot {
    ctx: Arc<SwarmContext>,
    addr: SocketAddr,
}

impl Drop for PeerSlot {
    fn drop(&mut self) {
        self.ctx.connected.remove(&self.addr);
        self.ctx.live_peers.fetch_sub(1, Ordering::AcqRel);
        self.ctx.changed.notify_one();
    }
}
