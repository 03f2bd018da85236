use std::path::PathBuf;
use std::sync::Arc;

use futures::future::join_all;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::context::SwarmContext;
use super::error::SwarmError;
use crate::allocator::Allocator;
use crate::config::SwarmConfig;
use crate::metainfo::Metainfo;
use crate::storage::TorrentStorage;
use crate::tracker::{PeerSink, TrackerClient};

/// How a swarm that did not fail came to an end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwarmOutcome {
    /// Every selected file is on disk.
    Completed,
    /// [`SwarmHandle::stop`] was called first.
    Stopped,
}

/// A download that has been prepared but not started.
///
/// ```no_run
/// use rswarm::{load_torrent, Swarm, SwarmConfig};
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let metainfo = load_torrent("example.torrent")?;
/// let handle = Swarm::new(metainfo, "downloads", SwarmConfig::default())?
///     .start()
///     .await?;
/// let outcome = handle.wait().await?;
/// println!("{:?}", outcome);
/// # Ok(())
/// # }
/// ```
pub struct Swarm {
    metainfo: Arc<Metainfo>,
    storage: Arc<TorrentStorage>,
    config: SwarmConfig,
}

impl Swarm {
    /// Prepares storage for `metainfo` under `save_path`.
    ///
    /// File selection is frozen here.
    pub fn new(
        metainfo: Metainfo,
        save_path: impl Into<PathBuf>,
        config: SwarmConfig,
    ) -> Result<Self, SwarmError> {
        let storage = TorrentStorage::new(save_path, &metainfo.info)?;
        Ok(Self {
            metainfo: Arc::new(metainfo),
            storage: Arc::new(storage),
            config,
        })
    }

    /// Lays out the files, then starts one task per tracker, the inbound
    /// listener and the coordinator.
    pub async fn start(self) -> Result<SwarmHandle, SwarmError> {
        self.storage.ensure_layout().await?;

        let allocator = Arc::new(Allocator::new(self.metainfo.clone(), self.storage));
        let config = Arc::new(self.config);
        let ctx = SwarmContext::new(allocator.clone(), config.clone());

        info!(
            name = %self.metainfo.info.name,
            info_hash = %self.metainfo.info_hash,
            bytes_left = allocator.bytes_left(),
            "starting swarm"
        );

        let listener = if config.accept_inbound {
            match TcpListener::bind(("0.0.0.0", config.listen_port)).await {
                Ok(listener) => Some(tokio::spawn(ctx.clone().listen(listener))),
                Err(e) => {
                    warn!(port = config.listen_port, error = %e, "cannot accept inbound peers");
                    None
                }
            }
        } else {
            None
        };

        let trackers = self
            .metainfo
            .trackers()
            .into_iter()
            .map(|url| {
                let slot = ctx.tracker_slot();
                let sink: Arc<dyn PeerSink> = ctx.clone();
                let client = TrackerClient::new(
                    url,
                    allocator.clone(),
                    config.clone(),
                    sink,
                    ctx.shutdown(),
                );
                tokio::spawn(async move {
                    let _slot = slot;
                    let url = client.url().to_string();
                    match client.run().await {
                        Ok(()) => debug!(tracker = %url, "tracker loop finished"),
                        Err(e) => warn!(tracker = %url, error = %e, "tracker abandoned"),
                    }
                })
            })
            .collect();

        let coordinator = tokio::spawn(coordinate(ctx.clone(), trackers, listener));

        Ok(SwarmHandle { ctx, coordinator })
    }
}

/// Starts a swarm with [`SwarmConfig::default`].
pub async fn start_swarm(
    metainfo: Metainfo,
    save_path: impl Into<PathBuf>,
) -> Result<SwarmHandle, SwarmError> {
    Swarm::new(metainfo, save_path, SwarmConfig::default())?
        .start()
        .await
}

/// Decides how the swarm ends, then winds everything down.
pub(super) async fn coordinate(
    ctx: Arc<SwarmContext>,
    trackers: Vec<JoinHandle<()>>,
    listener: Option<JoinHandle<()>>,
) -> Result<SwarmOutcome, SwarmError> {
    let mut completion = ctx.allocator.completion();
    let mut shutdown = ctx.shutdown();

    let outcome = loop {
        if ctx.allocator.is_complete() {
            break Ok(SwarmOutcome::Completed);
        }
        if *shutdown.borrow_and_update() {
            break Ok(SwarmOutcome::Stopped);
        }
        if ctx.is_exhausted() {
            break Err(SwarmError::Exhausted);
        }

        tokio::select! {
            _ = completion.changed() => {}
            _ = shutdown.changed() => {}
            _ = ctx.changed.notified() => {}
        }
    };

    match &outcome {
        Ok(outcome) => info!(?outcome, "swarm finished"),
        Err(e) => warn!(error = %e, "swarm finished"),
    }

    ctx.stop();
    for joined in join_all(trackers).await {
        if let Err(e) = joined {
            warn!(error = %e, "tracker task failed");
        }
    }
    if let Some(listener) = listener {
        if let Err(e) = listener.await {
            warn!(error = %e, "inbound listener task failed");
        }
    }
    if let Err(e) = ctx.allocator.storage().flush().await {
        warn!(error = %e, "final flush failed");
    }

    outcome
}

/// Status and control of a running swarm.
pub struct SwarmHandle {
    ctx: Arc<SwarmContext>,
    coordinator: JoinHandle<Result<SwarmOutcome, SwarmError>>,
}

impl SwarmHandle {
    pub fn metainfo(&self) -> &Metainfo {
        self.ctx.allocator.metainfo()
    }

    /// Bytes of selected files still missing.
    pub fn bytes_left(&self) -> u64 {
        self.ctx.allocator.bytes_left()
    }

    pub fn bytes_downloaded(&self) -> u64 {
        self.ctx.allocator.bytes_downloaded()
    }

    pub fn bytes_uploaded(&self) -> u64 {
        self.ctx.allocator.bytes_uploaded()
    }

    pub fn is_complete(&self) -> bool {
        self.ctx.allocator.is_complete()
    }

    pub fn active_tracker_count(&self) -> usize {
        self.ctx.active_tracker_count()
    }

    pub fn live_peer_count(&self) -> usize {
        self.ctx.live_peer_count()
    }

    /// Asks every task to wind down. Returns immediately; use
    /// [`wait`](Self::wait) to see them finish.
    pub fn stop(&self) {
        self.ctx.stop();
    }

    /// Resolves once the swarm has completed, been stopped or run dry.
    pub async fn wait(self) -> Result<SwarmOutcome, SwarmError> {
        self.coordinator.await?
    }
}
