use thiserror::Error;

use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum SwarmError {
    /// Every tracker has failed and no peer is connected.
    #[error("swarm exhausted: no trackers or peers left")]
    Exhausted,

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("swarm task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
