use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("bencode error: {0}")]
    Bencode(#[from] crate::bencode::BencodeError),

    /// The tracker answered with a `failure reason` or a UDP error action.
    #[error("tracker returned error: {0}")]
    Failure(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// No usable answer: the host did not resolve or the HTTP status was
    /// not a success.
    #[error("tracker unreachable: {0}")]
    Unreachable(String),

    /// Every UDP retry timed out or was answered with garbage.
    #[error("tracker abandoned after {0} attempts")]
    Abandoned(u32),

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("unsupported protocol: {0}")]
    UnsupportedProtocol(String),
}
