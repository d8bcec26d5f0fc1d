//! Error taxonomy for the receiver.
//!
//! Every per-connection error is contained by the connection handler;
//! only listener bind failures escape to process scope.

use std::path::PathBuf;
use thiserror::Error;

/// Counter or artifact I/O failure.
#[derive(Debug, Error)]
#[error("storage error at {}: {source}", .path.display())]
pub struct StorageError {
    /// File or directory the operation touched.
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

impl StorageError {
    pub fn new(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self {
            path: path.into(),
            source,
        }
    }
}

/// Failure reported by the decryption capability.
#[derive(Debug, Error)]
pub enum DecryptError {
    /// The decryption program could not be started or talked to.
    #[error("failed to run decryption program: {0}")]
    Io(#[from] std::io::Error),

    /// The decryption program ran and refused the payload.
    #[error("decryption failed: {0}")]
    Rejected(String),
}

/// Failure forwarding an artifact to the output sink.
#[derive(Debug, Error)]
pub enum SinkError {
    /// No default destination is configured on this host.
    #[error("no default print destination")]
    Unavailable,

    /// The submission program ran but reported an error.
    #[error("print submission failed: {0}")]
    Command(String),

    #[error("failed to run print program: {0}")]
    Io(#[from] std::io::Error),
}

/// Why a single connection ended without an acknowledgment.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The source has used up today's allowance.
    #[error("rate limit exceeded for {0}")]
    RateLimited(String),

    /// The received bytes are not UTF-8.
    #[error("received bytes are not valid UTF-8: {0}")]
    Decode(#[from] std::string::FromUtf8Error),

    /// Reading from the socket failed or timed out.
    #[error("failed to read message: {0}")]
    Read(std::io::Error),

    #[error(transparent)]
    Decryption(#[from] DecryptError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Result type for connection handling.
pub type ConnectionResult<T> = Result<T, ConnectionError>;
