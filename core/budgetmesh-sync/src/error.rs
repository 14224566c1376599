//! Errors surfaced by the replication layer.
//!
//! Inbound faults never reach callers as errors; they are logged and the
//! datagram is dropped. These are for local calls that can fail.

use budgetmesh_crypto::CryptoError;
use budgetmesh_store::StorageError;
use thiserror::Error;

pub type SyncResult<T> = Result<T, SyncError>;

#[derive(Debug, Error)]
pub enum SyncError {
    /// Socket setup failed.
    #[error("socket: {0}")]
    Network(String),

    /// A message or frame that breaks the wire rules.
    #[error("protocol: {0}")]
    Protocol(String),

    #[error("json: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("session file: {0}")]
    Io(#[from] std::io::Error),

    /// Not `host:port` or `host[port]`.
    #[error("invalid endpoint {0:?}")]
    InvalidEndpoint(String),

    #[error("{0} already taken")]
    AlreadyTaken(&'static str),

    /// A blocking job panicked or was cancelled.
    #[error("background task: {0}")]
    Task(String),
}

impl From<tokio::task::JoinError> for SyncError {
    fn from(e: tokio::task::JoinError) -> Self {
        SyncError::Task(e.to_string())
    }
}
