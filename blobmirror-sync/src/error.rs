//! Mirror engine error types.

use thiserror::Error;

/// Result type for mirror operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors surfaced by the mirror engine.
///
/// The set is closed: transport and serialization failures are translated
/// into one of these kinds at the boundary where they occur, so callers
/// can match exhaustively.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A remote key failed path-safety validation.
    #[error("unsafe object key {key:?}: {reason}")]
    Traversal { key: String, reason: String },

    /// A sync pass, manifest write, or transfer failed.
    #[error("sync operation failed: {0}")]
    Sync(String),

    /// The remote store could not be reached.
    #[error("connectivity failure: {0}")]
    Connectivity(String),

    /// The remote store rejected the request as unauthorized.
    #[error("authentication failed: {message}")]
    Auth {
        message: String,
        status: Option<u16>,
    },

    /// The requested object does not exist remotely.
    #[error("object not found: {key}")]
    NotFound { key: String },
}

impl SyncError {
    /// Builds a traversal rejection for `key`.
    pub fn traversal(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Traversal {
            key: key.into(),
            reason: reason.into(),
        }
    }
}
