//! Remote object store abstraction.

use std::path::Path;

use async_trait::async_trait;
use blobmirror_types::{RemoteObject, TransferOutcome};
use chrono::{DateTime, Utc};

use crate::error::SyncResult;

/// An object fetched fully into memory, with the version tag observed on
/// the fetch itself.
#[derive(Clone, Debug)]
pub struct FetchedObject {
    pub key: String,
    pub version_tag: String,
    pub last_modified: DateTime<Utc>,
    pub data: Vec<u8>,
}

/// Read-only view of a remote object container.
///
/// Implementations translate their transport errors into the closed
/// [`SyncError`](crate::SyncError) taxonomy at this boundary, so callers
/// never see SDK error types.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Lists every object whose key starts with `prefix`.
    async fn list(&self, prefix: &str) -> SyncResult<Vec<RemoteObject>>;

    /// Fetches an object fully into memory.
    async fn fetch(&self, key: &str) -> SyncResult<FetchedObject>;

    /// Fetches an object into memory and writes it to `path`.
    async fn fetch_to_path(&self, key: &str, path: &Path) -> SyncResult<TransferOutcome>;

    /// Streams an object to `path` chunk by chunk, never holding the
    /// whole body in memory.
    async fn fetch_stream_to_path(&self, key: &str, path: &Path) -> SyncResult<TransferOutcome>;
}
