//! Shared types for mirroring a remote object container to local disk.
//!
//! The manifest types serialize with camelCase field names; the manifest
//! file on disk is the only persisted format in the workspace and its
//! shape is part of the compatibility contract (`MANIFEST_VERSION`).

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Schema version of the persisted manifest. Readers treat any other
/// value as an unreadable manifest and fall back to a full re-download.
pub const MANIFEST_VERSION: u32 = 1;

/// One object as observed in a remote listing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteObject {
    pub key: String,
    /// Opaque version tag (e.g. an ETag). Compared only for equality.
    pub version_tag: String,
    pub last_modified: DateTime<Utc>,
    pub size: u64,
    pub content_hash: Option<String>,
}

/// Per-object record of what is currently materialized on disk.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ManifestEntry {
    pub key: String,
    pub version_tag: String,
    pub last_modified: DateTime<Utc>,
    pub size: u64,
    pub local_path: PathBuf,
    pub synced_at: DateTime<Utc>,
}

/// The persisted sync manifest: schema version, last completed pass,
/// and entries keyed by remote object key.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ObjectManifest {
    pub version: u32,
    pub last_sync_at: DateTime<Utc>,
    pub entries: HashMap<String, ManifestEntry>,
}

impl ObjectManifest {
    /// A manifest that has never recorded a sync.
    pub fn empty() -> Self {
        Self {
            version: MANIFEST_VERSION,
            last_sync_at: DateTime::UNIX_EPOCH,
            entries: HashMap::new(),
        }
    }

    pub fn entry(&self, key: &str) -> Option<&ManifestEntry> {
        self.entries.get(key)
    }

    /// Inserts or replaces the entry for its remote key.
    pub fn upsert(&mut self, entry: ManifestEntry) {
        self.entries.insert(entry.key.clone(), entry);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl Default for ObjectManifest {
    fn default() -> Self {
        Self::empty()
    }
}

/// A successfully completed single-object transfer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferOutcome {
    pub key: String,
    pub local_path: PathBuf,
    /// Tag observed on the fetch itself, which may be newer than the
    /// listing that requested it.
    pub version_tag: String,
    pub last_modified: DateTime<Utc>,
    pub size: u64,
}

/// How an object changed relative to the known-tags map.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Modified,
}

/// A change observed by the polling watcher.
///
/// `path` is the materialized local path in filesystem mode and the
/// prefix-relative object path in memory mode.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchChange {
    pub kind: ChangeKind,
    pub key: String,
    pub path: String,
    pub observed_at: DateTime<Utc>,
}

/// Selection strategy for a sync pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Download every listed object regardless of manifest state.
    Full,
    /// Download only objects whose version tag is unknown or changed.
    #[default]
    Incremental,
}

/// Counters for one completed sync pass. Partial failure is reported
/// here, not as an error.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub downloaded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub failed_keys: Vec<String>,
    pub total_objects: usize,
    /// The distinguished env object seen in the listing, if any. It is
    /// never mirrored to disk; callers fetch it separately.
    pub env_object: Option<RemoteObject>,
}

impl SyncReport {
    /// Returns true when every requested transfer succeeded.
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}
