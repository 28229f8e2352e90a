//! Persisted sync manifest: load, atomic save, diffing helpers.
//!
//! The manifest records what is materialized locally. Loading never
//! fails: a missing, unreadable, or structurally unexpected file
//! degrades to an empty manifest, which makes the next pass re-download
//! everything instead of trusting stale state.

use std::path::{Path, PathBuf};

use blobmirror_types::{MANIFEST_VERSION, ManifestEntry, ObjectManifest, RemoteObject};
use chrono::Utc;
use tracing::{debug, warn};

use crate::error::{SyncError, SyncResult};

/// File name of the manifest inside the sync root.
pub const MANIFEST_FILE_NAME: &str = ".blobmirror-manifest.json";

/// Loads and saves the manifest for one sync root.
#[derive(Clone, Debug)]
pub struct ManifestStore {
    root: PathBuf,
}

impl ManifestStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Path of the manifest file.
    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE_NAME)
    }

    /// Loads the manifest, degrading to an empty one when the file is
    /// missing, unreadable, malformed, or of an unsupported version.
    pub async fn load(&self) -> ObjectManifest {
        let path = self.manifest_path();
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("no manifest at {}, starting empty", path.display());
                return ObjectManifest::empty();
            }
            Err(e) => {
                warn!("manifest at {} unreadable ({e}), starting empty", path.display());
                return ObjectManifest::empty();
            }
        };

        match serde_json::from_slice::<ObjectManifest>(&raw) {
            Ok(manifest) if manifest.version == MANIFEST_VERSION => manifest,
            Ok(manifest) => {
                warn!(
                    "manifest at {} has unsupported version {}, starting empty",
                    path.display(),
                    manifest.version
                );
                ObjectManifest::empty()
            }
            Err(e) => {
                warn!("manifest at {} is malformed ({e}), starting empty", path.display());
                ObjectManifest::empty()
            }
        }
    }

    /// Stamps `last_sync_at` and persists the manifest atomically: the
    /// JSON is written to a temp file in the same directory, then renamed
    /// over the real path, so a crash mid-write leaves the previous
    /// manifest intact. A failed save removes the temp file and reports
    /// a [`SyncError::Sync`].
    pub async fn save(&self, manifest: &mut ObjectManifest) -> SyncResult<()> {
        manifest.last_sync_at = Utc::now();

        tokio::fs::create_dir_all(&self.root).await.map_err(|e| {
            SyncError::Sync(format!(
                "failed to create sync root {}: {e}",
                self.root.display()
            ))
        })?;

        let json = serde_json::to_vec_pretty(manifest)
            .map_err(|e| SyncError::Sync(format!("failed to serialize manifest: {e}")))?;

        let path = self.manifest_path();
        let tmp = self
            .root
            .join(format!(".{MANIFEST_FILE_NAME}.{}.tmp", std::process::id()));

        // A failed write or rename must not leave the temp file behind.
        if let Err(e) = tokio::fs::write(&tmp, &json).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(SyncError::Sync(format!(
                "failed to write manifest temp file {}: {e}",
                tmp.display()
            )));
        }
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(SyncError::Sync(format!(
                "failed to move manifest into place at {}: {e}",
                path.display()
            )));
        }

        debug!("saved manifest with {} entries to {}", manifest.len(), path.display());
        Ok(())
    }
}

/// True when `object` must be transferred: no entry for its key, or a
/// version tag that differs from the recorded one. Tags are opaque and
/// compared only for exact equality.
pub fn needs_update(manifest: &ObjectManifest, object: &RemoteObject) -> bool {
    match manifest.entry(&object.key) {
        Some(entry) => entry.version_tag != object.version_tag,
        None => true,
    }
}

/// Builds the manifest entry recording a completed transfer, stamping
/// the current time as `synced_at`.
pub fn create_entry(object: &RemoteObject, local_path: &Path) -> ManifestEntry {
    ManifestEntry {
        key: object.key.clone(),
        version_tag: object.version_tag.clone(),
        last_modified: object.last_modified,
        size: object.size,
        local_path: local_path.to_path_buf(),
        synced_at: Utc::now(),
    }
}
