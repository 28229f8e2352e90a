//! One-shot sync pass: list, diff, download, record.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use blobmirror_types::{RemoteObject, SyncMode, SyncReport};
use tracing::{debug, info, warn};

use crate::config::MirrorConfig;
use crate::error::SyncResult;
use crate::manifest::{self, ManifestStore};
use crate::store::ObjectStore;
use crate::transfer::{BatchDownloader, CancelFlag};

/// Runs full or incremental sync passes against one prefix.
pub struct SyncOrchestrator {
    store: Arc<dyn ObjectStore>,
    config: MirrorConfig,
    manifest_store: ManifestStore,
    downloader: BatchDownloader,
}

impl SyncOrchestrator {
    pub fn new(store: Arc<dyn ObjectStore>, config: MirrorConfig) -> Self {
        let manifest_store = ManifestStore::new(&config.root_dir);
        let downloader = BatchDownloader::new(
            Arc::clone(&store),
            config.max_concurrent_transfers,
            config.stream_threshold_bytes,
        );
        Self {
            store,
            config,
            manifest_store,
            downloader,
        }
    }

    /// Runs one sync pass and reports what happened.
    ///
    /// Partial failure is not an error: objects that fail to transfer
    /// are counted in the report and picked up again by a later pass.
    /// `Err` is reserved for failures that invalidate the pass as a
    /// whole, listing the container or persisting the manifest.
    pub async fn sync(&self) -> SyncResult<SyncReport> {
        info!(
            "starting {:?} sync of prefix {:?}",
            self.config.mode, self.config.prefix
        );

        let listed = self.store.list(&self.config.prefix).await?;
        let env_key = self.config.env_object_key();
        let (env_objects, ordinary): (Vec<_>, Vec<_>) =
            listed.into_iter().partition(|o| o.key == env_key);
        let env_object = env_objects.into_iter().next();

        if ordinary.is_empty() {
            info!("no objects under prefix {:?}", self.config.prefix);
            return Ok(SyncReport {
                env_object,
                ..SyncReport::default()
            });
        }

        let mut manifest = self.manifest_store.load().await;
        let selected: Vec<RemoteObject> = match self.config.mode {
            SyncMode::Full => ordinary.clone(),
            SyncMode::Incremental => ordinary
                .iter()
                .filter(|o| manifest::needs_update(&manifest, o))
                .cloned()
                .collect(),
        };
        let total = ordinary.len();
        let skipped = total - selected.len();
        debug!("{} of {total} objects need transfer", selected.len());

        let outcomes = self
            .downloader
            .download_batch(
                &selected,
                &self.config.prefix,
                &self.config.root_dir,
                &CancelFlag::new(),
            )
            .await;

        let by_key: HashMap<&str, &RemoteObject> =
            selected.iter().map(|o| (o.key.as_str(), o)).collect();
        for outcome in &outcomes {
            if let Some(object) = by_key.get(outcome.key.as_str()) {
                manifest.upsert(manifest::create_entry(object, &outcome.local_path));
            }
        }
        self.manifest_store.save(&mut manifest).await?;

        let succeeded: HashSet<&str> = outcomes.iter().map(|o| o.key.as_str()).collect();
        let failed_keys: Vec<String> = selected
            .iter()
            .filter(|o| !succeeded.contains(o.key.as_str()))
            .map(|o| o.key.clone())
            .collect();
        if !failed_keys.is_empty() {
            warn!("{} objects failed to transfer", failed_keys.len());
        }

        let report = SyncReport {
            downloaded: outcomes.len(),
            skipped,
            failed: failed_keys.len(),
            failed_keys,
            total_objects: total,
            env_object,
        };
        info!(
            "sync pass complete: {} downloaded, {} skipped, {} failed",
            report.downloaded, report.skipped, report.failed
        );
        Ok(report)
    }
}
