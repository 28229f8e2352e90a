//! Bounded-concurrency batch downloads.
//!
//! Objects are admitted in input order through a semaphore and fetched
//! on spawned tasks. A failed object is logged and omitted from the
//! results; the batch itself never fails.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use blobmirror_types::{RemoteObject, TransferOutcome};
use tokio::sync::Semaphore;
use tracing::{debug, error, warn};

use crate::paths::resolve_local_path;
use crate::store::ObjectStore;

/// Cooperative cancellation flag shared between the watcher, a running
/// batch, and their caller.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Downloads batches of objects with a fixed concurrency bound.
pub struct BatchDownloader {
    store: Arc<dyn ObjectStore>,
    max_concurrent: usize,
    stream_threshold: u64,
}

impl BatchDownloader {
    pub fn new(store: Arc<dyn ObjectStore>, max_concurrent: usize, stream_threshold: u64) -> Self {
        Self {
            store,
            max_concurrent: max_concurrent.max(1),
            stream_threshold,
        }
    }

    /// Downloads `objects` under `root` with at most `max_concurrent`
    /// transfers in flight, admitted in input order.
    ///
    /// Returns the successful transfers only: objects that fail
    /// validation or transfer are logged and skipped, and the caller
    /// derives failures from the difference. Setting `cancel` stops
    /// admitting new objects; transfers already in flight complete.
    pub async fn download_batch(
        &self,
        objects: &[RemoteObject],
        prefix: &str,
        root: &Path,
        cancel: &CancelFlag,
    ) -> Vec<TransferOutcome> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut handles = Vec::with_capacity(objects.len());

        for object in objects {
            if cancel.is_cancelled() {
                debug!("cancellation requested, stopping batch admission");
                break;
            }

            let local_path = match resolve_local_path(&object.key, prefix, root) {
                Ok(path) => path,
                Err(e) => {
                    warn!("skipping object: {e}");
                    continue;
                }
            };

            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };
            let store = Arc::clone(&self.store);
            let object = object.clone();
            let stream_threshold = self.stream_threshold;

            handles.push(tokio::spawn(async move {
                let outcome =
                    transfer_one(store.as_ref(), &object, &local_path, stream_threshold).await;
                drop(permit);
                outcome
            }));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(Some(outcome)) => outcomes.push(outcome),
                Ok(None) => {}
                Err(e) => warn!("transfer task panicked: {e}"),
            }
        }
        debug!(
            "batch complete: {}/{} transfers succeeded",
            outcomes.len(),
            objects.len()
        );
        outcomes
    }
}

/// Fetches one object to its resolved path, streaming when the listed
/// size is strictly above the threshold. Returns `None` on failure.
async fn transfer_one(
    store: &dyn ObjectStore,
    object: &RemoteObject,
    local_path: &Path,
    stream_threshold: u64,
) -> Option<TransferOutcome> {
    if let Some(parent) = local_path.parent()
        && let Err(e) = tokio::fs::create_dir_all(parent).await
    {
        error!(
            "skipping {}: cannot create directory {}: {e}",
            object.key,
            parent.display()
        );
        return None;
    }

    let result = if object.size > stream_threshold {
        store.fetch_stream_to_path(&object.key, local_path).await
    } else {
        store.fetch_to_path(&object.key, local_path).await
    };

    match result {
        Ok(outcome) => {
            debug!("downloaded {} ({} bytes)", object.key, outcome.size);
            Some(outcome)
        }
        Err(e) => {
            warn!("transfer failed for {}: {e}", object.key);
            None
        }
    }
}
