//! Polling change watcher.
//!
//! Lists the remote prefix on a fixed interval, diffs version tags
//! against the last known state, and materializes or reports changes.
//! Polls never overlap: each poll runs to completion inside the loop
//! before the next tick is honored, and missed ticks are skipped rather
//! than bursted.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use blobmirror_env::{EnvSink, apply_with_precedence, parse_env_content};
use blobmirror_types::{ChangeKind, ObjectManifest, RemoteObject, WatchChange};
use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::MirrorConfig;
use crate::error::SyncResult;
use crate::manifest::{self, ManifestStore};
use crate::store::ObjectStore;
use crate::transfer::{BatchDownloader, CancelFlag};

/// Commands sent to the change watcher.
#[derive(Debug)]
pub enum WatchCommand {
    Stop,
}

/// How observed changes are materialized.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WatchMode {
    /// Download changed objects under the sync root and keep the
    /// manifest current.
    Filesystem,
    /// Verify changed objects with in-memory fetches; nothing is
    /// written to disk.
    Memory,
}

/// Environment overlay session carried by the watcher.
///
/// The OS key set and local variables are captured once at session start
/// and reused for every re-merge; only the remote tier changes between
/// polls.
pub struct WatchEnv {
    /// Sink the merge writes through.
    pub sink: Box<dyn EnvSink + Send>,
    /// OS variable names captured before the first overlay ran.
    pub os_keys: HashSet<String>,
    /// Local fallback variables captured at startup.
    pub local_vars: HashMap<String, String>,
    /// Version tag of the env object at the last successful merge.
    /// `None` makes the first poll treat any env object as changed;
    /// re-merging is idempotent, so that is safe.
    pub last_tag: Option<String>,
}

/// Options for creating a change watcher.
pub struct WatchOptions {
    pub config: MirrorConfig,
    pub mode: WatchMode,
    /// Version tags already materialized, keyed by remote key. Seed from
    /// the manifest in filesystem mode (see [`known_tags_from_manifest`])
    /// or from the initial sync's outcomes in memory mode.
    pub known_tags: HashMap<String, String>,
    /// Environment overlay session, when the prefix carries an env
    /// object. `None` ignores the env object entirely.
    pub env: Option<WatchEnv>,
}

/// Handle for controlling a running watcher. Clones share one watcher.
#[derive(Clone)]
pub struct WatchHandle {
    command_tx: mpsc::Sender<WatchCommand>,
    cancel: CancelFlag,
}

impl WatchHandle {
    /// Stops the watcher: no new poll starts after this resolves, and an
    /// in-progress batch stops admitting transfers. Safe to call more
    /// than once.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let _ = self.command_tx.send(WatchCommand::Stop).await;
    }
}

/// Known-tags map recovered from a previously persisted manifest.
pub fn known_tags_from_manifest(manifest: &ObjectManifest) -> HashMap<String, String> {
    manifest
        .entries
        .values()
        .map(|entry| (entry.key.clone(), entry.version_tag.clone()))
        .collect()
}

/// Creates a change watcher, its control handle, and the change event
/// receiver. The caller spawns [`ChangeWatcher::run`]; dropping every
/// handle also ends the loop, so a forgotten watcher never keeps the
/// host process alive.
pub fn create_watcher(
    store: Arc<dyn ObjectStore>,
    options: WatchOptions,
) -> (WatchHandle, mpsc::Receiver<WatchChange>, ChangeWatcher) {
    let (command_tx, command_rx) = mpsc::channel(16);
    let (change_tx, change_rx) = mpsc::channel(256);
    let cancel = CancelFlag::new();

    let handle = WatchHandle {
        command_tx,
        cancel: cancel.clone(),
    };

    let downloader = BatchDownloader::new(
        Arc::clone(&store),
        options.config.max_concurrent_transfers,
        options.config.stream_threshold_bytes,
    );
    let manifest_store = ManifestStore::new(&options.config.root_dir);

    let watcher = ChangeWatcher {
        store,
        config: options.config,
        mode: options.mode,
        known_tags: options.known_tags,
        env: options.env,
        downloader,
        manifest_store,
        command_rx,
        change_tx,
        cancel,
    };

    (handle, change_rx, watcher)
}

/// Polls the remote prefix and applies observed changes.
pub struct ChangeWatcher {
    store: Arc<dyn ObjectStore>,
    config: MirrorConfig,
    mode: WatchMode,
    known_tags: HashMap<String, String>,
    env: Option<WatchEnv>,
    downloader: BatchDownloader,
    manifest_store: ManifestStore,
    command_rx: mpsc::Receiver<WatchCommand>,
    change_tx: mpsc::Sender<WatchChange>,
    cancel: CancelFlag,
}

impl ChangeWatcher {
    /// Runs the poll loop until stopped. The first poll happens only
    /// after one full interval has elapsed.
    pub async fn run(&mut self) {
        let mut secs = self.config.poll_interval_secs;
        if secs < 1 {
            warn!("poll interval below 1s, clamping to 1s");
            secs = 1;
        }
        let mut poll_interval = tokio::time::interval(Duration::from_secs(secs));
        poll_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            "change watcher started for prefix {:?} (every {secs}s)",
            self.config.prefix
        );

        // Skip first immediate tick
        poll_interval.tick().await;

        loop {
            tokio::select! {
                _ = poll_interval.tick() => {
                    if self.cancel.is_cancelled() {
                        info!("change watcher cancelled");
                        break;
                    }
                    if let Err(e) = self.poll_once().await {
                        warn!("poll failed: {e}");
                    }
                }
                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(WatchCommand::Stop) => {
                            info!("change watcher stopping");
                            break;
                        }
                        None => {
                            info!("all watch handles dropped, stopping");
                            break;
                        }
                    }
                }
            }
        }

        info!("change watcher stopped");
    }

    /// One poll: list the prefix, diff version tags, materialize ordinary
    /// changes, refresh the environment overlay.
    async fn poll_once(&mut self) -> SyncResult<()> {
        let listed = self.store.list(&self.config.prefix).await?;
        let env_key = self.config.env_object_key();

        let mut changed: Vec<RemoteObject> = Vec::new();
        let mut env_changed: Option<RemoteObject> = None;
        for object in listed {
            if object.key == env_key {
                if let Some(env) = &self.env
                    && env.last_tag.as_deref() != Some(object.version_tag.as_str())
                {
                    env_changed = Some(object);
                }
                continue;
            }
            match self.known_tags.get(&object.key) {
                Some(tag) if *tag == object.version_tag => {}
                _ => changed.push(object),
            }
        }

        if changed.is_empty() && env_changed.is_none() {
            debug!("poll found no changes");
            return Ok(());
        }
        debug!("poll found {} changed objects", changed.len());

        match self.mode {
            WatchMode::Filesystem => self.apply_filesystem(&changed).await?,
            WatchMode::Memory => self.apply_memory(&changed).await,
        }

        if let Some(env_object) = env_changed {
            self.refresh_env(&env_object).await;
        }

        Ok(())
    }

    /// Downloads changed objects, upserts manifest entries for the
    /// successes, and emits events carrying the local path. Known tags
    /// advance only for objects that actually transferred.
    async fn apply_filesystem(&mut self, changed: &[RemoteObject]) -> SyncResult<()> {
        if changed.is_empty() {
            return Ok(());
        }
        let outcomes = self
            .downloader
            .download_batch(
                changed,
                &self.config.prefix,
                &self.config.root_dir,
                &self.cancel,
            )
            .await;
        if outcomes.is_empty() {
            return Ok(());
        }

        let by_key: HashMap<&str, &RemoteObject> =
            changed.iter().map(|o| (o.key.as_str(), o)).collect();
        let mut manifest = self.manifest_store.load().await;
        for outcome in &outcomes {
            let kind = if self.known_tags.contains_key(&outcome.key) {
                ChangeKind::Modified
            } else {
                ChangeKind::Added
            };
            if let Some(object) = by_key.get(outcome.key.as_str()) {
                manifest.upsert(manifest::create_entry(object, &outcome.local_path));
                self.known_tags
                    .insert(outcome.key.clone(), object.version_tag.clone());
            }
            self.emit(kind, &outcome.key, outcome.local_path.display().to_string());
        }
        self.manifest_store.save(&mut manifest).await
    }

    /// Verifies changed objects with in-memory fetches and emits events
    /// carrying the prefix-relative path. A failed fetch leaves the old
    /// tag in place so the next poll retries.
    async fn apply_memory(&mut self, changed: &[RemoteObject]) {
        for object in changed {
            if self.cancel.is_cancelled() {
                break;
            }
            let kind = if self.known_tags.contains_key(&object.key) {
                ChangeKind::Modified
            } else {
                ChangeKind::Added
            };
            match self.store.fetch(&object.key).await {
                Ok(fetched) => {
                    self.known_tags
                        .insert(object.key.clone(), fetched.version_tag.clone());
                    let relative = object
                        .key
                        .strip_prefix(&self.config.prefix)
                        .unwrap_or(&object.key)
                        .trim_start_matches(['/', '\\'])
                        .to_string();
                    self.emit(kind, &object.key, relative);
                }
                Err(e) => warn!("fetch failed for {}: {e}", object.key),
            }
        }
    }

    /// Re-fetches the env object and reapplies the overlay with the
    /// session's captured OS keys and local variables. Refreshes are
    /// logged, never emitted as change events.
    async fn refresh_env(&mut self, env_object: &RemoteObject) {
        let Some(env) = self.env.as_mut() else {
            return;
        };

        let fetched = match self.store.fetch(&env_object.key).await {
            Ok(fetched) => fetched,
            Err(e) => {
                warn!("env object fetch failed: {e}");
                return;
            }
        };
        let content = match String::from_utf8(fetched.data) {
            Ok(content) => content,
            Err(e) => {
                warn!("env object is not valid UTF-8: {e}");
                return;
            }
        };

        let remote = parse_env_content(&content);
        let outcome =
            apply_with_precedence(&env.os_keys, &env.local_vars, &remote, env.sink.as_mut());
        env.last_tag = Some(fetched.version_tag);
        info!(
            "environment refreshed: {} variables ({} OS-preserved)",
            outcome.variables.len(),
            outcome.os_keys.len()
        );
    }

    /// Delivers a change event without blocking the poll. A full or
    /// closed channel drops the event.
    fn emit(&self, kind: ChangeKind, key: &str, path: String) {
        let change = WatchChange {
            kind,
            key: key.to_string(),
            path,
            observed_at: Utc::now(),
        };
        if let Err(e) = self.change_tx.try_send(change) {
            warn!("dropping change event for {key}: {e}");
        }
    }
}
