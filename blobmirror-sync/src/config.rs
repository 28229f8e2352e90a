//! Mirror configuration.

use std::path::PathBuf;

use blobmirror_types::SyncMode;
use serde::{Deserialize, Serialize};

/// Name of the distinguished environment object directly under the
/// prefix. It feeds the environment overlay and is never mirrored to
/// disk.
pub const ENV_OBJECT_NAME: &str = ".env";

/// Configuration for mirroring one container prefix.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MirrorConfig {
    /// Key prefix under which objects are mirrored (e.g. "configs/app1/").
    /// An empty prefix mirrors the whole container.
    pub prefix: String,

    /// Local directory that mirrors the prefix.
    pub root_dir: PathBuf,

    /// Selection strategy for sync passes.
    pub mode: SyncMode,

    /// Maximum number of object transfers in flight at once.
    pub max_concurrent_transfers: usize,

    /// Objects strictly larger than this are streamed to disk instead of
    /// buffered in memory.
    pub stream_threshold_bytes: u64,

    /// Poll interval for the change watcher (seconds).
    pub poll_interval_secs: u64,

    /// Whether the caller should run the change watcher after the
    /// initial sync.
    pub watch: bool,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            root_dir: PathBuf::from("."),
            mode: SyncMode::Incremental,
            max_concurrent_transfers: 4,
            stream_threshold_bytes: 10 * 1024 * 1024, // 10 MiB
            poll_interval_secs: 30,
            watch: false,
        }
    }
}

impl MirrorConfig {
    /// Key of the distinguished env object for this prefix.
    pub fn env_object_key(&self) -> String {
        format!("{}{}", self.prefix, ENV_OBJECT_NAME)
    }
}
