//! Mirror engine for S3-compatible object containers.
//!
//! Keeps a local directory in step with a remote prefix:
//! - Manifest-based change detection via opaque version tags
//! - Bounded-concurrency downloads, streaming for large objects
//! - Lexical path-safety validation for every remote key
//! - A polling change watcher with cooperative shutdown
//! - An environment overlay fed by a distinguished `.env` object
//!
//! The library never spawns its own runtime; callers drive the
//! orchestrator and watcher from their own tokio context.

pub mod config;
pub mod error;
pub mod manifest;
pub mod orchestrator;
pub mod paths;
pub mod s3;
pub mod store;
pub mod transfer;
pub mod watch;

pub use config::MirrorConfig;
pub use error::{SyncError, SyncResult};
pub use orchestrator::SyncOrchestrator;
pub use store::{FetchedObject, ObjectStore};
pub use transfer::{BatchDownloader, CancelFlag};
pub use watch::{
    ChangeWatcher, WatchEnv, WatchHandle, WatchMode, WatchOptions, create_watcher,
    known_tags_from_manifest,
};
