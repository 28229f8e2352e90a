//! Shared test helpers: an in-memory object store with scriptable
//! failures and call accounting, plus an observable env sink.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use blobmirror_env::EnvSink;
use blobmirror_sync::MirrorConfig;
use blobmirror_sync::error::{SyncError, SyncResult};
use blobmirror_sync::s3::{S3Settings, StaticCredentials};
use blobmirror_sync::store::{FetchedObject, ObjectStore};
use blobmirror_types::{RemoteObject, SyncMode, TransferOutcome};
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::Mutex;

/// Fixed timestamp used for all simulated objects.
pub fn fixed_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 14, 9, 0, 0).unwrap()
}

#[derive(Clone)]
struct StoredObject {
    tag: String,
    data: Vec<u8>,
}

// ── Memory object store ─────────────────────────────────────────

/// In-memory [`ObjectStore`] for tests.
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<String, StoredObject>>,
    /// Keys whose fetches fail with a scripted error.
    failing: Mutex<HashSet<String>>,
    /// Errors returned by upcoming list calls, in order.
    list_errors: Mutex<Vec<SyncError>>,
    /// Artificial per-transfer delay, for concurrency tests.
    transfer_delay: Mutex<Option<Duration>>,
    list_calls: AtomicUsize,
    buffered_fetches: AtomicUsize,
    streamed_fetches: AtomicUsize,
    memory_fetches: AtomicUsize,
    active_transfers: AtomicUsize,
    max_active_transfers: AtomicUsize,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
            list_errors: Mutex::new(Vec::new()),
            transfer_delay: Mutex::new(None),
            list_calls: AtomicUsize::new(0),
            buffered_fetches: AtomicUsize::new(0),
            streamed_fetches: AtomicUsize::new(0),
            memory_fetches: AtomicUsize::new(0),
            active_transfers: AtomicUsize::new(0),
            max_active_transfers: AtomicUsize::new(0),
        }
    }

    pub async fn insert(&self, key: &str, tag: &str, data: &[u8]) {
        self.objects.lock().await.insert(
            key.to_string(),
            StoredObject {
                tag: tag.to_string(),
                data: data.to_vec(),
            },
        );
    }

    pub async fn fail_key(&self, key: &str) {
        self.failing.lock().await.insert(key.to_string());
    }

    pub async fn clear_failures(&self) {
        self.failing.lock().await.clear();
    }

    pub async fn push_list_error(&self, err: SyncError) {
        self.list_errors.lock().await.push(err);
    }

    pub async fn set_transfer_delay(&self, delay: Duration) {
        *self.transfer_delay.lock().await = Some(delay);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn buffered_fetches(&self) -> usize {
        self.buffered_fetches.load(Ordering::SeqCst)
    }

    pub fn streamed_fetches(&self) -> usize {
        self.streamed_fetches.load(Ordering::SeqCst)
    }

    pub fn memory_fetches(&self) -> usize {
        self.memory_fetches.load(Ordering::SeqCst)
    }

    pub fn max_active_transfers(&self) -> usize {
        self.max_active_transfers.load(Ordering::SeqCst)
    }

    async fn lookup(&self, key: &str) -> SyncResult<StoredObject> {
        if self.failing.lock().await.contains(key) {
            return Err(SyncError::Sync(format!("scripted failure for {key}")));
        }
        self.objects
            .lock()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| SyncError::NotFound {
                key: key.to_string(),
            })
    }

    async fn write_to(&self, key: &str, path: &Path) -> SyncResult<TransferOutcome> {
        let stored = self.lookup(key).await?;
        let current = self.active_transfers.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active_transfers.fetch_max(current, Ordering::SeqCst);
        if let Some(delay) = *self.transfer_delay.lock().await {
            tokio::time::sleep(delay).await;
        }
        let written = tokio::fs::write(path, &stored.data)
            .await
            .map_err(|e| SyncError::Sync(format!("write failed for {key}: {e}")));
        self.active_transfers.fetch_sub(1, Ordering::SeqCst);
        written?;
        Ok(TransferOutcome {
            key: key.to_string(),
            local_path: path.to_path_buf(),
            version_tag: stored.tag,
            last_modified: fixed_time(),
            size: stored.data.len() as u64,
        })
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn list(&self, prefix: &str) -> SyncResult<Vec<RemoteObject>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        {
            let mut errors = self.list_errors.lock().await;
            if !errors.is_empty() {
                return Err(errors.remove(0));
            }
        }
        let objects = self.objects.lock().await;
        let mut listed: Vec<RemoteObject> = objects
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, stored)| RemoteObject {
                key: key.clone(),
                version_tag: stored.tag.clone(),
                last_modified: fixed_time(),
                size: stored.data.len() as u64,
                content_hash: None,
            })
            .collect();
        listed.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(listed)
    }

    async fn fetch(&self, key: &str) -> SyncResult<FetchedObject> {
        self.memory_fetches.fetch_add(1, Ordering::SeqCst);
        let stored = self.lookup(key).await?;
        Ok(FetchedObject {
            key: key.to_string(),
            version_tag: stored.tag,
            last_modified: fixed_time(),
            data: stored.data,
        })
    }

    async fn fetch_to_path(&self, key: &str, path: &Path) -> SyncResult<TransferOutcome> {
        self.buffered_fetches.fetch_add(1, Ordering::SeqCst);
        self.write_to(key, path).await
    }

    async fn fetch_stream_to_path(&self, key: &str, path: &Path) -> SyncResult<TransferOutcome> {
        self.streamed_fetches.fetch_add(1, Ordering::SeqCst);
        self.write_to(key, path).await
    }
}

// ── Observable env sink ─────────────────────────────────────────

/// Env sink whose state stays observable after the watcher takes
/// ownership of the boxed copy.
#[derive(Clone, Default)]
pub struct SharedEnv {
    vars: Arc<std::sync::Mutex<HashMap<String, String>>>,
}

impl SharedEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, key: &str, value: &str) {
        self.vars
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
    }

    pub fn value(&self, key: &str) -> Option<String> {
        self.vars.lock().unwrap().get(key).cloned()
    }
}

impl EnvSink for SharedEnv {
    fn get(&self, key: &str) -> Option<String> {
        self.vars.lock().unwrap().get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) {
        self.vars
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
    }

    fn snapshot(&self) -> HashMap<String, String> {
        self.vars.lock().unwrap().clone()
    }
}

// ── Builders ────────────────────────────────────────────────────

/// Config pointed at a temp root, with a small stream threshold so
/// tests can exercise both transfer strategies.
pub fn make_config(root: &Path, prefix: &str) -> MirrorConfig {
    MirrorConfig {
        prefix: prefix.to_string(),
        root_dir: root.to_path_buf(),
        mode: SyncMode::Incremental,
        max_concurrent_transfers: 4,
        stream_threshold_bytes: 1024,
        poll_interval_secs: 5,
        watch: true,
    }
}

pub fn make_object(key: &str, tag: &str, size: u64) -> RemoteObject {
    RemoteObject {
        key: key.to_string(),
        version_tag: tag.to_string(),
        last_modified: fixed_time(),
        size,
        content_hash: None,
    }
}

/// Initializes test logging once; respects `RUST_LOG`.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ── MinIO harness ───────────────────────────────────────────────

pub const TEST_BUCKET: &str = "blobmirror-test";

/// Settings matching the MinIO instance from docker-compose.test.yml.
pub fn minio_settings() -> S3Settings {
    S3Settings {
        bucket: TEST_BUCKET.to_string(),
        region: "us-east-1".to_string(),
        endpoint_override: Some("http://localhost:9000".to_string()),
        credentials: Some(StaticCredentials {
            access_key_id: "blobmirror-test".to_string(),
            secret_access_key: "blobmirror-test-secret".to_string(),
            session_token: None,
        }),
    }
}

/// Per-test key prefix so parallel runs never collide.
pub fn unique_prefix() -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("it-{nanos}/")
}

/// Raw client for seeding the test bucket.
pub async fn raw_client() -> aws_sdk_s3::Client {
    let settings = minio_settings();
    let creds = settings.credentials.clone().unwrap();
    let base = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(aws_types::region::Region::new(settings.region.clone()))
        .credentials_provider(aws_credential_types::Credentials::new(
            creds.access_key_id,
            creds.secret_access_key,
            None,
            None,
            "blobmirror-test",
        ))
        .load()
        .await;
    let conf = aws_sdk_s3::config::Builder::from(&base)
        .endpoint_url(settings.endpoint_override.unwrap())
        .force_path_style(true)
        .build();
    aws_sdk_s3::Client::from_conf(conf)
}

/// Creates the test bucket if missing; already-owned errors are fine.
pub async fn ensure_bucket(client: &aws_sdk_s3::Client) {
    let _ = client.create_bucket().bucket(TEST_BUCKET).send().await;
}

pub async fn put_object(client: &aws_sdk_s3::Client, key: &str, data: &[u8]) {
    client
        .put_object()
        .bucket(TEST_BUCKET)
        .key(key)
        .body(aws_sdk_s3::primitives::ByteStream::from(data.to_vec()))
        .send()
        .await
        .unwrap();
}
