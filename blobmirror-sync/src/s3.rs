//! S3-compatible object store implementation.
//!
//! Works against AWS S3 and MinIO-style endpoints (endpoint override +
//! path-style addressing). Transport and service errors are translated
//! into the closed error taxonomy at this boundary.

use std::path::Path;

use async_trait::async_trait;
use aws_sdk_s3::Client as S3Client;
use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::DateTime as AwsDateTime;
use blobmirror_types::{RemoteObject, TransferOutcome};
use chrono::{DateTime, Utc};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::{SyncError, SyncResult};
use crate::store::{FetchedObject, ObjectStore};

/// Connection settings for an S3-compatible container.
#[derive(Clone, Debug)]
pub struct S3Settings {
    pub bucket: String,
    pub region: String,
    /// Endpoint override for MinIO-style deployments.
    pub endpoint_override: Option<String>,
    /// Static credentials. When absent, the ambient AWS provider chain
    /// (environment, profile, instance metadata) is used.
    pub credentials: Option<StaticCredentials>,
}

/// Fixed credentials for deployments that do not use a provider chain.
#[derive(Clone, Debug)]
pub struct StaticCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

/// S3-backed [`ObjectStore`].
pub struct S3ObjectStore {
    client: S3Client,
    bucket: String,
}

impl S3ObjectStore {
    /// Builds a client for the configured endpoint and credentials.
    pub async fn connect(settings: S3Settings) -> Self {
        let region = aws_types::region::Region::new(settings.region.clone());
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest()).region(region);

        if let Some(creds) = &settings.credentials {
            let credentials = aws_credential_types::Credentials::new(
                &creds.access_key_id,
                &creds.secret_access_key,
                creds.session_token.clone(),
                None,
                "blobmirror-static",
            );
            loader = loader.credentials_provider(credentials);
        }
        let base = loader.load().await;

        let mut config_builder = aws_sdk_s3::config::Builder::from(&base);
        if let Some(endpoint) = &settings.endpoint_override {
            config_builder = config_builder.endpoint_url(endpoint).force_path_style(true);
        }

        Self {
            client: S3Client::from_conf(config_builder.build()),
            bucket: settings.bucket,
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn list(&self, prefix: &str) -> SyncResult<Vec<RemoteObject>> {
        let mut objects = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix);
            if let Some(token) = &continuation {
                request = request.continuation_token(token);
            }

            let resp = request
                .send()
                .await
                .map_err(|e| classify_error(prefix, &format!("list failed for prefix {prefix:?}"), e))?;

            for obj in resp.contents() {
                let Some(key) = obj.key() else { continue };
                // Zero-byte directory markers are not mirrorable objects.
                if key.ends_with('/') {
                    debug!("skipping directory marker {key}");
                    continue;
                }
                objects.push(RemoteObject {
                    key: key.to_string(),
                    version_tag: obj.e_tag().unwrap_or_default().to_string(),
                    last_modified: convert_timestamp(obj.last_modified()),
                    size: obj.size().unwrap_or(0).max(0) as u64,
                    content_hash: None,
                });
            }

            if resp.is_truncated() == Some(true) {
                continuation = resp.next_continuation_token().map(|t| t.to_string());
                if continuation.is_none() {
                    break;
                }
            } else {
                break;
            }
        }

        debug!("listed {} objects under s3://{}/{prefix}", objects.len(), self.bucket);
        Ok(objects)
    }

    async fn fetch(&self, key: &str) -> SyncResult<FetchedObject> {
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| classify_error(key, &format!("download failed for {key}"), e))?;

        let version_tag = resp.e_tag().unwrap_or_default().to_string();
        let last_modified = convert_timestamp(resp.last_modified());

        let body = resp
            .body
            .collect()
            .await
            .map_err(|e| SyncError::Connectivity(format!("body read failed for {key}: {e}")))?;
        let data = body.into_bytes().to_vec();
        debug!("downloaded {} bytes from s3://{}/{key}", data.len(), self.bucket);

        Ok(FetchedObject {
            key: key.to_string(),
            version_tag,
            last_modified,
            data,
        })
    }

    async fn fetch_to_path(&self, key: &str, path: &Path) -> SyncResult<TransferOutcome> {
        let fetched = self.fetch(key).await?;
        let size = fetched.data.len() as u64;

        tokio::fs::write(path, &fetched.data)
            .await
            .map_err(|e| SyncError::Sync(format!("failed to write {}: {e}", path.display())))?;

        Ok(TransferOutcome {
            key: key.to_string(),
            local_path: path.to_path_buf(),
            version_tag: fetched.version_tag,
            last_modified: fetched.last_modified,
            size,
        })
    }

    async fn fetch_stream_to_path(&self, key: &str, path: &Path) -> SyncResult<TransferOutcome> {
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| classify_error(key, &format!("download failed for {key}"), e))?;

        let version_tag = resp.e_tag().unwrap_or_default().to_string();
        let last_modified = convert_timestamp(resp.last_modified());

        let mut file = tokio::fs::File::create(path)
            .await
            .map_err(|e| SyncError::Sync(format!("failed to create {}: {e}", path.display())))?;

        let mut body = resp.body;
        let mut size: u64 = 0;
        while let Some(chunk) = body
            .try_next()
            .await
            .map_err(|e| SyncError::Connectivity(format!("body read failed for {key}: {e}")))?
        {
            size += chunk.len() as u64;
            file.write_all(&chunk)
                .await
                .map_err(|e| SyncError::Sync(format!("failed to write {}: {e}", path.display())))?;
        }
        file.flush()
            .await
            .map_err(|e| SyncError::Sync(format!("failed to flush {}: {e}", path.display())))?;

        debug!("streamed {size} bytes from s3://{}/{key}", self.bucket);
        Ok(TransferOutcome {
            key: key.to_string(),
            local_path: path.to_path_buf(),
            version_tag,
            last_modified,
            size,
        })
    }
}

/// Translates an SDK error into the closed taxonomy using the service
/// error code and HTTP status.
fn classify_error<E>(key: &str, context: &str, err: SdkError<E>) -> SyncError
where
    E: ProvideErrorMetadata,
    SdkError<E>: std::fmt::Display,
{
    if matches!(err, SdkError::DispatchFailure(_) | SdkError::TimeoutError(_)) {
        return SyncError::Connectivity(format!("{context}: {err}"));
    }

    let status = match &err {
        SdkError::ServiceError(service) => Some(service.raw().status().as_u16()),
        _ => None,
    };
    let detail = err
        .message()
        .map(|m| m.to_string())
        .unwrap_or_else(|| err.to_string());

    if matches!(err.code(), Some("NoSuchKey" | "NotFound" | "NoSuchBucket")) || status == Some(404)
    {
        return SyncError::NotFound {
            key: key.to_string(),
        };
    }
    if matches!(
        err.code(),
        Some("AccessDenied" | "InvalidAccessKeyId" | "SignatureDoesNotMatch" | "ExpiredToken")
    ) || status == Some(401)
        || status == Some(403)
    {
        return SyncError::Auth {
            message: format!("{context}: {detail}"),
            status,
        };
    }

    SyncError::Sync(format!("{context}: {detail}"))
}

/// AWS timestamps carry seconds and subsecond nanos; absent or
/// unrepresentable values collapse to the epoch.
fn convert_timestamp(ts: Option<&AwsDateTime>) -> DateTime<Utc> {
    ts.and_then(|t| DateTime::from_timestamp(t.secs(), t.subsec_nanos()))
        .unwrap_or(DateTime::UNIX_EPOCH)
}
