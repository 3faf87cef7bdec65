//! S3-compatible client.

use async_trait::async_trait;
use std::path::Path;

use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tracing::{debug, info};

use vcomp_models::StorageCredentials;

use crate::error::{StorageError, StorageResult};
use crate::store::{content_type_for, BlobStore};

/// Region used when the request names none.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Connection settings for one bucket.
#[derive(Clone)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    /// Custom endpoint for S3-compatible services
    pub endpoint_url: Option<String>,
}

impl std::fmt::Debug for S3Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Config")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("endpoint_url", &self.endpoint_url)
            .finish_non_exhaustive()
    }
}

impl S3Config {
    /// Build from request credentials, `None` when they are incomplete.
    pub fn from_credentials(creds: &StorageCredentials) -> Option<Self> {
        fn present(value: &Option<String>) -> Option<String> {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        }

        Some(Self {
            bucket: present(&creds.s3_bucket)?,
            access_key_id: present(&creds.s3_access_key)?,
            secret_access_key: present(&creds.s3_secret_key)?,
            region: present(&creds.s3_region).unwrap_or_else(|| DEFAULT_REGION.to_string()),
            endpoint_url: present(&creds.s3_endpoint)
                .map(|e| e.trim_end_matches('/').to_string()),
        })
    }

    /// Public URL of an object.
    pub fn public_url(&self, key: &str) -> String {
        match &self.endpoint_url {
            Some(endpoint) => format!("{}/{}/{}", endpoint, self.bucket, key),
            None => format!(
                "https://{}.s3.{}.amazonaws.com/{}",
                self.bucket, self.region, key
            ),
        }
    }
}

/// Blob store backed by an S3 bucket.
#[derive(Clone)]
pub struct S3BlobStore {
    client: Client,
    config: S3Config,
}

impl S3BlobStore {
    pub fn new(config: S3Config) -> StorageResult<Self> {
        if config.bucket.contains('/') {
            return Err(StorageError::config_error(format!(
                "invalid bucket name '{}'",
                config.bucket
            )));
        }

        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "request",
        );

        let mut builder = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials);
        if let Some(endpoint) = &config.endpoint_url {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Ok(Self {
            client: Client::from_conf(builder.build()),
            config,
        })
    }

    pub fn config(&self) -> &S3Config {
        &self.config
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn upload(&self, path: &Path, key: &str) -> StorageResult<String> {
        debug!(path = %path.display(), key, bucket = %self.config.bucket, "Uploading artifact");

        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        self.client
            .put_object()
            .bucket(&self.config.bucket)
            .key(key)
            .body(body)
            .content_type(content_type_for(path))
            .send()
            .await
            .map_err(|e| StorageError::upload_failed(format!("{}: {}", key, e)))?;

        let url = self.config.public_url(key);
        info!(key, url = %url, "Uploaded artifact");
        Ok(url)
    }
}
