//! Object storage
//!
//! The packaging pipeline talks to storage through the [`ObjectStore`] trait
//! so it can run against S3 in production and an in-memory store in tests.
//! [`S3Storage`] is the `aws-sdk-s3` implementation.

use async_trait::async_trait;
use aws_sdk_s3::{
    config::{BehaviorVersion, Credentials, Region},
    error::DisplayErrorContext,
    primitives::ByteStream,
    Client,
};
use std::path::Path;
use std::pin::Pin;
use thiserror::Error;
use tokio::io::AsyncRead;
use tracing::{debug, info, instrument};

pub mod config;

pub use config::StorageConfig;

/// Storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("object s3://{bucket}/{key} not found")]
    NotFound { bucket: String, key: String },

    #[error("storage {operation} failed: {message}")]
    Backend {
        operation: &'static str,
        message: String,
    },

    #[error("storage IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub fn not_found(bucket: &str, key: &str) -> Self {
        Self::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        }
    }

    pub fn backend(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Backend {
            operation,
            message: message.into(),
        }
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Streaming body of a stored object
pub type ObjectReader = Pin<Box<dyn AsyncRead + Send>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMetadata {
    pub bucket: String,
    pub key: String,
    pub size: u64,
    pub content_type: Option<String>,
}

/// Minimal object storage surface used by the packaging pipeline
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Size and content type of an object, or `NotFound`
    async fn head(&self, bucket: &str, key: &str) -> StorageResult<ObjectMetadata>;

    /// Stream an object's bytes
    async fn get(&self, bucket: &str, key: &str) -> StorageResult<ObjectReader>;

    /// Upload a local file
    async fn put_file(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
        content_type: &str,
    ) -> StorageResult<()>;

    async fn delete(&self, bucket: &str, key: &str) -> StorageResult<()>;
}

#[derive(Clone)]
pub struct S3Storage {
    client: Client,
}

impl S3Storage {
    pub async fn new(config: &StorageConfig) -> anyhow::Result<Self> {
        debug!(
            endpoint = ?config.endpoint,
            region = %config.region,
            path_style = config.path_style,
            "Initializing S3 storage"
        );

        let region = Region::new(config.region.clone());
        let mut builder = match config.static_credentials() {
            Some((access_key, secret_key)) => aws_sdk_s3::Config::builder()
                .behavior_version(BehaviorVersion::latest())
                .credentials_provider(Credentials::new(
                    access_key,
                    secret_key,
                    None,
                    None,
                    "mcr-storage",
                ))
                .region(region),
            None => {
                let shared = aws_config::defaults(BehaviorVersion::latest())
                    .region(region)
                    .load()
                    .await;
                aws_sdk_s3::config::Builder::from(&shared)
            },
        };

        builder = builder.force_path_style(config.path_style);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        let client = Client::from_conf(builder.build());
        info!(bucket = %config.documents_bucket, "S3 storage client initialized");

        Ok(Self { client })
    }
}

#[async_trait]
impl ObjectStore for S3Storage {
    #[instrument(skip(self))]
    async fn head(&self, bucket: &str, key: &str) -> StorageResult<ObjectMetadata> {
        let response = self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().is_some_and(|se| se.is_not_found()) {
                    StorageError::not_found(bucket, key)
                } else {
                    StorageError::backend("head", DisplayErrorContext(&e).to_string())
                }
            })?;

        Ok(ObjectMetadata {
            bucket: bucket.to_string(),
            key: key.to_string(),
            size: response
                .content_length()
                .and_then(|len| u64::try_from(len).ok())
                .unwrap_or(0),
            content_type: response.content_type().map(str::to_string),
        })
    }

    #[instrument(skip(self))]
    async fn get(&self, bucket: &str, key: &str) -> StorageResult<ObjectReader> {
        debug!("Streaming s3://{}/{}", bucket, key);

        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().is_some_and(|se| se.is_no_such_key()) {
                    StorageError::not_found(bucket, key)
                } else {
                    StorageError::backend("get", DisplayErrorContext(&e).to_string())
                }
            })?;

        Ok(Box::pin(response.body.into_async_read()))
    }

    #[instrument(skip(self, path), fields(path = %path.display()))]
    async fn put_file(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
        content_type: &str,
    ) -> StorageResult<()> {
        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| StorageError::backend("put", e.to_string()))?;

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .body(body)
            .send()
            .await
            .map_err(|e| StorageError::backend("put", DisplayErrorContext(&e).to_string()))?;

        info!("Uploaded s3://{}/{}", bucket, key);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, bucket: &str, key: &str) -> StorageResult<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::backend("delete", DisplayErrorContext(&e).to_string()))?;

        info!("Deleted s3://{}/{}", bucket, key);
        Ok(())
    }
}
