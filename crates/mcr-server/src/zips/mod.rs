//! Document zip packaging
//!
//! A revision's documents are packaged in four steps:
//!
//! 1. [`downloader`] fetches every document into a private [`staging`] area,
//!    in concurrent batches, bounded per file by a timeout and overall by a
//!    byte ceiling.
//! 2. [`archive`] writes a store-only zip whose entries are the documents'
//!    display names.
//! 3. The archive is hashed (SHA-256, streamed).
//! 4. [`service`] uploads it and records the artifact, deleting the upload
//!    again if the record cannot be written.

pub mod archive;
pub mod downloader;
pub mod service;
pub mod staging;

use mcr_common::s3_url::{S3Location, S3UrlError};
use std::time::Duration;
use thiserror::Error;

use crate::db::DbError;
use crate::storage::StorageError;

pub use archive::{build_zip, hash_file};
pub use downloader::{download_all, DownloadOptions, DownloadedFile};
pub use service::{DocumentZipService, ZipOutcome, ZipServiceConfig, ZIP_CONTENT_TYPE};
pub use staging::StagingArea;

/// Errors raised while generating a zip package
#[derive(Error, Debug)]
pub enum ZipError {
    #[error("invalid URL for document '{display_name}': {source}")]
    InvalidUrl {
        display_name: String,
        #[source]
        source: S3UrlError,
    },

    #[error("failed to download {location}: {source}")]
    Download {
        location: S3Location,
        #[source]
        source: StorageError,
    },

    #[error("download of {location} timed out after {timeout:?}")]
    DownloadTimeout {
        location: S3Location,
        timeout: Duration,
    },

    #[error(
        "documents total {total_bytes} bytes, {} bytes over the {limit_bytes} byte limit",
        .total_bytes - .limit_bytes
    )]
    SizeLimitExceeded { total_bytes: u64, limit_bytes: u64 },

    #[error("failed to write archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("failed to hash archive: {0}")]
    Hash(#[source] mcr_common::McrError),

    #[error("failed to upload {location}: {source}")]
    Upload {
        location: S3Location,
        #[source]
        source: StorageError,
    },

    #[error("failed to look up zip package for revision {revision_id}: {source}")]
    Lookup {
        revision_id: String,
        #[source]
        source: DbError,
    },

    #[error("failed to record zip package for revision {revision_id}: {source}")]
    Persistence {
        revision_id: String,
        #[source]
        source: DbError,
    },

    #[error("staging IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
