//! Batched document downloads
//!
//! Documents are fetched in sequential batches; the downloads inside a batch
//! run concurrently on a `FuturesUnordered`. Completions are consumed one at a
//! time by the loop in [`download_all`], which is the only place the running
//! byte total and the result slots are touched.

use futures::stream::{FuturesUnordered, StreamExt};
use mcr_common::s3_url::S3Location;
use mcr_common::types::DocumentReference;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::ZipError;
use crate::config::{
    ZipConfig, DEFAULT_BASE_TIMEOUT_MS, DEFAULT_DOWNLOAD_BATCH_SIZE, DEFAULT_MAX_TOTAL_BYTES,
    DEFAULT_TIMEOUT_PER_MB_MS,
};
use crate::storage::{ObjectStore, StorageError};

const BYTES_PER_MB: u64 = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOptions {
    /// Files fetched concurrently per batch
    pub batch_size: usize,
    /// Ceiling on the combined size of all downloaded files
    pub max_total_bytes: u64,
    pub base_timeout: Duration,
    /// Added to `base_timeout` for every started MiB of the object
    pub timeout_per_mb: Duration,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_DOWNLOAD_BATCH_SIZE,
            max_total_bytes: DEFAULT_MAX_TOTAL_BYTES,
            base_timeout: Duration::from_millis(DEFAULT_BASE_TIMEOUT_MS),
            timeout_per_mb: Duration::from_millis(DEFAULT_TIMEOUT_PER_MB_MS),
        }
    }
}

impl From<&ZipConfig> for DownloadOptions {
    fn from(config: &ZipConfig) -> Self {
        Self {
            batch_size: config.download_batch_size,
            max_total_bytes: config.max_total_bytes,
            base_timeout: Duration::from_millis(config.base_timeout_ms),
            timeout_per_mb: Duration::from_millis(config.timeout_per_mb_ms),
        }
    }
}

impl DownloadOptions {
    /// Timeout for a single object of `size_bytes`
    pub fn timeout_for(&self, size_bytes: u64) -> Duration {
        let started_mb = u32::try_from(size_bytes.div_ceil(BYTES_PER_MB)).unwrap_or(u32::MAX);
        self.base_timeout
            .saturating_add(self.timeout_per_mb.saturating_mul(started_mb))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedFile {
    /// Location in the staging area
    pub path: PathBuf,
    pub size: u64,
    pub display_name: String,
}

/// Download every document into `staging_dir`.
///
/// Results come back in the order of `documents`. The first failure aborts
/// the whole call: the failed file is removed, transfers still in flight are
/// cancelled, and whatever they left behind goes away with the staging area.
/// Every URL is resolved before any network traffic, so a malformed reference
/// fails fast.
#[instrument(skip_all, fields(documents = documents.len(), batch_size = options.batch_size))]
pub async fn download_all(
    store: &dyn ObjectStore,
    documents: &[DocumentReference],
    staging_dir: &Path,
    options: &DownloadOptions,
) -> Result<Vec<DownloadedFile>, ZipError> {
    let locations = documents
        .iter()
        .map(|doc| {
            doc.location().map_err(|source| ZipError::InvalidUrl {
                display_name: doc.display_name.clone(),
                source,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let work: Vec<(usize, &DocumentReference, &S3Location)> = documents
        .iter()
        .zip(&locations)
        .enumerate()
        .map(|(index, (doc, location))| (index, doc, location))
        .collect();

    let mut results: Vec<Option<DownloadedFile>> = vec![None; documents.len()];
    let mut total_bytes: u64 = 0;

    for (batch_index, batch) in work.chunks(options.batch_size.max(1)).enumerate() {
        debug!(batch = batch_index + 1, files = batch.len(), "Downloading batch");

        let mut in_flight: FuturesUnordered<_> = batch
            .iter()
            .map(|&(index, doc, location)| {
                let target = staging_dir.join(staging_file_name(index));
                async move {
                    let outcome = download_one(store, location, &target, options).await;
                    (index, doc, target, outcome)
                }
            })
            .collect();

        while let Some((index, doc, path, outcome)) = in_flight.next().await {
            let size = outcome?;

            total_bytes += size;
            if total_bytes > options.max_total_bytes {
                warn!(
                    total_bytes,
                    limit_bytes = options.max_total_bytes,
                    "Documents exceed the package size limit"
                );
                return Err(ZipError::SizeLimitExceeded {
                    total_bytes,
                    limit_bytes: options.max_total_bytes,
                });
            }

            results[index] = Some(DownloadedFile {
                path,
                size,
                display_name: doc.display_name.clone(),
            });
        }
    }

    debug!(total_bytes, "Downloaded all documents");
    Ok(results.into_iter().flatten().collect())
}

/// `{index:05}-{uuid}`; never derived from the display name
fn staging_file_name(index: usize) -> String {
    format!("{:05}-{}", index, Uuid::new_v4())
}

async fn download_one(
    store: &dyn ObjectStore,
    location: &S3Location,
    target: &Path,
    options: &DownloadOptions,
) -> Result<u64, ZipError> {
    let timed_out = |timeout: Duration| ZipError::DownloadTimeout {
        location: location.clone(),
        timeout,
    };

    // HEAD is bounded by the base timeout alone
    let metadata = tokio::time::timeout(
        options.base_timeout,
        store.head(&location.bucket, &location.key),
    )
    .await
    .map_err(|_| timed_out(options.base_timeout))?
    .map_err(|source| ZipError::Download {
        location: location.clone(),
        source,
    })?;
    let timeout = options.timeout_for(metadata.size);

    let result = match tokio::time::timeout(timeout, transfer(store, location, target)).await {
        Ok(result) => result,
        Err(_) => Err(timed_out(timeout)),
    };

    if let Err(e) = &result {
        debug!(%location, error = %e, "Download failed");
        discard_partial(target).await;
    }
    result
}

async fn transfer(
    store: &dyn ObjectStore,
    location: &S3Location,
    target: &Path,
) -> Result<u64, ZipError> {
    let download_error = |source: StorageError| ZipError::Download {
        location: location.clone(),
        source,
    };

    let mut reader = store
        .get(&location.bucket, &location.key)
        .await
        .map_err(download_error)?;
    let mut file = tokio::fs::File::create(target).await?;
    let written = tokio::io::copy(&mut reader, &mut file)
        .await
        .map_err(|e| download_error(StorageError::Io(e)))?;
    file.flush().await?;

    Ok(written)
}

async fn discard_partial(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Failed to remove partial download");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_scales_with_started_megabytes() {
        let options = DownloadOptions {
            base_timeout: Duration::from_secs(120),
            timeout_per_mb: Duration::from_secs(1),
            ..DownloadOptions::default()
        };

        assert_eq!(options.timeout_for(0), Duration::from_secs(120));
        assert_eq!(options.timeout_for(1), Duration::from_secs(121));
        assert_eq!(options.timeout_for(BYTES_PER_MB), Duration::from_secs(121));
        assert_eq!(options.timeout_for(BYTES_PER_MB + 1), Duration::from_secs(122));
        assert!(options.timeout_for(u64::MAX) > Duration::from_secs(u64::from(u32::MAX)));
    }

    #[test]
    fn test_staging_file_names_are_unique_and_ordered() {
        let a = staging_file_name(3);
        let b = staging_file_name(3);
        assert!(a.starts_with("00003-"));
        assert_ne!(a, b);
    }
}
