//! Store bucket and key alongside historical object URLs
//!
//! Old document records only carry a URL, often in the
//! `s3://bucket/<uuid>.<ext>/<original name>` shape whose real object lives
//! at `allusers/<uuid>.<ext>`. This job resolves each record's true location
//! and writes it back. Zip package URLs were always well formed and keep
//! everything after the bucket as their key.

use mcr_common::s3_url::{self, S3Location, S3UrlError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use super::JobError;
use crate::db::{LegacyLocationRecord, ZipPackageRepository};

/// Records fetched per query
pub const LEGACY_KEY_PAGE_SIZE: i64 = 500;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyKeyStats {
    pub dry_run: bool,
    pub documents_updated: u64,
    pub documents_failed: u64,
    pub zip_packages_updated: u64,
    pub zip_packages_failed: u64,
}

#[derive(Debug, Clone, Copy)]
enum RecordKind {
    Document,
    ZipPackage,
}

impl RecordKind {
    fn resolve(self, url: &str) -> Result<S3Location, S3UrlError> {
        match self {
            RecordKind::Document => s3_url::resolve_document_location(url),
            RecordKind::ZipPackage => {
                let bucket = s3_url::parse_bucket_and_key(url)?.bucket;
                Ok(S3Location::new(bucket, s3_url::extract_zip_key(url)?))
            },
        }
    }

    fn label(self) -> &'static str {
        match self {
            RecordKind::Document => "document",
            RecordKind::ZipPackage => "zip package",
        }
    }
}

#[instrument(skip(repository))]
pub async fn migrate_legacy_keys(
    repository: &dyn ZipPackageRepository,
    dry_run: bool,
) -> Result<LegacyKeyStats, JobError> {
    let mut stats = LegacyKeyStats {
        dry_run,
        ..LegacyKeyStats::default()
    };

    let (updated, failed) = migrate_records(repository, RecordKind::Document, dry_run).await?;
    stats.documents_updated = updated;
    stats.documents_failed = failed;

    let (updated, failed) = migrate_records(repository, RecordKind::ZipPackage, dry_run).await?;
    stats.zip_packages_updated = updated;
    stats.zip_packages_failed = failed;

    info!(
        dry_run,
        documents_updated = stats.documents_updated,
        documents_failed = stats.documents_failed,
        zip_packages_updated = stats.zip_packages_updated,
        zip_packages_failed = stats.zip_packages_failed,
        "Legacy key migration finished"
    );
    Ok(stats)
}

async fn migrate_records(
    repository: &dyn ZipPackageRepository,
    kind: RecordKind,
    dry_run: bool,
) -> Result<(u64, u64), JobError> {
    let mut updated = 0;
    let mut failed = 0;
    let mut cursor = None;

    loop {
        let page = fetch_page(repository, kind, cursor).await?;
        let Some(last) = page.last() else {
            break;
        };
        cursor = Some(last.id);

        for record in &page {
            let location = match kind.resolve(&record.s3_url) {
                Ok(location) => location,
                Err(e) => {
                    warn!(kind = kind.label(), id = %record.id, url = %record.s3_url, error = %e, "Unparseable URL");
                    failed += 1;
                    continue;
                },
            };

            if dry_run {
                debug!(kind = kind.label(), id = %record.id, %location, "[dry run] Would store location");
                updated += 1;
                continue;
            }

            let written = match kind {
                RecordKind::Document => repository.set_document_location(record.id, &location).await,
                RecordKind::ZipPackage => {
                    repository.set_zip_package_location(record.id, &location).await
                },
            };
            match written {
                Ok(()) => updated += 1,
                Err(e) => {
                    warn!(kind = kind.label(), id = %record.id, error = %e, "Failed to store location");
                    failed += 1;
                },
            }
        }

        if i64::try_from(page.len()).unwrap_or(i64::MAX) < LEGACY_KEY_PAGE_SIZE {
            break;
        }
    }

    Ok((updated, failed))
}

async fn fetch_page(
    repository: &dyn ZipPackageRepository,
    kind: RecordKind,
    cursor: Option<uuid::Uuid>,
) -> Result<Vec<LegacyLocationRecord>, JobError> {
    let page = match kind {
        RecordKind::Document => {
            repository
                .find_documents_missing_location(cursor, LEGACY_KEY_PAGE_SIZE)
                .await?
        },
        RecordKind::ZipPackage => {
            repository
                .find_zip_packages_missing_location(cursor, LEGACY_KEY_PAGE_SIZE)
                .await?
        },
    };
    Ok(page)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_document_urls_resolve_to_canonical_key() {
        assert_eq!(
            RecordKind::Document.resolve("s3://bkt/a1.pdf/report.pdf").unwrap(),
            S3Location::new("bkt", "allusers/a1.pdf")
        );
    }

    #[test]
    fn test_zip_urls_keep_full_key() {
        assert_eq!(
            RecordKind::ZipPackage
                .resolve("s3://bkt/zips/rates/r-1/rate-documents.zip")
                .unwrap(),
            S3Location::new("bkt", "zips/rates/r-1/rate-documents.zip")
        );
    }

    #[test]
    fn test_unparseable_url_is_error() {
        assert!(RecordKind::Document.resolve("not a url").is_err());
    }
}
