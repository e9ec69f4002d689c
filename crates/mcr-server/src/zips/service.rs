//! Zip package generation for a revision
//!
//! [`DocumentZipService::generate_and_store`] is idempotent per
//! (revision, document type): an existing artifact short-circuits the whole
//! pipeline. The artifact record is written last; if that write fails the
//! freshly uploaded object is deleted again so storage never holds a package
//! the database does not know about.

use mcr_common::s3_url::S3Location;
use mcr_common::types::{
    DocumentReference, DocumentType, NewZipPackageArtifact, RevisionDocuments, ZipPackageArtifact,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use super::archive::{build_zip, hash_file};
use super::downloader::{download_all, DownloadOptions};
use super::staging::StagingArea;
use super::ZipError;
use crate::config::ZipConfig;
use crate::db::ZipPackageRepository;
use crate::storage::ObjectStore;

pub const ZIP_CONTENT_TYPE: &str = "application/zip";

#[derive(Debug, Clone)]
pub struct ZipServiceConfig {
    /// Bucket packages are uploaded to
    pub bucket: String,
    /// Parent directory of per-invocation staging areas
    pub staging_root: PathBuf,
    pub download: DownloadOptions,
}

impl ZipServiceConfig {
    pub fn new(bucket: impl Into<String>, zips: &ZipConfig) -> Self {
        Self {
            bucket: bucket.into(),
            staging_root: zips.staging_dir.clone(),
            download: DownloadOptions::from(zips),
        }
    }
}

/// What a generation request ended up doing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ZipOutcome {
    Created(ZipPackageArtifact),
    /// A package was already recorded; nothing was downloaded or uploaded
    AlreadyExists(ZipPackageArtifact),
    /// The revision has no documents to package
    NoDocuments,
}

impl ZipOutcome {
    pub fn artifact(&self) -> Option<&ZipPackageArtifact> {
        match self {
            ZipOutcome::Created(artifact) | ZipOutcome::AlreadyExists(artifact) => Some(artifact),
            ZipOutcome::NoDocuments => None,
        }
    }
}

struct BuiltArchive {
    path: PathBuf,
    content_hash: String,
}

#[derive(Clone)]
pub struct DocumentZipService {
    store: Arc<dyn ObjectStore>,
    repository: Arc<dyn ZipPackageRepository>,
    config: ZipServiceConfig,
}

impl DocumentZipService {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        repository: Arc<dyn ZipPackageRepository>,
        config: ZipServiceConfig,
    ) -> Self {
        Self {
            store,
            repository,
            config,
        }
    }

    /// Package a revision's primary and supporting documents together
    pub async fn generate_for_revision(
        &self,
        revision: &RevisionDocuments,
    ) -> Result<ZipOutcome, ZipError> {
        self.generate_and_store(
            &revision.all_documents(),
            &revision.revision_id,
            revision.kind.document_type(),
        )
        .await
    }

    #[instrument(skip(self, documents), fields(documents = documents.len()))]
    pub async fn generate_and_store(
        &self,
        documents: &[DocumentReference],
        revision_id: &str,
        document_type: DocumentType,
    ) -> Result<ZipOutcome, ZipError> {
        if documents.is_empty() {
            debug!("No documents to package");
            return Ok(ZipOutcome::NoDocuments);
        }

        let existing = self
            .repository
            .find_zip_artifact(revision_id, document_type)
            .await
            .map_err(|source| ZipError::Lookup {
                revision_id: revision_id.to_string(),
                source,
            })?;
        if let Some(artifact) = existing {
            info!(artifact_id = %artifact.id, "Zip package already exists");
            return Ok(ZipOutcome::AlreadyExists(artifact));
        }

        let staging = StagingArea::create(&self.config.staging_root, revision_id)?;
        let result = match self.build_archive(documents, document_type, &staging).await {
            Ok(archive) => self.upload_and_record(&archive, revision_id, document_type).await,
            Err(e) => Err(e),
        };
        staging.close();

        result.map(ZipOutcome::Created)
    }

    async fn build_archive(
        &self,
        documents: &[DocumentReference],
        document_type: DocumentType,
        staging: &StagingArea,
    ) -> Result<BuiltArchive, ZipError> {
        let files = download_all(
            self.store.as_ref(),
            documents,
            staging.downloads_dir(),
            &self.config.download,
        )
        .await?;

        let path = staging.file_path(document_type.archive_file_name());
        build_zip(&files, &path).await?;
        let content_hash = hash_file(&path).await?;

        debug!(files = files.len(), %content_hash, "Built archive");
        Ok(BuiltArchive { path, content_hash })
    }

    async fn upload_and_record(
        &self,
        archive: &BuiltArchive,
        revision_id: &str,
        document_type: DocumentType,
    ) -> Result<ZipPackageArtifact, ZipError> {
        let location = S3Location::new(
            self.config.bucket.as_str(),
            document_type.zip_object_key(revision_id),
        );

        self.store
            .put_file(&location.bucket, &location.key, &archive.path, ZIP_CONTENT_TYPE)
            .await
            .map_err(|source| ZipError::Upload {
                location: location.clone(),
                source,
            })?;

        let record = NewZipPackageArtifact {
            object_url: location.to_url(),
            bucket_name: location.bucket.clone(),
            object_key: location.key.clone(),
            content_hash: archive.content_hash.clone(),
            document_type,
            associated_revision_id: revision_id.to_string(),
        };

        match self.repository.create_zip_artifact(record).await {
            Ok(artifact) => {
                info!(artifact_id = %artifact.id, url = %artifact.object_url, "Created zip package");
                Ok(artifact)
            },
            Err(source) => {
                error!(%location, error = %source, "Failed to record zip package, removing upload");
                if let Err(cleanup) = self.store.delete(&location.bucket, &location.key).await {
                    warn!(%location, error = %cleanup, "Failed to remove orphaned zip package");
                }
                Err(ZipError::Persistence {
                    revision_id: revision_id.to_string(),
                    source,
                })
            },
        }
    }
}
