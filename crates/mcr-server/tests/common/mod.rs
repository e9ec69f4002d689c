//! In-memory collaborators for packaging and job tests
//!
//! [`MemoryStore`] and [`MemoryRepository`] implement the storage and
//! persistence traits over plain collections and record the calls made
//! against them, so tests can assert what the pipeline did (and did not do)
//! without S3 or Postgres.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use mcr_common::s3_url::S3Location;
use mcr_common::types::{
    DocumentReference, DocumentType, NewZipPackageArtifact, RevisionDocuments, RevisionKind,
    ZipPackageArtifact,
};
use mcr_server::config::MigrationConfig;
use mcr_server::db::{DbError, DbResult, LegacyLocationRecord, RevisionFilter, ZipPackageRepository};
use mcr_server::jobs::JobContext;
use mcr_server::storage::{ObjectMetadata, ObjectReader, ObjectStore, StorageError, StorageResult};
use mcr_server::zips::{DocumentZipService, DownloadOptions, ZipServiceConfig};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

pub const TEST_BUCKET: &str = "bkt";

// ============================================================================
// Object store
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    Head(String),
    Get(String),
    Put(String),
    Delete(String),
}

#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<HashMap<(String, String), Vec<u8>>>,
    calls: Mutex<Vec<StoreCall>>,
    content_types: Mutex<HashMap<(String, String), String>>,
    /// Keys whose body never arrives
    stalled: Mutex<HashSet<String>>,
    /// Keys whose metadata request never answers
    stalled_heads: Mutex<HashSet<String>>,
    get_delay: Mutex<Option<Duration>>,
    fail_delete: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert(&self, bucket: &str, key: &str, body: impl Into<Vec<u8>>) {
        self.objects
            .lock()
            .unwrap()
            .insert((bucket.to_string(), key.to_string()), body.into());
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    pub fn content_type(&self, bucket: &str, key: &str) -> Option<String> {
        self.content_types
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    pub fn stall(&self, key: &str) {
        self.stalled.lock().unwrap().insert(key.to_string());
    }

    pub fn stall_head(&self, key: &str) {
        self.stalled_heads.lock().unwrap().insert(key.to_string());
    }

    pub fn set_get_delay(&self, delay: Duration) {
        *self.get_delay.lock().unwrap() = Some(delay);
    }

    pub fn fail_deletes(&self) {
        self.fail_delete.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn puts(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                StoreCall::Put(url) => Some(url),
                _ => None,
            })
            .collect()
    }

    pub fn deletes(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                StoreCall::Delete(url) => Some(url),
                _ => None,
            })
            .collect()
    }

    pub fn gets(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, StoreCall::Get(_)))
            .count()
    }

    fn record(&self, call: StoreCall) {
        self.calls.lock().unwrap().push(call);
    }
}

fn url(bucket: &str, key: &str) -> String {
    format!("s3://{}/{}", bucket, key)
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn head(&self, bucket: &str, key: &str) -> StorageResult<ObjectMetadata> {
        self.record(StoreCall::Head(url(bucket, key)));
        let stalled = self.stalled_heads.lock().unwrap().contains(key);
        if stalled {
            tokio::time::sleep(Duration::from_secs(36_000)).await;
        }
        let size = self
            .object(bucket, key)
            .map(|body| body.len() as u64)
            .ok_or_else(|| StorageError::not_found(bucket, key))?;
        Ok(ObjectMetadata {
            bucket: bucket.to_string(),
            key: key.to_string(),
            size,
            content_type: self.content_type(bucket, key),
        })
    }

    async fn get(&self, bucket: &str, key: &str) -> StorageResult<ObjectReader> {
        self.record(StoreCall::Get(url(bucket, key)));

        let stalled = self.stalled.lock().unwrap().contains(key);
        if stalled {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        let delay = *self.get_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let body = self
            .object(bucket, key)
            .ok_or_else(|| StorageError::not_found(bucket, key))?;
        Ok(Box::pin(std::io::Cursor::new(body)))
    }

    async fn put_file(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
        content_type: &str,
    ) -> StorageResult<()> {
        self.record(StoreCall::Put(url(bucket, key)));
        let body = tokio::fs::read(path).await?;
        self.insert(bucket, key, body);
        self.content_types
            .lock()
            .unwrap()
            .insert((bucket.to_string(), key.to_string()), content_type.to_string());
        Ok(())
    }

    async fn delete(&self, bucket: &str, key: &str) -> StorageResult<()> {
        self.record(StoreCall::Delete(url(bucket, key)));
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(StorageError::backend("delete", "simulated outage"));
        }
        self.objects
            .lock()
            .unwrap()
            .remove(&(bucket.to_string(), key.to_string()));
        Ok(())
    }
}

// ============================================================================
// Repository
// ============================================================================

#[derive(Clone)]
struct StoredRevision {
    revision: RevisionDocuments,
    submitted: bool,
}

#[derive(Default)]
pub struct MemoryRepository {
    artifacts: Mutex<Vec<ZipPackageArtifact>>,
    revisions: Mutex<Vec<StoredRevision>>,
    legacy_documents: Mutex<Vec<LegacyLocationRecord>>,
    legacy_zip_packages: Mutex<Vec<LegacyLocationRecord>>,
    locations: Mutex<HashMap<Uuid, S3Location>>,
    fail_create: AtomicBool,
    fail_queries: AtomicBool,
    create_calls: AtomicUsize,
}

impl MemoryRepository {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_revision(&self, revision: RevisionDocuments, submitted: bool) {
        self.revisions.lock().unwrap().push(StoredRevision {
            revision,
            submitted,
        });
    }

    pub fn add_artifact(&self, artifact: ZipPackageArtifact) {
        self.artifacts.lock().unwrap().push(artifact);
    }

    pub fn add_legacy_document(&self, s3_url: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.legacy_documents.lock().unwrap().push(LegacyLocationRecord {
            id,
            s3_url: s3_url.to_string(),
        });
        id
    }

    pub fn add_legacy_zip_package(&self, s3_url: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.legacy_zip_packages.lock().unwrap().push(LegacyLocationRecord {
            id,
            s3_url: s3_url.to_string(),
        });
        id
    }

    pub fn location(&self, id: Uuid) -> Option<S3Location> {
        self.locations.lock().unwrap().get(&id).cloned()
    }

    pub fn artifacts(&self) -> Vec<ZipPackageArtifact> {
        self.artifacts.lock().unwrap().clone()
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn fail_creates(&self) {
        self.fail_create.store(true, Ordering::SeqCst);
    }

    pub fn fail_queries(&self) {
        self.fail_queries.store(true, Ordering::SeqCst);
    }

    fn check_queries(&self) -> DbResult<()> {
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(DbError::Sqlx(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }

    fn has_artifact(&self, revision_id: &str, document_type: DocumentType) -> bool {
        self.artifacts
            .lock()
            .unwrap()
            .iter()
            .any(|a| a.associated_revision_id == revision_id && a.document_type == document_type)
    }

    fn missing_location(
        &self,
        records: &Mutex<Vec<LegacyLocationRecord>>,
        after: Option<Uuid>,
        limit: i64,
    ) -> Vec<LegacyLocationRecord> {
        let locations = self.locations.lock().unwrap();
        let mut pending: Vec<_> = records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| !locations.contains_key(&r.id))
            .filter(|r| after.is_none_or(|after| r.id > after))
            .cloned()
            .collect();
        pending.sort_by_key(|r| r.id);
        pending.truncate(usize::try_from(limit).unwrap());
        pending
    }
}

#[async_trait]
impl ZipPackageRepository for MemoryRepository {
    async fn find_zip_artifact(
        &self,
        revision_id: &str,
        document_type: DocumentType,
    ) -> DbResult<Option<ZipPackageArtifact>> {
        self.check_queries()?;
        Ok(self
            .artifacts
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|a| a.associated_revision_id == revision_id && a.document_type == document_type)
            .cloned())
    }

    async fn create_zip_artifact(
        &self,
        artifact: NewZipPackageArtifact,
    ) -> DbResult<ZipPackageArtifact> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(DbError::Sqlx(sqlx::Error::PoolTimedOut));
        }
        let artifact = artifact.into_artifact();
        self.artifacts.lock().unwrap().push(artifact.clone());
        Ok(artifact)
    }

    async fn find_revisions_missing_zips(
        &self,
        kind: RevisionKind,
        filter: &RevisionFilter,
    ) -> DbResult<Vec<RevisionDocuments>> {
        self.check_queries()?;
        let stored = self.revisions.lock().unwrap().clone();

        let mut matching: Vec<RevisionDocuments> = stored
            .into_iter()
            .filter(|s| s.revision.kind == kind)
            .filter(|s| !filter.submitted_only || s.submitted)
            .filter(|s| {
                filter
                    .state_code
                    .as_ref()
                    .is_none_or(|code| s.revision.state_code.as_ref() == Some(code))
            })
            .filter(|s| !filter.require_documents || s.revision.has_documents())
            .filter(|s| !self.has_artifact(&s.revision.revision_id, kind.document_type()))
            .map(|s| s.revision)
            .collect();

        matching.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.revision_id.cmp(&b.revision_id))
        });
        if let Some(limit) = filter.limit {
            matching.truncate(usize::try_from(limit).unwrap());
        }
        Ok(matching)
    }

    async fn find_revision(
        &self,
        kind: RevisionKind,
        revision_id: &str,
    ) -> DbResult<Option<RevisionDocuments>> {
        self.check_queries()?;
        Ok(self
            .revisions
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.revision.kind == kind && s.revision.revision_id == revision_id)
            .map(|s| s.revision.clone()))
    }

    async fn find_documents_missing_location(
        &self,
        after: Option<Uuid>,
        limit: i64,
    ) -> DbResult<Vec<LegacyLocationRecord>> {
        self.check_queries()?;
        Ok(self.missing_location(&self.legacy_documents, after, limit))
    }

    async fn set_document_location(&self, id: Uuid, location: &S3Location) -> DbResult<()> {
        self.locations.lock().unwrap().insert(id, location.clone());
        Ok(())
    }

    async fn find_zip_packages_missing_location(
        &self,
        after: Option<Uuid>,
        limit: i64,
    ) -> DbResult<Vec<LegacyLocationRecord>> {
        self.check_queries()?;
        Ok(self.missing_location(&self.legacy_zip_packages, after, limit))
    }

    async fn set_zip_package_location(&self, id: Uuid, location: &S3Location) -> DbResult<()> {
        self.locations.lock().unwrap().insert(id, location.clone());
        Ok(())
    }
}

// ============================================================================
// Fixtures
// ============================================================================

/// A fixed point in time; `offset_secs` orders revisions deterministically
pub fn created_at(offset_secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + ChronoDuration::seconds(offset_secs)
}

/// A revision with `documents` primary documents whose objects exist in `store`
pub fn seeded_revision(
    store: &MemoryStore,
    kind: RevisionKind,
    revision_id: &str,
    documents: usize,
    offset_secs: i64,
) -> RevisionDocuments {
    let documents = (0..documents)
        .map(|i| {
            let key = format!("allusers/{}-{}.pdf", revision_id, i);
            store.insert(TEST_BUCKET, &key, format!("{} document {}", revision_id, i));
            DocumentReference::new(
                format!("s3://{}/{}", TEST_BUCKET, key),
                format!("document-{}.pdf", i),
            )
        })
        .collect();

    RevisionDocuments {
        revision_id: revision_id.to_string(),
        kind,
        state_code: Some("MN".to_string()),
        created_at: created_at(offset_secs),
        documents,
        supporting_documents: Vec::new(),
    }
}

pub fn service_config(staging_root: &Path) -> ZipServiceConfig {
    ZipServiceConfig {
        bucket: TEST_BUCKET.to_string(),
        staging_root: staging_root.to_path_buf(),
        download: DownloadOptions::default(),
    }
}

pub fn zip_service(
    store: &Arc<MemoryStore>,
    repository: &Arc<MemoryRepository>,
    config: ZipServiceConfig,
) -> DocumentZipService {
    DocumentZipService::new(store.clone(), repository.clone(), config)
}

pub fn job_context(
    store: &Arc<MemoryStore>,
    repository: &Arc<MemoryRepository>,
    staging_root: &Path,
) -> JobContext {
    JobContext::new(
        store.clone(),
        repository.clone(),
        service_config(staging_root),
        MigrationConfig {
            batch_size: 10,
            max_runtime_ms: 60_000,
        },
    )
}

/// Number of entries left under a staging root
pub fn staging_entries(root: &Path) -> usize {
    std::fs::read_dir(root).map(|dir| dir.count()).unwrap_or(0)
}
