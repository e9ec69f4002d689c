//! Zip package persistence
//!
//! [`ZipPackageRepository`] is everything the packaging pipeline and its jobs
//! need from the database: artifact lookup and creation, revision scans for
//! backfill, and the legacy location queries. [`PgZipPackageRepository`] is
//! the Postgres implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mcr_common::s3_url::{self, S3Location};
use mcr_common::types::{
    DocumentReference, DocumentType, NewZipPackageArtifact, RevisionDocuments, RevisionKind,
    ZipPackageArtifact,
};
use sqlx::{FromRow, PgPool};
use std::collections::HashMap;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::{DbError, DbResult};

/// Which revisions a backfill scan should return
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RevisionFilter {
    /// Only revisions that have been submitted
    pub submitted_only: bool,
    pub state_code: Option<String>,
    /// Only revisions carrying at least one document
    pub require_documents: bool,
    pub limit: Option<i64>,
}

impl RevisionFilter {
    /// Submitted revisions without a package, optionally for one state
    pub fn submitted(state_code: Option<String>) -> Self {
        Self {
            submitted_only: true,
            state_code,
            require_documents: false,
            limit: None,
        }
    }

    /// Revisions of any status that have documents but no package
    pub fn with_documents(limit: Option<i64>) -> Self {
        Self {
            submitted_only: false,
            state_code: None,
            require_documents: true,
            limit,
        }
    }
}

/// A record whose bucket and key have not been split out of its URL yet
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct LegacyLocationRecord {
    pub id: Uuid,
    pub s3_url: String,
}

#[async_trait]
pub trait ZipPackageRepository: Send + Sync {
    async fn find_zip_artifact(
        &self,
        revision_id: &str,
        document_type: DocumentType,
    ) -> DbResult<Option<ZipPackageArtifact>>;

    async fn create_zip_artifact(
        &self,
        artifact: NewZipPackageArtifact,
    ) -> DbResult<ZipPackageArtifact>;

    /// Revisions of `kind` with no package, oldest first
    async fn find_revisions_missing_zips(
        &self,
        kind: RevisionKind,
        filter: &RevisionFilter,
    ) -> DbResult<Vec<RevisionDocuments>>;

    async fn find_revision(
        &self,
        kind: RevisionKind,
        revision_id: &str,
    ) -> DbResult<Option<RevisionDocuments>>;

    /// Document records without a stored bucket/key, ordered by id, after `after`
    async fn find_documents_missing_location(
        &self,
        after: Option<Uuid>,
        limit: i64,
    ) -> DbResult<Vec<LegacyLocationRecord>>;

    async fn set_document_location(&self, id: Uuid, location: &S3Location) -> DbResult<()>;

    async fn find_zip_packages_missing_location(
        &self,
        after: Option<Uuid>,
        limit: i64,
    ) -> DbResult<Vec<LegacyLocationRecord>>;

    async fn set_zip_package_location(&self, id: Uuid, location: &S3Location) -> DbResult<()>;
}

// ============================================================================
// Rows
// ============================================================================

#[derive(Debug, FromRow)]
struct ZipPackageRow {
    id: Uuid,
    s3_url: String,
    s3_bucket_name: Option<String>,
    s3_key: Option<String>,
    sha256: String,
    document_type: String,
    revision_id: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<ZipPackageRow> for ZipPackageArtifact {
    type Error = DbError;

    fn try_from(row: ZipPackageRow) -> DbResult<Self> {
        let document_type = row
            .document_type
            .parse::<DocumentType>()
            .map_err(|e| DbError::Decode(e.to_string()))?;

        // Rows written before bucket/key were stored carry only the URL
        let location = match (row.s3_bucket_name, row.s3_key) {
            (Some(bucket), Some(key)) => S3Location::new(bucket, key),
            _ => s3_url::parse_bucket_and_key(&row.s3_url)
                .map_err(|e| DbError::Decode(e.to_string()))?,
        };

        Ok(ZipPackageArtifact {
            id: row.id,
            object_url: row.s3_url,
            bucket_name: location.bucket,
            object_key: location.key,
            content_hash: row.sha256,
            document_type,
            associated_revision_id: row.revision_id,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct RevisionRow {
    id: String,
    state_code: Option<String>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct DocumentRow {
    revision_id: String,
    is_supporting: bool,
    name: String,
    s3_url: String,
    sha256: Option<String>,
}

const ZIP_PACKAGE_COLUMNS: &str =
    "id, s3_url, s3_bucket_name, s3_key, sha256, document_type, revision_id, created_at";

fn revision_table(kind: RevisionKind) -> &'static str {
    match kind {
        RevisionKind::Contract => "contract_revisions",
        RevisionKind::Rate => "rate_revisions",
    }
}

// ============================================================================
// Postgres implementation
// ============================================================================

#[derive(Clone)]
pub struct PgZipPackageRepository {
    pool: PgPool,
}

impl PgZipPackageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Load the documents of every revision in `rows`, preserving row order
    async fn attach_documents(
        &self,
        kind: RevisionKind,
        rows: Vec<RevisionRow>,
    ) -> DbResult<Vec<RevisionDocuments>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
        let documents = sqlx::query_as::<_, DocumentRow>(
            r#"
            SELECT revision_id, is_supporting, name, s3_url, sha256
            FROM revision_documents
            WHERE revision_kind = $1 AND revision_id = ANY($2)
            ORDER BY revision_id, is_supporting, position, created_at
            "#,
        )
        .bind(kind.as_str())
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_revision: HashMap<String, (Vec<DocumentReference>, Vec<DocumentReference>)> =
            HashMap::new();
        for doc in documents {
            let entry = by_revision.entry(doc.revision_id).or_default();
            let reference = DocumentReference {
                remote_url: doc.s3_url,
                display_name: doc.name,
                content_hash: doc.sha256,
            };
            if doc.is_supporting {
                entry.1.push(reference);
            } else {
                entry.0.push(reference);
            }
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let (documents, supporting_documents) =
                    by_revision.remove(&row.id).unwrap_or_default();
                RevisionDocuments {
                    revision_id: row.id,
                    kind,
                    state_code: row.state_code,
                    created_at: row.created_at,
                    documents,
                    supporting_documents,
                }
            })
            .collect())
    }

    async fn set_location(
        &self,
        table: &'static str,
        id: Uuid,
        location: &S3Location,
    ) -> DbResult<()> {
        let sql = format!(
            "UPDATE {} SET s3_bucket_name = $2, s3_key = $3 WHERE id = $1",
            table
        );
        let result = sqlx::query(&sql)
            .bind(id)
            .bind(&location.bucket)
            .bind(&location.key)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found(table, &id.to_string()));
        }
        Ok(())
    }

    async fn find_missing_location(
        &self,
        table: &'static str,
        after: Option<Uuid>,
        limit: i64,
    ) -> DbResult<Vec<LegacyLocationRecord>> {
        let sql = format!(
            r#"
            SELECT id, s3_url FROM {}
            WHERE (s3_bucket_name IS NULL OR s3_key IS NULL)
              AND ($1::uuid IS NULL OR id > $1)
            ORDER BY id
            LIMIT $2
            "#,
            table
        );
        let records = sqlx::query_as::<_, LegacyLocationRecord>(&sql)
            .bind(after)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(records)
    }
}

#[async_trait]
impl ZipPackageRepository for PgZipPackageRepository {
    #[instrument(skip(self))]
    async fn find_zip_artifact(
        &self,
        revision_id: &str,
        document_type: DocumentType,
    ) -> DbResult<Option<ZipPackageArtifact>> {
        let sql = format!(
            r#"
            SELECT {} FROM document_zip_packages
            WHERE revision_id = $1 AND document_type = $2
            ORDER BY created_at DESC
            LIMIT 1
            "#,
            ZIP_PACKAGE_COLUMNS
        );
        let row = sqlx::query_as::<_, ZipPackageRow>(&sql)
            .bind(revision_id)
            .bind(document_type.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(ZipPackageArtifact::try_from).transpose()
    }

    #[instrument(skip(self, artifact), fields(revision_id = %artifact.associated_revision_id))]
    async fn create_zip_artifact(
        &self,
        artifact: NewZipPackageArtifact,
    ) -> DbResult<ZipPackageArtifact> {
        let sql = format!(
            r#"
            INSERT INTO document_zip_packages
                (id, s3_url, s3_bucket_name, s3_key, sha256, document_type, revision_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {}
            "#,
            ZIP_PACKAGE_COLUMNS
        );
        let row = sqlx::query_as::<_, ZipPackageRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(&artifact.object_url)
            .bind(&artifact.bucket_name)
            .bind(&artifact.object_key)
            .bind(&artifact.content_hash)
            .bind(artifact.document_type.as_str())
            .bind(&artifact.associated_revision_id)
            .fetch_one(&self.pool)
            .await?;

        debug!(id = %row.id, "Recorded zip package");
        ZipPackageArtifact::try_from(row)
    }

    #[instrument(skip(self))]
    async fn find_revisions_missing_zips(
        &self,
        kind: RevisionKind,
        filter: &RevisionFilter,
    ) -> DbResult<Vec<RevisionDocuments>> {
        let sql = format!(
            r#"
            SELECT r.id, r.state_code, r.created_at
            FROM {} r
            WHERE ($1 = FALSE OR r.submitted_at IS NOT NULL)
              AND ($2::text IS NULL OR r.state_code = $2)
              AND NOT EXISTS (
                  SELECT 1 FROM document_zip_packages z
                  WHERE z.revision_id = r.id AND z.document_type = $3
              )
              AND ($4 = FALSE OR EXISTS (
                  SELECT 1 FROM revision_documents d
                  WHERE d.revision_kind = $5 AND d.revision_id = r.id
              ))
            ORDER BY r.created_at ASC, r.id ASC
            LIMIT $6
            "#,
            revision_table(kind)
        );
        let rows = sqlx::query_as::<_, RevisionRow>(&sql)
            .bind(filter.submitted_only)
            .bind(filter.state_code.as_deref())
            .bind(kind.document_type().as_str())
            .bind(filter.require_documents)
            .bind(kind.as_str())
            .bind(filter.limit)
            .fetch_all(&self.pool)
            .await?;

        debug!(count = rows.len(), "Found revisions without zip packages");
        self.attach_documents(kind, rows).await
    }

    #[instrument(skip(self))]
    async fn find_revision(
        &self,
        kind: RevisionKind,
        revision_id: &str,
    ) -> DbResult<Option<RevisionDocuments>> {
        let sql = format!(
            "SELECT id, state_code, created_at FROM {} WHERE id = $1",
            revision_table(kind)
        );
        let row = sqlx::query_as::<_, RevisionRow>(&sql)
            .bind(revision_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(self.attach_documents(kind, vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn find_documents_missing_location(
        &self,
        after: Option<Uuid>,
        limit: i64,
    ) -> DbResult<Vec<LegacyLocationRecord>> {
        self.find_missing_location("revision_documents", after, limit)
            .await
    }

    async fn set_document_location(&self, id: Uuid, location: &S3Location) -> DbResult<()> {
        self.set_location("revision_documents", id, location).await
    }

    async fn find_zip_packages_missing_location(
        &self,
        after: Option<Uuid>,
        limit: i64,
    ) -> DbResult<Vec<LegacyLocationRecord>> {
        self.find_missing_location("document_zip_packages", after, limit)
            .await
    }

    async fn set_zip_package_location(&self, id: Uuid, location: &S3Location) -> DbResult<()> {
        self.set_location("document_zip_packages", id, location)
            .await
    }
}
