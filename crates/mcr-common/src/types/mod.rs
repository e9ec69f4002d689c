//! Domain types shared by the packaging pipeline and its callers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::s3_url::{self, S3Location, S3UrlError, ZIP_KEY_PREFIX};

/// Checksum algorithm type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChecksumAlgorithm {
    Sha256,
    Sha512,
}

impl std::fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChecksumAlgorithm::Sha256 => write!(f, "sha256"),
            ChecksumAlgorithm::Sha512 => write!(f, "sha512"),
        }
    }
}

// ============================================================================
// Revisions
// ============================================================================

/// Which kind of submission a revision belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RevisionKind {
    Contract,
    Rate,
}

impl RevisionKind {
    /// Document type of the zip package generated for this kind of revision
    pub fn document_type(self) -> DocumentType {
        match self {
            RevisionKind::Contract => DocumentType::ContractDocuments,
            RevisionKind::Rate => DocumentType::RateDocuments,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RevisionKind::Contract => "CONTRACT",
            RevisionKind::Rate => "RATE",
        }
    }
}

impl std::fmt::Display for RevisionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category of documents packaged into a zip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentType {
    ContractDocuments,
    RateDocuments,
}

impl DocumentType {
    pub fn as_str(self) -> &'static str {
        match self {
            DocumentType::ContractDocuments => "CONTRACT_DOCUMENTS",
            DocumentType::RateDocuments => "RATE_DOCUMENTS",
        }
    }

    /// Key path segment grouping packages of this type
    pub fn category(self) -> &'static str {
        match self {
            DocumentType::ContractDocuments => "contracts",
            DocumentType::RateDocuments => "rates",
        }
    }

    /// File name of the generated archive
    pub fn archive_file_name(self) -> &'static str {
        match self {
            DocumentType::ContractDocuments => "contract-documents.zip",
            DocumentType::RateDocuments => "rate-documents.zip",
        }
    }

    /// Deterministic destination key for a revision's package
    pub fn zip_object_key(self, revision_id: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            ZIP_KEY_PREFIX,
            self.category(),
            revision_id,
            self.archive_file_name()
        )
    }
}

impl std::fmt::Display for DocumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DocumentType {
    type Err = crate::McrError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "CONTRACT_DOCUMENTS" => Ok(DocumentType::ContractDocuments),
            "RATE_DOCUMENTS" => Ok(DocumentType::RateDocuments),
            other => Err(crate::McrError::Parse(format!("Unknown document type: {}", other))),
        }
    }
}

// ============================================================================
// Documents
// ============================================================================

/// A document to be packaged, as referenced by a revision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentReference {
    /// Object URL, possibly in the legacy `bucket/<uuid>/<filename>` shape
    #[serde(rename = "s3URL")]
    pub remote_url: String,

    /// Human-readable name used for the archive entry
    #[serde(rename = "name")]
    pub display_name: String,

    /// SHA-256 recorded at upload time, when known
    #[serde(default, rename = "sha256")]
    pub content_hash: Option<String>,
}

impl DocumentReference {
    pub fn new(remote_url: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            remote_url: remote_url.into(),
            display_name: display_name.into(),
            content_hash: None,
        }
    }

    /// Resolve the storage location this document actually lives at
    pub fn location(&self) -> Result<S3Location, S3UrlError> {
        s3_url::resolve_document_location(&self.remote_url)
    }
}

/// A contract or rate revision together with the documents it carries
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevisionDocuments {
    pub revision_id: String,
    pub kind: RevisionKind,
    pub state_code: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Contract documents for contract revisions, rate documents for rate revisions
    pub documents: Vec<DocumentReference>,
    pub supporting_documents: Vec<DocumentReference>,
}

impl RevisionDocuments {
    /// Every document packaged for this revision: primary documents first,
    /// then supporting documents, in their recorded order.
    pub fn all_documents(&self) -> Vec<DocumentReference> {
        self.documents
            .iter()
            .chain(self.supporting_documents.iter())
            .cloned()
            .collect()
    }

    pub fn has_documents(&self) -> bool {
        !self.documents.is_empty() || !self.supporting_documents.is_empty()
    }
}

// ============================================================================
// Zip Packages
// ============================================================================

/// Persisted record of a generated zip package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZipPackageArtifact {
    pub id: Uuid,
    pub object_url: String,
    pub bucket_name: String,
    pub object_key: String,
    /// Lowercase hex SHA-256 of the archive
    pub content_hash: String,
    pub document_type: DocumentType,
    pub associated_revision_id: String,
    pub created_at: DateTime<Utc>,
}

/// Fields required to create a [`ZipPackageArtifact`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewZipPackageArtifact {
    pub object_url: String,
    pub bucket_name: String,
    pub object_key: String,
    pub content_hash: String,
    pub document_type: DocumentType,
    pub associated_revision_id: String,
}

impl NewZipPackageArtifact {
    /// Materialize into a full record with a fresh id and timestamp
    pub fn into_artifact(self) -> ZipPackageArtifact {
        ZipPackageArtifact {
            id: Uuid::new_v4(),
            object_url: self.object_url,
            bucket_name: self.bucket_name,
            object_key: self.object_key,
            content_hash: self.content_hash,
            document_type: self.document_type,
            associated_revision_id: self.associated_revision_id,
            created_at: Utc::now(),
        }
    }
}
