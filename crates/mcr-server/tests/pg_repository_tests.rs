//! Postgres repository tests
//!
//! These tests need a reachable database and are skipped unless
//! `DATABASE_URL` is set. Every test works under its own state code and
//! revision ids, so runs against a shared database do not interfere.

use mcr_common::s3_url::S3Location;
use mcr_common::types::{DocumentType, NewZipPackageArtifact, RevisionKind};
use mcr_server::db::{PgZipPackageRepository, RevisionFilter, ZipPackageRepository};
use sqlx::PgPool;
use uuid::Uuid;

async fn setup() -> Option<PgPool> {
    let Ok(url) = std::env::var("DATABASE_URL") else {
        eprintln!("Skipping Postgres test: DATABASE_URL not set");
        return None;
    };

    let pool = PgPool::connect(&url).await.expect("connect to DATABASE_URL");
    sqlx::migrate!("../../migrations")
        .run(&pool)
        .await
        .expect("run migrations");
    Some(pool)
}

fn unique(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::new_v4().simple())
}

async fn insert_contract_revision(
    pool: &PgPool,
    id: &str,
    state_code: &str,
    submitted: bool,
    created_offset_secs: i64,
) {
    sqlx::query(
        r#"
        INSERT INTO contract_revisions (id, contract_id, state_code, submitted_at, created_at)
        VALUES ($1, $2, $3, CASE WHEN $4 THEN NOW() ELSE NULL END,
                NOW() - make_interval(secs => $5))
        "#,
    )
    .bind(id)
    .bind(unique("contract"))
    .bind(state_code)
    .bind(submitted)
    .bind(1000.0 - created_offset_secs as f64)
    .execute(pool)
    .await
    .expect("insert revision");
}

async fn insert_document(
    pool: &PgPool,
    revision_id: &str,
    name: &str,
    s3_url: &str,
    supporting: bool,
    position: i32,
) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO revision_documents
            (id, revision_kind, revision_id, is_supporting, position, name, s3_url)
        VALUES ($1, 'CONTRACT', $2, $3, $4, $5, $6)
        "#,
    )
    .bind(id)
    .bind(revision_id)
    .bind(supporting)
    .bind(position)
    .bind(name)
    .bind(s3_url)
    .execute(pool)
    .await
    .expect("insert document");
    id
}

#[tokio::test]
async fn test_submitted_scan_returns_documents_in_order() {
    let Some(pool) = setup().await else { return };
    let repository = PgZipPackageRepository::new(pool.clone());
    let state = unique("ST");

    let first = unique("rev");
    let second = unique("rev");
    let draft = unique("rev");
    insert_contract_revision(&pool, &first, &state, true, 0).await;
    insert_contract_revision(&pool, &second, &state, true, 10).await;
    insert_contract_revision(&pool, &draft, &state, false, 20).await;
    insert_document(&pool, &first, "b.pdf", "s3://bkt/allusers/b", false, 1).await;
    insert_document(&pool, &first, "a.pdf", "s3://bkt/allusers/a", false, 0).await;
    insert_document(&pool, &first, "s.pdf", "s3://bkt/allusers/s", true, 0).await;

    let revisions = repository
        .find_revisions_missing_zips(RevisionKind::Contract, &RevisionFilter::submitted(Some(state)))
        .await
        .unwrap();

    let ids: Vec<_> = revisions.iter().map(|r| r.revision_id.as_str()).collect();
    assert_eq!(ids, vec![first.as_str(), second.as_str()]);

    let names: Vec<_> = revisions[0]
        .documents
        .iter()
        .map(|d| d.display_name.as_str())
        .collect();
    assert_eq!(names, vec!["a.pdf", "b.pdf"]);
    assert_eq!(revisions[0].supporting_documents.len(), 1);
    assert!(!revisions[1].has_documents());
}

#[tokio::test]
async fn test_created_artifact_is_found_and_excluded_from_scans() {
    let Some(pool) = setup().await else { return };
    let repository = PgZipPackageRepository::new(pool.clone());
    let state = unique("ST");
    let revision_id = unique("rev");
    insert_contract_revision(&pool, &revision_id, &state, true, 0).await;
    insert_document(&pool, &revision_id, "a.pdf", "s3://bkt/allusers/a", false, 0).await;

    let key = DocumentType::ContractDocuments.zip_object_key(&revision_id);
    let created = repository
        .create_zip_artifact(NewZipPackageArtifact {
            object_url: format!("s3://bkt/{}", key),
            bucket_name: "bkt".to_string(),
            object_key: key.clone(),
            content_hash: "ab".repeat(32),
            document_type: DocumentType::ContractDocuments,
            associated_revision_id: revision_id.clone(),
        })
        .await
        .unwrap();

    let found = repository
        .find_zip_artifact(&revision_id, DocumentType::ContractDocuments)
        .await
        .unwrap();
    assert_eq!(found.as_ref().map(|a| a.id), Some(created.id));
    assert_eq!(found.map(|a| a.object_key), Some(key));

    let other_type = repository
        .find_zip_artifact(&revision_id, DocumentType::RateDocuments)
        .await
        .unwrap();
    assert!(other_type.is_none());

    let remaining = repository
        .find_revisions_missing_zips(RevisionKind::Contract, &RevisionFilter::submitted(Some(state)))
        .await
        .unwrap();
    assert!(remaining.is_empty());
}

#[tokio::test]
async fn test_find_revision_by_id() {
    let Some(pool) = setup().await else { return };
    let repository = PgZipPackageRepository::new(pool.clone());
    let revision_id = unique("rev");
    insert_contract_revision(&pool, &revision_id, &unique("ST"), false, 0).await;
    insert_document(&pool, &revision_id, "a.pdf", "s3://bkt/allusers/a", false, 0).await;

    let revision = repository
        .find_revision(RevisionKind::Contract, &revision_id)
        .await
        .unwrap()
        .expect("revision exists");
    assert_eq!(revision.documents.len(), 1);

    let missing = repository
        .find_revision(RevisionKind::Rate, &revision_id)
        .await
        .unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
async fn test_document_location_is_stored() {
    let Some(pool) = setup().await else { return };
    let repository = PgZipPackageRepository::new(pool.clone());
    let revision_id = unique("rev");
    insert_contract_revision(&pool, &revision_id, &unique("ST"), true, 0).await;
    let id = insert_document(&pool, &revision_id, "a.pdf", "s3://bkt/0d9f/a.pdf", false, 0).await;

    let before = id.as_u128().checked_sub(1).map(Uuid::from_u128);
    let pending = repository
        .find_documents_missing_location(before, 1)
        .await
        .unwrap();
    assert_eq!(pending.first().map(|r| r.id), Some(id));

    repository
        .set_document_location(id, &S3Location::new("bkt", "allusers/0d9f"))
        .await
        .unwrap();

    let (bucket, key): (Option<String>, Option<String>) =
        sqlx::query_as("SELECT s3_bucket_name, s3_key FROM revision_documents WHERE id = $1")
            .bind(id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(bucket.as_deref(), Some("bkt"));
    assert_eq!(key.as_deref(), Some("allusers/0d9f"));

    let missing = repository
        .set_document_location(Uuid::new_v4(), &S3Location::new("bkt", "k"))
        .await;
    assert!(missing.is_err());
}
