//! Background jobs over the zip packaging pipeline
//!
//! - [`migrate_document_zips`]: backfill packages for submitted revisions,
//!   within a wall-clock budget so a scheduler can re-invoke until done
//! - [`regenerate_zips`]: targeted or scanned regeneration
//! - [`legacy_keys`]: split bucket/key out of historical document URLs
//!
//! All of them share one [`JobContext`], built once per process.

pub mod legacy_keys;
pub mod migrate_document_zips;
pub mod regenerate_zips;
pub mod stats;

use std::sync::Arc;
use thiserror::Error;

use crate::config::{Config, MigrationConfig};
use crate::db::{self, DbError, PgZipPackageRepository, ZipPackageRepository};
use crate::storage::{ObjectStore, S3Storage};
use crate::zips::{DocumentZipService, ZipServiceConfig};

pub use legacy_keys::{migrate_legacy_keys, LegacyKeyStats};
pub use migrate_document_zips::{migrate_document_zips, MigrateQuery, MigrationReport};
pub use regenerate_zips::{regenerate_zips, RegenerateEvent, RegenerateResult};
pub use stats::{ItemOutcome, MigrationRunState};

/// Failures that stop a job outright (per-item failures are counted instead)
#[derive(Error, Debug)]
pub enum JobError {
    #[error("database error: {0}")]
    Database(#[from] DbError),
}

/// Everything a job needs, constructed once and shared
#[derive(Clone)]
pub struct JobContext {
    pub service: DocumentZipService,
    pub repository: Arc<dyn ZipPackageRepository>,
    pub migration: MigrationConfig,
}

impl JobContext {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        repository: Arc<dyn ZipPackageRepository>,
        service_config: ZipServiceConfig,
        migration: MigrationConfig,
    ) -> Self {
        let service = DocumentZipService::new(store, Arc::clone(&repository), service_config);
        Self {
            service,
            repository,
            migration,
        }
    }

    /// Connect to Postgres and S3 as configured
    pub async fn connect(config: &Config) -> anyhow::Result<(Self, sqlx::PgPool)> {
        let pool = db::create_pool(&config.database).await?;
        let repository: Arc<dyn ZipPackageRepository> =
            Arc::new(PgZipPackageRepository::new(pool.clone()));
        let store: Arc<dyn ObjectStore> = Arc::new(S3Storage::new(&config.storage).await?);

        let context = Self::new(
            store,
            repository,
            ZipServiceConfig::new(config.storage.documents_bucket.as_str(), &config.zips),
            config.migration.clone(),
        );
        Ok((context, pool))
    }
}
