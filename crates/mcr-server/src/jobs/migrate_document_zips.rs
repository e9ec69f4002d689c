//! Backfill zip packages for submitted revisions
//!
//! Revisions are walked oldest first, contracts before rates. The run has a
//! wall-clock budget checked before every batch and every revision; when it
//! runs out the job stops cleanly with `timeout_exceeded` set. Already
//! packaged revisions drop out of the scan, so the next invocation carries on
//! from where this one stopped.

use mcr_common::types::{RevisionDocuments, RevisionKind};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info, instrument, warn};

use super::stats::{ItemOutcome, MigrationRunState};
use super::{JobContext, JobError};
use crate::db::RevisionFilter;
use crate::zips::ZipOutcome;

/// Optional overrides, as accepted on the query string
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrateQuery {
    pub dry_run: Option<bool>,
    pub batch_size: Option<usize>,
    pub state_code: Option<String>,
    pub max_runtime_ms: Option<u64>,
}

/// Effective settings of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationRunConfig {
    pub dry_run: bool,
    pub batch_size: usize,
    pub state_code: Option<String>,
    pub max_runtime_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
    pub success: bool,
    pub stats: MigrationRunState,
    pub config: MigrationRunConfig,
}

struct RunBudget {
    started: Instant,
    limit: Duration,
}

impl RunBudget {
    fn start(limit: Duration) -> Self {
        Self {
            started: Instant::now(),
            limit,
        }
    }

    fn exhausted(&self) -> bool {
        self.started.elapsed() >= self.limit
    }

    fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

impl MigrateQuery {
    fn resolve(self, ctx: &JobContext) -> MigrationRunConfig {
        let batch_size = match self.batch_size {
            Some(0) => {
                warn!(default = ctx.migration.batch_size, "Ignoring batchSize=0");
                ctx.migration.batch_size
            },
            Some(size) => size,
            None => ctx.migration.batch_size,
        };

        MigrationRunConfig {
            dry_run: self.dry_run.unwrap_or(false),
            batch_size,
            state_code: self
                .state_code
                .map(|code| code.trim().to_uppercase())
                .filter(|code| !code.is_empty()),
            max_runtime_ms: self.max_runtime_ms.unwrap_or(ctx.migration.max_runtime_ms),
        }
    }
}

#[instrument(skip(ctx))]
pub async fn migrate_document_zips(
    ctx: &JobContext,
    query: MigrateQuery,
) -> Result<MigrationReport, JobError> {
    let config = query.resolve(ctx);
    let budget = RunBudget::start(Duration::from_millis(config.max_runtime_ms));
    let mut stats = MigrationRunState::new();

    info!(
        dry_run = config.dry_run,
        batch_size = config.batch_size,
        state_code = ?config.state_code,
        max_runtime_ms = config.max_runtime_ms,
        "Starting document zip migration"
    );

    'kinds: for kind in [RevisionKind::Contract, RevisionKind::Rate] {
        if budget.exhausted() {
            stats.timeout_exceeded = true;
            break;
        }

        let revisions = ctx
            .repository
            .find_revisions_missing_zips(kind, &RevisionFilter::submitted(config.state_code.clone()))
            .await?;
        info!(%kind, count = revisions.len(), "Found revisions without zip packages");

        for (batch_index, batch) in revisions.chunks(config.batch_size.max(1)).enumerate() {
            if budget.exhausted() {
                stats.timeout_exceeded = true;
                break 'kinds;
            }
            info!(%kind, batch = batch_index + 1, size = batch.len(), "Processing batch");

            for revision in batch {
                if budget.exhausted() {
                    stats.timeout_exceeded = true;
                    break 'kinds;
                }
                let outcome = process_revision(ctx, revision, config.dry_run).await;
                stats.record(kind, outcome);
            }
        }
    }

    stats.complete(budget.elapsed_ms());

    if stats.timeout_exceeded {
        warn!(
            processed_contracts = stats.processed_contracts,
            processed_rates = stats.processed_rates,
            elapsed_ms = stats.elapsed_ms,
            "Migration stopped at its runtime budget; re-run to continue"
        );
    } else {
        info!(
            processed_contracts = stats.processed_contracts,
            processed_rates = stats.processed_rates,
            skipped = stats.skipped_contracts + stats.skipped_rates,
            errored = stats.errored(),
            elapsed_ms = stats.elapsed_ms,
            "Migration complete"
        );
    }

    Ok(MigrationReport {
        success: true,
        stats,
        config,
    })
}

async fn process_revision(
    ctx: &JobContext,
    revision: &RevisionDocuments,
    dry_run: bool,
) -> ItemOutcome {
    if !revision.has_documents() {
        return ItemOutcome::Skipped;
    }

    if dry_run {
        info!(
            revision_id = %revision.revision_id,
            kind = %revision.kind,
            documents = revision.documents.len() + revision.supporting_documents.len(),
            "[dry run] Would generate zip package"
        );
        return ItemOutcome::Processed;
    }

    match ctx.service.generate_for_revision(revision).await {
        Ok(ZipOutcome::Created(_)) => ItemOutcome::Processed,
        Ok(ZipOutcome::AlreadyExists(_) | ZipOutcome::NoDocuments) => ItemOutcome::Skipped,
        Err(e) => {
            error!(
                revision_id = %revision.revision_id,
                kind = %revision.kind,
                error = %e,
                "Failed to generate zip package"
            );
            ItemOutcome::Errored
        },
    }
}
