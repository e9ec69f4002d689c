//! Regenerate missing zip packages
//!
//! With an explicit revision ID only that revision is handled. Without one,
//! revisions of any status that have documents but no package are scanned,
//! up to `limit` per revision kind.

use mcr_common::types::{RevisionDocuments, RevisionKind};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use super::{JobContext, JobError};
use crate::db::RevisionFilter;
use crate::zips::ZipOutcome;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegenerateEvent {
    #[serde(alias = "contractRevisionID")]
    pub contract_revision_id: Option<String>,
    #[serde(alias = "rateRevisionID")]
    pub rate_revision_id: Option<String>,
    pub limit: Option<u32>,
    pub dry_run: Option<bool>,
}

impl RegenerateEvent {
    /// Whether the event names specific revisions
    pub fn is_targeted(&self) -> bool {
        self.contract_revision_id.is_some() || self.rate_revision_id.is_some()
    }

    fn targets(&self) -> Vec<(RevisionKind, &str)> {
        [
            (RevisionKind::Contract, self.contract_revision_id.as_deref()),
            (RevisionKind::Rate, self.rate_revision_id.as_deref()),
        ]
        .into_iter()
        .filter_map(|(kind, id)| id.map(|id| (kind, id)))
        .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegenerateResult {
    pub success: bool,
    pub contracts_processed: u64,
    pub rates_processed: u64,
    pub contracts_failed: u64,
    pub rates_failed: u64,
    pub errors: Vec<String>,
}

impl RegenerateResult {
    fn processed(&mut self, kind: RevisionKind) {
        match kind {
            RevisionKind::Contract => self.contracts_processed += 1,
            RevisionKind::Rate => self.rates_processed += 1,
        }
    }

    fn failed(&mut self, kind: RevisionKind, message: String) {
        match kind {
            RevisionKind::Contract => self.contracts_failed += 1,
            RevisionKind::Rate => self.rates_failed += 1,
        }
        self.errors.push(message);
    }
}

#[instrument(skip(ctx))]
pub async fn regenerate_zips(
    ctx: &JobContext,
    event: RegenerateEvent,
) -> Result<RegenerateResult, JobError> {
    let dry_run = event.dry_run.unwrap_or(false);
    let mut result = RegenerateResult::default();

    if event.is_targeted() {
        for (kind, revision_id) in event.targets() {
            match ctx.repository.find_revision(kind, revision_id).await? {
                Some(revision) => regenerate_one(ctx, &revision, dry_run, &mut result).await,
                None => {
                    error!(%kind, revision_id, "Revision not found");
                    result.failed(kind, format!("{} revision {} not found", kind, revision_id));
                },
            }
        }
    } else {
        let filter = RevisionFilter::with_documents(event.limit.map(i64::from));
        for kind in [RevisionKind::Contract, RevisionKind::Rate] {
            let revisions = ctx.repository.find_revisions_missing_zips(kind, &filter).await?;
            info!(%kind, count = revisions.len(), dry_run, "Regenerating zip packages");

            for revision in &revisions {
                regenerate_one(ctx, revision, dry_run, &mut result).await;
            }
        }
    }

    result.success = result.contracts_failed == 0 && result.rates_failed == 0;
    info!(
        success = result.success,
        contracts_processed = result.contracts_processed,
        rates_processed = result.rates_processed,
        contracts_failed = result.contracts_failed,
        rates_failed = result.rates_failed,
        "Regeneration finished"
    );
    Ok(result)
}

async fn regenerate_one(
    ctx: &JobContext,
    revision: &RevisionDocuments,
    dry_run: bool,
    result: &mut RegenerateResult,
) {
    let kind = revision.kind;

    if dry_run {
        dry_run_one(ctx, revision, result).await;
        return;
    }

    match ctx.service.generate_for_revision(revision).await {
        Ok(ZipOutcome::Created(_)) => result.processed(kind),
        Ok(ZipOutcome::AlreadyExists(_)) => {
            info!(%kind, revision_id = %revision.revision_id, "Zip package already exists");
        },
        Ok(ZipOutcome::NoDocuments) => {
            info!(%kind, revision_id = %revision.revision_id, "Revision has no documents");
        },
        Err(e) => {
            error!(%kind, revision_id = %revision.revision_id, error = %e, "Regeneration failed");
            result.failed(kind, format!("{} revision {}: {}", kind, revision.revision_id, e));
        },
    }
}

/// Count a revision the way a real run would, without writing anything
async fn dry_run_one(ctx: &JobContext, revision: &RevisionDocuments, result: &mut RegenerateResult) {
    let kind = revision.kind;

    if !revision.has_documents() {
        info!(%kind, revision_id = %revision.revision_id, "Revision has no documents");
        return;
    }

    match ctx
        .repository
        .find_zip_artifact(&revision.revision_id, kind.document_type())
        .await
    {
        Ok(Some(_)) => {
            info!(%kind, revision_id = %revision.revision_id, "Zip package already exists");
        },
        Ok(None) => {
            info!(
                %kind,
                revision_id = %revision.revision_id,
                documents = revision.documents.len() + revision.supporting_documents.len(),
                "[dry run] Would regenerate zip package"
            );
            result.processed(kind);
        },
        Err(e) => {
            error!(%kind, revision_id = %revision.revision_id, error = %e, "Regeneration failed");
            result.failed(kind, format!("{} revision {}: {}", kind, revision.revision_id, e));
        },
    }
}
