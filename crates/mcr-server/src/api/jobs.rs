//! HTTP entry points for the packaging jobs

use axum::{
    body::Bytes,
    extract::{rejection::QueryRejection, Query, State},
    http::StatusCode,
    response::Response,
};
use serde::Deserialize;
use tracing::info;

use super::response::job_response;
use super::AppState;
use crate::error::AppError;
use crate::jobs::{self, MigrateQuery, RegenerateEvent};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyKeysQuery {
    pub dry_run: Option<bool>,
}

/// `GET|POST /jobs/migrate-document-zips`
///
/// 200 whenever the run finishes, including when it stops at its runtime
/// budget; 500 only if the run itself could not proceed.
pub async fn migrate_document_zips(
    State(state): State<AppState>,
    query: Result<Query<MigrateQuery>, QueryRejection>,
) -> Result<Response, AppError> {
    let Query(query) = query.map_err(|e| AppError::BadRequest(e.body_text()))?;
    info!(?query, "Document zip migration requested");

    let report = jobs::migrate_document_zips(&state.jobs, query).await?;
    Ok(job_response(StatusCode::OK, &report))
}

/// `POST /jobs/regenerate-zips` with an optional JSON [`RegenerateEvent`]
pub async fn regenerate_zips(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response, AppError> {
    let event: RegenerateEvent = if body.iter().all(u8::is_ascii_whitespace) {
        RegenerateEvent::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::BadRequest(format!("Invalid regenerate event: {}", e)))?
    };
    info!(?event, "Zip regeneration requested");

    let targeted = event.is_targeted();
    let result = jobs::regenerate_zips(&state.jobs, event).await?;

    // A named revision has no batch to hide behind; its failure fails the request
    let status = if targeted && !result.success {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::OK
    };
    Ok(job_response(status, &result))
}

/// `POST /jobs/migrate-legacy-keys?dryRun=true`
pub async fn migrate_legacy_keys(
    State(state): State<AppState>,
    query: Result<Query<LegacyKeysQuery>, QueryRejection>,
) -> Result<Response, AppError> {
    let Query(query) = query.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let dry_run = query.dry_run.unwrap_or(false);

    let stats = jobs::migrate_legacy_keys(state.jobs.repository.as_ref(), dry_run).await?;
    Ok(job_response(
        StatusCode::OK,
        &serde_json::json!({ "success": true, "stats": stats }),
    ))
}
