pub mod jobs;
pub mod response;

use crate::db;
use crate::jobs::JobContext;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub jobs: Arc<JobContext>,
    /// Checked by `/health` when present
    pub db: Option<PgPool>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/jobs/migrate-document-zips",
            get(jobs::migrate_document_zips).post(jobs::migrate_document_zips),
        )
        .route("/jobs/regenerate-zips", post(jobs::regenerate_zips))
        .route("/jobs/migrate-legacy-keys", post(jobs::migrate_legacy_keys))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Response {
    let Some(pool) = &state.db else {
        return (StatusCode::OK, Json(json!({ "status": "healthy" }))).into_response();
    };

    match db::health_check(pool).await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "healthy",
                "database": "connected"
            })),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Database health check failed: {:?}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "database": "unreachable"
                })),
            )
                .into_response()
        },
    }
}
