//! API response helpers
//!
//! Every job response, success or failure, carries its own CORS headers.

use axum::{
    http::{header::ACCESS_CONTROL_ALLOW_ORIGIN, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// JSON response with a wildcard CORS origin
///
/// No `Access-Control-Allow-Credentials`: browsers reject it next to `*`.
pub fn job_response<T: Serialize>(status: StatusCode, body: &T) -> Response {
    (status, [(ACCESS_CONTROL_ALLOW_ORIGIN, "*")], Json(body)).into_response()
}
