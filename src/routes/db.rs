//! Database status endpoints.
//!
//! Both endpoints run exactly one probe per request. `/db-status` is the JSON
//! contract used by the status page; `/db-test` returns raw rows or a plain
//! text error.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde_json::{json, Value};
use tracing::instrument;

use crate::correlation::RequestContext;
use crate::state::AppState;

/// Message returned with a successful `/db-status` response.
pub const DB_STATUS_SUCCESS_MESSAGE: &str = "Database connection successful";

/// JSON probe status.
///
/// 200 `{status: "success", message, latency, host, database}` or
/// 500 `{status: "error", message}`.
#[instrument(name = "db::status", skip_all)]
pub async fn status(
    State(state): State<AppState>,
    Extension(context): Extension<RequestContext>,
) -> (StatusCode, Json<Value>) {
    let result = state.probe.probe(state.database.as_ref(), &context).await;

    if result.is_success() {
        let target = state.database.target();
        (
            StatusCode::OK,
            Json(json!({
                "status": "success",
                "message": DB_STATUS_SUCCESS_MESSAGE,
                "latency": result.latency_ms,
                "host": target.host,
                "database": target.database,
            })),
        )
    } else {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "status": "error",
                "message": result.detail,
            })),
        )
    }
}

/// Row-oriented variant of the probe: `[{now, version}]` or a text error.
#[instrument(name = "db::test", skip_all)]
pub async fn test(
    State(state): State<AppState>,
    Extension(context): Extension<RequestContext>,
) -> Response {
    let result = state.probe.probe(state.database.as_ref(), &context).await;

    match result.facts {
        Some(facts) => (StatusCode::OK, Json(vec![facts])).into_response(),
        None => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Database error: {}", result.detail),
        )
            .into_response(),
    }
}
