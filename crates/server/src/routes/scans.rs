// crates/server/src/routes/scans.rs
//! Scan history, proxied to the backend.
//!
//! - GET /scans/{*subject} - Past scans of a subject, newest first
//! - DELETE /scans/delete/{id} - Remove one historical scan
//!
//! The delete route is static and wins over the wildcard for two-segment
//! paths, so its GET serves the history of `delete/{id}` subjects.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use scanwatch_core::{FindingStore, ScanSummary, SubjectKey};

use crate::error::ApiResult;
use crate::state::AppState;

async fn history(state: &AppState, raw: &str) -> ApiResult<Json<Vec<ScanSummary>>> {
    let subject = SubjectKey::new(raw)?;
    let mut scans = state.reports.list_scans(&subject).await?;
    scans.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    Ok(Json(scans))
}

async fn list_scans(
    State(state): State<Arc<AppState>>,
    Path(subject): Path<String>,
) -> ApiResult<Json<Vec<ScanSummary>>> {
    history(&state, &subject).await
}

/// GET on the delete route shadows the wildcard for subjects under `delete/`.
async fn list_delete_prefixed(
    State(state): State<Arc<AppState>>,
    Path(rest): Path<String>,
) -> ApiResult<Json<Vec<ScanSummary>>> {
    history(&state, &format!("delete/{rest}")).await
}

async fn delete_scan(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.reports.delete_scan(&id).await?;
    tracing::info!(scan_id = %id, "Scan deleted");
    state.findings.request_reload();
    Ok(StatusCode::NO_CONTENT)
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/scans/delete/{id}",
            get(list_delete_prefixed).delete(delete_scan),
        )
        .route("/scans/{*subject}", get(list_scans))
}
