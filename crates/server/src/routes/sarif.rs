// crates/server/src/routes/sarif.rs
//! Static-analysis results of one scan, proxied to the backend.
//!
//! - GET /sarif/{id} - Full SARIF log of a scan
//! - POST /sarif/{id}/suppress?fingerprint=F - Hide one result, returns the updated log
//! - POST /scan/review - Automated review of one result

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use scanwatch_core::FindingReview;
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SuppressQuery {
    pub fingerprint: Option<String>,
}

/// Body of `POST /api/scan/review`, as the dashboard sends it.
#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    pub scan_id: String,
    pub fingerprint_id: String,
}

#[derive(Debug, Serialize)]
pub struct ReviewResponse {
    pub review: FindingReview,
}

async fn get_sarif(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    Ok(Json(state.reports.fetch_sarif(&id).await?))
}

/// Also answers GET, which older dashboards use.
async fn suppress(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<SuppressQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let fingerprint = query
        .fingerprint
        .filter(|f| !f.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("fingerprint is required".into()))?;
    let log = state.reports.suppress_finding(&id, &fingerprint).await?;
    tracing::info!(scan_id = %id, fingerprint = %fingerprint, "Finding suppressed");
    Ok(Json(log))
}

async fn review(
    State(state): State<Arc<AppState>>,
    body: Result<Json<ReviewRequest>, JsonRejection>,
) -> ApiResult<Json<ReviewResponse>> {
    let Json(body) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    if body.scan_id.trim().is_empty() || body.fingerprint_id.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "scan_id and fingerprint_id are required".into(),
        ));
    }
    let review = state
        .reports
        .review_finding(&body.scan_id, &body.fingerprint_id)
        .await?;
    Ok(Json(ReviewResponse { review }))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/sarif/{id}", get(get_sarif))
        .route("/sarif/{id}/suppress", post(suppress).get(suppress))
        .route("/scan/review", post(review))
}
