// crates/server/src/routes/scan.rs
//! Job submission endpoints.
//!
//! - POST /scan - Start (or join) a scan of one subject
//! - POST /refresh?days=N - Start (or join) a report refresh

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use scanwatch_core::{Job, JobRequest, SubjectKey, DEFAULT_REFRESH_DAYS};
use serde::Deserialize;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Body of `POST /api/scan`. `repo` is accepted for older dashboards.
#[derive(Debug, Deserialize)]
pub struct ScanBody {
    #[serde(alias = "repo")]
    pub subject: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshQuery {
    pub days: Option<u32>,
}

/// POST /api/scan - 202 with the job snapshot.
///
/// A second request while the subject is in flight returns the existing job.
async fn start_scan(
    State(state): State<Arc<AppState>>,
    body: Result<Json<ScanBody>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Job>)> {
    let Json(body) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let subject = SubjectKey::new(&body.subject)?;
    let job = state.tracker.start(JobRequest::scan(subject));
    Ok((StatusCode::ACCEPTED, Json(job)))
}

/// POST /api/refresh - 202 with the refresh job snapshot.
async fn start_refresh(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RefreshQuery>,
) -> ApiResult<(StatusCode, Json<Job>)> {
    let days = query.days.unwrap_or(DEFAULT_REFRESH_DAYS);
    if days == 0 {
        return Err(ApiError::BadRequest("days must be at least 1".into()));
    }
    let job = state.tracker.start(JobRequest::refresh(days));
    Ok((StatusCode::ACCEPTED, Json(job)))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/scan", post(start_scan))
        .route("/refresh", post(start_refresh))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{request, test_state};
    use axum::http::Method;

    #[tokio::test]
    async fn test_scan_blank_subject_is_400() {
        let (state, _server) = test_state().await;
        let app = crate::create_app(state);

        let (status, body) = request(
            app,
            Method::POST,
            "/api/scan",
            Some(serde_json::json!({ "subject": "   " })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("Invalid subject"));
    }

    #[tokio::test]
    async fn test_scan_of_refresh_key_is_400() {
        let (state, _server) = test_state().await;
        let app = crate::create_app(state.clone());

        let (status, body) = request(
            app,
            Method::POST,
            "/api/scan",
            Some(serde_json::json!({ "subject": "reports:refresh" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("Invalid subject"));
        assert!(state.tracker.active_jobs().is_empty());
    }

    #[tokio::test]
    async fn test_scan_without_body_is_400() {
        let (state, _server) = test_state().await;
        let app = crate::create_app(state);

        let (status, _) = request(app, Method::POST, "/api/scan", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_refresh_zero_days_is_400() {
        let (state, _server) = test_state().await;
        let app = crate::create_app(state);

        let (status, _) = request(app, Method::POST, "/api/refresh?days=0", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
