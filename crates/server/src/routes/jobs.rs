// crates/server/src/routes/jobs.rs
//! API routes for tracked jobs.
//!
//! - GET /jobs - Every tracked job (in flight or on display)
//! - GET /jobs/stream - SSE stream of job transitions
//! - GET /jobs/state/{*subject} - Snapshot for one subject (idle if untracked)
//! - DELETE /jobs/state/{*subject} - Cancel the subject's in-flight job

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::get;
use axum::{Json, Router};
use scanwatch_core::{Job, SubjectKey};
use tokio::sync::broadcast::error::RecvError;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// GET /api/jobs - List all tracked jobs.
async fn list_jobs(State(state): State<Arc<AppState>>) -> Json<Vec<Job>> {
    Json(state.tracker.active_jobs())
}

/// GET /api/jobs/stream - SSE stream of every transition.
///
/// Each event is named after the new phase (`submitting`, `polling`, ...).
async fn stream_jobs(
    State(state): State<Arc<AppState>>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let rx = state.tracker.subscribe_all();

    let stream = async_stream::stream! {
        let mut rx = rx;
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let json = serde_json::to_string(&event).unwrap_or_default();
                    yield Ok(Event::default().event(event.job.phase.as_str()).data(json));
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Job stream subscriber lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// GET /api/jobs/state/{*subject} - Current snapshot for a subject.
async fn get_state(
    State(state): State<Arc<AppState>>,
    Path(subject): Path<String>,
) -> ApiResult<Json<Job>> {
    let subject = SubjectKey::lookup(&subject)?;
    Ok(Json(state.tracker.get_state(&subject)))
}

/// DELETE /api/jobs/state/{*subject} - Cancel the in-flight job.
async fn cancel_job(
    State(state): State<Arc<AppState>>,
    Path(subject): Path<String>,
) -> ApiResult<Json<Job>> {
    let subject = SubjectKey::lookup(&subject)?;
    if !state.tracker.cancel(&subject) {
        return Err(ApiError::NoJob(subject.to_string()));
    }
    Ok(Json(state.tracker.get_state(&subject)))
}

/// Build the jobs router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/jobs", get(list_jobs))
        .route("/jobs/stream", get(stream_jobs))
        .route("/jobs/state/{*subject}", get(get_state).delete(cancel_job))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{request, test_state};
    use axum::http::{Method, StatusCode};

    #[tokio::test]
    async fn test_list_jobs_empty() {
        let (state, _server) = test_state().await;
        let app = crate::create_app(state);

        let (status, body) = request(app, Method::GET, "/api/jobs", None).await;
        assert_eq!(status, StatusCode::OK);
        let json: Vec<serde_json::Value> = serde_json::from_str(&body).unwrap();
        assert!(json.is_empty());
    }

    #[tokio::test]
    async fn test_state_of_untracked_subject_is_idle() {
        let (state, _server) = test_state().await;
        let app = crate::create_app(state);

        let (status, body) =
            request(app, Method::GET, "/api/jobs/state/acme/widgets", None).await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["subject"], "acme/widgets");
        assert_eq!(json["phase"], "idle");
        assert_eq!(json["generation"], 0);
    }

    #[tokio::test]
    async fn test_state_of_refresh_subject_is_readable() {
        let (state, _server) = test_state().await;
        let app = crate::create_app(state);

        let (status, body) =
            request(app, Method::GET, "/api/jobs/state/reports:refresh", None).await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["subject"], "reports:refresh");
        assert_eq!(json["kind"], "refresh");
    }

    #[tokio::test]
    async fn test_cancel_without_job_is_404() {
        let (state, _server) = test_state().await;
        let app = crate::create_app(state);

        let (status, body) =
            request(app, Method::DELETE, "/api/jobs/state/acme/widgets", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body.contains("No in-flight job"));
    }
}
