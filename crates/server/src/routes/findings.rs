// crates/server/src/routes/findings.rs
//! Cached finding groups.
//!
//! - GET /findings - Last loaded snapshot
//! - POST /findings/reload - Load now and return the fresh snapshot

use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use scanwatch_core::FindingSnapshot;

use crate::error::ApiResult;
use crate::state::AppState;

async fn get_findings(State(state): State<Arc<AppState>>) -> Json<FindingSnapshot> {
    Json(state.findings.snapshot().as_ref().clone())
}

async fn reload_findings(State(state): State<Arc<AppState>>) -> ApiResult<Json<FindingSnapshot>> {
    state.findings.reload().await?;
    Ok(Json(state.findings.snapshot().as_ref().clone()))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/findings", get(get_findings))
        .route("/findings/reload", post(reload_findings))
}
