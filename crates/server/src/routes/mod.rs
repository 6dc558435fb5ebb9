//! API route handlers for the scanwatch server.

pub mod findings;
pub mod health;
pub mod jobs;
pub mod metrics;
pub mod notices;
pub mod sarif;
pub mod scan;
pub mod scans;

use std::sync::Arc;

use axum::Router;

use crate::state::AppState;

/// Create the combined API router with all routes under /api prefix.
///
/// Routes:
/// - GET    /api/health - Health check
/// - POST   /api/scan - Start a scan of one subject
/// - POST   /api/refresh?days=N - Start a report refresh
/// - GET    /api/jobs - Tracked jobs
/// - GET    /api/jobs/stream - SSE stream of job transitions
/// - GET    /api/jobs/state/{*subject} - Snapshot for one subject
/// - DELETE /api/jobs/state/{*subject} - Cancel a subject's in-flight job
/// - GET    /api/notices - Visible status messages
/// - GET    /api/notices/stream - SSE stream of message changes
/// - GET    /api/findings - Cached finding groups
/// - POST   /api/findings/reload - Reload finding groups now
/// - GET    /api/scans/{*subject} - Scan history of a subject
/// - GET    /api/scans/delete/{id} - Scan history of the subject `delete/{id}`
/// - DELETE /api/scans/delete/{id} - Delete one historical scan
/// - GET    /api/sarif/{id} - SARIF log of one scan
/// - POST   /api/sarif/{id}/suppress?fingerprint=F - Suppress one result
/// - POST   /api/scan/review - Automated review of one result
/// - GET    /metrics - Prometheus metrics (no /api prefix)
pub fn api_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api", health::router())
        .nest("/api", scan::router())
        .nest("/api", jobs::router())
        .nest("/api", notices::router())
        .nest("/api", findings::router())
        .nest("/api", scans::router())
        .nest("/api", sarif::router())
        .merge(metrics::router())
        .with_state(state)
}
