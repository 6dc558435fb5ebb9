// crates/server/src/lib.rs
//! Scanwatch server library.
//!
//! Axum HTTP surface over the `scanwatch-core` job tracker: start scans and
//! refreshes, watch their progress over SSE, read cached findings and scan
//! history.

pub mod error;
pub mod metrics;
pub mod routes;
pub mod state;

pub use error::*;
pub use metrics::{init_metrics, render_metrics};
pub use routes::api_routes;
pub use state::AppState;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the Axum application with all routes and middleware.
///
/// This sets up:
/// - API routes and `/metrics`
/// - CORS for development (allows any origin)
/// - Request tracing
pub fn create_app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(api_routes(state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
