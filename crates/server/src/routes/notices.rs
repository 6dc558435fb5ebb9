// crates/server/src/routes/notices.rs
//! Per-subject status messages.
//!
//! - GET /notices - Every visible message
//! - GET /notices/stream - SSE stream of posted/cleared messages

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::get;
use axum::{Json, Router};
use scanwatch_core::{Notice, NoticeEvent};
use tokio::sync::broadcast::error::RecvError;

use crate::state::AppState;

async fn list_notices(State(state): State<Arc<AppState>>) -> Json<Vec<Notice>> {
    Json(state.notifier.messages())
}

async fn stream_notices(
    State(state): State<Arc<AppState>>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let rx = state.notifier.subscribe();

    let stream = async_stream::stream! {
        let mut rx = rx;
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let name = match &event {
                        NoticeEvent::Posted { .. } => "posted",
                        NoticeEvent::Cleared { .. } => "cleared",
                    };
                    let json = serde_json::to_string(&event).unwrap_or_default();
                    yield Ok(Event::default().event(name).data(json));
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Notice stream subscriber lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/notices", get(list_notices))
        .route("/notices/stream", get(stream_notices))
}
