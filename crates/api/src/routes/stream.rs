use axum::routing::get;
use axum::Router;

use crate::state::AppState;
use crate::ws;

/// ```text
/// GET    /ws/{job_id}     -> job_stream_handler (WebSocket)
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/ws/{job_id}", get(ws::job_stream_handler))
}
