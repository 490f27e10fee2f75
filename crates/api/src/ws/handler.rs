use std::sync::Arc;

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use cadence_core::error::CoreError;
use cadence_core::status_channel::StatusReceiver;
use cadence_core::types::JobId;
use futures::StreamExt;

use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::ws::forwarder::forward_events;
use crate::ws::registry::JobRegistry;

/// GET /ws/{job_id}
///
/// Attach the caller as the job's only subscriber and upgrade to
/// WebSocket. Unknown jobs get 404 and a second subscriber gets 409, both
/// before any upgrade happens.
pub async fn job_stream_handler(
    Path(job_id): Path<String>,
    State(state): State<AppState>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> AppResult<Response> {
    let job_id: JobId = job_id.parse().map_err(|_| {
        AppError::Core(CoreError::NotFound {
            entity: "Job",
            id: job_id.clone(),
        })
    })?;

    state.registry.check_subscribable(job_id).await?;

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return Ok(rejection.into_response()),
    };

    let receiver = state.registry.subscribe(job_id).await?;
    let registry = Arc::clone(&state.registry);

    Ok(ws
        .on_upgrade(move |socket| handle_socket(socket, job_id, receiver, registry))
        .into_response())
}

/// Drive one subscriber connection until forwarding ends, then forget the
/// job.
async fn handle_socket(
    socket: WebSocket,
    job_id: JobId,
    receiver: StatusReceiver,
    registry: Arc<JobRegistry>,
) {
    tracing::info!(job_id = %job_id, "Subscriber connected");

    let (sink, stream) = socket.split();
    let outcome = forward_events(job_id, receiver, sink, stream).await;

    registry.remove(job_id).await;
    tracing::info!(job_id = %job_id, outcome = ?outcome, "Subscriber disconnected");
}
