//! Handler for job submission.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use cadence_core::job::{AudioRequest, SynthesisJob};
use cadence_core::status_channel::status_channel;
use serde::Serialize;

use crate::engine::supervisor::spawn_job;
use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Body of a `202 Accepted` submission response.
#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub job_id: String,
    /// Path of the job's WebSocket status stream.
    pub status_stream: String,
}

/// POST /generate-audio
///
/// Validate the request, take an admission slot, register the job's status
/// channel, and start the job. Returns 202 with the job handle, or 429 when
/// every slot is busy. The job runs on after this returns.
pub async fn generate_audio(
    State(state): State<AppState>,
    Json(input): Json<AudioRequest>,
) -> AppResult<impl IntoResponse> {
    input.validate(state.config.max_text_chars)?;

    let slot = state.admission.try_admit().ok_or_else(|| {
        tracing::info!("Submission rejected, no free slot");
        AppError::Busy
    })?;

    let job = SynthesisJob::from_request(input);
    let job_id = job.id;

    // The channel is registered before the job starts so no event can be
    // produced for a job the registry does not know.
    let (events, receiver) = status_channel();
    state.registry.insert(job_id, receiver).await;

    tracing::info!(
        job_id = %job_id,
        text_chars = job.text_prompt.chars().count(),
        audio_ref_key = %job.audio_ref_key,
        "Job submitted",
    );

    spawn_job(
        Arc::clone(&state.launcher),
        Arc::clone(&state.registry),
        slot,
        job,
        events,
        state.config.work_dir.clone(),
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            job_id: job_id.to_string(),
            status_stream: format!("/ws/{job_id}"),
        }),
    ))
}
