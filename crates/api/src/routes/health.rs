use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Overall service status.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    /// Configured concurrency limit.
    pub slots_total: usize,
    /// Admission slots free right now.
    pub slots_available: usize,
    /// Jobs with a registry entry (running or awaiting a subscriber).
    pub tracked_jobs: usize,
}

/// GET /health -- returns service status and admission capacity.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        slots_total: state.admission.limit(),
        slots_available: state.admission.available(),
        tracked_jobs: state.registry.len().await,
    })
}

/// Mount health check routes.
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
