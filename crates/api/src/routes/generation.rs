use axum::routing::post;
use axum::Router;

use crate::handlers::generation;
use crate::state::AppState;

/// ```text
/// POST   /generate-audio  -> generate_audio
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/generate-audio", post(generation::generate_audio))
}
