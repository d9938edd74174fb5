use api_types::HealthResponse;
use axum::Json;

use crate::{probe::probe_upstream, state::AppState};

pub async fn check(state: &AppState) -> Json<HealthResponse> {
    let ready = probe_upstream(&state.upstream, state.probe_timeout).await;
    Json(HealthResponse { ready })
}
