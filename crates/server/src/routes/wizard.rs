use axum::{
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};

use crate::state::AppState;

/// Serve the setup wizard, read fresh from disk so it can be swapped
/// without restarting.
pub async fn serve(state: &AppState) -> Response {
    match tokio::fs::read(&state.wizard_path).await {
        Ok(page) => (
            [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
            page,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(path = %state.wizard_path.display(), error = %e, "Failed to load wizard page");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                "Could not load setup page",
            )
                .into_response()
        }
    }
}
