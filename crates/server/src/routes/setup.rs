use api_types::{SetupFields, SetupResponse};
use axum::{Json, extract::Request};

use crate::{
    setup::{SetupError, SetupSubmission, generate_credential},
    state::AppState,
};

/// Submissions are a handful of short strings.
const MAX_SETUP_BODY: usize = 64 * 1024;

pub async fn read(state: &AppState) -> Json<SetupFields> {
    Json(state.store.read_config().await)
}

/// Validate, persist with a fresh credential, then restart the upstream.
///
/// A failed restart is reported but does not roll the saved configuration
/// back; the operator can restart the upstream by hand.
pub async fn submit(state: &AppState, request: Request) -> Result<Json<SetupResponse>, SetupError> {
    let body = axum::body::to_bytes(request.into_body(), MAX_SETUP_BODY)
        .await
        .map_err(|_| SetupError::MalformedBody)?;
    let submission = SetupSubmission::from_json(&body)?;

    let credential = generate_credential();
    state
        .store
        .write_config(&submission, &credential)
        .await
        .map_err(SetupError::Persistence)?;

    state
        .restart
        .restart_upstream()
        .await
        .map_err(SetupError::Restart)?;

    Ok(Json(SetupResponse { ok: true }))
}
