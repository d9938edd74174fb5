//! First-run setup: validating a wizard submission, persisting it and
//! restarting the upstream so it picks the new configuration up.

pub mod restart;
pub mod store;
pub mod upstream_config;

use api_types::{ErrorResponse, Provider, SetupRequest};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use rand::RngCore;
use serde_json::Value;
use thiserror::Error;

use self::{restart::RestartError, store::ConfigStoreError};

/// Number of random bytes in a freshly minted gateway credential.
const CREDENTIAL_BYTES: usize = 32;

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("Invalid request body")]
    MalformedBody,
    #[error("Invalid provider")]
    InvalidProvider,
    #[error("API key is required")]
    MissingApiKey,
    #[error("Model is required")]
    MissingModel,
    #[error("Failed to save configuration")]
    Persistence(#[source] ConfigStoreError),
    #[error("Config saved but failed to restart: {0}")]
    Restart(#[source] RestartError),
}

impl SetupError {
    pub fn status(&self) -> StatusCode {
        match self {
            SetupError::MalformedBody
            | SetupError::InvalidProvider
            | SetupError::MissingApiKey
            | SetupError::MissingModel => StatusCode::BAD_REQUEST,
            SetupError::Persistence(_) | SetupError::Restart(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for SetupError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            SetupError::Persistence(source) => {
                tracing::error!(error = %source, "Failed to persist setup configuration");
            }
            SetupError::Restart(source) => {
                tracing::error!(error = %source, "Upstream restart failed after saving configuration");
            }
            _ => tracing::debug!(error = %self, "Rejected setup submission"),
        }

        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

/// A setup submission that passed validation. Strings are trimmed and
/// optional fields are `None` when left blank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupSubmission {
    pub provider: Provider,
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: Option<String>,
    pub telegram_token: Option<String>,
    pub discord_token: Option<String>,
    pub embeddings_key: Option<String>,
}

impl SetupSubmission {
    /// Only a body that is not JSON at all is malformed. Fields are read
    /// leniently: a value that is not a string counts as absent, so a wrong
    /// type surfaces as the matching validation error.
    pub fn from_json(body: &[u8]) -> Result<Self, SetupError> {
        let value: Value = serde_json::from_slice(body).map_err(|_| SetupError::MalformedBody)?;
        Self::validate(request_from_value(&value))
    }

    pub fn validate(request: SetupRequest) -> Result<Self, SetupError> {
        let provider = non_blank(request.provider)
            .and_then(|p| p.parse::<Provider>().ok())
            .ok_or(SetupError::InvalidProvider)?;

        let api_key = non_blank(request.api_key);
        if provider.requires_api_key() && api_key.is_none() {
            return Err(SetupError::MissingApiKey);
        }

        let model = non_blank(request.model).ok_or(SetupError::MissingModel)?;

        Ok(Self {
            provider,
            api_key,
            model,
            base_url: non_blank(request.base_url),
            telegram_token: non_blank(request.telegram_token),
            discord_token: non_blank(request.discord_token),
            embeddings_key: non_blank(request.embeddings_key),
        })
    }
}

fn request_from_value(value: &Value) -> SetupRequest {
    let field = |key: &str| value.get(key).and_then(Value::as_str).map(str::to_string);
    SetupRequest {
        provider: field("provider"),
        api_key: field("apiKey"),
        model: field("model"),
        base_url: field("baseUrl"),
        telegram_token: field("telegramToken"),
        discord_token: field("discordToken"),
        embeddings_key: field("embeddingsKey"),
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// A new high-entropy gateway credential, hex encoded.
pub fn generate_credential() -> String {
    let mut bytes = [0u8; CREDENTIAL_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
