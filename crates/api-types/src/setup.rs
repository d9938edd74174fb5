use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::types::Provider;

/// Body of `POST /api/setup` as submitted by the wizard.
///
/// Every field is optional on the wire so that missing values surface as
/// validation errors rather than as a malformed body.
#[derive(Debug, Clone, Default, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct SetupRequest {
    #[ts(optional)]
    pub provider: Option<String>,
    #[ts(optional)]
    pub api_key: Option<String>,
    #[ts(optional)]
    pub model: Option<String>,
    #[ts(optional)]
    pub base_url: Option<String>,
    #[ts(optional)]
    pub telegram_token: Option<String>,
    #[ts(optional)]
    pub discord_token: Option<String>,
    #[ts(optional)]
    pub embeddings_key: Option<String>,
}

/// Persisted setup fields returned by `GET /api/setup` to pre-fill the form.
/// The gateway credential is never part of this payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct SetupFields {
    pub provider: Provider,
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub telegram_token: String,
    pub discord_token: String,
    pub embeddings_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SetupResponse {
    pub ok: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ErrorResponse {
    pub error: String,
}
