//! Forwarding of gated traffic to the upstream.
//!
//! Plain HTTP requests are re-issued through a reqwest client with streaming
//! bodies in both directions. Connection-upgrade requests (WebSocket) get a
//! hand-built handshake on a raw TCP connection and are then spliced.
//! Either way the gateway credential is resolved once per operation and sent
//! as `Authorization: Bearer <token>`.

pub mod http;
pub mod splice;
pub mod upgrade;

use axum::{
    extract::Request,
    http::{HeaderMap, HeaderName, StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::{credential::Credential, state::AppState};

/// Body returned when the upstream cannot be reached.
pub const UPSTREAM_UNAVAILABLE_MESSAGE: &str =
    "OpenClaw is not available yet. Try refreshing in a moment.";

const TOKEN_QUERY_PARAM: &str = "token";

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("upstream request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("could not connect to upstream: {0}")]
    Connect(#[source] std::io::Error),
    #[error("upstream handshake failed: {0}")]
    Handshake(String),
    #[error("upstream did not respond within {0:?}")]
    Timeout(std::time::Duration),
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        tracing::warn!(error = %self, "Upstream unavailable");
        (
            StatusCode::BAD_GATEWAY,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            UPSTREAM_UNAVAILABLE_MESSAGE,
        )
            .into_response()
    }
}

/// Proxy a non-upgrade request, redirecting bare `/` to carry the token.
pub async fn handle(state: &AppState, request: Request) -> Response {
    let credential = state.credentials.resolve().await;

    if let Some(location) = root_redirect(request.uri(), &credential) {
        return (StatusCode::FOUND, [(header::LOCATION, location)]).into_response();
    }

    let forwarded = http::forward(
        &state.http,
        &state.upstream,
        &credential,
        request,
        state.response_timeout,
    );
    match forwarded.await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    }
}

/// Where to send a browser landing on `/` without a token, so the UI can
/// bootstrap its session. `None` once the token parameter is present.
pub fn root_redirect(uri: &Uri, credential: &Credential) -> Option<String> {
    let token = credential.expose()?;
    if uri.path() != "/" {
        return None;
    }

    let has_token = uri
        .query()
        .map(|q| url::form_urlencoded::parse(q.as_bytes()).any(|(k, _)| k == TOKEN_QUERY_PARAM))
        .unwrap_or(false);
    if has_token {
        return None;
    }

    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair(TOKEN_QUERY_PARAM, token)
        .finish();
    Some(format!("/?{}", query))
}

/// Headers meaningful only for a single transport hop.
const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Copy of `headers` without hop-by-hop headers, including any named by the
/// `Connection` header itself.
pub fn end_to_end_headers(headers: &HeaderMap) -> HeaderMap {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if HOP_BY_HOP.contains(name) || listed.contains(name) {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}
