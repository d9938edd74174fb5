use std::time::Duration;

use axum::{
    body::Body,
    extract::Request,
    http::{HeaderMap, header},
    response::Response,
};

use super::{ProxyError, end_to_end_headers};
use crate::{config::UpstreamTarget, credential::Credential};

/// How long to wait for the upstream to accept a connection.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// How long to wait for the upstream's response head. The body that follows
/// is not bounded, so long-lived streams stay open.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(30);

/// Client used for all plain HTTP forwarding. Upstream redirects are handed
/// to the browser untouched, and proxy environment variables are ignored
/// since the upstream sits on the local network.
pub fn build_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .no_proxy()
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
}

/// Headers sent upstream: the inbound end-to-end headers, with the
/// credential as bearer authorization when there is one.
pub fn outbound_headers(inbound: &HeaderMap, credential: &Credential) -> HeaderMap {
    let mut headers = end_to_end_headers(inbound);
    if let Some(bearer) = credential.bearer_header() {
        headers.insert(header::AUTHORIZATION, bearer);
    }
    headers
}

/// Re-issue `request` against the upstream and stream the response back.
///
/// Only failures before the response head arrives are reported as errors;
/// after that the status is committed and a broken body simply ends the
/// client connection. `response_timeout` bounds the wait for the head only.
pub async fn forward(
    client: &reqwest::Client,
    upstream: &UpstreamTarget,
    credential: &Credential,
    request: Request,
    response_timeout: Duration,
) -> Result<Response, ProxyError> {
    let (parts, body) = request.into_parts();
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let url = upstream.url_for(path_and_query);

    tracing::debug!(method = %parts.method, %url, "Forwarding request upstream");

    let pending = client
        .request(parts.method.clone(), &url)
        .headers(outbound_headers(&parts.headers, credential))
        .body(reqwest::Body::wrap_stream(body.into_data_stream()))
        .send();
    let upstream_response = tokio::time::timeout(response_timeout, pending)
        .await
        .map_err(|_| ProxyError::Timeout(response_timeout))??;

    let status = upstream_response.status();
    let headers = end_to_end_headers(upstream_response.headers());

    let mut response = Response::new(Body::from_stream(upstream_response.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Ok(response)
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn credential_overrides_client_authorization() {
        let mut inbound = HeaderMap::new();
        inbound.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer user-supplied"));
        inbound.insert(header::ACCEPT, HeaderValue::from_static("text/html"));

        let headers = outbound_headers(&inbound, &Credential::new("gateway"));
        assert_eq!(headers.get(header::AUTHORIZATION).unwrap(), "Bearer gateway");
        assert_eq!(headers.get(header::ACCEPT).unwrap(), "text/html");
    }

    #[test]
    fn empty_credential_adds_nothing() {
        let inbound = HeaderMap::new();
        let headers = outbound_headers(&inbound, &Credential::default());
        assert!(headers.get(header::AUTHORIZATION).is_none());
    }
}
