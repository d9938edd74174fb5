//! Connection-upgrade (WebSocket) proxying.
//!
//! The client's handshake is re-serialized by hand onto a raw TCP connection
//! to the upstream, with the gateway credential swapped into the
//! `Authorization` header. The upstream's response head is parsed and
//! mirrored; on `101 Switching Protocols` both connections are spliced.

use std::time::Duration;

use axum::{
    body::Body,
    extract::Request,
    http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use hyper_util::rt::TokioIo;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};
use tokio_util::io::ReaderStream;

use super::{ProxyError, end_to_end_headers, splice};
use crate::{
    config::UpstreamTarget,
    credential::Credential,
    gate::{SetupState, UpgradeRoute},
    state::AppState,
};

/// Largest upstream response head accepted during the handshake.
const MAX_RESPONSE_HEAD: usize = 16 * 1024;
const MAX_RESPONSE_HEADERS: usize = 64;
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Whether the request asks to switch protocols.
pub fn is_upgrade_request(headers: &HeaderMap) -> bool {
    headers.contains_key(header::UPGRADE)
        && headers
            .get_all(header::CONNECTION)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .any(|token| token.trim().eq_ignore_ascii_case("upgrade"))
}

/// Serialize an upgrade request for the upstream.
///
/// Every original header is kept, repeated headers included. When there is a
/// credential any `Authorization` header is replaced by the bearer token;
/// without one the client's own header passes through.
pub fn build_upgrade_request(
    method: &Method,
    path_and_query: &str,
    headers: &HeaderMap,
    credential: &Credential,
) -> Vec<u8> {
    let bearer = credential.bearer_header();
    let mut out = Vec::with_capacity(256 + headers.len() * 32);

    out.extend_from_slice(method.as_str().as_bytes());
    out.push(b' ');
    out.extend_from_slice(path_and_query.as_bytes());
    out.extend_from_slice(b" HTTP/1.1\r\n");

    for (name, value) in headers {
        if bearer.is_some() && name == header::AUTHORIZATION {
            continue;
        }
        write_header(&mut out, name, value);
    }
    if let Some(bearer) = &bearer {
        write_header(&mut out, &header::AUTHORIZATION, bearer);
    }

    out.extend_from_slice(b"\r\n");
    out
}

fn write_header(out: &mut Vec<u8>, name: &HeaderName, value: &HeaderValue) {
    out.extend_from_slice(name.as_str().as_bytes());
    out.extend_from_slice(b": ");
    out.extend_from_slice(value.as_bytes());
    out.extend_from_slice(b"\r\n");
}

/// Handle an upgrade request under the given setup state.
pub async fn handle(state: &AppState, setup_state: SetupState, mut request: Request) -> Response {
    if UpgradeRoute::resolve(setup_state) == UpgradeRoute::Refuse {
        tracing::debug!(path = %request.uri().path(), "Refusing upgrade before setup");
        return closing(StatusCode::SERVICE_UNAVAILABLE, Body::empty());
    }

    // Must be taken before the request is consumed.
    let on_upgrade = hyper::upgrade::on(&mut request);

    let credential = state.credentials.resolve().await;
    let handshake = {
        let path_and_query = request
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        build_upgrade_request(request.method(), path_and_query, request.headers(), &credential)
    };
    drop(credential);

    let exchange = tokio::time::timeout(
        HANDSHAKE_TIMEOUT,
        open_upstream(&state.upstream, &handshake),
    );
    let (upstream, head) = match exchange.await {
        Ok(Ok(pair)) => pair,
        Ok(Err(e)) => {
            tracing::warn!(upstream = %state.upstream, error = %e, "Upgrade to upstream failed");
            return closing(StatusCode::BAD_GATEWAY, Body::from(super::UPSTREAM_UNAVAILABLE_MESSAGE));
        }
        Err(_) => {
            tracing::warn!(upstream = %state.upstream, "Upstream upgrade handshake timed out");
            return closing(StatusCode::GATEWAY_TIMEOUT, Body::empty());
        }
    };

    if head.status != StatusCode::SWITCHING_PROTOCOLS {
        tracing::debug!(status = %head.status, "Upstream declined upgrade");
        return declined(head, upstream);
    }

    let path = request.uri().path().to_string();
    let ResponseHead {
        status,
        headers,
        leftover,
    } = head;

    tokio::spawn(async move {
        let upgraded = match on_upgrade.await {
            Ok(upgraded) => upgraded,
            Err(e) => {
                tracing::debug!(error = %e, "Client upgrade did not complete");
                return;
            }
        };
        let mut client = TokioIo::new(upgraded);

        // Frames the upstream sent right behind its response head.
        if !leftover.is_empty()
            && let Err(e) = client.write_all(&leftover).await
        {
            tracing::debug!(error = %e, "Client went away during upgrade");
            return;
        }

        match splice::splice(client, upstream).await {
            Ok(end) => tracing::debug!(%path, ?end, "Upgraded connection closed"),
            Err(e) => tracing::debug!(%path, error = %e, "Upgraded connection failed"),
        }
    });

    let mut response = Response::new(Body::empty());
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

/// The upstream's response head plus any bytes read past it.
#[derive(Debug)]
pub struct ResponseHead {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub leftover: Bytes,
}

async fn open_upstream(
    upstream: &UpstreamTarget,
    handshake: &[u8],
) -> Result<(TcpStream, ResponseHead), ProxyError> {
    let mut stream = TcpStream::connect((upstream.host.as_str(), upstream.port))
        .await
        .map_err(ProxyError::Connect)?;
    stream
        .write_all(handshake)
        .await
        .map_err(ProxyError::Connect)?;
    let head = read_response_head(&mut stream).await?;
    Ok((stream, head))
}

/// Read from `stream` until a complete HTTP/1.x response head is buffered.
pub async fn read_response_head<R>(stream: &mut R) -> Result<ResponseHead, ProxyError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(4096);
    loop {
        if let Some((len, status, headers)) = parse_response_head(&buf)? {
            let leftover = buf.split_off(len).freeze();
            return Ok(ResponseHead {
                status,
                headers,
                leftover,
            });
        }
        if buf.len() >= MAX_RESPONSE_HEAD {
            return Err(ProxyError::Handshake("response head too large".to_string()));
        }
        let read = stream.read_buf(&mut buf).await.map_err(ProxyError::Connect)?;
        if read == 0 {
            return Err(ProxyError::Handshake(
                "upstream closed before responding".to_string(),
            ));
        }
    }
}

fn parse_response_head(buf: &[u8]) -> Result<Option<(usize, StatusCode, HeaderMap)>, ProxyError> {
    let mut storage = [httparse::EMPTY_HEADER; MAX_RESPONSE_HEADERS];
    let mut response = httparse::Response::new(&mut storage);
    let len = match response.parse(buf) {
        Ok(httparse::Status::Complete(len)) => len,
        Ok(httparse::Status::Partial) => return Ok(None),
        Err(e) => return Err(ProxyError::Handshake(e.to_string())),
    };

    let status = response
        .code
        .and_then(|code| StatusCode::from_u16(code).ok())
        .ok_or_else(|| ProxyError::Handshake("missing status code".to_string()))?;

    let mut headers = HeaderMap::with_capacity(response.headers.len());
    for h in response.headers.iter() {
        let name = HeaderName::from_bytes(h.name.as_bytes())
            .map_err(|e| ProxyError::Handshake(e.to_string()))?;
        let value =
            HeaderValue::from_bytes(h.value).map_err(|e| ProxyError::Handshake(e.to_string()))?;
        headers.append(name, value);
    }

    Ok(Some((len, status, headers)))
}

/// Mirror a non-101 answer. Only a `Content-Length` delimited body is
/// relayed; anything else is answered with the head alone.
fn declined(head: ResponseHead, upstream: TcpStream) -> Response {
    let content_length = head
        .headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());

    let mut headers = end_to_end_headers(&head.headers);
    let body = match content_length {
        Some(len) => {
            let leftover_len = head.leftover.len() as u64;
            let prefix = head.leftover.slice(..len.min(leftover_len) as usize);
            let rest = ReaderStream::new(upstream.take(len.saturating_sub(leftover_len)));
            Body::from_stream(futures_util::stream::once(async move { Ok(prefix) }).chain(rest))
        }
        None => {
            headers.remove(header::CONTENT_LENGTH);
            Body::empty()
        }
    };
    headers.insert(header::CONNECTION, HeaderValue::from_static("close"));

    let mut response = Response::new(body);
    *response.status_mut() = head.status;
    *response.headers_mut() = headers;
    response
}

/// A response that asks hyper to close the client connection afterwards.
fn closing(status: StatusCode, body: Body) -> Response {
    (status, [(header::CONNECTION, "close")], body).into_response()
}
