mod common;

use std::{future::Future, sync::Arc, time::Duration};

use axum::{
    Router,
    body::Body,
    extract::Request,
    http::{StatusCode, header},
    response::IntoResponse,
    routing::any,
};
use bytes::Bytes;
use common::{TestGateway, body_text, local_upstream, spawn_router, unused_port};
use futures_util::StreamExt;
use http_body_util::BodyExt;
use setup_proxy::proxy::UPSTREAM_UNAVAILABLE_MESSAGE;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    sync::{Notify, oneshot},
};
use tower::ServiceExt;

/// Upstream that answers with what it received.
async fn echo(request: Request) -> impl IntoResponse {
    let auth = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string();
    let target = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_default();
    let method = request.method().to_string();
    let body = axum::body::to_bytes(request.into_body(), usize::MAX)
        .await
        .unwrap();
    (
        [("x-upstream", "echo")],
        format!("{} {} auth={} body={}", method, target, auth, String::from_utf8_lossy(&body)),
    )
}

async fn spawn_echo_upstream() -> u16 {
    let router = Router::new()
        .route("/redirect", any(|| async { (StatusCode::FOUND, [(header::LOCATION, "/elsewhere")]) }))
        .fallback(echo);
    spawn_router(router).await.port()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn forwards_with_gateway_credential() {
    let port = spawn_echo_upstream().await;
    let gateway = TestGateway::new(local_upstream(port));
    gateway.mark_configured("gw-token");

    let request = Request::builder()
        .method("PUT")
        .uri("/api/sessions/7?verbose=1")
        .header(header::AUTHORIZATION, "Bearer from-browser")
        .body(Body::from("payload"))
        .unwrap();
    let response = gateway.router().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-upstream"], "echo");
    assert_eq!(
        body_text(response).await,
        "PUT /api/sessions/7?verbose=1 auth=Bearer gw-token body=payload"
    );
}

#[tokio::test]
async fn forwards_unauthenticated_without_credential() {
    let port = spawn_echo_upstream().await;
    let gateway = TestGateway::new(local_upstream(port));
    gateway.mark_configured("");

    let response = gateway.router().oneshot(get("/status")).await.unwrap();

    assert_eq!(body_text(response).await, "GET /status auth=- body=");
}

#[tokio::test]
async fn upstream_redirects_reach_the_client() {
    let port = spawn_echo_upstream().await;
    let gateway = TestGateway::new(local_upstream(port));
    gateway.mark_configured("tok");

    let response = gateway.router().oneshot(get("/redirect")).await.unwrap();

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(response.headers()[header::LOCATION], "/elsewhere");
}

#[tokio::test]
async fn bare_root_redirects_with_token() {
    let port = spawn_echo_upstream().await;
    let gateway = TestGateway::new(local_upstream(port));
    gateway.mark_configured("abc123");

    let response = gateway.router().oneshot(get("/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(response.headers()[header::LOCATION], "/?token=abc123");

    let response = gateway.router().oneshot(get("/?token=abc123")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_text(response).await,
        "GET /?token=abc123 auth=Bearer abc123 body="
    );
}

#[tokio::test]
async fn credential_falls_back_to_upstream_token_file() {
    let port = spawn_echo_upstream().await;
    let gateway = TestGateway::new(local_upstream(port));
    gateway.mark_configured("");
    std::fs::write(gateway.store().upstream_token_path(), "from-file\n").unwrap();

    let response = gateway.router().oneshot(get("/x")).await.unwrap();

    assert_eq!(body_text(response).await, "GET /x auth=Bearer from-file body=");
}

#[tokio::test]
async fn unreachable_upstream_is_bad_gateway() {
    let gateway = TestGateway::new(local_upstream(unused_port()));
    gateway.mark_configured("tok");

    let response = gateway.router().oneshot(get("/chat")).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(body_text(response).await, UPSTREAM_UNAVAILABLE_MESSAGE);
}

const UPGRADE_REQUEST: &str = "GET /ws?room=1 HTTP/1.1\r\n\
Host: gateway\r\n\
Connection: Upgrade\r\n\
Upgrade: websocket\r\n\
Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
Sec-WebSocket-Version: 13\r\n\r\n";

async fn read_head(stream: &mut TcpStream) -> String {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        let n = stream.read(&mut byte).await.unwrap();
        assert_ne!(n, 0, "connection closed mid-head");
        head.push(byte[0]);
    }
    String::from_utf8(head).unwrap()
}

/// Raw upstream that accepts one upgrade, reports the handshake it saw, then
/// echoes until `close` is signalled.
async fn spawn_ws_upstream() -> (u16, oneshot::Receiver<String>, oneshot::Sender<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (seen_tx, seen_rx) = oneshot::channel();
    let (close_tx, mut close_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let head = read_head(&mut stream).await;
        let _ = seen_tx.send(head);
        stream
            .write_all(b"HTTP/1.1 101 Switching Protocols\r\nConnection: Upgrade\r\nUpgrade: websocket\r\n\r\n")
            .await
            .unwrap();

        let mut buf = [0u8; 1024];
        loop {
            tokio::select! {
                _ = &mut close_rx => break,
                read = stream.read(&mut buf) => {
                    let n = read.unwrap();
                    if n == 0 {
                        break;
                    }
                    stream.write_all(&buf[..n]).await.unwrap();
                }
            }
        }
    });

    (port, seen_rx, close_tx)
}

#[tokio::test]
async fn upgrade_is_spliced_with_credential() {
    let (port, seen, close) = spawn_ws_upstream().await;
    let gateway = TestGateway::new(local_upstream(port));
    gateway.mark_configured("ws-token");
    let addr = gateway.spawn().await;

    let mut client = TcpStream::connect(addr).await.unwrap();
    client.write_all(UPGRADE_REQUEST.as_bytes()).await.unwrap();

    let head = read_head(&mut client).await;
    assert!(head.starts_with("HTTP/1.1 101"), "{head}");

    let upstream_saw = seen.await.unwrap();
    assert!(upstream_saw.starts_with("GET /ws?room=1 HTTP/1.1\r\n"));
    assert!(upstream_saw.to_ascii_lowercase().contains("authorization: bearer ws-token\r\n"));

    client.write_all(b"ping").await.unwrap();
    let mut buf = [0u8; 4];
    client.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"ping");

    // Upstream going away closes the client side too.
    close.send(()).unwrap();
    let mut rest = Vec::new();
    let read = tokio::time::timeout(
        std::time::Duration::from_secs(5),
        client.read_to_end(&mut rest),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(read, 0);
}

#[tokio::test]
async fn upgrade_refused_before_setup() {
    let upstream = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let gateway = TestGateway::new(local_upstream(upstream.local_addr().unwrap().port()));
    let addr = gateway.spawn().await;

    let mut client = TcpStream::connect(addr).await.unwrap();
    client.write_all(UPGRADE_REQUEST.as_bytes()).await.unwrap();

    let mut response = Vec::new();
    client.read_to_end(&mut response).await.unwrap();
    let response = String::from_utf8(response).unwrap();
    assert!(response.starts_with("HTTP/1.1 503"), "{response}");

    let accepted =
        tokio::time::timeout(std::time::Duration::from_millis(200), upstream.accept()).await;
    assert!(accepted.is_err(), "upstream saw a connection");
}

#[tokio::test]
async fn upgrade_to_unreachable_upstream_is_bad_gateway() {
    let gateway = TestGateway::new(local_upstream(unused_port()));
    gateway.mark_configured("tok");
    let addr = gateway.spawn().await;

    let mut client = TcpStream::connect(addr).await.unwrap();
    client.write_all(UPGRADE_REQUEST.as_bytes()).await.unwrap();

    let mut response = Vec::new();
    client.read_to_end(&mut response).await.unwrap();
    let response = String::from_utf8(response).unwrap();
    assert!(response.starts_with("HTTP/1.1 502"), "{response}");
    assert!(response.ends_with(UPSTREAM_UNAVAILABLE_MESSAGE));
}

#[tokio::test]
async fn unresponsive_upstream_is_bad_gateway() {
    // Connections complete in the kernel backlog but nobody ever answers.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let mut gateway = TestGateway::new(local_upstream(listener.local_addr().unwrap().port()));
    gateway.state.response_timeout = Duration::from_millis(300);
    gateway.mark_configured("tok");

    let response = tokio::time::timeout(
        Duration::from_secs(10),
        gateway.router().oneshot(get("/chat")),
    )
    .await
    .expect("request hung")
    .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(body_text(response).await, UPSTREAM_UNAVAILABLE_MESSAGE);
    drop(listener);
}

#[tokio::test]
async fn response_body_is_streamed_as_it_arrives() {
    let release = Arc::new(Notify::new());
    let gate = release.clone();
    let upstream = Router::new().fallback(move || {
        let gate = gate.clone();
        async move {
            let first = futures_util::stream::once(async {
                Ok::<_, std::io::Error>(Bytes::from_static(b"one"))
            });
            let second = futures_util::stream::once(async move {
                gate.notified().await;
                Ok(Bytes::from_static(b"two"))
            });
            Body::from_stream(first.chain(second))
        }
    });
    let port = spawn_router(upstream).await.port();
    let gateway = TestGateway::new(local_upstream(port));
    gateway.mark_configured("tok");

    let response = gateway.router().oneshot(get("/events")).await.unwrap();
    let mut body = response.into_body();

    let first = tokio::time::timeout(Duration::from_secs(5), body.frame())
        .await
        .expect("first chunk held back")
        .unwrap()
        .unwrap();
    assert_eq!(first.into_data().unwrap(), Bytes::from_static(b"one"));

    release.notify_one();
    let rest = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    assert_eq!(rest, Bytes::from_static(b"two"));
}

/// Serve exactly one raw connection with `handler`.
async fn spawn_raw_upstream<F, Fut>(handler: F) -> u16
where
    F: FnOnce(TcpStream) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        handler(stream).await;
    });
    port
}

const SWITCHING: &[u8] =
    b"HTTP/1.1 101 Switching Protocols\r\nConnection: Upgrade\r\nUpgrade: websocket\r\n\r\n";

#[tokio::test]
async fn bytes_sent_behind_the_handshake_reach_upstream() {
    let (early_tx, early_rx) = oneshot::channel();
    let port = spawn_raw_upstream(|mut stream| async move {
        read_head(&mut stream).await;
        stream.write_all(SWITCHING).await.unwrap();
        let mut buf = [0u8; 5];
        stream.read_exact(&mut buf).await.unwrap();
        let _ = early_tx.send(buf.to_vec());
        let _ = stream.read(&mut buf).await;
    })
    .await;
    let gateway = TestGateway::new(local_upstream(port));
    gateway.mark_configured("tok");
    let addr = gateway.spawn().await;

    let mut client = TcpStream::connect(addr).await.unwrap();
    let mut first_write = UPGRADE_REQUEST.as_bytes().to_vec();
    first_write.extend_from_slice(b"early");
    client.write_all(&first_write).await.unwrap();

    let head = read_head(&mut client).await;
    assert!(head.starts_with("HTTP/1.1 101"), "{head}");
    let early = tokio::time::timeout(Duration::from_secs(5), early_rx)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(early, b"early");
}

#[tokio::test]
async fn declined_upgrade_is_mirrored() {
    let port = spawn_raw_upstream(|mut stream| async move {
        read_head(&mut stream).await;
        stream
            .write_all(
                b"HTTP/1.1 401 Unauthorized\r\nContent-Length: 12\r\nWww-Authenticate: Bearer\r\n\r\nunauthorized",
            )
            .await
            .unwrap();
    })
    .await;
    let gateway = TestGateway::new(local_upstream(port));
    gateway.mark_configured("tok");
    let addr = gateway.spawn().await;

    let mut client = TcpStream::connect(addr).await.unwrap();
    client.write_all(UPGRADE_REQUEST.as_bytes()).await.unwrap();

    let mut response = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), client.read_to_end(&mut response))
        .await
        .unwrap()
        .unwrap();
    let response = String::from_utf8(response).unwrap();
    let lower = response.to_ascii_lowercase();
    assert!(response.starts_with("HTTP/1.1 401"), "{response}");
    assert!(lower.contains("content-length: 12\r\n"), "{response}");
    assert!(lower.contains("connection: close\r\n"), "{response}");
    assert!(lower.contains("www-authenticate: bearer\r\n"), "{response}");
    assert!(response.ends_with("\r\n\r\nunauthorized"), "{response}");
}

#[tokio::test]
async fn client_close_ends_upstream_session() {
    let (eof_tx, eof_rx) = oneshot::channel();
    let port = spawn_raw_upstream(|mut stream| async move {
        read_head(&mut stream).await;
        stream.write_all(SWITCHING).await.unwrap();
        let mut buf = [0u8; 64];
        loop {
            match stream.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
        }
        let _ = eof_tx.send(());
    })
    .await;
    let gateway = TestGateway::new(local_upstream(port));
    gateway.mark_configured("tok");
    let addr = gateway.spawn().await;

    let mut client = TcpStream::connect(addr).await.unwrap();
    client.write_all(UPGRADE_REQUEST.as_bytes()).await.unwrap();
    let head = read_head(&mut client).await;
    assert!(head.starts_with("HTTP/1.1 101"), "{head}");

    drop(client);
    tokio::time::timeout(Duration::from_secs(5), eof_rx)
        .await
        .expect("upstream still open after client closed")
        .unwrap();
}

#[tokio::test]
async fn client_disconnect_aborts_upstream_request() {
    let (received_tx, received_rx) = oneshot::channel();
    let (eof_tx, eof_rx) = oneshot::channel();
    let port = spawn_raw_upstream(|mut stream| async move {
        read_head(&mut stream).await;
        let _ = received_tx.send(());
        // Never answer; wait for the gateway to give up on us.
        let mut buf = [0u8; 64];
        loop {
            match stream.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
        }
        let _ = eof_tx.send(());
    })
    .await;
    let gateway = TestGateway::new(local_upstream(port));
    gateway.mark_configured("tok");
    let addr = gateway.spawn().await;

    let mut client = TcpStream::connect(addr).await.unwrap();
    client
        .write_all(b"GET /slow HTTP/1.1\r\nHost: gateway\r\n\r\n")
        .await
        .unwrap();
    tokio::time::timeout(Duration::from_secs(5), received_rx)
        .await
        .unwrap()
        .unwrap();

    drop(client);
    tokio::time::timeout(Duration::from_secs(5), eof_rx)
        .await
        .expect("upstream request outlived the client")
        .unwrap();
}
