#![allow(dead_code)]

use std::{
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use axum::{body::Body, http::Response};
use setup_proxy::{
    config::UpstreamTarget,
    routes,
    setup::{
        restart::{RestartAction, RestartError},
        store::ConfigStore,
    },
    state::AppState,
};
use tempfile::TempDir;

pub const WIZARD_HTML: &str = "<!doctype html><title>OpenClaw setup</title>";

/// Records restart calls instead of talking to Docker.
#[derive(Default)]
pub struct RecordingRestart {
    calls: AtomicUsize,
    fail: bool,
}

impl RecordingRestart {
    pub fn failing() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: true,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RestartAction for RecordingRestart {
    async fn restart_upstream(&self) -> Result<(), RestartError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(RestartError::Status {
                status: 404,
                body: "no such container".to_string(),
            });
        }
        Ok(())
    }
}

/// A gateway wired to a temporary config directory.
pub struct TestGateway {
    pub dir: TempDir,
    pub state: AppState,
    pub restart: Arc<RecordingRestart>,
}

impl TestGateway {
    pub fn new(upstream: UpstreamTarget) -> Self {
        Self::with_restart(upstream, RecordingRestart::default())
    }

    pub fn with_restart(upstream: UpstreamTarget, restart: RecordingRestart) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let wizard = dir.path().join("wizard.html");
        std::fs::write(&wizard, WIZARD_HTML).unwrap();

        let restart = Arc::new(restart);
        let state = AppState::new(
            upstream,
            ConfigStore::new(dir.path().join("config")),
            restart.clone(),
            wizard,
            Duration::from_millis(500),
        )
        .unwrap();

        Self {
            dir,
            state,
            restart,
        }
    }

    pub fn store(&self) -> &ConfigStore {
        &self.state.store
    }

    /// Put the store into the configured state with `token` as credential.
    pub fn mark_configured(&self, token: &str) {
        let store = self.store();
        std::fs::create_dir_all(store.dir()).unwrap();
        std::fs::write(
            store.env_path(),
            format!("OPENCLAW_PROVIDER=anthropic\nOPENCLAW_GATEWAY_TOKEN={}\n", token),
        )
        .unwrap();
        std::fs::write(store.marker_path(), "2026-01-01T00:00:00Z").unwrap();
    }

    pub fn router(&self) -> axum::Router {
        routes::router(self.state.clone())
    }

    /// Serve the gateway on an ephemeral port.
    pub async fn spawn(&self) -> SocketAddr {
        spawn_router(self.router()).await
    }
}

pub async fn spawn_router(router: axum::Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// A port nothing listens on.
pub fn unused_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

pub fn local_upstream(port: u16) -> UpstreamTarget {
    UpstreamTarget::new("127.0.0.1", port)
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_str(&body_text(response).await).unwrap()
}
