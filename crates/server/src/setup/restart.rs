//! Restarting the upstream container after its configuration changed.

use std::{path::PathBuf, time::Duration};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RestartError {
    #[error("cannot reach docker socket {path}: {source}")]
    Connect {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("docker API request failed: {0}")]
    Http(#[from] hyper::Error),
    #[error("invalid docker API request: {0}")]
    Request(#[from] axum::http::Error),
    #[error("Docker restart returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("container restart is not supported on this platform")]
    Unsupported,
}

/// Side effect run once a new configuration has been persisted.
#[async_trait]
pub trait RestartAction: Send + Sync {
    async fn restart_upstream(&self) -> Result<(), RestartError>;
}

/// Restarts a container through the Docker Engine API on a unix socket.
#[derive(Debug, Clone)]
pub struct DockerRestart {
    socket_path: PathBuf,
    container: String,
    grace: Duration,
}

impl DockerRestart {
    pub fn new(socket_path: impl Into<PathBuf>, container: impl Into<String>, grace: Duration) -> Self {
        Self {
            socket_path: socket_path.into(),
            container: container.into(),
            grace,
        }
    }

    fn request_path(&self) -> String {
        format!(
            "/containers/{}/restart?t={}",
            self.container,
            self.grace.as_secs()
        )
    }
}

#[async_trait]
impl RestartAction for DockerRestart {
    #[cfg(unix)]
    async fn restart_upstream(&self) -> Result<(), RestartError> {
        use axum::http::{Method, Request, header};
        use bytes::Bytes;
        use http_body_util::{BodyExt, Empty};
        use hyper_util::rt::TokioIo;
        use tokio::net::UnixStream;

        let stream = UnixStream::connect(&self.socket_path)
            .await
            .map_err(|source| RestartError::Connect {
                path: self.socket_path.clone(),
                source,
            })?;

        let (mut sender, connection) =
            hyper::client::conn::http1::handshake(TokioIo::new(stream)).await?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::debug!(error = %e, "Docker API connection closed with error");
            }
        });

        let request = Request::builder()
            .method(Method::POST)
            .uri(self.request_path())
            .header(header::HOST, "docker")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Empty::<Bytes>::new())?;

        tracing::info!(container = %self.container, "Restarting upstream container");
        let response = sender.send_request(request).await?;
        let status = response.status();
        let body = response.into_body().collect().await?.to_bytes();

        if status.as_u16() == 200 || status.as_u16() == 204 {
            tracing::info!(container = %self.container, "Upstream container restarted");
            Ok(())
        } else {
            Err(RestartError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).trim().to_string(),
            })
        }
    }

    #[cfg(not(unix))]
    async fn restart_upstream(&self) -> Result<(), RestartError> {
        Err(RestartError::Unsupported)
    }
}
