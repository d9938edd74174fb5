//! Setup gateway binary.
//!
//! # Environment variables
//!
//! | Variable             | Default                | Description                               |
//! |----------------------|------------------------|-------------------------------------------|
//! | `HOST`               | `0.0.0.0`              | Listen address                            |
//! | `PORT`               | `8080`                 | Listen port                               |
//! | `UPSTREAM_HOST`      | `openclaw_web_1`       | Upstream host                             |
//! | `UPSTREAM_PORT`      | `28639`                | Upstream port                             |
//! | `CONFIG_DIR`         | `/config`              | Shared configuration directory            |
//! | `WEB_CONTAINER`      | `openclaw_web_1`       | Container restarted after setup           |
//! | `DOCKER_SOCKET`      | `/var/run/docker.sock` | Docker Engine API socket                  |
//! | `WIZARD_PATH`        | `/app/wizard.html`     | Setup page served before configuration    |
//! | `PROBE_TIMEOUT_MS`   | `2000`                 | Health probe connect timeout              |
//! | `RESTART_GRACE_SECS` | `10`                   | Grace period passed to the restart call   |
//! | `UPSTREAM_RESPONSE_TIMEOUT_SECS` | `30`       | Wait for a proxied response head          |
//! | `RUST_LOG`           | `info`                 | Log filter (tracing-subscriber)           |
//! | `LOG_FORMAT`         | text                   | `json` for structured output              |

use anyhow::Context;
use clap::Parser;
use setup_proxy::{config::Config, routes, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    utils::logging::init("info");

    let config = Config::parse();
    let state = AppState::from_config(&config).context("Failed to build HTTP client")?;
    state.store.bootstrap().await;

    let addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!(
        addr = %addr,
        upstream = %state.upstream,
        configured = state.store.is_configured().await,
        config_dir = %state.store.dir().display(),
        "Setup gateway listening"
    );

    axum::serve(listener, routes::router(state))
        .with_graceful_shutdown(utils::shutdown::shutdown_signal())
        .await
        .context("Server error")?;

    Ok(())
}
