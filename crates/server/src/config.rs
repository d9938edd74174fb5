use std::{fmt, path::PathBuf, time::Duration};

use clap::Parser;

/// Process configuration. Every flag can also be supplied through the
/// environment, which is how the container orchestrator passes it.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "setup-proxy",
    version,
    about = "First-run setup wizard and authenticating reverse proxy"
)]
pub struct Config {
    /// Address to listen on.
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Host of the service that receives traffic once setup is complete.
    #[arg(long, env = "UPSTREAM_HOST", default_value = "openclaw_web_1")]
    pub upstream_host: String,

    #[arg(long, env = "UPSTREAM_PORT", default_value_t = 28639)]
    pub upstream_port: u16,

    /// Directory shared with the upstream container.
    #[arg(long, env = "CONFIG_DIR", default_value = "/config")]
    pub config_dir: PathBuf,

    /// Container restarted after a successful setup submission.
    #[arg(long, env = "WEB_CONTAINER", default_value = "openclaw_web_1")]
    pub web_container: String,

    #[arg(long, env = "DOCKER_SOCKET", default_value = "/var/run/docker.sock")]
    pub docker_socket: PathBuf,

    #[arg(long, env = "WIZARD_PATH", default_value = "/app/wizard.html")]
    pub wizard_path: PathBuf,

    #[arg(long, env = "PROBE_TIMEOUT_MS", default_value_t = 2000)]
    pub probe_timeout_ms: u64,

    /// Seconds to wait for the upstream's response head on proxied requests.
    #[arg(long, env = "UPSTREAM_RESPONSE_TIMEOUT_SECS", default_value_t = 30)]
    pub upstream_response_timeout_secs: u64,

    /// Seconds docker waits for the container to stop before killing it.
    #[arg(long, env = "RESTART_GRACE_SECS", default_value_t = 10)]
    pub restart_grace_secs: u64,
}

impl Config {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn upstream(&self) -> UpstreamTarget {
        UpstreamTarget::new(self.upstream_host.clone(), self.upstream_port)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_response_timeout_secs)
    }
}

/// The backend all proxied traffic is sent to. Fixed for the process lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamTarget {
    pub host: String,
    pub port: u16,
}

impl UpstreamTarget {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Absolute URL for a request-target taken from an inbound request.
    pub fn url_for(&self, path_and_query: &str) -> String {
        format!("http://{}{}", self, path_and_query)
    }
}

impl fmt::Display for UpstreamTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
