use std::{path::PathBuf, sync::Arc, time::Duration};

use crate::{
    config::{Config, UpstreamTarget},
    credential::CredentialStore,
    proxy,
    setup::{
        restart::{DockerRestart, RestartAction},
        store::ConfigStore,
    },
};

/// Everything a request handler needs. Cheap to clone; holds no mutable state.
#[derive(Clone)]
pub struct AppState {
    pub upstream: UpstreamTarget,
    pub store: ConfigStore,
    pub credentials: CredentialStore,
    pub restart: Arc<dyn RestartAction>,
    pub http: reqwest::Client,
    pub wizard_path: PathBuf,
    pub probe_timeout: Duration,
    /// Bound on the wait for an upstream response head.
    pub response_timeout: Duration,
}

impl AppState {
    pub fn new(
        upstream: UpstreamTarget,
        store: ConfigStore,
        restart: Arc<dyn RestartAction>,
        wizard_path: impl Into<PathBuf>,
        probe_timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self {
            upstream,
            credentials: store.credentials(),
            store,
            restart,
            http: proxy::http::build_client()?,
            wizard_path: wizard_path.into(),
            probe_timeout,
            response_timeout: proxy::http::DEFAULT_RESPONSE_TIMEOUT,
        })
    }

    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    pub fn from_config(config: &Config) -> Result<Self, reqwest::Error> {
        let restart = DockerRestart::new(
            &config.docker_socket,
            &config.web_container,
            Duration::from_secs(config.restart_grace_secs),
        );
        let state = Self::new(
            config.upstream(),
            ConfigStore::new(&config.config_dir),
            Arc::new(restart),
            &config.wizard_path,
            config.probe_timeout(),
        )?;
        Ok(state.with_response_timeout(config.response_timeout()))
    }
}
