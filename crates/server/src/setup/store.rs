//! Files shared with the upstream container.
//!
//! Layout of the config directory:
//! - `openclaw.env`: key=value env file the orchestrator loads for the upstream
//! - `openclaw.json`: the upstream's structured configuration
//! - `.setup-complete`: marker written last; its presence means "configured"
//! - `.gateway_token`: credential the upstream persists on its own (read only)

use std::{
    io,
    path::{Path, PathBuf},
};

use api_types::{Provider, SetupFields};
use thiserror::Error;
use utils::env_file::{EnvFile, EnvFileWriter};

use super::{SetupSubmission, upstream_config};
use crate::{
    credential::{CredentialStore, GATEWAY_TOKEN_KEY},
    gate::SetupState,
};

pub const ENV_FILE_NAME: &str = "openclaw.env";
pub const CONFIG_JSON_NAME: &str = "openclaw.json";
pub const MARKER_FILE_NAME: &str = ".setup-complete";
pub const UPSTREAM_TOKEN_FILE_NAME: &str = ".gateway_token";

const BOOTSTRAP_HEADER: &str = "OpenClaw configuration";
const MANAGED_HEADER: &str = "OpenClaw configuration (managed by setup wizard)";

const PROVIDER_KEY: &str = "OPENCLAW_PROVIDER";
const MODEL_KEY: &str = "OPENCLAW_MODEL";
const ANTHROPIC_KEY: &str = "ANTHROPIC_API_KEY";
const OPENAI_KEY: &str = "OPENAI_API_KEY";
const OPENROUTER_KEY: &str = "OPENROUTER_API_KEY";
const OLLAMA_BASE_URL_KEY: &str = "OLLAMA_BASE_URL";
const TELEGRAM_KEY: &str = "TELEGRAM_BOT_TOKEN";
const DISCORD_KEY: &str = "DISCORD_BOT_TOKEN";

#[derive(Debug, Error)]
pub enum ConfigStoreError {
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to serialize upstream config: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Env variable carrying the API key for `provider`, if it takes one.
fn api_key_var(provider: Provider) -> Option<&'static str> {
    match provider {
        Provider::Anthropic => Some(ANTHROPIC_KEY),
        Provider::Openai => Some(OPENAI_KEY),
        Provider::Openrouter => Some(OPENROUTER_KEY),
        Provider::Ollama => None,
    }
}

#[derive(Debug, Clone)]
pub struct ConfigStore {
    dir: PathBuf,
}

impl ConfigStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn env_path(&self) -> PathBuf {
        self.dir.join(ENV_FILE_NAME)
    }

    pub fn config_json_path(&self) -> PathBuf {
        self.dir.join(CONFIG_JSON_NAME)
    }

    pub fn marker_path(&self) -> PathBuf {
        self.dir.join(MARKER_FILE_NAME)
    }

    pub fn upstream_token_path(&self) -> PathBuf {
        self.dir.join(UPSTREAM_TOKEN_FILE_NAME)
    }

    pub fn credentials(&self) -> CredentialStore {
        CredentialStore::new(self.env_path(), self.upstream_token_path())
    }

    /// Make sure the directory and an env file exist; the orchestrator refuses
    /// to start the upstream when its env file is missing. Failures are logged
    /// and otherwise ignored.
    pub async fn bootstrap(&self) {
        if let Err(e) = tokio::fs::create_dir_all(&self.dir).await {
            tracing::error!(dir = %self.dir.display(), error = %e, "Failed to create config directory");
            return;
        }

        let env_path = self.env_path();
        match tokio::fs::try_exists(&env_path).await {
            Ok(true) => {}
            Ok(false) => {
                let contents = EnvFileWriter::with_header(BOOTSTRAP_HEADER).finish();
                if let Err(e) = tokio::fs::write(&env_path, contents).await {
                    tracing::error!(path = %env_path.display(), error = %e, "Failed to create env file");
                }
            }
            Err(e) => {
                tracing::error!(path = %env_path.display(), error = %e, "Failed to check env file");
            }
        }
    }

    /// Presence of the completion marker. Read errors count as unconfigured.
    pub async fn is_configured(&self) -> bool {
        tokio::fs::try_exists(self.marker_path())
            .await
            .unwrap_or(false)
    }

    pub async fn setup_state(&self) -> SetupState {
        SetupState::from_marker(self.is_configured().await)
    }

    /// Persist a submission. The marker is written last so a partial write
    /// leaves the gateway unconfigured.
    pub async fn write_config(
        &self,
        submission: &SetupSubmission,
        credential: &str,
    ) -> Result<(), ConfigStoreError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| ConfigStoreError::Write {
                path: self.dir.clone(),
                source,
            })?;

        write_file(&self.env_path(), render_env_file(submission, credential)).await?;

        let json = serde_json::to_string_pretty(&upstream_config::build(submission, credential))?;
        write_file(&self.config_json_path(), json).await?;

        write_file(&self.marker_path(), chrono::Utc::now().to_rfc3339()).await?;

        tracing::info!(
            dir = %self.dir.display(),
            provider = %submission.provider,
            model = %submission.model,
            "Saved setup configuration"
        );
        Ok(())
    }

    /// The persisted form fields, for pre-filling the wizard. Never includes
    /// the gateway credential.
    pub async fn read_config(&self) -> SetupFields {
        let env_path = self.env_path();
        let contents = match tokio::fs::read_to_string(&env_path).await {
            Ok(contents) => contents,
            Err(e) => {
                if e.kind() != io::ErrorKind::NotFound {
                    tracing::warn!(path = %env_path.display(), error = %e, "Failed to read env file");
                }
                return SetupFields::default();
            }
        };
        fields_from_env(&EnvFile::parse(&contents))
    }
}

async fn write_file(path: &Path, contents: String) -> Result<(), ConfigStoreError> {
    tokio::fs::write(path, contents)
        .await
        .map_err(|source| ConfigStoreError::Write {
            path: path.to_path_buf(),
            source,
        })
}

fn render_env_file(submission: &SetupSubmission, credential: &str) -> String {
    let provider = submission.provider;
    let mut env = EnvFileWriter::with_header(MANAGED_HEADER)
        .set(PROVIDER_KEY, provider.as_str())
        .set(MODEL_KEY, &submission.model);

    env = match api_key_var(provider) {
        Some(key) => env.set(key, submission.api_key.as_deref().unwrap_or_default()),
        None => env.set_if_present(OLLAMA_BASE_URL_KEY, submission.base_url.as_deref()),
    };

    // The embeddings key rides on the OpenAI variable, which an OpenAI
    // provider already owns.
    if provider != Provider::Openai {
        env = env.set_if_present(OPENAI_KEY, submission.embeddings_key.as_deref());
    }

    env.set_if_present(TELEGRAM_KEY, submission.telegram_token.as_deref())
        .set_if_present(DISCORD_KEY, submission.discord_token.as_deref())
        .set(GATEWAY_TOKEN_KEY, credential)
        .finish()
}

fn fields_from_env(env: &EnvFile) -> SetupFields {
    let provider = env
        .get(PROVIDER_KEY)
        .and_then(|p| p.parse::<Provider>().ok())
        .unwrap_or_default();
    let value = |key: &str| env.get(key).unwrap_or_default().to_string();

    SetupFields {
        provider,
        api_key: api_key_var(provider).map(value).unwrap_or_default(),
        model: value(MODEL_KEY),
        base_url: value(OLLAMA_BASE_URL_KEY),
        telegram_token: value(TELEGRAM_KEY),
        discord_token: value(DISCORD_KEY),
        embeddings_key: if provider == Provider::Openai {
            String::new()
        } else {
            value(OPENAI_KEY)
        },
    }
}
