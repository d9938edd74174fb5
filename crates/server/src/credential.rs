//! Bearer credential injected into every proxied request.

use std::{
    fmt, io,
    path::{Path, PathBuf},
};

use axum::http::HeaderValue;
use secrecy::{ExposeSecret, SecretString};
use utils::env_file::EnvFile;

/// Env file key holding the credential written by the setup flow.
pub const GATEWAY_TOKEN_KEY: &str = "OPENCLAW_GATEWAY_TOKEN";

/// An opaque bearer token. Empty means requests go upstream unauthenticated.
#[derive(Default)]
pub struct Credential(Option<SecretString>);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        let token = token.into();
        if token.is_empty() {
            Self(None)
        } else {
            Self(Some(SecretString::from(token)))
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    pub fn expose(&self) -> Option<&str> {
        self.0.as_ref().map(|s| s.expose_secret())
    }

    /// `Bearer <token>` marked sensitive, or `None` when there is no token or
    /// it cannot be carried in a header.
    pub fn bearer_header(&self) -> Option<HeaderValue> {
        let token = self.expose()?;
        match HeaderValue::from_str(&format!("Bearer {}", token)) {
            Ok(mut value) => {
                value.set_sensitive(true);
                Some(value)
            }
            Err(_) => {
                tracing::warn!(
                    token_len = token.len(),
                    "Gateway credential is not a valid header value; sending request unauthenticated"
                );
                None
            }
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(_) => f.write_str("Credential([REDACTED])"),
            None => f.write_str("Credential(empty)"),
        }
    }
}

/// Resolves the current credential from disk on every call.
///
/// The setup env file wins; the token file the upstream persists on its own is
/// the fallback for deployments that were never set up through the wizard or
/// where the upstream rotated its token.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    env_path: PathBuf,
    token_path: PathBuf,
}

impl CredentialStore {
    pub fn new(env_path: impl Into<PathBuf>, token_path: impl Into<PathBuf>) -> Self {
        Self {
            env_path: env_path.into(),
            token_path: token_path.into(),
        }
    }

    pub async fn resolve(&self) -> Credential {
        if let Some(contents) = read_optional(&self.env_path).await {
            let env = EnvFile::parse(&contents);
            if let Some(token) = env.get_non_empty(GATEWAY_TOKEN_KEY) {
                return Credential::new(token);
            }
        }

        match read_optional(&self.token_path).await {
            Some(contents) => Credential::new(contents.trim()),
            None => Credential::default(),
        }
    }
}

async fn read_optional(path: &Path) -> Option<String> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => Some(contents),
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to read credential source");
            None
        }
    }
}
