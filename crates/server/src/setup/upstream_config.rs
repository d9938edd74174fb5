//! Structured configuration file consumed by the upstream on start.

use api_types::Provider;
use serde_json::{Value, json};

use super::SetupSubmission;

pub const DEFAULT_OLLAMA_BASE_URL: &str = "http://host.docker.internal:11434/v1";

pub fn build(submission: &SetupSubmission, credential: &str) -> Value {
    let mut config = json!({
        "browser": {
            "headless": true,
            "noSandbox": true,
            "defaultProfile": "openclaw"
        },
        "agents": {
            "defaults": {
                "model": {
                    "primary": format!("{}/{}", submission.provider, submission.model)
                }
            }
        },
        "gateway": {
            "mode": "local",
            "bind": "lan",
            "controlUi": {
                "allowInsecureAuth": true
            },
            "auth": {
                "mode": "token",
                "token": credential
            }
        }
    });

    if submission.provider == Provider::Ollama
        && let Some(map) = config.as_object_mut()
    {
        let base_url = submission
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_OLLAMA_BASE_URL);
        map.insert(
            "models".to_string(),
            json!({
                "mode": "merge",
                "providers": {
                    "ollama": {
                        "baseUrl": base_url,
                        "apiKey": "ollama-local",
                        "api": "openai-completions",
                        "models": []
                    }
                }
            }),
        );
    }

    config
}
