//! Configuration loaded from `stepflow.toml`.
//!
//! Values absent from the file fall back to local-development defaults. The
//! `QSTASH_TOKEN` and `QSTASH_URL` environment variables take precedence over
//! the file.

use anyhow::Result;
use serde::Deserialize;
use std::path::Path;

/// Top-level configuration loaded from `stepflow.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct StepflowConfig {
    /// Port the sequencer handler listens on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Base URL of the QStash broker.
    #[serde(default = "default_qstash_url")]
    pub qstash_url: String,

    /// Bearer token for the QStash publish API.
    #[serde(default)]
    pub qstash_token: String,

    /// Publicly reachable URL of our own delayed-sequence route, given to the
    /// broker for re-delivery. Derived from `port` when unset.
    #[serde(default)]
    pub handler_url: Option<String>,

    /// Timeout in seconds for outbound step, callback, and broker calls.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_port() -> u16 {
    4001
}

fn default_qstash_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for StepflowConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            qstash_url: default_qstash_url(),
            qstash_token: String::new(),
            handler_url: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl StepflowConfig {
    /// Load the configuration from `stepflow.toml` in the current directory,
    /// falling back to defaults when the file does not exist.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(Path::new("stepflow.toml"))?;

        // Environment takes precedence over the config file for broker settings.
        if let Ok(token) = std::env::var("QSTASH_TOKEN")
            && !token.is_empty()
        {
            config.qstash_token = token;
        }
        if let Ok(url) = std::env::var("QSTASH_URL")
            && !url.is_empty()
        {
            config.qstash_url = url;
        }

        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            Ok(toml::from_str::<StepflowConfig>(&contents)?)
        } else {
            Ok(Self::default())
        }
    }

    /// The URL the broker should deliver ticks to.
    pub fn handler_url(&self) -> String {
        self.handler_url.clone().unwrap_or_else(|| {
            format!(
                "http://localhost:{}/api/workflows/delayed-sequence",
                self.port
            )
        })
    }
}
