use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::application::services::{DEFAULT_CHAT_TIMEOUT, DEFAULT_TOP_K};
use crate::infrastructure::http_client::{DEFAULT_CHAT_ENDPOINT, DEFAULT_CHAT_MODEL};

/// Default filename used to persist configuration within the data directory.
const CONFIG_FILENAME: &str = "config.json";

pub const ENV_DATA_DIR: &str = "LIFTKB_DATA_DIR";
pub const ENV_SERVICE_HOST: &str = "LIFTKB_SERVICE_HOST";
pub const ENV_SERVICE_PORT: &str = "LIFTKB_SERVICE_PORT";
pub const ENV_CHAT_ENDPOINT: &str = "LIFTKB_CHAT_ENDPOINT";
pub const ENV_CHAT_MODEL: &str = "LIFTKB_CHAT_MODEL";
pub const ENV_CHAT_TIMEOUT_SECS: &str = "LIFTKB_CHAT_TIMEOUT_SECS";

/// Declarative list of embedding backends compiled into the binary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "backend", rename_all = "kebab-case")]
pub enum EmbeddingBackend {
    /// Lightweight deterministic hash embedder (always available).
    Simple {
        #[serde(default = "default_simple_model")]
        model: String,
        #[serde(default = "default_simple_dim")]
        dimensions: usize,
    },
    /// Semantic embeddings powered by FastEmbed (feature gated).
    #[cfg(feature = "fastembed-engine")]
    FastEmbed { model: String },
}

impl EmbeddingBackend {
    pub fn id(&self) -> &'static str {
        match self {
            EmbeddingBackend::Simple { .. } => "simple",
            #[cfg(feature = "fastembed-engine")]
            EmbeddingBackend::FastEmbed { .. } => "fastembed",
        }
    }

    pub fn model_name(&self) -> &str {
        match self {
            EmbeddingBackend::Simple { model, .. } => model,
            #[cfg(feature = "fastembed-engine")]
            EmbeddingBackend::FastEmbed { model } => model,
        }
    }
}

impl Default for EmbeddingBackend {
    fn default() -> Self {
        EmbeddingBackend::Simple {
            model: default_simple_model(),
            dimensions: default_simple_dim(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatSettings {
    #[serde(default = "default_chat_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_chat_model")]
    pub model: String,
    #[serde(default = "default_chat_timeout_secs")]
    pub timeout_secs: u64,
}

impl ChatSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            endpoint: default_chat_endpoint(),
            model: default_chat_model(),
            timeout_secs: default_chat_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl ServiceSettings {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetrievalSettings {
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            default_top_k: default_top_k(),
        }
    }
}

/// Complete persisted configuration payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppConfig {
    #[serde(default)]
    pub embedding: EmbeddingBackend,
    #[serde(default)]
    pub chat: ChatSettings,
    #[serde(default)]
    pub service: ServiceSettings,
    #[serde(default)]
    pub retrieval: RetrievalSettings,
}

impl AppConfig {
    /// Loads `<data_dir>/config.json`, falling back to defaults, then applies environment overrides.
    pub fn load(data_dir: impl AsRef<Path>) -> Self {
        let path = data_dir.as_ref().join(CONFIG_FILENAME);
        let mut config = if path.exists() {
            match fs::read(&path)
                .map_err(|err| err.to_string())
                .and_then(|bytes| {
                    serde_json::from_slice::<AppConfig>(&bytes).map_err(|err| err.to_string())
                }) {
                Ok(config) => config,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "ignoring unreadable config file");
                    AppConfig::default()
                }
            }
        } else {
            AppConfig::default()
        };

        config.apply_overrides(|key| env::var(key).ok());
        config
    }

    /// Applies overrides from any key lookup (the process environment in production).
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(host) = lookup(ENV_SERVICE_HOST) {
            self.service.host = host;
        }
        if let Some(port) = lookup(ENV_SERVICE_PORT).and_then(|p| p.parse().ok()) {
            self.service.port = port;
        }
        if let Some(endpoint) = lookup(ENV_CHAT_ENDPOINT) {
            self.chat.endpoint = endpoint;
        }
        if let Some(model) = lookup(ENV_CHAT_MODEL) {
            self.chat.model = model;
        }
        if let Some(secs) = lookup(ENV_CHAT_TIMEOUT_SECS).and_then(|s| s.parse().ok()) {
            self.chat.timeout_secs = secs;
        }
    }

    /// Writes the configuration back to `<data_dir>/config.json`.
    pub fn save(&self, data_dir: impl AsRef<Path>) -> std::io::Result<()> {
        let dir = data_dir.as_ref();
        fs::create_dir_all(dir)?;
        let payload = serde_json::to_vec_pretty(self)?;
        fs::write(dir.join(CONFIG_FILENAME), payload)
    }
}

/// `LIFTKB_DATA_DIR` if set, otherwise the OS data directory.
pub fn resolve_data_dir() -> anyhow::Result<PathBuf> {
    let dir = match env::var(ENV_DATA_DIR) {
        Ok(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
        _ => directories::ProjectDirs::from("dev", "liftkb", "LiftKB")
            .ok_or_else(|| anyhow::anyhow!("unable to determine OS data dir"))?
            .data_dir()
            .to_path_buf(),
    };
    Ok(dir)
}

const fn default_simple_dim() -> usize {
    384
}

fn default_simple_model() -> String {
    "liftkb/simple-hash".to_string()
}

fn default_chat_endpoint() -> String {
    DEFAULT_CHAT_ENDPOINT.to_string()
}

fn default_chat_model() -> String {
    DEFAULT_CHAT_MODEL.to_string()
}

const fn default_chat_timeout_secs() -> u64 {
    DEFAULT_CHAT_TIMEOUT.as_secs()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

const fn default_port() -> u16 {
    8001
}

const fn default_top_k() -> usize {
    DEFAULT_TOP_K
}
