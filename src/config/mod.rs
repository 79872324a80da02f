//! Configuration system for detserve
//!
//! One file describes the whole deployment: the target device, the model
//! bundles to load, which of them is the default, and the HTTP server
//! settings. JSON and YAML are both accepted; the path comes from
//! `--config` or the `DETSERVE_CONFIG` environment variable.

mod server;

pub use server::ServerConfig;

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

/// Environment variable naming the config file when `--config` is absent.
pub const CONFIG_ENV_VAR: &str = "DETSERVE_CONFIG";

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetServeConfig {
    /// CUDA device index to load engines on.
    #[serde(default)]
    pub device_id: usize,

    /// Name of the bundle used when clients ask for `"default"`.
    pub default_model_name: String,

    /// Model bundles to construct at startup.
    pub models: Vec<ModelConfig>,

    /// HTTP server settings (only for `detserve serve`).
    #[serde(default)]
    pub server: Option<ServerConfig>,
}

/// One configured model bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Bundle name clients select models by. `"default"` is reserved.
    pub name: String,

    /// Disabled bundles are skipped entirely at startup.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Number of engine instances to load for this bundle (coerced to at
    /// least 1).
    #[serde(default = "default_max_instances", alias = "max_model_limit")]
    pub max_instances: usize,

    /// Path to the serialized engine plan.
    #[serde(alias = "model_abs_path")]
    pub model_path: PathBuf,
}

fn default_true() -> bool {
    true
}

fn default_max_instances() -> usize {
    1
}

impl DetServeConfig {
    /// Load configuration from a file, dispatching on the extension
    /// (`.yaml`/`.yml` is YAML, anything else JSON).
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read config file: {}", path.display()))?;

        let config: Self = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)
                .with_context(|| format!("config YAML error: {}", path.display()))?,
            _ => serde_json::from_str(&content)
                .with_context(|| format!("config JSON error: {}", path.display()))?,
        };
        Ok(config)
    }

    /// Resolve the config path from an explicit override or
    /// [`CONFIG_ENV_VAR`], then load it.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => std::env::var(CONFIG_ENV_VAR)
                .map(PathBuf::from)
                .map_err(|_| anyhow!("no --config given and {CONFIG_ENV_VAR} is not set"))?,
        };
        if !path.exists() {
            return Err(anyhow!("config file not found: {}", path.display()));
        }
        tracing::info!(path = %path.display(), "loading config");
        Self::from_path(&path)
    }

    /// Server settings, falling back to defaults when the section is absent.
    pub fn server_config(&self) -> ServerConfig {
        self.server.clone().unwrap_or_default()
    }
}
