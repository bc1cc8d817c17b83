use anyhow::Context;

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::consts::{APP_DIR_NAME, CONFIG_FILE_NAME, DEFAULT_BASE_NAME};

/// What to do with a link addressed to an instance that is not running.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MissingInstancePolicy {
    /// Hand the payload to the default instance instead.
    #[default]
    FallbackDefault,
    /// Drop the payload (this process keeps running without a window).
    Drop,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Config {
    #[serde(default = "default_base_name")]
    pub base_name: String,

    /// Socket directory (Unix). Unset means `paths::default_runtime_dir()`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_dir: Option<PathBuf>,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Unset means retry forever.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_election_attempts: Option<u32>,

    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,

    #[serde(default)]
    pub missing_instance: MissingInstancePolicy,
}

fn default_base_name() -> String {
    DEFAULT_BASE_NAME.to_string()
}

fn default_connect_timeout_ms() -> u64 {
    2000
}

fn default_retry_backoff_ms() -> u64 {
    800
}

fn default_max_payload_bytes() -> usize {
    64 * 1024 * 1024
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_name: default_base_name(),
            runtime_dir: None,
            connect_timeout_ms: default_connect_timeout_ms(),
            retry_backoff_ms: default_retry_backoff_ms(),
            max_election_attempts: None,
            max_payload_bytes: default_max_payload_bytes(),
            missing_instance: MissingInstancePolicy::default(),
        }
    }
}

impl Config {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms.max(1))
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn runtime_dir(&self) -> PathBuf {
        self.runtime_dir
            .clone()
            .unwrap_or_else(crate::paths::default_runtime_dir)
    }
}

pub fn config_path() -> PathBuf {
    let base = dirs::config_dir().unwrap_or_else(|| PathBuf::from(".config"));
    base.join(APP_DIR_NAME).join(CONFIG_FILE_NAME)
}

pub fn load_config_from(path: &Path) -> anyhow::Result<Config> {
    let s = std::fs::read_to_string(path)
        .with_context(|| format!("read config {}", path.display()))?;
    let cfg: Config = toml::from_str(&s).context("parse config")?;
    if cfg.base_name.trim().is_empty() {
        anyhow::bail!("config {}: base_name must not be empty", path.display());
    }
    Ok(cfg)
}
