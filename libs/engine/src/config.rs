use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use observer_api::TopicSuffixes;
use observer_bridge::DEFAULT_MAX_FRAME_BYTES;

use crate::error::ConfigError;

// ---- TOML Config ----

/// Test-process side configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ObserverConfig {
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub topic_suffixes: TopicSuffixes,
    #[serde(default)]
    pub assertions: AssertionConfig,
    /// Record messages injected through the publish path as published.
    #[serde(default)]
    pub listen_published_messages: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    #[serde(default = "default_host")]
    pub host: String,
    /// `0` binds an ephemeral port.
    #[serde(default)]
    pub port: u16,
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: 0,
            max_frame_bytes: default_max_frame_bytes(),
        }
    }
}

impl BridgeConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssertionConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for AssertionConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl AssertionConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_max_frame_bytes() -> usize {
    DEFAULT_MAX_FRAME_BYTES
}
fn default_poll_interval_ms() -> u64 {
    50
}

impl ObserverConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.display().to_string(),
                source,
            },
            other => other,
        })
    }

    /// Like [`Self::load`], but a missing file yields the defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!(path = %path.display(), "config not found, using defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: "<inline>".to_string(),
            source,
        })
    }
}
