//! Configuration system for the mesh hub.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $MESHHUB_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/meshhub/config.toml
//!   3. ~/.config/meshhub/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::node::{NodeDef, NodeStatus};
use crate::wire::parse_address;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    pub timing: TimingConfig,
    pub link: LinkConfig,
    pub sink: SinkConfig,
    pub beacon: BeaconConfig,
    pub api: ApiConfig,
    /// Static allow-list. Addresses not listed are admitted as unknown.
    pub nodes: Vec<NodeDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Period of the resend loop.
    pub resend_period_secs: u64,
    /// Spacing between consecutive frames in a burst.
    pub send_delay_ms: u64,
    /// Ceiling on one awake cycle before the mesh is forced back to sleep.
    pub max_awake_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Local UDP socket the radio gateway talks to.
    pub bind: String,
    /// Gateway address. Datagrams from anywhere else are ignored.
    pub gateway: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// Base URL of the shadow endpoint. Required.
    pub endpoint_url: String,
    /// Prepended to the node address to form its thing name.
    pub thing_prefix: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BeaconConfig {
    pub enabled: bool,
    /// File the countdown is written to.
    pub path: PathBuf,
    /// Seconds between scheduled mesh syncs.
    pub period_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Local status API port. 0 = disabled.
    pub port: u16,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            resend_period_secs: 10,
            send_delay_ms: 50,
            max_awake_secs: 45,
        }
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:7600".to_string(),
            gateway: "127.0.0.1:7601".to_string(),
        }
    }
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            endpoint_url: String::new(),
            thing_prefix: "Sensor_".to_string(),
            timeout_secs: 10,
        }
    }
}

impl Default for BeaconConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: data_dir().join("sync-beacon"),
            period_secs: 180,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self { port: 9100 }
    }
}

impl HubConfig {
    /// The allow-list shipped with the hub.
    pub fn default_nodes() -> Vec<NodeDef> {
        vec![
            NodeDef::new("98:F4:AB:80:97:86", NodeStatus::Deployed),
            NodeDef::new("E8:DB:84:02:BD:12", NodeStatus::Testing),
        ]
    }
}

impl TimingConfig {
    pub fn resend_period(&self) -> Duration {
        Duration::from_secs(self.resend_period_secs)
    }

    pub fn send_delay(&self) -> Duration {
        Duration::from_millis(self.send_delay_ms)
    }

    pub fn max_awake(&self) -> Duration {
        Duration::from_secs(self.max_awake_secs)
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("meshhub")
}

pub fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".local").join("share"))
        .join("meshhub")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
    #[error("required setting {0} is missing")]
    MissingSetting(&'static str),
    #[error("allow-list address {0:?} is not colon-separated hex")]
    InvalidAddress(String),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl HubConfig {
    /// Load config: env vars → file → defaults.
    ///
    /// The shipped allow-list only applies when there is no file at all. A
    /// file without any `[[nodes]]` table means an empty allow-list.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            Self::from_file(&path)?
        } else {
            Self::with_default_nodes()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse one config file, without env overrides.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
        toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))
    }

    fn with_default_nodes() -> Self {
        Self {
            nodes: Self::default_nodes(),
            ..Self::default()
        }
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("MESHHUB_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&Self::with_default_nodes())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Reject configs the hub cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sink.endpoint_url.trim().is_empty() {
            return Err(ConfigError::MissingSetting("sink.endpoint_url"));
        }
        for node in &self.nodes {
            if parse_address(&node.address).is_err() {
                return Err(ConfigError::InvalidAddress(node.address.clone()));
            }
        }
        Ok(())
    }

    /// Apply MESHHUB_* env var overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("MESHHUB_SINK__ENDPOINT_URL") {
            self.sink.endpoint_url = v;
        }
        if let Ok(v) = std::env::var("MESHHUB_LINK__BIND") {
            self.link.bind = v;
        }
        if let Ok(v) = std::env::var("MESHHUB_LINK__GATEWAY") {
            self.link.gateway = v;
        }
        if let Ok(v) = std::env::var("MESHHUB_API__PORT") {
            if let Ok(p) = v.parse() {
                self.api.port = p;
            }
        }
        if let Ok(v) = std::env::var("MESHHUB_BEACON__ENABLED") {
            self.beacon.enabled = v == "true" || v == "1";
        }
    }
}
