//! Service configuration.
//!
//! Defaults are usable as-is for a local setup. An optional YAML file named by
//! `ADMIN_CONFIG` overrides them, and `LISTEN` overrides the listen address.

use anyhow::Context;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub paths: PathsConfig,
    pub agent: AgentConfig,
    pub screen: ScreenConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
}

/// Filesystem locations used by the admin service.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Holds `templates/` and `static/`
    pub data_dir: PathBuf,
    /// Holds `index.json` and one `<uid>.json` per profile
    pub profiles_dir: PathBuf,
}

/// Remote session agent running on the target host.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub port: u16,
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
}

/// Local relay for the remote screen-sharing session.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScreenConfig {
    pub listen_addr: String,
    pub target_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".to_string(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            profiles_dir: PathBuf::from("profiles"),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            port: 8182,
            connect_timeout_ms: 5_000,
            request_timeout_ms: 30_000,
        }
    }
}

impl Default for ScreenConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:5935".to_string(),
            target_port: 5935,
        }
    }
}

impl PathsConfig {
    pub fn templates_dir(&self) -> PathBuf {
        self.data_dir.join("templates")
    }

    pub fn static_dir(&self) -> PathBuf {
        self.data_dir.join("static")
    }
}

impl AgentConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Config {
    /// Loads configuration from `ADMIN_CONFIG` (if set) and applies the
    /// `LISTEN` override.
    pub fn load() -> anyhow::Result<Self> {
        let mut cfg = match std::env::var("ADMIN_CONFIG") {
            Ok(path) => {
                let raw = std::fs::read_to_string(&path)
                    .with_context(|| format!("failed to read config file {}", path))?;
                Self::from_yaml_str(&raw)?
            }
            Err(_) => Self::default(),
        };

        if let Ok(listen) = std::env::var("LISTEN") {
            cfg.server.listen_addr = listen;
        }

        Ok(cfg)
    }

    pub fn from_yaml_str(raw: &str) -> anyhow::Result<Self> {
        serde_yaml::from_str(raw).context("invalid YAML configuration")
    }
}
