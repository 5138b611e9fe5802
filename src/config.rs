//! Configuration handling for vpn-kill-users

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

const LOCAL_CONFIG: &str = "vpn-kill-users.toml";
const HOME_CONFIG_DIR: &str = ".vpn-kill-users";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub management: ManagementConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oracle: Option<OracleConfig>,
}

/// Tuning for the OpenVPN management socket conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagementConfig {
    /// How long the drain loop waits for more data before calling a reply done
    pub poll_interval_ms: u64,
    /// Bytes requested per read while draining a reply
    pub read_chunk_size: usize,
    /// Size of the single read that discards the welcome banner
    pub banner_size: usize,
    /// Upper bound on waiting for the welcome banner
    pub greeting_timeout_secs: u64,
}

impl Default for ManagementConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            read_chunk_size: 1024,
            banner_size: 1024,
            greeting_timeout_secs: 5,
        }
    }
}

impl ManagementConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn greeting_timeout(&self) -> Duration {
        Duration::from_secs(self.greeting_timeout_secs)
    }
}

/// Which authorization backend decides if a user may stay on the VPN
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum OracleConfig {
    /// Fixed list of allowed usernames
    Allowlist {
        #[serde(default)]
        users: Vec<String>,
    },
    /// Remote IAM endpoint answering `{"allowed": bool}`
    Http {
        url: String,
        #[serde(default = "default_http_timeout")]
        timeout_secs: u64,
        #[serde(default = "default_fail_open")]
        fail_open: bool,
    },
}

fn default_http_timeout() -> u64 {
    5
}

fn default_fail_open() -> bool {
    true
}

impl Config {
    /// Starter config written by `--init`: an HTTP oracle that fails open
    pub fn template() -> Self {
        Self {
            management: ManagementConfig::default(),
            oracle: Some(OracleConfig::Http {
                url: "https://iam.example.com/vpn/allowed".to_string(),
                timeout_secs: default_http_timeout(),
                fail_open: default_fail_open(),
            }),
        }
    }

    /// Where `--init` writes, and the first place [`Config::discover`] looks
    pub fn local_path() -> PathBuf {
        PathBuf::from(LOCAL_CONFIG)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load config from an explicit path, or fall back to the default locations
    ///
    /// Search order: `./vpn-kill-users.toml`, then
    /// `~/.vpn-kill-users/config.toml`. With no file anywhere the built-in
    /// defaults are used, which carry no oracle.
    pub fn discover(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            debug!("Loading config from {}", path.display());
            return Self::load(path);
        }

        for candidate in default_locations() {
            if candidate.exists() {
                info!("Loading config from {}", candidate.display());
                return Self::load(&candidate);
            }
        }

        info!("No config file found, using defaults");
        Ok(Config::default())
    }
}

fn default_locations() -> Vec<PathBuf> {
    let mut locations = vec![PathBuf::from(LOCAL_CONFIG)];
    if let Some(home) = dirs::home_dir() {
        locations.push(home.join(HOME_CONFIG_DIR).join("config.toml"));
    }
    locations
}
