//! Service configuration
//!
//! Handles loading and saving the adapter's settings. Everything has a
//! default, so a missing file or an empty table is fine.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::network::ConnectionConfig;
use crate::protocol::DEFAULT_PORT;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Main service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Command handling settings
    #[serde(default)]
    pub service: ServiceSettings,

    /// Reader connection settings
    #[serde(default)]
    pub network: NetworkSettings,

    /// Discovery settings
    #[serde(default)]
    pub discovery: DiscoverySettings,
}

/// Command handling settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSettings {
    /// Deadline for one read/write batch in ms
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
    /// Time granted to graceful shutdown in ms
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_ms: u64,
}

fn default_request_timeout() -> u64 {
    30_000
}

fn default_shutdown_grace() -> u64 {
    1_000
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout(),
            shutdown_grace_ms: default_shutdown_grace(),
        }
    }
}

impl ServiceSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

/// Reader connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSettings {
    /// TCP connect timeout in ms
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
    /// Grace for the CloseConnection exchange in ms
    #[serde(default = "default_close_timeout")]
    pub close_timeout_ms: u64,
    /// Reconnect backoff ladder in ms; the last entry repeats
    #[serde(default = "default_backoff")]
    pub backoff_ms: Vec<u64>,
    /// Capacity of the per-device notification channel
    #[serde(default = "default_notification_buffer")]
    pub notification_buffer: usize,
}

fn default_connect_timeout() -> u64 {
    5_000
}

fn default_close_timeout() -> u64 {
    1_000
}

fn default_backoff() -> Vec<u64> {
    vec![1_000, 2_000, 4_000, 8_000, 30_000]
}

fn default_notification_buffer() -> usize {
    64
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout(),
            close_timeout_ms: default_close_timeout(),
            backoff_ms: default_backoff(),
            notification_buffer: default_notification_buffer(),
        }
    }
}

/// Discovery settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoverySettings {
    /// Probe the candidate hosts once at startup
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Hosts (or addresses) to probe
    #[serde(default)]
    pub hosts: Vec<String>,
    /// Port to probe on
    #[serde(default = "default_port")]
    pub port: u16,
    /// Per-host probe deadline in ms
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_ms: u64,
}

fn default_true() -> bool {
    true
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_probe_timeout() -> u64 {
    500
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            hosts: Vec::new(),
            port: default_port(),
            probe_timeout_ms: default_probe_timeout(),
        }
    }
}

impl DiscoverySettings {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

impl ServiceConfig {
    /// Load configuration from a file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: ServiceConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from the default locations
    pub fn load_default() -> ConfigResult<Self> {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("llrp-bridge/config.toml")),
            Some(PathBuf::from("./llrp-bridge.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                return Self::load(path);
            }
        }

        // Return default config if no file found
        Ok(Self::default())
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let contents = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, contents)?;
        Ok(())
    }

    /// The connection settings in the form the network layer wants.
    pub fn connection(&self) -> ConnectionConfig {
        ConnectionConfig {
            connect_timeout: Duration::from_millis(self.network.connect_timeout_ms),
            close_timeout: Duration::from_millis(self.network.close_timeout_ms),
            backoff: self
                .network
                .backoff_ms
                .iter()
                .map(|ms| Duration::from_millis(*ms))
                .collect(),
            notification_buffer: self.network.notification_buffer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = ServiceConfig::default();
        assert_eq!(config.discovery.port, DEFAULT_PORT);
        assert_eq!(config.service.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.service.shutdown_grace(), Duration::from_secs(1));
    }

    #[test]
    fn test_save_and_load() {
        let mut config = ServiceConfig::default();
        config.discovery.hosts = vec!["192.168.1.78".to_string()];
        let file = NamedTempFile::new().unwrap();

        config.save(file.path()).unwrap();

        let loaded = ServiceConfig::load(file.path()).unwrap();
        assert_eq!(loaded.discovery.hosts, config.discovery.hosts);
        assert_eq!(loaded.network.backoff_ms, config.network.backoff_ms);
    }

    #[test]
    fn test_partial_file_gets_defaults() {
        let parsed: ServiceConfig =
            toml::from_str("[service]\nrequest_timeout_ms = 1000\n").unwrap();
        assert_eq!(parsed.service.request_timeout_ms, 1_000);
        assert_eq!(parsed.service.shutdown_grace_ms, default_shutdown_grace());
        assert_eq!(parsed.network.connect_timeout_ms, default_connect_timeout());
    }

    #[test]
    fn test_connection_mapping() {
        let config = ServiceConfig::default();
        let connection = config.connection();
        assert_eq!(connection.connect_timeout, Duration::from_secs(5));
        assert_eq!(
            connection.backoff,
            [1, 2, 4, 8, 30]
                .into_iter()
                .map(Duration::from_secs)
                .collect::<Vec<_>>()
        );
    }
}
