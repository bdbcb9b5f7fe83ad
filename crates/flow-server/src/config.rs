//! Server configuration for flow-server.
//!
//! Loads and parses `flow-server.toml`, with `HOST`/`PORT` environment
//! overrides, following the teacher's `ServerConfig::load` search order.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerConfigError {
    #[error("failed to read config file: {0}")]
    ReadError(std::io::Error),
    #[error("failed to parse TOML: {0}")]
    ParseError(toml::de::Error),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Server identification, surfaced in diagnostics only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfoConfig {
    #[serde(default = "default_server_name")]
    pub name: String,
}

impl Default for ServerInfoConfig {
    fn default() -> Self {
        Self { name: default_server_name() }
    }
}

fn default_server_name() -> String {
    "flow-server".to_string()
}

/// Network bind address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self { host: default_host(), port: default_port() }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Execution scheduling parameters (spec §5 "worker count W").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self { workers: default_workers() }
    }
}

fn default_workers() -> usize {
    4
}

/// Per-user admission control parameters (spec §4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionConfig {
    #[serde(default = "default_max_per_user")]
    pub max_per_user: u32,
    #[serde(default = "default_backoff_base_secs")]
    pub backoff_base_secs: u64,
    #[serde(default = "default_backoff_jitter_secs")]
    pub backoff_jitter_secs: u64,
}

impl AdmissionConfig {
    pub fn backoff_base(&self) -> Duration {
        Duration::from_secs(self.backoff_base_secs)
    }

    pub fn backoff_jitter(&self) -> Duration {
        Duration::from_secs(self.backoff_jitter_secs)
    }
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            max_per_user: default_max_per_user(),
            backoff_base_secs: default_backoff_base_secs(),
            backoff_jitter_secs: default_backoff_jitter_secs(),
        }
    }
}

fn default_max_per_user() -> u32 {
    3
}

fn default_backoff_base_secs() -> u64 {
    6
}

fn default_backoff_jitter_secs() -> u64 {
    3
}

/// SSE bridge polling parameters (spec §4.9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SseConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_max_messages_per_read")]
    pub max_messages_per_read: usize,
    #[serde(default = "default_error_backoff_ms")]
    pub error_backoff_ms: u64,
}

impl SseConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }
}

impl Default for SseConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            max_messages_per_read: default_max_messages_per_read(),
            error_backoff_ms: default_error_backoff_ms(),
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    5_000
}

fn default_max_messages_per_read() -> usize {
    50
}

fn default_error_backoff_ms() -> u64 {
    200
}

/// Complete server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: ServerInfoConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub admission: AdmissionConfig,
    #[serde(default)]
    pub sse: SseConfig,
}

impl ServerConfig {
    pub fn from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ServerConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(ServerConfigError::ReadError)?;
        Self::from_str(&content)
    }

    pub fn from_str(content: &str) -> Result<Self, ServerConfigError> {
        toml::from_str(content).map_err(ServerConfigError::ParseError)
    }

    /// Loads configuration from (in order): `CONFIG_PATH`, then
    /// `config/flow-server.toml`, then `../config/flow-server.toml`. Falls
    /// back to defaults if none is found; `HOST`/`PORT` env vars always win.
    pub fn load() -> Result<Self, ServerConfigError> {
        let mut config = if let Ok(config_path) = std::env::var("CONFIG_PATH") {
            Self::from_file(config_path)?
        } else {
            let paths = [
                PathBuf::from("config/flow-server.toml"),
                PathBuf::from("../config/flow-server.toml"),
                PathBuf::from("./flow-server.toml"),
            ];
            match paths.iter().find(|p| p.exists()) {
                Some(path) => Self::from_file(path)?,
                None => Self::default(),
            }
        };

        if let Ok(host) = std::env::var("HOST") {
            config.network.host = host;
        }
        if let Ok(port) = std::env::var("PORT") {
            config.network.port =
                port.parse().map_err(|_| ServerConfigError::InvalidConfig("PORT must be a valid u16".into()))?;
        }

        Ok(config)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.network.host, self.network.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable_without_a_config_file() {
        let config = ServerConfig::default();
        assert_eq!(config.network.port, 8080);
        assert_eq!(config.admission.max_per_user, 3);
    }

    #[test]
    fn parses_a_minimal_toml_document() {
        let toml_content = r#"
[network]
host = "0.0.0.0"
port = 9090

[admission]
max_per_user = 1
backoff_base_secs = 6
backoff_jitter_secs = 3
"#;
        let config = ServerConfig::from_str(toml_content).unwrap();
        assert_eq!(config.network.host, "0.0.0.0");
        assert_eq!(config.network.port, 9090);
        assert_eq!(config.admission.max_per_user, 1);
        assert_eq!(config.bind_addr(), "0.0.0.0:9090");
    }
}
