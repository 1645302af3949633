//! Server configuration module
//!
//! Loads the relay configuration from an optional TOML file, then applies
//! `RELAY_*` environment overrides. With neither present the defaults apply.

use std::env;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::game::registry::DEFAULT_OUTBOUND_CAPACITY;
use crate::game::world::DEFAULT_POLL_INTERVAL_MS;
use crate::DEFAULT_PORT;

/// Default configuration file location
const DEFAULT_CONFIG_PATH: &str = "config/relay.toml";

/// Largest accepted outbound queue capacity
const MAX_OUTBOUND_QUEUE: usize = 65536;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Path to the configuration file
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Server name shown in the startup banner
    #[serde(default = "default_server_name")]
    pub server_name: String,

    /// Address to bind the listener to
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// TCP port for client connections
    #[serde(default = "default_port")]
    pub port: u16,

    /// Frames each session may have queued before it is evicted
    #[serde(default = "default_outbound_queue_capacity")]
    pub outbound_queue_capacity: usize,

    /// How often the event driver polls the scheduler
    #[serde(default = "default_scheduler_poll_interval")]
    pub scheduler_poll_interval_ms: u64,

    /// Enable debug logging
    #[serde(default)]
    pub debug: bool,
}

fn default_server_name() -> String {
    "Relay".to_string()
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_outbound_queue_capacity() -> usize {
    DEFAULT_OUTBOUND_CAPACITY
}

fn default_scheduler_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from(DEFAULT_CONFIG_PATH),
            server_name: default_server_name(),
            bind_address: default_bind_address(),
            port: default_port(),
            outbound_queue_capacity: default_outbound_queue_capacity(),
            scheduler_poll_interval_ms: default_scheduler_poll_interval(),
            debug: false,
        }
    }
}

impl ServerConfig {
    /// Load configuration from file and environment variables.
    ///
    /// Runs before logging is initialized, so a missing file is reported by
    /// the caller (see `file_exists`).
    pub async fn load() -> Result<Self> {
        let config_path = env::var("RELAY_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

        let mut config = if config_path.exists() {
            let content = tokio::fs::read_to_string(&config_path)
                .await
                .with_context(|| {
                    format!("Failed to read config file: {}", config_path.display())
                })?;

            Self::from_toml(&content).with_context(|| {
                format!("Failed to parse config file: {}", config_path.display())
            })?
        } else {
            Self::default()
        };

        config.config_path = config_path;
        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Parse configuration from TOML text; missing keys take defaults
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("RELAY_SERVER_NAME") {
            self.server_name = val;
        }
        if let Ok(val) = env::var("RELAY_BIND_ADDRESS") {
            self.bind_address = val;
        }
        if let Ok(val) = env::var("RELAY_PORT") {
            if let Ok(port) = val.parse() {
                self.port = port;
            }
        }
        if let Ok(val) = env::var("RELAY_OUTBOUND_QUEUE") {
            if let Ok(capacity) = val.parse() {
                self.outbound_queue_capacity = capacity;
            }
        }
        if let Ok(val) = env::var("RELAY_SCHEDULER_POLL_MS") {
            if let Ok(ms) = val.parse() {
                self.scheduler_poll_interval_ms = ms;
            }
        }
        if let Ok(val) = env::var("RELAY_DEBUG") {
            self.debug = val.to_lowercase() == "true" || val == "1";
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.outbound_queue_capacity == 0 || self.outbound_queue_capacity > MAX_OUTBOUND_QUEUE {
            anyhow::bail!(
                "Outbound queue capacity must be between 1 and {}",
                MAX_OUTBOUND_QUEUE
            );
        }

        if self.scheduler_poll_interval_ms < 10 || self.scheduler_poll_interval_ms > 60_000 {
            anyhow::bail!("Scheduler poll interval must be between 10ms and 60000ms");
        }

        if self.bind_address.parse::<IpAddr>().is_err() {
            anyhow::bail!("Bind address is not an IP address: {}", self.bind_address);
        }

        Ok(())
    }

    /// Socket address the listener binds to
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self
            .bind_address
            .parse()
            .with_context(|| format!("Invalid bind address: {}", self.bind_address))?;
        Ok(SocketAddr::new(ip, self.port))
    }

    /// Whether the configuration file was present
    pub fn file_exists(&self) -> bool {
        self.config_path.exists()
    }

    pub fn scheduler_poll_interval(&self) -> Duration {
        Duration::from_millis(self.scheduler_poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.server_name, "Relay");
        assert_eq!(config.bind_address, "0.0.0.0");
        assert_eq!(config.port, 7777);
        assert_eq!(config.outbound_queue_capacity, 256);
        assert_eq!(config.scheduler_poll_interval_ms, 250);
        assert!(!config.debug);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml_partial() {
        let config = ServerConfig::from_toml("port = 9000\nserver_name = \"Test\"\n").unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.server_name, "Test");
        assert_eq!(config.outbound_queue_capacity, 256);
    }

    #[test]
    fn test_from_toml_rejects_bad_types() {
        assert!(ServerConfig::from_toml("port = \"seven\"").is_err());
    }

    #[test]
    fn test_listen_addr() {
        let mut config = ServerConfig::default();
        config.bind_address = "127.0.0.1".to_string();
        config.port = 8123;
        assert_eq!(
            config.listen_addr().unwrap(),
            "127.0.0.1:8123".parse::<SocketAddr>().unwrap()
        );
    }

    #[test]
    fn test_validation() {
        let mut config = ServerConfig::default();

        config.outbound_queue_capacity = 0;
        assert!(config.validate().is_err());
        config.outbound_queue_capacity = MAX_OUTBOUND_QUEUE + 1;
        assert!(config.validate().is_err());
        config.outbound_queue_capacity = 16;

        config.scheduler_poll_interval_ms = 5;
        assert!(config.validate().is_err());
        config.scheduler_poll_interval_ms = 100;

        config.bind_address = "not-an-ip".to_string();
        assert!(config.validate().is_err());
        config.bind_address = "::".to_string();
        assert!(config.validate().is_ok());
    }
}
