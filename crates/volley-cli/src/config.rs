//! Configuration file for the Volley CLI.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use volley_core::{EngineConfig, RetryPolicy, Transport};

/// Volley configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Network configuration
    #[serde(default)]
    pub network: NetworkConfig,
    /// Transfer configuration
    #[serde(default)]
    pub transfer: TransferConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Port used when none is given on the command line
    #[serde(default = "default_port")]
    pub port: u16,
    /// Transport used when neither `--tcp` nor `--udp` is given
    #[serde(default = "default_protocol")]
    pub protocol: Transport,
    /// TCP connect budget in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Receive poll interval in milliseconds
    #[serde(default = "default_interval_ms")]
    pub poll_interval_ms: u64,
    /// Read timeout on accepted TCP streams in milliseconds
    #[serde(default = "default_interval_ms")]
    pub read_timeout_ms: u64,
}

/// Transfer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Default packet size in bytes
    #[serde(default = "default_packet_size")]
    pub packet_size: usize,
    /// Default number of times to send the packet
    #[serde(default = "default_packet_count")]
    pub packet_count: u64,
    /// Retries per TCP packet on transient send errors
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Sleep between TCP send retries in milliseconds
    #[serde(default = "default_interval_ms")]
    pub retry_backoff_ms: u64,
    /// Receive buffer size in bytes
    #[serde(default = "default_recv_buffer_size")]
    pub recv_buffer_size: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default values

fn default_port() -> u16 {
    7000
}

fn default_protocol() -> Transport {
    Transport::Udp
}

fn default_connect_timeout_ms() -> u64 {
    2000
}

fn default_interval_ms() -> u64 {
    100
}

fn default_packet_size() -> usize {
    1024
}

fn default_packet_count() -> u64 {
    1
}

fn default_max_retries() -> u32 {
    3
}

fn default_recv_buffer_size() -> usize {
    volley_core::RECV_BUFFER_SIZE
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            protocol: default_protocol(),
            connect_timeout_ms: default_connect_timeout_ms(),
            poll_interval_ms: default_interval_ms(),
            read_timeout_ms: default_interval_ms(),
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            packet_size: default_packet_size(),
            packet_count: default_packet_count(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_interval_ms(),
            recv_buffer_size: default_recv_buffer_size(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(path, contents)?;
        Ok(())
    }

    /// Get default config path
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("volley/config.toml")
    }

    /// Load config from default path, or create default if it doesn't exist
    ///
    /// # Errors
    ///
    /// Returns an error if reading or creating the config fails.
    pub fn load_or_default() -> anyhow::Result<Self> {
        let path = Self::default_path();

        if path.exists() {
            Self::load(&path)
        } else {
            let config = Self::default();
            config.save(&path)?;
            Ok(config)
        }
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns an error if configuration is invalid.
    pub fn validate(&self) -> anyhow::Result<()> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!(
                "Invalid log level: {}. Must be one of: {}",
                self.logging.level,
                valid_log_levels.join(", ")
            );
        }

        if self.network.connect_timeout_ms == 0 {
            anyhow::bail!("Connect timeout must be at least 1 ms");
        }

        if self.network.poll_interval_ms == 0 || self.network.read_timeout_ms == 0 {
            anyhow::bail!("Poll interval and read timeout must be at least 1 ms");
        }

        if self.transfer.packet_size == 0 {
            anyhow::bail!("Default packet size must be 1 or greater");
        }

        if self.transfer.packet_count == 0 {
            anyhow::bail!("Default packet count must be 1 or greater");
        }

        let recv_buffer = self.transfer.recv_buffer_size;
        if !(volley_core::RECV_BUFFER_SIZE..=16 * 1024 * 1024).contains(&recv_buffer) {
            anyhow::bail!("Receive buffer size must be between 64KB and 16MB");
        }

        Ok(())
    }

    /// Engine tunables described by this file.
    #[must_use]
    pub fn engine(&self) -> EngineConfig {
        EngineConfig {
            retry: RetryPolicy {
                max_retries: self.transfer.max_retries,
                backoff: Duration::from_millis(self.transfer.retry_backoff_ms),
            },
            connect_timeout: Duration::from_millis(self.network.connect_timeout_ms),
            poll_interval: Duration::from_millis(self.network.poll_interval_ms),
            read_timeout: Duration::from_millis(self.network.read_timeout_ms),
            recv_buffer_size: self.transfer.recv_buffer_size,
            ..EngineConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.network.port, 7000);
        assert_eq!(config.network.protocol, Transport::Udp);
        assert_eq!(config.transfer.packet_size, 1024);
        assert_eq!(config.transfer.max_retries, 3);
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());

        config.logging.level = "info".to_string();
        config.transfer.packet_count = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_recv_buffer_must_hold_a_datagram() {
        let mut config = Config::default();
        config.transfer.recv_buffer_size = 1024;
        assert!(config.validate().is_err());

        config.transfer.recv_buffer_size = 64 * 1024;
        assert!(config.validate().is_ok());

        config.transfer.recv_buffer_size = 32 * 1024 * 1024;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        let deserialized: Config = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.network.port, deserialized.network.port);
        assert_eq!(config.transfer.packet_size, deserialized.transfer.packet_size);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str("[network]\nprotocol = \"TCP\"\n").unwrap();
        assert_eq!(config.network.protocol, Transport::Tcp);
        assert_eq!(config.network.port, 7000);
        assert_eq!(config.transfer.packet_count, 1);
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/config.toml");

        let mut config = Config::default();
        config.transfer.packet_size = 4096;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.transfer.packet_size, 4096);
    }

    #[test]
    fn test_engine_conversion() {
        let mut config = Config::default();
        config.transfer.retry_backoff_ms = 5;
        config.network.connect_timeout_ms = 750;

        let engine = config.engine();
        assert_eq!(engine.retry.backoff, Duration::from_millis(5));
        assert_eq!(engine.connect_timeout, Duration::from_millis(750));
        assert_eq!(engine.max_packet_size, isize::MAX as usize);
    }
}
