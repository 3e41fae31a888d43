//! Configuration for the SancharLink daemon
//!
//! Loaded once at startup from a TOML file. This is process configuration
//! (sockets, timing, hardware scale); the properties the base station can
//! change at runtime live in [`crate::store::ConfigStore`].

use crate::dedup::DEFAULT_CAPACITY;
use crate::error::{Error, Result};
use crate::protocol::messages::DEFAULT_PROTOCOL_TAG;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Where a loaded configuration came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    File,
    /// The file did not exist
    Defaults,
}

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub network: NetworkConfig,
    pub protocol: ProtocolConfig,
    pub heartbeat: HeartbeatConfig,
    pub motors: MotorConfig,
    pub logging: LoggingConfig,
}

/// UDP socket settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address the command socket binds to
    ///
    /// Examples:
    /// - `0.0.0.0:8000` - all interfaces, base station default port
    /// - `127.0.0.1:0` - localhost, ephemeral port (tests)
    pub bind_address: String,

    /// Receive buffer size; longer datagrams are truncated and fail to decode
    pub frame_size: usize,

    /// Socket read timeout, bounds how long the listener takes to notice shutdown
    pub read_timeout_ms: u64,

    /// Fixed signal strength reported in heartbeats (dBm)
    pub rssi_dbm: i32,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8000".to_string(),
            frame_size: 2048,
            read_timeout_ms: 200,
            rssi_dbm: -50,
        }
    }
}

impl NetworkConfig {
    /// Parsed bind address
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.bind_address
            .parse()
            .map_err(|e| Error::Config(format!("bind_address {:?}: {}", self.bind_address, e)))
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// Protocol identity and request tracking
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Tag every datagram must carry in `protocol`
    pub tag: String,
    /// Robot id stamped on outbound messages
    pub robot_id: u16,
    /// Number of recent request ids remembered for duplicate suppression
    pub dedup_capacity: usize,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            tag: DEFAULT_PROTOCOL_TAG.to_string(),
            robot_id: 3,
            dedup_capacity: DEFAULT_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    pub period_ms: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self { period_ms: 2000 }
    }
}

impl HeartbeatConfig {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }
}

/// Actuator scale
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MotorConfig {
    /// Raw duty value for speed 100 (8-bit PWM = 255)
    pub duty_max: u16,
}

impl Default for MotorConfig {
    fn default() -> Self {
        Self { duty_max: 255 }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` overrides
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Load and validate configuration from a TOML file
    ///
    /// # Example
    /// ```no_run
    /// use sanchar_link::config::AppConfig;
    ///
    /// let config = AppConfig::from_file("sanchar.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`, or fall back to defaults when the file does not exist.
    ///
    /// Runs before logging is set up, so the caller reports the fallback.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<(Self, ConfigSource)> {
        let path = path.as_ref();
        if path.exists() {
            Ok((Self::from_file(path)?, ConfigSource::File))
        } else {
            Ok((Self::default(), ConfigSource::Defaults))
        }
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Reject values the daemon can not run with
    pub fn validate(&self) -> Result<()> {
        self.network.socket_addr()?;
        if self.network.frame_size == 0 {
            return Err(Error::Config("network.frame_size must be non-zero".into()));
        }
        if self.network.read_timeout_ms == 0 {
            return Err(Error::Config("network.read_timeout_ms must be non-zero".into()));
        }
        if self.protocol.tag.is_empty() {
            return Err(Error::Config("protocol.tag must not be empty".into()));
        }
        if self.protocol.dedup_capacity == 0 {
            return Err(Error::Config("protocol.dedup_capacity must be non-zero".into()));
        }
        if self.heartbeat.period_ms == 0 {
            return Err(Error::Config("heartbeat.period_ms must be non-zero".into()));
        }
        if self.motors.duty_max == 0 {
            return Err(Error::Config("motors.duty_max must be non-zero".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.network.bind_address, "0.0.0.0:8000");
        assert_eq!(config.network.frame_size, 2048);
        assert_eq!(config.protocol.tag, "robot-net/1.0");
        assert_eq!(config.protocol.dedup_capacity, 16);
        assert_eq!(config.heartbeat.period(), Duration::from_secs(2));
        assert_eq!(config.motors.duty_max, 255);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_serialization() {
        let toml_string = toml::to_string_pretty(&AppConfig::default()).unwrap();

        assert!(toml_string.contains("[network]"));
        assert!(toml_string.contains("[protocol]"));
        assert!(toml_string.contains("[heartbeat]"));
        assert!(toml_string.contains("[motors]"));
        assert!(toml_string.contains("[logging]"));
        assert!(toml_string.contains("tag = \"robot-net/1.0\""));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let toml_content = r#"
[network]
bind_address = "127.0.0.1:9000"

[heartbeat]
period_ms = 500

[logging]
level = "debug"
"#;

        let config: AppConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.network.bind_address, "127.0.0.1:9000");
        assert_eq!(config.network.frame_size, 2048);
        assert_eq!(config.heartbeat.period_ms, 500);
        assert_eq!(config.protocol.dedup_capacity, 16);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_shipped_config_parses() {
        let config: AppConfig = toml::from_str(include_str!("../sanchar.toml")).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.network.socket_addr().unwrap().port(), 8000);
        assert_eq!(config.protocol.robot_id, 3);
    }

    #[test]
    fn test_validation_rejects_zeroes() {
        let mut config = AppConfig::default();
        config.protocol.dedup_capacity = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.heartbeat.period_ms = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.network.read_timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.network.bind_address = "not an address".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sanchar.toml");

        let mut config = AppConfig::default();
        config.protocol.robot_id = 4;
        config.to_file(&path).unwrap();

        let (loaded, source) = AppConfig::load_or_default(&path).unwrap();
        assert_eq!(source, ConfigSource::File);
        assert_eq!(loaded.protocol.robot_id, 4);

        let (missing, source) = AppConfig::load_or_default(dir.path().join("absent.toml")).unwrap();
        assert_eq!(source, ConfigSource::Defaults);
        assert_eq!(missing.protocol.robot_id, 3);
    }
}
