//! Service configuration
//!
//! Loaded through [`common::load_config`]: built-in defaults, then an optional
//! YAML/TOML/JSON file, then `METERSRV_` environment variables.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use common::LogConfig;
use serde::{Deserialize, Serialize};
use tracing::Level;

use crate::error::{ErrorExt, MeterSrvError, Result};
use crate::history::HistoryPolicy;
use crate::model::ConnectionConfig;

/// Prefix of environment overrides; nested keys are separated by `__`
pub const ENV_PREFIX: &str = "METERSRV_";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeterSrvConfig {
    pub service: ServiceConfig,
    pub logging: LoggingConfig,
    pub history: HistoryPolicy,
    pub runtime: RuntimeConfig,
    pub codec: CodecConfig,
    pub serial: SerialConfig,
    pub connections: Vec<ConnectionConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_service_name")]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            description: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Console log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// File log level
    #[serde(default = "default_file_log_level")]
    pub file_level: String,

    /// Log directory; `METERLINK_LOG_DIR` takes precedence
    #[serde(default)]
    pub dir: Option<String>,

    #[serde(default = "default_true")]
    pub enable_file: bool,

    /// JSON lines in the log file
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file_level: default_file_log_level(),
            dir: None,
            enable_file: true,
            json: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Period of connection duration reports
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Size of a single read from the serial port
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            read_buffer_size: default_read_buffer_size(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodecConfig {
    /// Reject SML messages whose CRC does not match
    #[serde(default = "default_true")]
    pub verify_crc: bool,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self { verify_crc: true }
    }
}

/// Serial line settings shared by all connections
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerialConfig {
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    /// `none`, `odd` or `even`
    #[serde(default = "default_parity")]
    pub parity: String,
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: default_baud_rate(),
            data_bits: default_data_bits(),
            parity: default_parity(),
            stop_bits: default_stop_bits(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_service_name() -> String {
    "metersrv".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_file_log_level() -> String {
    "debug".to_string()
}

fn default_tick_interval_ms() -> u64 {
    1000
}

fn default_read_buffer_size() -> usize {
    1024
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_data_bits() -> u8 {
    8
}

fn default_parity() -> String {
    "none".to_string()
}

fn default_stop_bits() -> u8 {
    1
}

impl MeterSrvConfig {
    /// Load and validate
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config: Self = common::load_config(path, ENV_PREFIX)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.runtime.tick_interval_ms == 0 {
            return Err(MeterSrvError::config("runtime.tick_interval_ms must be greater than 0"));
        }
        if self.runtime.read_buffer_size == 0 {
            return Err(MeterSrvError::config("runtime.read_buffer_size must be greater than 0"));
        }
        if self.history.capacity() == Some(0) {
            return Err(MeterSrvError::config("history.capacity must be greater than 0"));
        }
        self.serial.validate()?;

        let mut names = HashSet::new();
        let mut ports = HashSet::new();
        for connection in &self.connections {
            if !connection.is_valid() {
                return Err(MeterSrvError::config(format!(
                    "Connection '{}' needs a name, a port and a known protocol",
                    connection.name
                )));
            }
            if !names.insert(connection.name.as_str()) {
                return Err(MeterSrvError::config(format!(
                    "Duplicate connection name '{}'",
                    connection.name
                )));
            }
            if !ports.insert(connection.port_name.as_str()) {
                return Err(MeterSrvError::config(format!(
                    "Port {} is configured for more than one connection",
                    connection.port_name
                )));
            }
        }
        Ok(())
    }

    pub fn connection(&self, name: &str) -> Option<&ConnectionConfig> {
        self.connections.iter().find(|c| c.name == name)
    }

    /// Logging setup for [`common::logging::init_with_config`]
    pub fn log_config(&self) -> Result<LogConfig> {
        let log_dir: PathBuf = common::logging::init_log_root(self.logging.dir.as_deref());
        Ok(LogConfig {
            service_name: self.service.name.clone(),
            log_dir,
            console_level: parse_level(&self.logging.level)?,
            file_level: parse_level(&self.logging.file_level)?,
            enable_file: self.logging.enable_file,
            enable_json: self.logging.json,
        })
    }
}

impl SerialConfig {
    pub fn validate(&self) -> Result<()> {
        if self.baud_rate == 0 {
            return Err(MeterSrvError::config("serial.baud_rate must be greater than 0"));
        }
        if !(5..=8).contains(&self.data_bits) {
            return Err(MeterSrvError::config(format!(
                "serial.data_bits must be 5..8, got {}",
                self.data_bits
            )));
        }
        if !matches!(self.stop_bits, 1 | 2) {
            return Err(MeterSrvError::config(format!(
                "serial.stop_bits must be 1 or 2, got {}",
                self.stop_bits
            )));
        }
        match self.parity.to_ascii_lowercase().as_str() {
            "none" | "odd" | "even" => Ok(()),
            other => Err(MeterSrvError::config(format!(
                "serial.parity must be none, odd or even, got '{}'",
                other
            ))),
        }
    }
}

fn parse_level(level: &str) -> Result<Level> {
    Level::from_str(level).config_error(&format!("Invalid log level '{}'", level))
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::model::{CommunicationProtocol, WatchedIdentifier};

    fn connection(name: &str, port: &str) -> ConnectionConfig {
        ConnectionConfig::new(name, port, CommunicationProtocol::DssInformation)
    }

    #[test]
    fn test_defaults() {
        let config = MeterSrvConfig::default();
        assert_eq!(config.service.name, "metersrv");
        assert_eq!(config.serial.baud_rate, 9600);
        assert_eq!(config.serial.parity, "none");
        assert_eq!(config.runtime.tick_interval_ms, 1000);
        assert!(config.codec.verify_crc);
        assert_eq!(config.history, HistoryPolicy::Unbounded);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_zero_values() {
        let mut config = MeterSrvConfig::default();
        config.runtime.tick_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = MeterSrvConfig::default();
        config.history = HistoryPolicy::DropOldest { capacity: 0 };
        assert!(config.validate().is_err());

        let mut config = MeterSrvConfig::default();
        config.serial.parity = "mark".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_duplicates() {
        let mut config = MeterSrvConfig::default();
        config.connections = vec![connection("a", "COM1"), connection("a", "COM2")];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Duplicate connection name 'a'"));

        config.connections = vec![connection("a", "COM1"), connection("b", "COM1")];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Port COM1"));
    }

    #[test]
    fn test_unknown_protocol_rejected() {
        let mut config = MeterSrvConfig::default();
        config.connections = vec![ConnectionConfig::new("a", "COM1", CommunicationProtocol::Unknown)];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_yaml_roundtrip_through_serde() {
        let yaml = r#"
history:
  policy: drop_oldest
  capacity: 500
serial:
  baud_rate: 115200
connections:
  - name: basement
    port_name: /dev/ttyUSB0
    protocol: dss
    watched:
      - identifier: "1-0:16.7.0*255"
        unit: W
        min_interval: "10s"
"#;
        let config: MeterSrvConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.history, HistoryPolicy::DropOldest { capacity: 500 });
        assert_eq!(config.serial.baud_rate, 115200);
        assert_eq!(config.serial.data_bits, 8);
        assert_eq!(
            config.connection("basement").unwrap().watched,
            vec![WatchedIdentifier::new("1-0:16.7.0*255")
                .with_unit("W")
                .with_interval(std::time::Duration::from_secs(10))]
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_log_config_levels() {
        let mut config = MeterSrvConfig::default();
        config.logging.level = "warn".to_string();
        config.logging.dir = Some("/tmp/metersrv-logs".to_string());
        let log = config.log_config().unwrap();
        assert_eq!(log.console_level, Level::WARN);
        assert_eq!(log.file_level, Level::DEBUG);
        assert_eq!(log.service_name, "metersrv");

        config.logging.level = "loud".to_string();
        assert!(config.log_config().is_err());
    }
}
