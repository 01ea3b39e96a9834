//! Configuration for the polling engine.

use crate::snip::{FIRST_DEVICE_ID, LAST_DEVICE_ID};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] json5::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Complete engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Serial device path (e.g., "/dev/ttyUSB0").
    pub device: String,

    /// Communication preset for the bus.
    pub comset: Comset,

    /// Per-query timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Log each failed query attempt with full detail.
    #[serde(default)]
    pub verbose: bool,

    /// Seconds between read cycles over the configured meters.
    #[serde(default = "default_cycle_secs")]
    pub cycle_secs: u64,

    /// Meters to poll continuously. May be empty for scan-only use.
    #[serde(default)]
    pub meters: Vec<MeterConfig>,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_timeout_ms() -> u64 {
    300
}

fn default_cycle_secs() -> u64 {
    10
}

/// One meter on the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeterConfig {
    /// Slave address (1-247).
    pub device_id: u8,

    /// Meter family.
    #[serde(rename = "type")]
    pub meter_type: MeterType,
}

/// Supported meter families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeterType {
    Sdm,
    Janitza,
    Dzg,
}

/// Serial communication presets.
///
/// The bus only supports this fixed set; everything runs 8 data bits and
/// 1 stop bit. An unrecognized preset fails config parsing, which is a
/// fatal startup error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comset {
    #[serde(rename = "2400_8n1")]
    Baud2400N1,
    #[serde(rename = "9600_8n1")]
    Baud9600N1,
    #[serde(rename = "19200_8n1")]
    Baud19200N1,
    #[serde(rename = "2400_8e1")]
    Baud2400E1,
    #[serde(rename = "9600_8e1")]
    Baud9600E1,
    #[serde(rename = "19200_8e1")]
    Baud19200E1,
}

impl Comset {
    /// Baud rate of this preset.
    pub fn baud_rate(&self) -> u32 {
        match self {
            Comset::Baud2400N1 | Comset::Baud2400E1 => 2400,
            Comset::Baud9600N1 | Comset::Baud9600E1 => 9600,
            Comset::Baud19200N1 | Comset::Baud19200E1 => 19200,
        }
    }

    /// Whether this preset uses even parity (no-parity otherwise).
    pub fn even_parity(&self) -> bool {
        matches!(
            self,
            Comset::Baud2400E1 | Comset::Baud9600E1 | Comset::Baud19200E1
        )
    }
}

impl std::fmt::Display for Comset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parity = if self.even_parity() { 'E' } else { 'N' };
        write!(f, "{} 8{}1", self.baud_rate(), parity)
    }
}

/// Logging output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl EngineConfig {
    /// Load configuration from a JSON5 file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: EngineConfig = json5::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.device.is_empty() {
            return Err(ConfigError::Validation(
                "Serial device path cannot be empty".to_string(),
            ));
        }

        if self.timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "timeout_ms must be positive".to_string(),
            ));
        }

        for meter in &self.meters {
            if !(FIRST_DEVICE_ID..=LAST_DEVICE_ID).contains(&meter.device_id) {
                return Err(ConfigError::Validation(format!(
                    "Meter address {} is outside the valid {}-{} range",
                    meter.device_id, FIRST_DEVICE_ID, LAST_DEVICE_ID
                )));
            }
        }

        Ok(())
    }
}
