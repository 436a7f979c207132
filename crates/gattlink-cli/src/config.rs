//! gattlink CLI Configuration Management
//!
//! Configuration is read from a TOML file. Every section is optional and
//! falls back to its defaults, so a file only needs the values it changes.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use gattlink_core::SessionConfig;

// ----------------------------------------------------------------------------
// CLI Application Configuration
// ----------------------------------------------------------------------------

/// Complete configuration for the gattlink CLI application
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliAppConfig {
    /// CLI-specific settings
    pub cli: CliConfig,

    /// Simulated peripheral the commands talk to
    pub peripheral: PeripheralConfig,

    /// Session configuration passed to `GattSession`
    pub session: SessionConfig,
}

/// CLI-specific configuration options
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Enable verbose logging output
    pub verbose: bool,
}

/// Shape and timing of the simulated peripheral
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeripheralConfig {
    pub address: String,
    pub name: String,

    /// 16-bit service UUID
    pub service: u16,

    /// 16-bit UUID of the notifying characteristic
    pub measurement: u16,

    /// 16-bit UUID of the writable characteristic
    pub control: u16,

    /// Delay before each simulated callback (in milliseconds)
    pub latency_ms: u64,
}

impl Default for PeripheralConfig {
    fn default() -> Self {
        Self {
            address: "00:11:22:33:44:55".to_string(),
            name: "Heart Rate Sensor".to_string(),
            service: 0x180D,
            measurement: 0x2A37,
            control: 0x2A39,
            latency_ms: 5,
        }
    }
}

impl PeripheralConfig {
    pub fn latency(&self) -> Duration {
        Duration::from_millis(self.latency_ms)
    }
}

// ----------------------------------------------------------------------------
// Configuration Loading Logic
// ----------------------------------------------------------------------------

impl CliAppConfig {
    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        tracing::info!("Loading configuration from: {}", path.display());

        let contents = std::fs::read_to_string(path).map_err(|e| {
            ConfigError::FileSystem(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: CliAppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration for consistency and correctness
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.peripheral.address.is_empty() {
            return Err(ConfigError::Validation(
                "Peripheral address must not be empty".to_string(),
            ));
        }

        if self.session.connection_timeout.is_zero() {
            return Err(ConfigError::Validation(
                "Connection timeout must be greater than 0".to_string(),
            ));
        }

        if self.session.disconnect_timeout.is_some_and(|t| t.is_zero()) {
            return Err(ConfigError::Validation(
                "Disconnect timeout must be greater than 0 when set".to_string(),
            ));
        }

        Ok(())
    }

    /// Create example configuration file content
    pub fn example_config() -> String {
        let example_config = CliAppConfig {
            cli: CliConfig { verbose: true },
            session: SessionConfig::default().with_disconnect_timeout(Duration::from_secs(2)),
            ..Default::default()
        };

        toml::to_string_pretty(&example_config)
            .unwrap_or_else(|_| "# Failed to generate example config".to_string())
    }
}

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Configuration-related errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration parsing error: {0}")]
    Parsing(#[from] toml::de::Error),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("File system error: {0}")]
    FileSystem(String),
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
