//! Bridge configuration loaded from a TOML file.
//!
//! ```toml
//! [device]
//! location = "/dev/input/event5"
//! name = "spacenav"
//! rel_to_abs = false
//! refresh_rate_hz = 60.0
//!
//! [mqtt]
//! host = "localhost"
//! topic_prefix = "evdev"
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Axis state is published at this frequency (in Hz) unless configured.
pub const REFRESH_RATE_HZ: f64 = 60.0;

/// Publish periods must lie between 1 ms and one day.
pub const MAX_REFRESH_RATE_HZ: f64 = 1000.0;
pub const MIN_REFRESH_RATE_HZ: f64 = 1.0 / 86_400.0;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct BridgeConfig {
    pub device: DeviceConfig,

    // Without a broker, messages are printed to stdout
    #[serde(default)]
    pub mqtt: Option<MqttConfig>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct DeviceConfig {
    pub location: PathBuf,

    // Informational label for logs
    #[serde(default)]
    pub name: Option<String>,

    // Treat EV_REL events as EV_ABS
    #[serde(default)]
    pub rel_to_abs: bool,

    #[serde(default = "default_refresh_rate")]
    pub refresh_rate_hz: f64,

    #[serde(default = "default_true")]
    pub publish_raw: bool,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct MqttConfig {
    pub host: String,

    #[serde(default = "default_mqtt_port")]
    pub port: u16,

    #[serde(default = "default_client_id")]
    pub client_id: String,

    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String,

    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,

    #[serde(default)]
    pub user: Option<String>,

    #[serde(default)]
    pub password: Option<String>,
}

fn default_refresh_rate() -> f64 {
    REFRESH_RATE_HZ
}

fn default_true() -> bool {
    true
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_client_id() -> String {
    "evdev-bridge".to_string()
}

fn default_topic_prefix() -> String {
    "evdev".to_string()
}

fn default_keep_alive() -> u64 {
    5
}

impl DeviceConfig {
    pub fn new(location: impl Into<PathBuf>) -> Self {
        Self {
            location: location.into(),
            name: None,
            rel_to_abs: false,
            refresh_rate_hz: REFRESH_RATE_HZ,
            publish_raw: true,
        }
    }

    /// The configured name, or the device path.
    pub fn label(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| self.location.display().to_string())
    }
}

impl BridgeConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        info!("Loading config from {}", path.display());
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: BridgeConfig = toml::from_str(content)?;
        config.validate()?;
        debug!("Parsed config: {:?}", config);
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.device.location.as_os_str().is_empty() {
            return Err(ConfigError::Invalid(
                "device.location must not be empty".to_string(),
            ));
        }

        refresh_period(self.device.refresh_rate_hz)?;

        if let Some(mqtt) = &self.mqtt {
            if mqtt.host.is_empty() {
                return Err(ConfigError::Invalid("mqtt.host must not be empty".to_string()));
            }
        }
        Ok(())
    }
}

/// Publish period for `rate_hz`, rejecting rates outside
/// [`MIN_REFRESH_RATE_HZ`]..=[`MAX_REFRESH_RATE_HZ`].
pub fn refresh_period(rate_hz: f64) -> Result<Duration, ConfigError> {
    if !(MIN_REFRESH_RATE_HZ..=MAX_REFRESH_RATE_HZ).contains(&rate_hz) {
        return Err(ConfigError::Invalid(format!(
            "device.refresh_rate_hz must be between {} and {} Hz, got {}",
            MIN_REFRESH_RATE_HZ, MAX_REFRESH_RATE_HZ, rate_hz
        )));
    }
    Duration::try_from_secs_f64(1.0 / rate_hz)
        .map_err(|e| ConfigError::Invalid(format!("refresh rate {} Hz: {}", rate_hz, e)))
}
