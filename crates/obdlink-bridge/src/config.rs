//! Bridge configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use obdlink_types::pid::{Pid, pid_by_command, standard_pids};

/// Bridge configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// The OBD adapter to poll.
    pub device: DeviceConfig,
    /// MQTT broker settings.
    pub mqtt: MqttConfig,
    /// oneM2M platform settings.
    pub platform: PlatformConfig,
    /// Session store settings.
    pub storage: StorageConfig,
}

impl Config {
    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Save configuration to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        std::fs::write(path.as_ref(), content).map_err(|e| ConfigError::Write {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Validate the configuration and return any errors.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();
        errors.extend(self.device.validate());
        errors.extend(self.mqtt.validate());
        errors.extend(self.platform.validate());

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Resolve the configured PID subset against the catalog.
    ///
    /// An empty `device.pids` list means the full catalog.
    pub fn selected_pids(&self) -> Vec<Pid> {
        if self.device.pids.is_empty() {
            standard_pids()
        } else {
            self.device
                .pids
                .iter()
                .filter_map(|command| pid_by_command(command))
                .collect()
        }
    }
}

/// Adapter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Adapter address, `host:port`.
    pub address: String,
    /// Poll interval in seconds.
    pub poll_interval: u64,
    /// Command codes to poll; empty means the full catalog.
    pub pids: Vec<String>,
}

/// Minimum poll interval in seconds.
pub const MIN_POLL_INTERVAL: u64 = 1;
/// Maximum poll interval in seconds (1 hour).
pub const MAX_POLL_INTERVAL: u64 = 3600;

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            address: String::new(),
            poll_interval: 5,
            pids: Vec::new(),
        }
    }
}

impl DeviceConfig {
    /// Poll interval as a [`Duration`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval)
    }

    fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.address.is_empty() {
            errors.push(ValidationError::new(
                "device.address",
                "adapter address cannot be empty",
            ));
        }

        if self.poll_interval < MIN_POLL_INTERVAL || self.poll_interval > MAX_POLL_INTERVAL {
            errors.push(ValidationError::new(
                "device.poll_interval",
                format!(
                    "poll interval {} out of range ({}..={} seconds)",
                    self.poll_interval, MIN_POLL_INTERVAL, MAX_POLL_INTERVAL
                ),
            ));
        }

        for command in &self.pids {
            if pid_by_command(command).is_none() {
                errors.push(ValidationError::new(
                    "device.pids",
                    format!("unknown PID command '{command}'"),
                ));
            }
        }

        errors
    }
}

/// MQTT broker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// Broker URL, `mqtt://host:port` or `mqtts://host:port`.
    pub broker: String,
    /// Keep-alive interval in seconds.
    pub keep_alive: u64,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker: "mqtt://localhost:1883".to_string(),
            keep_alive: 30,
        }
    }
}

impl MqttConfig {
    fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if !self.broker.starts_with("mqtt://") && !self.broker.starts_with("mqtts://") {
            errors.push(ValidationError::new(
                "mqtt.broker",
                format!(
                    "invalid broker URL '{}': must start with mqtt:// or mqtts://",
                    self.broker
                ),
            ));
        }
        errors
    }
}

/// oneM2M platform configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    /// Device identity used as originator and AE resource name.
    pub device_id: String,
    /// Application id stamped into the AE registration.
    pub app_id: String,
    /// Authorization token sent with every request.
    pub access_token: String,
    /// CSE identifier (the platform's root addressing segment).
    pub cse_id: String,
    /// CSE resource name.
    pub cse_name: String,
    /// Correlated request timeout in seconds.
    pub request_timeout: u64,
    /// Delay between provisioning requests in milliseconds.
    pub setup_step_delay_ms: u64,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            device_id: String::new(),
            app_id: "vn.obd.bridge".to_string(),
            access_token: String::new(),
            cse_id: "in-cse".to_string(),
            cse_name: "in-name".to_string(),
            request_timeout: 10,
            setup_step_delay_ms: 200,
        }
    }
}

impl PlatformConfig {
    /// Request timeout as a [`Duration`].
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    /// Inter-step provisioning delay as a [`Duration`].
    pub fn setup_step_delay(&self) -> Duration {
        Duration::from_millis(self.setup_step_delay_ms)
    }

    /// The CSE base path, e.g. `"/in-cse/in-name"`.
    pub fn cse_base(&self) -> String {
        format!("/{}/{}", self.cse_id, self.cse_name)
    }

    fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if self.device_id.is_empty() {
            errors.push(ValidationError::new(
                "platform.device_id",
                "device id cannot be empty",
            ));
        }
        if self.cse_id.is_empty() || self.cse_name.is_empty() {
            errors.push(ValidationError::new(
                "platform.cse_id",
                "CSE id and name cannot be empty",
            ));
        }
        if self.request_timeout == 0 {
            errors.push(ValidationError::new(
                "platform.request_timeout",
                "request timeout must be at least 1 second",
            ));
        }
        errors
    }
}

/// Session store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Session store file path.
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("obdlink-session.json"),
        }
    }
}

/// Configuration errors.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("configuration validation failed:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// A single validation error with context.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field path, e.g. `device.address`.
    pub field: String,
    /// Description of the validation failure.
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {e}"))
        .collect::<Vec<_>>()
        .join("\n")
}
