//! Connection configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via P2CTL_CONFIG)
//! 3. Environment variables

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default delay before reconnecting after the control channel closes.
pub const DEFAULT_RECONNECT_INTERVAL_MS: u64 = 100;

/// Default keep-alive / telemetry poll interval.
pub const DEFAULT_KEEPALIVE_INTERVAL_MS: u64 = 5000;

/// Default read buffer size (8 KiB).
pub const DEFAULT_READ_BUFFER_SIZE: usize = 8 * 1024;

/// Minimum read buffer size (1 KiB).
pub const MIN_READ_BUFFER_SIZE: usize = 1024;

/// Maximum read buffer size (1 MiB).
pub const MAX_READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Camera connection configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraConfig {
    /// Camera host name or address.
    pub host: String,
    /// Control channel TCP port.
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Delay before reconnecting; 0 disables automatic reconnection.
    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,
    /// Interval between keep-alives and telemetry polls.
    #[serde(default = "default_keepalive_interval_ms")]
    pub keepalive_interval_ms: u64,
    /// Read buffer size for control channel reads.
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,
    /// Largest envelope accepted before the stream is considered corrupt.
    #[serde(default = "default_max_envelope_size")]
    pub max_envelope_size: usize,
}

fn default_reconnect_interval_ms() -> u64 {
    DEFAULT_RECONNECT_INTERVAL_MS
}

fn default_keepalive_interval_ms() -> u64 {
    DEFAULT_KEEPALIVE_INTERVAL_MS
}

fn default_read_buffer_size() -> usize {
    DEFAULT_READ_BUFFER_SIZE
}

fn default_max_envelope_size() -> usize {
    p2ctl_protocol::MAX_ENVELOPE_SIZE
}

impl CameraConfig {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            password: password.into(),
            reconnect_interval_ms: DEFAULT_RECONNECT_INTERVAL_MS,
            keepalive_interval_ms: DEFAULT_KEEPALIVE_INTERVAL_MS,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            max_envelope_size: p2ctl_protocol::MAX_ENVELOPE_SIZE,
        }
    }

    pub fn with_reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_keepalive_interval(mut self, interval: Duration) -> Self {
        self.keepalive_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.clamp(MIN_READ_BUFFER_SIZE, MAX_READ_BUFFER_SIZE);
        self
    }

    /// Returns the reconnect delay, or `None` if reconnection is disabled.
    pub fn reconnect_interval(&self) -> Option<Duration> {
        match self.reconnect_interval_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_millis(self.keepalive_interval_ms)
    }

    /// Returns the `host:port` pair of the control channel.
    pub fn control_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Loads configuration from file, then applies environment variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var("P2CTL_CONFIG") {
            Ok(path) => Self::from_file(&path)?,
            Err(_) => Self::new("", 0, "", ""),
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        let config: CameraConfig = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        let read_buffer_size = config.read_buffer_size;
        Ok(config.with_read_buffer_size(read_buffer_size))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("P2CTL_HOST") {
            self.host = host;
        }

        if let Ok(port) = std::env::var("P2CTL_PORT") {
            if let Ok(parsed) = port.parse() {
                self.port = parsed;
            }
        }

        if let Ok(username) = std::env::var("P2CTL_USERNAME") {
            self.username = username;
        }

        if let Ok(password) = std::env::var("P2CTL_PASSWORD") {
            self.password = password;
        }

        if let Ok(ms) = std::env::var("P2CTL_RECONNECT_MS") {
            if let Ok(parsed) = ms.parse() {
                self.reconnect_interval_ms = parsed;
            }
        }

        if let Ok(ms) = std::env::var("P2CTL_KEEPALIVE_MS") {
            if let Ok(parsed) = ms.parse() {
                self.keepalive_interval_ms = parsed;
            }
        }
    }

    /// Checks that the configuration can be used to open a connection.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::ValidationError("host must not be empty".into()));
        }
        if self.port == 0 {
            return Err(ConfigError::ValidationError("port must not be 0".into()));
        }
        if self.keepalive_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "keepalive_interval_ms must be positive".into(),
            ));
        }
        if !(MIN_READ_BUFFER_SIZE..=MAX_READ_BUFFER_SIZE).contains(&self.read_buffer_size) {
            return Err(ConfigError::ValidationError(format!(
                "read_buffer_size must be between {} and {}",
                MIN_READ_BUFFER_SIZE, MAX_READ_BUFFER_SIZE
            )));
        }
        if self.max_envelope_size == 0 {
            return Err(ConfigError::ValidationError("max_envelope_size must be positive".into()));
        }
        Ok(())
    }
}

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read camera config '{path}': {1}", path = .0.display())]
    IoError(PathBuf, #[source] std::io::Error),

    #[error("invalid camera config '{path}': {1}", path = .0.display())]
    ParseError(PathBuf, String),

    #[error("camera config rejected: {0}")]
    ValidationError(String),
}
