//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub connection: ConnectionConfig,

    #[serde(default)]
    pub hub: HubConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP/WebSocket server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Allowed CORS origins; empty allows any origin
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Get the socket address string
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Per-connection limits and timers
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionConfig {
    /// Time allowed to write a frame to the peer
    #[serde(default = "default_write_wait")]
    pub write_wait_secs: u64,

    /// Time allowed between pongs before the peer is considered gone
    #[serde(default = "default_pong_wait")]
    pub pong_wait_secs: u64,

    /// Largest inbound frame accepted, in bytes
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    /// Capacity of each connection's outbound queue
    #[serde(default = "default_send_queue_capacity")]
    pub send_queue_capacity: usize,
}

fn default_write_wait() -> u64 {
    10
}

fn default_pong_wait() -> u64 {
    60
}

fn default_max_message_size() -> usize {
    512
}

fn default_send_queue_capacity() -> usize {
    256
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            write_wait_secs: default_write_wait(),
            pong_wait_secs: default_pong_wait(),
            max_message_size: default_max_message_size(),
            send_queue_capacity: default_send_queue_capacity(),
        }
    }
}

impl ConnectionConfig {
    pub fn write_wait(&self) -> Duration {
        Duration::from_secs(self.write_wait_secs)
    }

    pub fn pong_wait(&self) -> Duration {
        Duration::from_secs(self.pong_wait_secs)
    }

    /// Ping period, kept below the pong wait so a live peer always answers in time
    pub fn ping_period(&self) -> Duration {
        self.pong_wait() * 9 / 10
    }
}

/// Hub actor configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HubConfig {
    /// Capacity of the hub's command channel
    #[serde(default = "default_command_capacity")]
    pub command_capacity: usize,
}

fn default_command_capacity() -> usize {
    1024
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            command_capacity: default_command_capacity(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,

    pub file: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file: None,
        }
    }
}

impl LoggingConfig {
    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config = Self::parse(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        config.validate().map_err(|error| ConfigError::Invalid {
            path: path.to_path_buf(),
            error,
        })?;
        Ok(config)
    }

    /// Check values that parse fine but cannot drive a connection
    pub fn validate(&self) -> Result<(), String> {
        let connection = &self.connection;
        if connection.pong_wait_secs == 0 {
            return Err("connection.pong_wait_secs must be at least 1".to_string());
        }
        if connection.write_wait_secs == 0 {
            return Err("connection.write_wait_secs must be at least 1".to_string());
        }
        if connection.max_message_size == 0 {
            return Err("connection.max_message_size must be at least 1".to_string());
        }
        if connection.send_queue_capacity == 0 {
            return Err("connection.send_queue_capacity must be at least 1".to_string());
        }
        if self.hub.command_capacity == 0 {
            return Err("hub.command_capacity must be at least 1".to_string());
        }
        Ok(())
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from the first default location that exists, else the environment.
    ///
    /// Returns the path the configuration came from, if any.
    pub fn load_default() -> (Self, Option<PathBuf>) {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("collabwrite").join("config.toml")),
            Some(PathBuf::from("/etc/collabwrite/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                match Self::load_with_env(path) {
                    Ok(config) => return (config, Some(path.clone())),
                    Err(e) => {
                        eprintln!("Ignoring config {}: {}", path.display(), e);
                    }
                }
            }
        }

        (Self::from_env(), None)
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(host) = lookup("COLLABWRITE_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("COLLABWRITE_PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
        if let Some(level) = lookup("COLLABWRITE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("COLLABWRITE_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Invalid value in config file {path:?}: {error}")]
    Invalid { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# CollabWrite Configuration
#
# Environment variables override these settings:
# - COLLABWRITE_HOST
# - COLLABWRITE_PORT
# - COLLABWRITE_LOG_LEVEL
# - COLLABWRITE_LOG_FORMAT

[server]
# Server host
host = "0.0.0.0"

# Server port
port = 8080

# Allowed CORS origins (empty = any origin)
cors_origins = []

[connection]
# Seconds allowed to write a frame to a peer
write_wait_secs = 10

# Seconds without a pong before a peer is dropped (pings go out at 9/10 of this)
pong_wait_secs = 60

# Largest inbound frame in bytes
max_message_size = 512

# Outbound queue capacity per connection; a full queue drops the connection
send_queue_capacity = 256

[hub]
# Hub command channel capacity
command_capacity = 1024

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"

# Optional log file path
# file = "/var/log/collabwrite/collabwrite.log"
"#
    .to_string()
}
