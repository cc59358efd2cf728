//! Configuration structures for LogRelay

use crate::codec::MAX_FRAME_SIZE;
use crate::sink::rotation::DEFAULT_EXTENSION;
use crate::sink::{ConsoleTarget, LineFormat};
use crate::types::LogLevel;
use crate::{RelayError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Prefix of environment variables overriding file configuration,
/// e.g. `LOGRELAY__SERVER__PORT=9100`
pub const ENV_PREFIX: &str = "LOGRELAY";

/// Server configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener settings
    pub server: ServerSettings,
    /// Rotating file sink
    pub file: FileSinkSettings,
    /// Console mirror
    pub console: ConsoleSettings,
    /// Logger-name routing
    pub routing: RoutingSettings,
}

/// Core listener settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Interface to bind to
    pub host: String,
    /// TCP port to bind to; 0 picks a free port
    pub port: u16,
    /// Largest payload accepted in one frame (bytes)
    pub max_frame_size: usize,
    /// How often the accept loop checks for a stop request (milliseconds)
    pub poll_interval_ms: u64,
}

/// Rotating file sink settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileSinkSettings {
    /// Enable the file sink
    pub enabled: bool,
    /// Active log file
    pub path: PathBuf,
    /// Rotate once the active file reaches this many bytes; 0 disables rotation
    pub max_bytes: u64,
    /// Extension kept at the end of rotated names
    pub extension: String,
    /// Line format
    pub format: LineFormat,
    /// Minimum level written to the file
    pub level: LogLevel,
}

/// Console mirror settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleSettings {
    /// Enable the console mirror
    pub enabled: bool,
    /// Stream to write to
    pub target: ConsoleTarget,
    /// Minimum level mirrored
    pub level: LogLevel,
}

/// Routing settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingSettings {
    /// Route every record as if it came from this logger
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logname: Option<String>,
    /// Re-emit records through the local `tracing` subscriber
    pub tracing: bool,
}

/// Producer client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Receiver address (`host:port`)
    pub server_addr: String,
    /// Logger name stamped on records
    pub logger_name: String,
    /// Connection timeout in seconds
    pub timeout_seconds: u64,
    /// Reconnect on the next send after the connection was closed
    pub auto_reconnect: bool,
    /// Largest payload the client will send
    pub max_frame_size: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9020,
            max_frame_size: MAX_FRAME_SIZE,
            poll_interval_ms: 1000,
        }
    }
}

impl Default for FileSinkSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            path: PathBuf::from("logs/server.jsonl"),
            max_bytes: 10 * 1024 * 1024, // 10MB
            extension: DEFAULT_EXTENSION.to_string(),
            format: LineFormat::Json,
            level: LogLevel::Debug,
        }
    }
}

impl Default for ConsoleSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            target: ConsoleTarget::Stderr,
            level: LogLevel::Debug,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:9020".to_string(),
            logger_name: "root".to_string(),
            timeout_seconds: 5,
            auto_reconnect: true,
            max_frame_size: MAX_FRAME_SIZE,
        }
    }
}

impl ServerSettings {
    /// `host:port` string for binding
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Accept-loop polling interval
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl ServerConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| RelayError::Config(format!("Failed to read config file: {}", e)))?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: ServerConfig = toml::from_str(content)
            .map_err(|e| RelayError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration by layering defaults, an optional TOML file and
    /// `LOGRELAY__SECTION__KEY` environment variables
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let defaults = ::config::Config::try_from(&ServerConfig::default())
            .map_err(|e| RelayError::Config(format!("Failed to build defaults: {}", e)))?;

        let mut builder = ::config::Config::builder().add_source(defaults);
        if let Some(path) = path {
            builder = builder.add_source(
                ::config::File::from(path)
                    .format(::config::FileFormat::Toml)
                    .required(true),
            );
        }
        builder = builder.add_source(
            ::config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: ServerConfig = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| RelayError::Config(format!("Failed to load config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.host.is_empty() {
            return Err(RelayError::Config("Listen host cannot be empty".to_string()));
        }
        if self.server.max_frame_size == 0 || self.server.max_frame_size > u32::MAX as usize {
            return Err(RelayError::Config(format!(
                "max_frame_size must be between 1 and {}",
                u32::MAX
            )));
        }
        if self.server.poll_interval_ms == 0 {
            return Err(RelayError::Config("poll_interval_ms must be positive".to_string()));
        }
        if self.file.enabled && self.file.path.as_os_str().is_empty() {
            return Err(RelayError::Config("File sink path cannot be empty".to_string()));
        }
        if self.file.enabled && self.file.path.file_name().is_none() {
            return Err(RelayError::Config(format!(
                "File sink path {} does not name a file",
                self.file.path.display()
            )));
        }
        if !self.file.extension.is_empty() && !self.file.extension.starts_with('.') {
            return Err(RelayError::Config(format!(
                "Rotation extension {:?} must start with '.'",
                self.file.extension
            )));
        }
        if matches!(&self.routing.logname, Some(name) if name.trim().is_empty()) {
            return Err(RelayError::Config("Routing logname cannot be blank".to_string()));
        }
        Ok(())
    }
}

impl ClientConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.server_addr.is_empty() {
            return Err(RelayError::Config("Server address cannot be empty".to_string()));
        }
        if self.logger_name.is_empty() {
            return Err(RelayError::Config("Logger name cannot be empty".to_string()));
        }
        if self.max_frame_size == 0 || self.max_frame_size > u32::MAX as usize {
            return Err(RelayError::Config(format!(
                "max_frame_size must be between 1 and {}",
                u32::MAX
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.bind_addr(), "0.0.0.0:9020");
        assert_eq!(config.server.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.file.extension, ".jsonl");
        assert!(config.routing.logname.is_none());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = ServerConfig::from_toml(
            r#"
            [server]
            port = 9100

            [file]
            path = "/var/log/relay/app.jsonl"
            max_bytes = 2048
            format = "human"

            [routing]
            logname = "relay"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.file.max_bytes, 2048);
        assert_eq!(config.file.format, LineFormat::Human);
        assert_eq!(config.file.extension, ".jsonl");
        assert_eq!(config.routing.logname.as_deref(), Some("relay"));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let mut config = ServerConfig::default();
        config.server.host = String::new();
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.file.extension = "jsonl".to_string();
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.server.poll_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.routing.logname = Some("  ".to_string());
        assert!(config.validate().is_err());

        assert!(matches!(
            ServerConfig::from_toml("[server]\nport = \"not a port\""),
            Err(RelayError::Config(_))
        ));
    }

    #[test]
    fn test_client_config_validation() {
        assert!(ClientConfig::default().validate().is_ok());

        let config = ClientConfig {
            server_addr: String::new(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ClientConfig {
            logger_name: String::new(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.toml");
        std::fs::write(&path, "[server]\nhost = \"127.0.0.1\"\nport = 9555\n").unwrap();

        let from_file = ServerConfig::from_file(&path).unwrap();
        assert_eq!(from_file.server.bind_addr(), "127.0.0.1:9555");

        let layered = ServerConfig::load(Some(&path)).unwrap();
        assert_eq!(layered.server.port, 9555);
        assert_eq!(layered.file.max_bytes, FileSinkSettings::default().max_bytes);

        assert!(ServerConfig::from_file(dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn test_shipped_config_matches_defaults() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/server.toml");
        let shipped = ServerConfig::from_file(path).unwrap();
        shipped.validate().unwrap();

        let mut expected = ServerConfig::default();
        expected.console.level = LogLevel::Info;
        assert_eq!(shipped, expected);
    }
}
