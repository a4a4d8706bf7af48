//! Configuration management for mongoconnect
//!
//! Configuration is an explicit value handed to the executor at construction
//! time. It can be assembled from several sources:
//! - Configuration file (TOML format)
//! - Environment variables
//! - Command-line arguments (binary only)
//!
//! Configuration precedence (highest to lowest):
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. Configuration file
//! 4. Default values

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{ConfigError, Result};

/// Environment variable holding the connection URL.
pub const ENV_ENDPOINT: &str = "MONGODB_DEFAULT_URL";

/// Environment variable holding the default database name.
pub const ENV_DEFAULT_DATABASE: &str = "MONGODB_DEFAULT_DB";

/// Environment variable overriding the connect timeout (seconds).
pub const ENV_CONNECT_TIMEOUT: &str = "MONGOCONNECT_CONNECT_TIMEOUT";

/// Environment variable overriding the operation timeout (seconds).
pub const ENV_OPERATION_TIMEOUT: &str = "MONGOCONNECT_OPERATION_TIMEOUT";

/// Environment variable overriding the log level.
pub const ENV_LOG_LEVEL: &str = "MONGOCONNECT_LOG_LEVEL";

/// Database used when neither the config nor the URI names one.
pub const FALLBACK_DATABASE: &str = "test";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Connection configuration
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Connection-related configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// MongoDB connection URL
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Database used when a request does not name one
    #[serde(default)]
    pub default_database: Option<String>,

    /// Connect timeout in seconds (also bounds server selection)
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,

    /// Timeout for a single delegated operation in seconds
    #[serde(default = "default_operation_timeout")]
    pub operation_timeout: u64,

    /// Application name reported to the server
    #[serde(default = "default_app_name")]
    pub app_name: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: LogLevel,

    /// Enable timestamps in logs
    #[serde(default = "default_log_timestamps")]
    pub timestamps: bool,
}

/// Log level options
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

// Default value functions
fn default_endpoint() -> String {
    "mongodb://localhost:27017".to_string()
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_operation_timeout() -> u64 {
    30
}

fn default_app_name() -> String {
    format!("mongoconnect/{}", env!("CARGO_PKG_VERSION"))
}

fn default_log_level() -> LogLevel {
    LogLevel::Warn
}

fn default_log_timestamps() -> bool {
    true
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            default_database: None,
            connect_timeout: default_connect_timeout(),
            operation_timeout: default_operation_timeout(),
            app_name: default_app_name(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            timestamps: default_log_timestamps(),
        }
    }
}

impl Config {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ConfigError::FileNotFound(path.display().to_string()),
            _ => ConfigError::InvalidFormat(format!("{}: {}", path.display(), e)),
        })?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| ConfigError::InvalidFormat(format!("{}: {}", path.display(), e)))?;
        Ok(config)
    }

    /// Load configuration from file and environment
    ///
    /// An explicitly given path must exist. Without one, the default path is
    /// used when present and defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = Self::default_path();
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    Self::default()
                }
            }
        };

        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from the process environment
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(endpoint) = lookup(ENV_ENDPOINT) {
            self.connection.endpoint = endpoint;
        }
        if let Some(database) = lookup(ENV_DEFAULT_DATABASE) {
            self.connection.default_database = Some(database);
        }
        if let Some(value) = lookup(ENV_CONNECT_TIMEOUT) {
            self.connection.connect_timeout = parse_env(ENV_CONNECT_TIMEOUT, &value)?;
        }
        if let Some(value) = lookup(ENV_OPERATION_TIMEOUT) {
            self.connection.operation_timeout = parse_env(ENV_OPERATION_TIMEOUT, &value)?;
        }
        if let Some(value) = lookup(ENV_LOG_LEVEL) {
            self.logging.level = parse_env(ENV_LOG_LEVEL, &value)?;
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".mongoconnect")
            .join("config.toml")
    }

    /// Save configuration to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::InvalidFormat(e.to_string()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.connection.validate()
    }
}

impl ConnectionConfig {
    /// Configuration pointing at `endpoint` with every other field defaulted
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    /// Set the default database
    pub fn default_database(mut self, database: impl Into<String>) -> Self {
        self.default_database = Some(database.into());
        self
    }

    /// Validate endpoint scheme, timeouts and the default database name
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.trim().is_empty() {
            return Err(ConfigError::MissingField("connection.endpoint".to_string()).into());
        }

        if !self.endpoint.starts_with("mongodb://") && !self.endpoint.starts_with("mongodb+srv://")
        {
            return Err(ConfigError::InvalidValue {
                field: "connection.endpoint".to_string(),
                value: redact_uri(&self.endpoint),
            }
            .into());
        }

        for (field, value) in [
            ("connection.connect_timeout", self.connect_timeout),
            ("connection.operation_timeout", self.operation_timeout),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    value: value.to_string(),
                }
                .into());
            }
        }

        if let Some(database) = &self.default_database
            && !is_valid_database_name(database)
        {
            return Err(ConfigError::InvalidValue {
                field: "connection.default_database".to_string(),
                value: database.clone(),
            }
            .into());
        }

        Ok(())
    }

    /// Database a request falls back to when it does not name one
    ///
    /// Priority:
    /// 1. Configured default database
    /// 2. Database name from the connection URI
    /// 3. `"test"`
    pub fn resolved_default_database(&self) -> String {
        self.default_database
            .as_deref()
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .or_else(|| extract_database_from_uri(&self.endpoint))
            .unwrap_or_else(|| FALLBACK_DATABASE.to_string())
    }

    /// Connect timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    /// Operation timeout as Duration
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout)
    }

    /// Endpoint with credentials hidden, for log lines
    pub fn redacted_endpoint(&self) -> String {
        redact_uri(&self.endpoint)
    }
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            other => Err(format!("unknown log level '{other}'")),
        }
    }
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        ConfigError::InvalidValue {
            field: key.to_string(),
            value: value.to_string(),
        }
        .into()
    })
}

/// Extract database name from a MongoDB connection URI
///
/// Format: mongodb://[username:password@]host[:port][/database][?options]
pub fn extract_database_from_uri(uri: &str) -> Option<String> {
    let after_scheme = uri.split("://").nth(1)?;
    let path_part = after_scheme.split_once('/')?.1;
    let db_name = path_part.split('?').next().unwrap_or("");
    if db_name.is_empty() {
        None
    } else {
        Some(db_name.to_string())
    }
}

/// Hide everything between the scheme and the `@` of a connection URI
pub fn redact_uri(uri: &str) -> String {
    match (uri.find("://"), uri.rfind('@')) {
        (Some(proto_end), Some(host_start)) if host_start > proto_end => {
            format!("{}***{}", &uri[..proto_end + 3], &uri[host_start..])
        }
        (None, Some(_)) => "mongodb://***".to_string(),
        _ => uri.to_string(),
    }
}

fn is_valid_database_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() < 64
        && !name
            .chars()
            .any(|c| matches!(c, '/' | '\\' | '.' | ' ' | '"' | '$' | '\0'))
}
