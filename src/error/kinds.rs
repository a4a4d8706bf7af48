use std::time::Duration;
use std::{fmt, io};

use crate::error::mongo::format_mongodb_error;

/// Crate-wide `Result` type using [`MongoConnectError`] as the error.
///
/// This alias is re-exported by the parent `error` module and is intended
/// to be used throughout the crate for fallible operations.
pub type Result<T> = std::result::Result<T, MongoConnectError>;

/// Top-level error type for connection-scoped operations.
///
/// Callers can tell a failure to reach the engine apart from a failure of the
/// delegated call itself, and decide on retry or backoff accordingly.
#[derive(Debug)]
pub enum MongoConnectError {
    /// The connection could not be established (or released).
    Connection(ConnectionError),

    /// The delegated operation failed after a connection was established.
    Operation(OperationError),

    /// Configuration errors.
    Config(ConfigError),

    /// I/O errors.
    Io(io::Error),

    /// Feature not available.
    NotImplemented(String),
}

/// Connection-specific errors.
#[derive(Debug)]
pub enum ConnectionError {
    /// Endpoint unreachable, handshake or authentication failed.
    ConnectionFailed(String),

    /// Connection string could not be parsed.
    InvalidUri(String),

    /// Connecting took longer than the configured limit.
    Timeout(Duration),

    /// Cancelled while connecting.
    Cancelled,

    /// The connection was already closed.
    NotConnected,
}

/// Errors raised by the delegated call.
#[derive(Debug)]
pub enum OperationError {
    /// The driver reported a failure.
    Driver(mongodb::error::Error),

    /// The request is malformed (missing collection, bad write command, ...).
    InvalidParameters(String),

    /// The options document could not be decoded for this operation.
    InvalidOptions { operation: String, reason: String },

    /// The delegated call took longer than the configured limit.
    Timeout(Duration),

    /// Cancelled while the delegated call was in flight.
    Cancelled,

    /// The engine answered with a result of a different kind than requested.
    UnexpectedResult { expected: String, found: String },
}

/// Configuration-specific errors.
#[derive(Debug)]
pub enum ConfigError {
    /// Config file not found.
    FileNotFound(String),

    /// Invalid config format.
    InvalidFormat(String),

    /// Missing required field.
    MissingField(String),

    /// Invalid field value.
    InvalidValue { field: String, value: String },
}

/* ========================= Display & Error impls ========================= */

impl fmt::Display for MongoConnectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MongoConnectError::Connection(e) => write!(f, "Connection error: {e}"),
            MongoConnectError::Operation(e) => write!(f, "Operation error: {e}"),
            MongoConnectError::Config(e) => write!(f, "Configuration error: {e}"),
            MongoConnectError::Io(e) => write!(f, "I/O error: {e}"),
            MongoConnectError::NotImplemented(msg) => write!(f, "Not implemented: {msg}"),
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionError::ConnectionFailed(msg) => write!(f, "Failed to connect: {msg}"),
            ConnectionError::InvalidUri(msg) => write!(f, "Invalid connection URI: {msg}"),
            ConnectionError::Timeout(limit) => {
                write!(f, "Connection timeout after {}ms", limit.as_millis())
            }
            ConnectionError::Cancelled => write!(f, "Connection attempt cancelled"),
            ConnectionError::NotConnected => write!(f, "Not connected to MongoDB"),
        }
    }
}

impl fmt::Display for OperationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationError::Driver(e) => format_mongodb_error(f, e),
            OperationError::InvalidParameters(msg) => write!(f, "Invalid parameters: {msg}"),
            OperationError::InvalidOptions { operation, reason } => {
                write!(f, "Invalid options for {operation}: {reason}")
            }
            OperationError::Timeout(limit) => {
                write!(f, "Operation timeout after {}ms", limit.as_millis())
            }
            OperationError::Cancelled => write!(f, "Operation cancelled"),
            OperationError::UnexpectedResult { expected, found } => {
                write!(f, "Expected {expected} result, engine returned {found}")
            }
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileNotFound(path) => write!(f, "Config file not found: {path}"),
            ConfigError::InvalidFormat(msg) => write!(f, "Invalid config format: {msg}"),
            ConfigError::MissingField(field) => write!(f, "Missing required field: {field}"),
            ConfigError::InvalidValue { field, value } => {
                write!(f, "Invalid value '{value}' for field '{field}'")
            }
        }
    }
}

impl std::error::Error for MongoConnectError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MongoConnectError::Connection(e) => Some(e),
            MongoConnectError::Operation(e) => Some(e),
            MongoConnectError::Config(e) => Some(e),
            MongoConnectError::Io(e) => Some(e),
            MongoConnectError::NotImplemented(_) => None,
        }
    }
}

impl std::error::Error for ConnectionError {}

impl std::error::Error for OperationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            OperationError::Driver(e) => Some(e),
            _ => None,
        }
    }
}

impl std::error::Error for ConfigError {}

/* ========================= Conversions to MongoConnectError ========================= */

impl From<io::Error> for MongoConnectError {
    fn from(err: io::Error) -> Self {
        MongoConnectError::Io(err)
    }
}

/// Driver errors surfacing through `?` are failures of the delegated call.
/// Connect-time driver errors are mapped to [`ConnectionError`] explicitly.
impl From<mongodb::error::Error> for MongoConnectError {
    fn from(err: mongodb::error::Error) -> Self {
        MongoConnectError::Operation(OperationError::Driver(err))
    }
}

impl From<ConnectionError> for MongoConnectError {
    fn from(err: ConnectionError) -> Self {
        MongoConnectError::Connection(err)
    }
}

impl From<OperationError> for MongoConnectError {
    fn from(err: OperationError) -> Self {
        MongoConnectError::Operation(err)
    }
}

impl From<ConfigError> for MongoConnectError {
    fn from(err: ConfigError) -> Self {
        MongoConnectError::Config(err)
    }
}

impl MongoConnectError {
    /// True when the engine could not be reached at all.
    pub fn is_connection_failure(&self) -> bool {
        matches!(self, MongoConnectError::Connection(_))
    }

    /// True when a connection was established but the delegated call failed.
    pub fn is_operation_failure(&self) -> bool {
        matches!(self, MongoConnectError::Operation(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_classification() {
        let conn: MongoConnectError = ConnectionError::ConnectionFailed("refused".into()).into();
        assert!(conn.is_connection_failure());
        assert!(!conn.is_operation_failure());

        let op: MongoConnectError = OperationError::Cancelled.into();
        assert!(op.is_operation_failure());
        assert!(!op.is_connection_failure());
    }

    #[test]
    fn test_display_messages() {
        let err: MongoConnectError = ConnectionError::Timeout(Duration::from_millis(250)).into();
        assert_eq!(err.to_string(), "Connection error: Connection timeout after 250ms");

        let err: MongoConnectError = OperationError::InvalidOptions {
            operation: "find".into(),
            reason: "bad limit".into(),
        }
        .into();
        assert_eq!(
            err.to_string(),
            "Operation error: Invalid options for find: bad limit"
        );
    }

    #[test]
    fn test_source_chain() {
        use std::error::Error;

        let err: MongoConnectError = ConfigError::MissingField("connection.endpoint".into()).into();
        assert!(err.source().is_some());
    }
}
