//! Error handling for the meter service
//!
//! Decode and entry anomalies never surface as errors from a connection; these
//! variants cover configuration, I/O and lifecycle failures.

use errors::{ErrorCategory, MeterError, MeterErrorTrait};
use sml_codec::DecodeError;
use thiserror::Error;

/// Meter Service Error Type
#[derive(Error, Debug, Clone)]
pub enum MeterSrvError {
    /// Configuration-related errors (invalid connection, bad interval, ...)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Input/Output operation errors (serial port, files)
    #[error("IO error: {0}")]
    IoError(String),

    /// Frame or message decoding errors
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("Connection not found: {0}")]
    ConnectionNotFound(String),

    #[error("Connection already exists: {0}")]
    ConnectionExists(String),

    /// A serial port can only be read by one connection
    #[error("Port {port} already used by connection {connection}")]
    PortInUse { port: String, connection: String },

    /// Validation errors
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Result type alias for the meter service
pub type Result<T> = std::result::Result<T, MeterSrvError>;

impl MeterSrvError {
    pub fn config(msg: impl Into<String>) -> Self {
        MeterSrvError::ConfigError(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        MeterSrvError::ProtocolError(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        MeterSrvError::ValidationError(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        MeterSrvError::InternalError(msg.into())
    }

    pub fn connection_not_found(name: impl Into<String>) -> Self {
        MeterSrvError::ConnectionNotFound(name.into())
    }

    pub fn connection_exists(name: impl Into<String>) -> Self {
        MeterSrvError::ConnectionExists(name.into())
    }

    pub fn port_in_use(port: impl Into<String>, owner: impl Into<String>) -> Self {
        MeterSrvError::PortInUse {
            port: port.into(),
            connection: owner.into(),
        }
    }
}

// ============================================================================
// From implementations for external error types
// ============================================================================

impl From<std::io::Error> for MeterSrvError {
    fn from(err: std::io::Error) -> Self {
        MeterSrvError::IoError(err.to_string())
    }
}

impl From<DecodeError> for MeterSrvError {
    fn from(err: DecodeError) -> Self {
        MeterSrvError::ProtocolError(format!("SML: {}", err))
    }
}

impl From<tokio_serial::Error> for MeterSrvError {
    fn from(err: tokio_serial::Error) -> Self {
        MeterSrvError::IoError(format!("Serial: {}", err))
    }
}

impl From<MeterError> for MeterSrvError {
    fn from(err: MeterError) -> Self {
        match err {
            MeterError::Configuration(msg) | MeterError::FileNotFound(msg) => {
                MeterSrvError::ConfigError(msg)
            },
            MeterError::Io(e) => MeterSrvError::IoError(e.to_string()),
            other => MeterSrvError::InternalError(other.to_string()),
        }
    }
}

// ============================================================================
// Extension trait for adding context to errors
// ============================================================================

/// Extension trait for adding context to errors
pub trait ErrorExt<T> {
    fn config_error(self, msg: &str) -> Result<T>;
    fn io_error(self, msg: &str) -> Result<T>;
}

impl<T, E> ErrorExt<T> for std::result::Result<T, E>
where
    E: std::fmt::Display,
{
    fn config_error(self, msg: &str) -> Result<T> {
        self.map_err(|e| MeterSrvError::ConfigError(format!("{msg}: {e}")))
    }

    fn io_error(self, msg: &str) -> Result<T> {
        self.map_err(|e| MeterSrvError::IoError(format!("{msg}: {e}")))
    }
}

// ============================================================================
// Conversion to MeterError at crate boundaries
// ============================================================================

impl From<MeterSrvError> for MeterError {
    fn from(err: MeterSrvError) -> Self {
        match err {
            MeterSrvError::ConfigError(msg) => MeterError::Configuration(msg),
            MeterSrvError::IoError(msg) => MeterError::Io(std::io::Error::other(msg)),
            MeterSrvError::ProtocolError(msg) => errors::protocol_error!("sml", msg),
            MeterSrvError::ConnectionNotFound(name) => MeterError::ConnectionNotFound(name),
            MeterSrvError::ConnectionExists(name) => MeterError::AlreadyExists(name),
            MeterSrvError::PortInUse { port, connection } => {
                MeterError::PortInUse { port, connection }
            },
            MeterSrvError::ValidationError(msg) => MeterError::Validation(msg),
            MeterSrvError::InternalError(msg) => MeterError::Internal(msg),
        }
    }
}

impl MeterErrorTrait for MeterSrvError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::ConfigError(_) => "METERSRV_CONFIG_ERROR",
            Self::IoError(_) => "METERSRV_IO_ERROR",
            Self::ProtocolError(_) => "METERSRV_PROTOCOL_ERROR",
            Self::ConnectionNotFound(_) => "METERSRV_CONNECTION_NOT_FOUND",
            Self::ConnectionExists(_) => "METERSRV_CONNECTION_EXISTS",
            Self::PortInUse { .. } => "METERSRV_PORT_IN_USE",
            Self::ValidationError(_) => "METERSRV_VALIDATION_ERROR",
            Self::InternalError(_) => "METERSRV_INTERNAL_ERROR",
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::ConfigError(_) => ErrorCategory::Configuration,
            Self::IoError(_) => ErrorCategory::Connection,
            Self::ProtocolError(_) => ErrorCategory::Protocol,
            Self::ConnectionNotFound(_) => ErrorCategory::NotFound,
            Self::ConnectionExists(_) | Self::PortInUse { .. } => ErrorCategory::Conflict,
            Self::ValidationError(_) => ErrorCategory::Validation,
            Self::InternalError(_) => ErrorCategory::Internal,
        }
    }
}
