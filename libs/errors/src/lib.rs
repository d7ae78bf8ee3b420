//! Unified error handling for MeterLink crates
//!
//! Every crate in the workspace keeps its own domain error type (for example
//! `MeterSrvError` or the codec's `DecodeError`) and converts into [`MeterError`]
//! at crate boundaries. [`MeterErrorTrait`] gives all of them a common face for
//! logging and classification.

use thiserror::Error;

// ============================================================================
// MeterError - Main error type
// ============================================================================

/// Main error type shared by all MeterLink crates
#[derive(Debug, Error)]
pub enum MeterError {
    // ======================================
    // Configuration Errors
    // ======================================
    #[error("Configuration error: {0}")]
    Configuration(String),

    // ======================================
    // Protocol & Communication Errors
    // ======================================
    #[error("Protocol error: {protocol}: {message}")]
    Protocol { protocol: String, message: String },

    #[error("Connection failed: {endpoint}: {reason}")]
    ConnectionFailed { endpoint: String, reason: String },

    #[error("Port {port} already used by connection {connection}")]
    PortInUse { port: String, connection: String },

    // ======================================
    // Validation Errors
    // ======================================
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Invalid parameter: {param}: {reason}")]
    InvalidParameter { param: String, reason: String },

    // ======================================
    // Resource Errors
    // ======================================
    #[error("Connection not found: {0}")]
    ConnectionNotFound(String),

    #[error("Resource already exists: {0}")]
    AlreadyExists(String),

    // ======================================
    // File & I/O Errors
    // ======================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    // ======================================
    // Runtime Errors
    // ======================================
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using MeterError
pub type MeterResult<T> = Result<T, MeterError>;

impl MeterError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConnectionFailed { .. } | Self::Io(_))
    }
}

// Conversion traits for common error types
impl From<serde_json::Error> for MeterError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for MeterError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Deserialization(err.to_string())
    }
}

impl From<figment::Error> for MeterError {
    fn from(err: figment::Error) -> Self {
        Self::Configuration(err.to_string())
    }
}

// Helper macros for creating errors
#[macro_export]
macro_rules! config_error {
    ($msg:expr) => {
        $crate::MeterError::Configuration($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::MeterError::Configuration(format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! protocol_error {
    ($protocol:expr, $msg:expr) => {
        $crate::MeterError::Protocol {
            protocol: $protocol.to_string(),
            message: $msg.to_string(),
        }
    };
}

// ============================================================================
// MeterError implements MeterErrorTrait
// ============================================================================

impl MeterErrorTrait for MeterError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "CONFIGURATION_ERROR",

            Self::Protocol { .. } => "PROTOCOL_ERROR",
            Self::ConnectionFailed { .. } => "CONNECTION_FAILED",
            Self::PortInUse { .. } => "PORT_IN_USE",

            Self::Validation(_) => "VALIDATION_ERROR",
            Self::InvalidParameter { .. } => "INVALID_PARAMETER",

            Self::ConnectionNotFound(_) => "CONNECTION_NOT_FOUND",
            Self::AlreadyExists(_) => "ALREADY_EXISTS",

            Self::Io(_) => "IO_ERROR",
            Self::FileNotFound(_) => "FILE_NOT_FOUND",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Deserialization(_) => "DESERIALIZATION_ERROR",

            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration(_) => ErrorCategory::Configuration,

            Self::Protocol { .. } => ErrorCategory::Protocol,

            Self::ConnectionFailed { .. } => ErrorCategory::Connection,

            Self::Validation(_) | Self::InvalidParameter { .. } => ErrorCategory::Validation,

            Self::ConnectionNotFound(_) | Self::FileNotFound(_) => ErrorCategory::NotFound,

            Self::PortInUse { .. } | Self::AlreadyExists(_) => ErrorCategory::Conflict,

            Self::Io(_)
            | Self::Serialization(_)
            | Self::Deserialization(_)
            | Self::Internal(_) => ErrorCategory::Internal,
        }
    }
}

// ============================================================================
// MeterLink Error Trait
// ============================================================================

/// Error category enum - used for classification and log routing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Validation,
    NotFound,
    Conflict,

    // Stream/communication layer
    Protocol,
    Connection,
    Timeout,

    Internal,
    DataCorruption,
}

/// Shared error capability trait
///
/// Each crate keeps its own error enum and implements this trait to expose
/// a stable code, a category and a log level.
pub trait MeterErrorTrait: std::error::Error + Send + Sync + 'static {
    /// Get error code (for logs and monitoring)
    fn error_code(&self) -> &'static str;

    /// Get error category
    fn category(&self) -> ErrorCategory;

    /// Whether the error is retryable (default implementation is category-based)
    fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Connection | ErrorCategory::Timeout
        )
    }

    /// Get log level
    fn log_level(&self) -> tracing::Level {
        use tracing::Level;
        match self.category() {
            ErrorCategory::Internal | ErrorCategory::DataCorruption => Level::ERROR,
            ErrorCategory::Timeout | ErrorCategory::Connection | ErrorCategory::Protocol => {
                Level::WARN
            },
            ErrorCategory::Validation | ErrorCategory::NotFound => Level::INFO,
            _ => Level::WARN,
        }
    }
}
