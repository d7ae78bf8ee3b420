//! SML decoding errors

use errors::{ErrorCategory, MeterErrorTrait};
use thiserror::Error;

/// Failure to decode one SML payload
///
/// Offsets are relative to the unescaped payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("Unexpected end of data at offset {offset}")]
    UnexpectedEnd { offset: usize },

    #[error("Invalid type-length byte {byte:#04X} at offset {offset}")]
    InvalidTypeLength { byte: u8, offset: usize },

    #[error("Expected {expected} at offset {offset}")]
    UnexpectedType {
        expected: &'static str,
        offset: usize,
    },

    #[error("Invalid length {length} at offset {offset}")]
    InvalidLength { length: usize, offset: usize },

    #[error("CRC mismatch: stored {stored:#06X}, computed {computed:#06X}")]
    CrcMismatch { stored: u16, computed: u16 },

    #[error("Missing end of message at offset {offset}")]
    MissingEndOfMessage { offset: usize },
}

pub type Result<T> = std::result::Result<T, DecodeError>;

impl MeterErrorTrait for DecodeError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::UnexpectedEnd { .. } => "SML_UNEXPECTED_END",
            Self::InvalidTypeLength { .. } => "SML_INVALID_TL",
            Self::UnexpectedType { .. } => "SML_UNEXPECTED_TYPE",
            Self::InvalidLength { .. } => "SML_INVALID_LENGTH",
            Self::CrcMismatch { .. } => "SML_CRC_MISMATCH",
            Self::MissingEndOfMessage { .. } => "SML_MISSING_END",
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::CrcMismatch { .. } => ErrorCategory::DataCorruption,
            _ => ErrorCategory::Protocol,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let err = DecodeError::CrcMismatch {
            stored: 0x1234,
            computed: 0xABCD,
        };
        assert_eq!(err.category(), ErrorCategory::DataCorruption);
        assert_eq!(err.to_string(), "CRC mismatch: stored 0x1234, computed 0xABCD");

        let err = DecodeError::UnexpectedEnd { offset: 7 };
        assert_eq!(err.error_code(), "SML_UNEXPECTED_END");
        assert!(!err.is_retryable());
    }
}
