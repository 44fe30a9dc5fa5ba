//! Formatter error types.

use thiserror::Error;

/// Errors raised while selecting a format or converting a single message.
///
/// Encoding and decoding errors are scoped to one message; they never say
/// anything about the connection the payload travelled on.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("encoding failed: {0}")]
    EncodingFailed(String),

    #[error("decoding failed: {0}")]
    DecodingFailed(String),
}

/// Convenience alias for formatter results.
pub type FormatResult<T> = Result<T, FormatError>;
