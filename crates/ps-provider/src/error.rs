//! Provider and connection error types.

use ps_protocol::{MessageCategory, ProviderTag};
use thiserror::Error;

/// Errors that can occur while resolving a provider or driving a connection.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("unsupported backend: {0}")]
    UnsupportedBackend(ProviderTag),

    #[error("provider already registered for backend {0}")]
    DuplicateProvider(ProviderTag),

    #[error("process-wide provider registry already installed")]
    RegistryInstalled,

    #[error("connect timed out after {timeout_ms}ms")]
    ConnectTimeout { timeout_ms: u64 },

    #[error("connection attempt cancelled")]
    Cancelled,

    #[error("failed to open topic for {category}: {reason}")]
    TopicOpenFailed {
        category: MessageCategory,
        reason: String,
    },

    #[error("connection error: {0}")]
    Connection(String),

    #[error("publish error: {0}")]
    Publish(String),

    #[error("subscribe error: {0}")]
    Subscribe(String),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("disconnect error: {0}")]
    Disconnect(String),
}

/// Convenience alias for provider results.
pub type ProviderResult<T> = Result<T, ProviderError>;
