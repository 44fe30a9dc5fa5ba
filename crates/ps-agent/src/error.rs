use ps_formatters::FormatError;
use ps_provider::ProviderError;
use thiserror::Error;

/// Errors surfaced by the integration runtime.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("no integration configured for application '{0}'")]
    UnknownApplication(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Format(#[from] FormatError),
}

pub type AgentResult<T> = Result<T, AgentError>;
