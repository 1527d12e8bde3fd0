//! Error types for LLM operations

use thiserror::Error;

/// Result type for LLM operations
pub type Result<T> = std::result::Result<T, LLMError>;

/// Errors that can occur while talking to a provider
///
/// Every failure raised by a provider adapter surfaces as one of these
/// variants; nothing is retried automatically.
#[derive(Error, Debug)]
pub enum LLMError {
    /// API request failed
    #[error("API request failed: {0}")]
    RequestFailed(String),

    /// Invalid API key or authentication failed
    #[error("Invalid API key or authentication failed")]
    AuthenticationFailed,

    /// Rate limit exceeded
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// Invalid request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Model not found
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// HTTP error
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Unexpected response format
    #[error("Unexpected response format: {0}")]
    UnexpectedResponse(String),

    /// Provider-specific error
    #[error("Provider error: {0}")]
    ProviderError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// The provider broke off or reported an error mid-stream
    #[error("Stream error: {0}")]
    StreamError(String),
}

impl LLMError {
    /// Whether an outer retry policy may reasonably try the call again
    ///
    /// Rate limits, transport failures, server-side (5xx) failures and broken
    /// streams are transient; authentication, validation and configuration
    /// failures are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            LLMError::RateLimitExceeded(_) | LLMError::StreamError(_) => true,
            LLMError::HttpError(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            LLMError::RequestFailed(detail) => detail.starts_with("HTTP 5"),
            _ => false,
        }
    }
}
