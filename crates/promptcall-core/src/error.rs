//! Error types for promptcall-core

use promptcall_llm::LLMError;
use promptcall_prompt::PromptError;
use promptcall_utils::ConfigError;
use thiserror::Error;

/// Result type alias for promptcall-core
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for prompt calls
#[derive(Error, Debug)]
pub enum Error {
    /// Template parsing or rendering failed
    #[error(transparent)]
    Prompt(#[from] PromptError),

    /// The provider call failed
    #[error(transparent)]
    Provider(#[from] LLMError),

    /// The reply did not parse into the requested type
    #[error("Response does not match schema '{schema}': {detail}")]
    SchemaValidation {
        schema: String,
        detail: String,
        /// Text returned by the model
        raw: String,
    },

    /// Call could not be configured
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl Error {
    /// Whether repeating the call might succeed
    ///
    /// Template and binding errors are deterministic and never retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Provider(err) => err.is_retryable(),
            Error::SchemaValidation { .. } => true,
            Error::Prompt(_) | Error::Configuration(_) => false,
        }
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Configuration(err.to_string())
    }
}
