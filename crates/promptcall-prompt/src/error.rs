//! Error types for prompt operations

use thiserror::Error;

/// Result type for prompt operations
pub type Result<T> = std::result::Result<T, PromptError>;

/// Errors that can occur while parsing or rendering a template
#[derive(Error, Debug)]
pub enum PromptError {
    /// Malformed role marker or placeholder syntax
    #[error("Invalid template: {detail}")]
    TemplateFormat { detail: String },

    /// A referenced name or path is absent from the bindings
    #[error("Missing variable '{path}' in template bindings")]
    MissingVariable { path: String },

    /// A bound value has the wrong shape for how the template uses it
    #[error("Invalid bindings: {0}")]
    InvalidBindings(String),

    /// Bindings could not be converted to JSON
    #[error("Failed to serialize bindings: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PromptError {
    pub(crate) fn format(detail: impl Into<String>) -> Self {
        PromptError::TemplateFormat {
            detail: detail.into(),
        }
    }

    pub(crate) fn missing(path: impl Into<String>) -> Self {
        PromptError::MissingVariable { path: path.into() }
    }
}
