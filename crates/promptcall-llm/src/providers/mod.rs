//! Concrete LLM provider implementations
//!
//! This module contains implementations of the LLMProvider trait for
//! various LLM services.

pub mod anthropic;
pub mod gemini;
pub mod openai;

pub use anthropic::{AnthropicConfig, AnthropicProvider};
pub use gemini::{GeminiConfig, GeminiProvider};
pub use openai::{OpenAIConfig, OpenAIProvider};
