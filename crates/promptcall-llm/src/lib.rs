//! LLM provider abstraction layer for promptcall
//!
//! This crate provides provider-agnostic abstractions for interacting with
//! Large Language Models (LLMs). It includes:
//!
//! - Message types for LLM communication (text and multi-modal content)
//! - Completion request/response types, including JSON response formats
//! - Tool definitions for function calling
//! - The [`LLMProvider`] trait callers depend on and the per-provider
//!   [`ProviderAdapter`] translation seam
//! - Server-sent-event streaming of response chunks
//! - Concrete adapters for OpenAI, Anthropic and Gemini

pub mod completion;
pub mod error;
mod http;
pub mod messages;
pub mod provider;
pub mod providers;
pub mod stream;
pub mod tools;

// Re-export main types
pub use completion::{
    CompletionRequest, CompletionResponse, ResponseFormat, StopReason, TokenUsage,
};
pub use error::{LLMError, Result};
pub use messages::{ContentBlock, ImageSource, Message, MessageContent, Role, UnknownRole};
pub use provider::{LLMProvider, ProviderAdapter};
pub use stream::{ChunkStream, ResponseChunk, collect_chunks};
pub use tools::ToolDefinition;
