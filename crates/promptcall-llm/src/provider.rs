//! LLM provider traits

use crate::{ChunkStream, CompletionRequest, CompletionResponse, ResponseChunk, Result};
use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

/// Trait for LLM providers
///
/// This is the only seam the call layer depends on. Implementations give
/// access to different LLM services (e.g., OpenAI, Anthropic, Gemini).
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Generate a completion from the LLM
    ///
    /// # Arguments
    ///
    /// * `request` - The completion request with messages, tools, and parameters
    ///
    /// # Returns
    ///
    /// The completion response with the assistant's message and metadata
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;

    /// Stream a completion as incremental chunks
    async fn stream(&self, request: CompletionRequest) -> Result<ChunkStream>;

    /// Get the provider name (e.g., "openai", "anthropic")
    fn name(&self) -> &str;
}

/// Translation between the uniform request/response types and one vendor's API
///
/// Adapters keep the wire shapes private; [`LLMProvider`] implementations
/// glue `compile_request`, the HTTP exchange and `parse_response` together.
pub trait ProviderAdapter {
    /// Native request body
    type Request: Serialize + Send + Sync;

    /// Native response body
    type Response: DeserializeOwned;

    /// Build the provider request for a uniform completion request
    fn compile_request(&self, request: &CompletionRequest) -> Result<Self::Request>;

    /// Map the provider response (plus its raw JSON) to the uniform response
    fn parse_response(&self, response: Self::Response, raw: Value) -> Result<CompletionResponse>;

    /// Map one streamed event payload to a chunk
    ///
    /// Returns `Ok(None)` for events that carry nothing for the caller
    /// (pings, block boundaries).
    fn parse_stream_event(data: &str) -> Result<Option<ResponseChunk>>;
}
