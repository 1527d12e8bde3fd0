//! OpenAI provider implementation
//!
//! This module implements the provider traits for OpenAI's chat completions API.
//! See: https://platform.openai.com/docs/api-reference/chat
//!
//! Any OpenAI-compatible server (vLLM, llama.cpp, Ollama, Azure deployments)
//! works through [`OpenAIConfig::with_api_base`].
//!
//! # Example
//!
//! ```no_run
//! use promptcall_llm::{CompletionRequest, LLMProvider, Message};
//! use promptcall_llm::providers::OpenAIProvider;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let provider = OpenAIProvider::from_env()?;
//!
//!     let request = CompletionRequest::builder("gpt-4o-mini")
//!         .add_message(Message::user("Hello!"))
//!         .max_tokens(100)
//!         .build();
//!
//!     let response = provider.complete(request).await?;
//!     println!("{}", response.content());
//!     Ok(())
//! }
//! ```

use crate::http;
use crate::{
    ChunkStream, CompletionRequest, CompletionResponse, ContentBlock, LLMError, LLMProvider,
    Message, MessageContent, ProviderAdapter, ResponseChunk, ResponseFormat, Result, Role,
    StopReason, TokenUsage, ToolDefinition,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, instrument};

const DEFAULT_OPENAI_API_BASE: &str = "https://api.openai.com/v1";
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Configuration for OpenAI provider
#[derive(Debug, Clone)]
pub struct OpenAIConfig {
    /// API key for authentication
    pub api_key: String,

    /// Base URL for the API (default: "https://api.openai.com/v1")
    pub api_base: String,

    /// Request timeout in seconds (default: 120)
    pub timeout_secs: u64,

    /// Optional allow-list of models; `None` accepts any model string
    pub supported_models: Option<Vec<String>>,
}

impl OpenAIConfig {
    /// Create a new config with the given API key and default settings
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    /// Create config from environment variables
    ///
    /// Reads the API key from `OPENAI_API_KEY` and, when set, the base URL
    /// from `OPENAI_API_BASE`.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            LLMError::ConfigurationError("OPENAI_API_KEY environment variable not set".to_string())
        })?;

        let mut config = Self::new(api_key);
        if let Ok(api_base) = std::env::var("OPENAI_API_BASE") {
            config.api_base = api_base;
        }
        Ok(config)
    }

    /// Set custom API base URL
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// Set request timeout in seconds
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Restrict the provider to these models
    pub fn with_supported_models(mut self, models: Vec<String>) -> Self {
        self.supported_models = Some(models);
        self
    }
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: DEFAULT_OPENAI_API_BASE.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            supported_models: None,
        }
    }
}

/// OpenAI provider
pub struct OpenAIProvider {
    client: Client,
    config: OpenAIConfig,
}

impl OpenAIProvider {
    /// Create a new OpenAI provider with custom configuration
    pub fn with_config(config: OpenAIConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { client, config })
    }

    /// Create a new OpenAI provider with API key and default settings
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_config(OpenAIConfig::new(api_key))
    }

    /// Create a provider from environment variables
    pub fn from_env() -> Result<Self> {
        Self::with_config(OpenAIConfig::from_env()?)
    }

    /// Get the current configuration
    pub fn config(&self) -> &OpenAIConfig {
        &self.config
    }

    fn validate_model(&self, model: &str) -> Result<()> {
        if let Some(supported) = &self.config.supported_models {
            if !supported.iter().any(|m| m == model) {
                return Err(LLMError::InvalidRequest(format!(
                    "Model '{model}' is not in the supported models list: {supported:?}"
                )));
            }
        }
        Ok(())
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.api_base.trim_end_matches('/'))
    }

    fn headers(&self) -> Vec<(&'static str, String)> {
        vec![("authorization", format!("Bearer {}", self.config.api_key))]
    }
}

impl ProviderAdapter for OpenAIProvider {
    type Request = OpenAIRequest;
    type Response = OpenAIResponse;

    fn compile_request(&self, request: &CompletionRequest) -> Result<OpenAIRequest> {
        self.validate_model(&request.model)?;

        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = &request.system {
            messages.push(OpenAIMessage::text("system", system.clone()));
        }
        for message in &request.messages {
            messages.extend(convert_message(message)?);
        }

        Ok(OpenAIRequest {
            model: request.model.clone(),
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            top_p: request.top_p,
            tools: request.tools.as_deref().map(convert_tools),
            stop: request.stop_sequences.clone(),
            response_format: request.response_format.as_ref().map(convert_format),
            stream: None,
            stream_options: None,
        })
    }

    fn parse_response(&self, response: OpenAIResponse, raw: Value) -> Result<CompletionResponse> {
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LLMError::UnexpectedResponse("No choices in response".to_string()))?;

        let usage = response.usage.map(TokenUsage::from).unwrap_or_default();
        debug!(
            finish_reason = ?choice.finish_reason,
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            "Received OpenAI response"
        );

        Ok(CompletionResponse {
            id: response.id,
            model: response.model,
            message: parse_response_message(choice.message)?,
            stop_reason: map_stop_reason(choice.finish_reason.as_deref()),
            usage,
            raw,
        })
    }

    fn parse_stream_event(data: &str) -> Result<Option<ResponseChunk>> {
        let raw: Value = serde_json::from_str(data)?;
        if let Some(error) = raw.get("error") {
            return Err(LLMError::StreamError(error.to_string()));
        }
        let chunk: OpenAIStreamChunk = serde_json::from_value(raw.clone())?;

        let (content, finish_reason) = chunk
            .choices
            .into_iter()
            .next()
            .map(|choice| {
                (
                    choice.delta.content.unwrap_or_default(),
                    choice.finish_reason.map(|r| map_stop_reason(Some(&r))),
                )
            })
            .unwrap_or_default();
        let usage = chunk.usage.map(TokenUsage::from);

        if content.is_empty() && finish_reason.is_none() && usage.is_none() {
            return Ok(None);
        }
        Ok(Some(ResponseChunk {
            content,
            finish_reason,
            usage,
            raw,
        }))
    }
}

#[async_trait]
impl LLMProvider for OpenAIProvider {
    #[instrument(skip(self, request), fields(model = %request.model, api_base = %self.config.api_base))]
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        debug!("Sending request to OpenAI API");
        let body = self.compile_request(&request)?;
        let (response, raw) =
            http::post_json(&self.client, &self.endpoint(), &self.headers(), &body, &request.model)
                .await?;
        self.parse_response(response, raw)
    }

    #[instrument(skip(self, request), fields(model = %request.model, api_base = %self.config.api_base))]
    async fn stream(&self, request: CompletionRequest) -> Result<ChunkStream> {
        debug!("Opening OpenAI stream");
        let mut body = self.compile_request(&request)?;
        body.stream = Some(true);
        body.stream_options = Some(json!({ "include_usage": true }));

        let events =
            http::post_stream(&self.client, &self.endpoint(), &self.headers(), &body, &request.model)
                .await?;
        Ok(events.into_chunks(Self::parse_stream_event))
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

// ============================================================================
// OpenAI wire types
// ============================================================================

#[doc(hidden)]
#[derive(Debug, Serialize)]
pub struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    max_tokens: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<Value>,
}

#[derive(Debug, Serialize)]
struct OpenAIMessage {
    role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl OpenAIMessage {
    fn text(role: &'static str, text: String) -> Self {
        Self {
            role,
            content: Some(Value::String(text)),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct OpenAIResponse {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    model: String,
    choices: Vec<OpenAIChoice>,
    #[serde(default)]
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<OpenAIResponseToolCall>>,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseToolCall {
    id: String,
    function: OpenAIFunctionCall,
}

#[derive(Debug, Deserialize)]
struct OpenAIFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    prompt_tokens: usize,
    completion_tokens: usize,
}

impl From<OpenAIUsage> for TokenUsage {
    fn from(usage: OpenAIUsage) -> Self {
        TokenUsage {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
        }
    }
}

#[derive(Debug, Deserialize)]
struct OpenAIStreamChunk {
    #[serde(default)]
    choices: Vec<OpenAIStreamChoice>,
    #[serde(default)]
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIStreamChoice {
    #[serde(default)]
    delta: OpenAIDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OpenAIDelta {
    #[serde(default)]
    content: Option<String>,
}

// ============================================================================
// Conversion functions
// ============================================================================

fn role_name(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant | Role::Model => "assistant",
        Role::Tool => "tool",
    }
}

/// Convert a single message; tool results expand into separate `tool` messages
fn convert_message(msg: &Message) -> Result<Vec<OpenAIMessage>> {
    let role = role_name(msg.role);
    let blocks = match &msg.content {
        None => return Ok(vec![OpenAIMessage::text(role, String::new())]),
        Some(MessageContent::Text(text)) => return Ok(vec![OpenAIMessage::text(role, text.clone())]),
        Some(MessageContent::Blocks(blocks)) => blocks,
    };

    let mut tool_messages = Vec::new();
    let mut parts = Vec::new();
    let mut tool_calls = Vec::new();

    for block in blocks {
        match block {
            ContentBlock::Text { text } => parts.push(json!({ "type": "text", "text": text })),
            ContentBlock::Image { source } => parts.push(json!({
                "type": "image_url",
                "image_url": { "url": source.to_url() },
            })),
            ContentBlock::ToolUse { id, name, input } => tool_calls.push(json!({
                "id": id,
                "type": "function",
                "function": { "name": name, "arguments": serde_json::to_string(input)? },
            })),
            ContentBlock::ToolResult {
                tool_use_id,
                content,
                ..
            } => tool_messages.push(OpenAIMessage {
                role: "tool",
                content: Some(Value::String(content.clone())),
                tool_calls: None,
                tool_call_id: Some(tool_use_id.clone()),
            }),
        }
    }

    let mut messages = Vec::with_capacity(tool_messages.len() + 1);
    if !parts.is_empty() || !tool_calls.is_empty() {
        let content = match parts.as_slice() {
            [] => None,
            [single] if single["type"] == "text" => Some(single["text"].clone()),
            _ => Some(Value::Array(parts)),
        };
        messages.push(OpenAIMessage {
            role,
            content,
            tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
            tool_call_id: None,
        });
    }
    messages.extend(tool_messages);
    Ok(messages)
}

fn convert_tools(tools: &[ToolDefinition]) -> Vec<Value> {
    tools
        .iter()
        .map(|tool| {
            json!({
                "type": "function",
                "function": {
                    "name": tool.name,
                    "description": tool.description,
                    "parameters": tool.input_schema,
                },
            })
        })
        .collect()
}

fn convert_format(format: &ResponseFormat) -> Value {
    match format {
        ResponseFormat::Json => json!({ "type": "json_object" }),
        ResponseFormat::JsonSchema { name, schema } => json!({
            "type": "json_schema",
            "json_schema": { "name": name, "schema": schema },
        }),
    }
}

fn parse_response_message(msg: OpenAIResponseMessage) -> Result<Message> {
    let mut blocks = Vec::new();

    if let Some(content) = msg.content.filter(|c| !c.is_empty()) {
        blocks.push(ContentBlock::Text { text: content });
    }

    for call in msg.tool_calls.unwrap_or_default() {
        let input: Value = serde_json::from_str(&call.function.arguments).map_err(|e| {
            LLMError::UnexpectedResponse(format!("Failed to parse tool arguments: {e}"))
        })?;
        blocks.push(ContentBlock::ToolUse {
            id: call.id,
            name: call.function.name,
            input,
        });
    }

    if blocks.is_empty() {
        blocks.push(ContentBlock::text(""));
    }

    Ok(Message::with_blocks(Role::Assistant, blocks))
}

fn map_stop_reason(reason: Option<&str>) -> StopReason {
    match reason {
        Some("stop") | None => StopReason::EndTurn,
        Some("length") => StopReason::MaxTokens,
        Some("tool_calls" | "function_call") => StopReason::ToolUse,
        Some(other) => {
            debug!("Unmapped OpenAI finish reason: {}", other);
            StopReason::EndTurn
        }
    }
}
