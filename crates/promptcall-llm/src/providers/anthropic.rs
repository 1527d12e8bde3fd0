//! Anthropic Claude provider implementation
//!
//! This module implements the provider traits for Anthropic's Messages API.
//! See: https://docs.anthropic.com/en/api/messages
//!
//! System messages are hoisted into the top-level `system` field. The API has
//! no JSON mode, so a requested [`ResponseFormat`](crate::ResponseFormat) is
//! appended to the system prompt as an instruction.

use crate::http;
use crate::{
    ChunkStream, CompletionRequest, CompletionResponse, ContentBlock, LLMError, LLMProvider,
    Message, MessageContent, ProviderAdapter, ResponseChunk, Result, Role, StopReason,
    TokenUsage, ToolDefinition,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument};

const ANTHROPIC_API_BASE: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Configuration for the Anthropic provider
#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    /// API key for authentication
    pub api_key: String,
    /// Base URL (default: "https://api.anthropic.com/v1")
    pub api_base: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl AnthropicConfig {
    /// Create a config with the given API key and default settings
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_base: ANTHROPIC_API_BASE.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Read `ANTHROPIC_API_KEY` (and optionally `ANTHROPIC_API_BASE`)
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY").map_err(|_| {
            LLMError::ConfigurationError(
                "ANTHROPIC_API_KEY environment variable not set".to_string(),
            )
        })?;
        let mut config = Self::new(api_key);
        if let Ok(api_base) = std::env::var("ANTHROPIC_API_BASE") {
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
}

/// Anthropic Claude provider
pub struct AnthropicProvider {
    client: Client,
    config: AnthropicConfig,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider from an API key
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_config(AnthropicConfig::new(api_key))
    }

    /// Create a provider with custom configuration
    pub fn with_config(config: AnthropicConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    /// Create a provider from environment variables
    pub fn from_env() -> Result<Self> {
        Self::with_config(AnthropicConfig::from_env()?)
    }

    /// Get the current configuration
    pub fn config(&self) -> &AnthropicConfig {
        &self.config
    }

    fn endpoint(&self) -> String {
        format!("{}/messages", self.config.api_base.trim_end_matches('/'))
    }

    fn headers(&self) -> Vec<(&'static str, String)> {
        vec![
            ("x-api-key", self.config.api_key.clone()),
            ("anthropic-version", ANTHROPIC_VERSION.to_string()),
        ]
    }
}

impl ProviderAdapter for AnthropicProvider {
    type Request = AnthropicRequest;
    type Response = AnthropicResponse;

    fn compile_request(&self, request: &CompletionRequest) -> Result<AnthropicRequest> {
        let system = request.system_instructions(true);
        let messages: Vec<AnthropicMessage> = request
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(convert_message)
            .collect();

        if messages.is_empty() {
            return Err(LLMError::InvalidRequest(
                "Anthropic requires at least one non-system message".to_string(),
            ));
        }

        Ok(AnthropicRequest {
            model: request.model.clone(),
            messages,
            system: (!system.is_empty()).then(|| system.join("\n\n")),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            top_p: request.top_p,
            tools: request.tools.clone(),
            stop_sequences: request.stop_sequences.clone(),
            stream: None,
        })
    }

    fn parse_response(
        &self,
        response: AnthropicResponse,
        raw: Value,
    ) -> Result<CompletionResponse> {
        debug!(
            stop_reason = ?response.stop_reason,
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            "Received Anthropic response"
        );

        Ok(CompletionResponse {
            id: Some(response.id),
            model: response.model,
            message: Message::with_blocks(Role::Assistant, response.content),
            stop_reason: map_stop_reason(response.stop_reason.as_deref()),
            usage: TokenUsage {
                input_tokens: response.usage.input_tokens,
                output_tokens: response.usage.output_tokens,
            },
            raw,
        })
    }

    fn parse_stream_event(data: &str) -> Result<Option<ResponseChunk>> {
        let raw: Value = serde_json::from_str(data)?;
        let event: AnthropicStreamEvent = serde_json::from_value(raw.clone())?;

        let chunk = match event {
            AnthropicStreamEvent::MessageStart { message } => ResponseChunk {
                usage: Some(TokenUsage {
                    input_tokens: message.usage.input_tokens,
                    output_tokens: 0,
                }),
                ..ResponseChunk::default()
            },
            AnthropicStreamEvent::ContentBlockDelta { delta } => match delta {
                AnthropicDelta::TextDelta { text } => ResponseChunk {
                    content: text,
                    ..ResponseChunk::default()
                },
                AnthropicDelta::Other => return Ok(None),
            },
            AnthropicStreamEvent::MessageDelta { delta, usage } => ResponseChunk {
                finish_reason: Some(map_stop_reason(delta.stop_reason.as_deref())),
                usage: usage.map(|u| TokenUsage {
                    input_tokens: 0,
                    output_tokens: u.output_tokens,
                }),
                ..ResponseChunk::default()
            },
            AnthropicStreamEvent::Error { error } => {
                return Err(LLMError::StreamError(error.message));
            }
            AnthropicStreamEvent::Other => return Ok(None),
        };

        Ok(Some(ResponseChunk { raw, ..chunk }))
    }
}

#[async_trait]
impl LLMProvider for AnthropicProvider {
    #[instrument(skip(self, request), fields(model = %request.model, api_base = %self.config.api_base))]
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        debug!("Sending request to Anthropic API");
        let body = self.compile_request(&request)?;
        let (response, raw) =
            http::post_json(&self.client, &self.endpoint(), &self.headers(), &body, &request.model)
                .await?;
        self.parse_response(response, raw)
    }

    #[instrument(skip(self, request), fields(model = %request.model, api_base = %self.config.api_base))]
    async fn stream(&self, request: CompletionRequest) -> Result<ChunkStream> {
        debug!("Opening Anthropic stream");
        let mut body = self.compile_request(&request)?;
        body.stream = Some(true);
        let events =
            http::post_stream(&self.client, &self.endpoint(), &self.headers(), &body, &request.model)
                .await?;
        Ok(events.into_chunks(Self::parse_stream_event))
    }

    fn name(&self) -> &'static str {
        "anthropic"
    }
}

// Anthropic-specific request/response types
// These match the Anthropic API format exactly

#[doc(hidden)]
#[derive(Debug, Serialize)]
pub struct AnthropicRequest {
    model: String,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    max_tokens: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ToolDefinition>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_sequences: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: &'static str,
    content: MessageContent,
}

#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct AnthropicResponse {
    id: String,
    #[serde(default)]
    model: String,
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    #[serde(default)]
    input_tokens: usize,
    #[serde(default)]
    output_tokens: usize,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicStreamEvent {
    MessageStart {
        message: AnthropicStreamMessage,
    },
    ContentBlockDelta {
        delta: AnthropicDelta,
    },
    MessageDelta {
        delta: AnthropicMessageDelta,
        #[serde(default)]
        usage: Option<AnthropicUsage>,
    },
    Error {
        error: AnthropicErrorBody,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct AnthropicStreamMessage {
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicDelta {
    TextDelta {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct AnthropicMessageDelta {
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorBody {
    message: String,
}

/// Tool role messages are user turns on this API; model turns are assistant turns
fn convert_message(msg: &Message) -> AnthropicMessage {
    let role = match msg.role {
        Role::Assistant | Role::Model => "assistant",
        Role::User | Role::Tool | Role::System => "user",
    };
    AnthropicMessage {
        role,
        content: msg
            .content
            .clone()
            .unwrap_or_else(|| MessageContent::Text(String::new())),
    }
}

fn map_stop_reason(reason: Option<&str>) -> StopReason {
    match reason {
        Some("end_turn") | None => StopReason::EndTurn,
        Some("max_tokens") => StopReason::MaxTokens,
        Some("stop_sequence") => StopReason::StopSequence,
        Some("tool_use") => StopReason::ToolUse,
        Some(other) => {
            debug!("Unknown stop reason: {}", other);
            StopReason::EndTurn
        }
    }
}
