//! Completion request and response types

use crate::{ContentBlock, Message, ToolDefinition};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Structured output the caller wants back
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseFormat {
    /// Any well-formed JSON object
    Json,
    /// JSON conforming to the given JSON Schema
    JsonSchema {
        /// Schema name (reported to providers that accept one)
        name: String,
        /// The JSON Schema document
        schema: Value,
    },
}

impl ResponseFormat {
    /// Plain-language instruction for providers without a native JSON mode
    pub fn instruction(&self) -> String {
        match self {
            ResponseFormat::Json => {
                "Respond only with a valid JSON object. Do not include any other text.".to_string()
            }
            ResponseFormat::JsonSchema { schema, .. } => format!(
                "Respond only with a JSON object that conforms to the following JSON schema. \
                 Do not include any other text.\n{schema}"
            ),
        }
    }
}

/// Request for LLM completion with full conversation history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Model identifier (provider-specific)
    pub model: String,

    /// Conversation history, in order
    pub messages: Vec<Message>,

    /// Optional system prompt, placed ahead of any system messages in `messages`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    /// Maximum tokens to generate
    pub max_tokens: usize,

    /// Sampling temperature
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Nucleus sampling parameter
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    /// Tools available for the LLM to call
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDefinition>>,

    /// Stop sequences
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,

    /// Requested structured output format
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
}

/// Uniform response from any provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// Provider-assigned response id, when reported
    pub id: Option<String>,

    /// Model that produced the response
    pub model: String,

    /// Generated message from the assistant
    pub message: Message,

    /// Stop reason (completed, max_tokens, tool_use, etc.)
    pub stop_reason: StopReason,

    /// Token usage statistics
    pub usage: TokenUsage,

    /// The provider's response body, untouched
    pub raw: Value,
}

impl CompletionResponse {
    /// Text content of the generated message
    pub fn content(&self) -> String {
        self.message.text_content()
    }

    /// Tool calls requested by the model
    pub fn tool_uses(&self) -> Vec<&ContentBlock> {
        self.message.tool_uses()
    }
}

/// Reason the LLM stopped generating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Natural completion (end of turn)
    EndTurn,

    /// Hit max tokens limit
    MaxTokens,

    /// Stop sequence encountered
    StopSequence,

    /// Tool use requested
    ToolUse,
}

/// Token usage statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Number of input tokens
    pub input_tokens: usize,

    /// Number of output tokens
    pub output_tokens: usize,
}

impl TokenUsage {
    /// Total tokens used (input + output)
    pub fn total(&self) -> usize {
        self.input_tokens + self.output_tokens
    }

    /// Add another usage report to this one
    pub fn accumulate(&mut self, other: TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }
}

impl CompletionRequest {
    /// Create a builder for completion requests
    pub fn builder(model: impl Into<String>) -> CompletionRequestBuilder {
        CompletionRequestBuilder::new(model)
    }

    /// Every system instruction for this request, in order
    ///
    /// Collects `system`, the text of system-role messages and, when a JSON
    /// format is requested, its instruction. Used by providers that carry the
    /// system prompt outside the message list.
    pub fn system_instructions(&self, include_format: bool) -> Vec<String> {
        let mut parts: Vec<String> = self.system.iter().cloned().collect();
        parts.extend(
            self.messages
                .iter()
                .filter(|m| m.role == crate::Role::System)
                .map(Message::text_content)
                .filter(|text| !text.is_empty()),
        );
        if include_format {
            if let Some(format) = &self.response_format {
                parts.push(format.instruction());
            }
        }
        parts
    }
}

/// Builder for CompletionRequest
pub struct CompletionRequestBuilder {
    request: CompletionRequest,
}

impl CompletionRequestBuilder {
    /// Create a new builder
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            request: CompletionRequest {
                model: model.into(),
                messages: Vec::new(),
                system: None,
                max_tokens: 1024,
                temperature: None,
                top_p: None,
                tools: None,
                stop_sequences: None,
                response_format: None,
            },
        }
    }

    /// Set the conversation messages
    pub fn messages(mut self, messages: Vec<Message>) -> Self {
        self.request.messages = messages;
        self
    }

    /// Add a single message
    pub fn add_message(mut self, message: Message) -> Self {
        self.request.messages.push(message);
        self
    }

    /// Set the system prompt
    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.request.system = Some(system.into());
        self
    }

    /// Set the maximum tokens
    pub fn max_tokens(mut self, max_tokens: usize) -> Self {
        self.request.max_tokens = max_tokens;
        self
    }

    /// Set the temperature
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.request.temperature = Some(temperature);
        self
    }

    /// Set top-p
    pub fn top_p(mut self, top_p: f32) -> Self {
        self.request.top_p = Some(top_p);
        self
    }

    /// Set the available tools
    pub fn tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.request.tools = Some(tools);
        self
    }

    /// Set stop sequences
    pub fn stop_sequences(mut self, sequences: Vec<String>) -> Self {
        self.request.stop_sequences = Some(sequences);
        self
    }

    /// Request structured output
    pub fn response_format(mut self, format: ResponseFormat) -> Self {
        self.request.response_format = Some(format);
        self
    }

    /// Build the completion request
    pub fn build(self) -> CompletionRequest {
        self.request
    }
}
