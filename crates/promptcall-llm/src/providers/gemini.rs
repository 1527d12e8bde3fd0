//! Google Gemini provider implementation
//!
//! Targets the Generative Language API (`generateContent` and
//! `streamGenerateContent`). Assistant turns are sent with the `model` role and
//! system text travels in `systemInstruction`.

use crate::http;
use crate::{
    ChunkStream, CompletionRequest, CompletionResponse, ContentBlock, ImageSource, LLMError,
    LLMProvider, Message, MessageContent, ProviderAdapter, ResponseChunk, ResponseFormat, Result,
    Role, StopReason, TokenUsage, ToolDefinition,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument};

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Configuration for the Gemini provider
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    /// API key for authentication
    pub api_key: String,
    /// Base URL (default: "https://generativelanguage.googleapis.com/v1beta")
    pub api_base: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_base: GEMINI_API_BASE.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Read `GEMINI_API_KEY` (and optionally `GEMINI_API_BASE`)
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("GEMINI_API_KEY").map_err(|_| {
            LLMError::ConfigurationError("GEMINI_API_KEY environment variable not set".to_string())
        })?;
        let mut config = Self::new(api_key);
        if let Ok(api_base) = std::env::var("GEMINI_API_BASE") {
            config.api_base = api_base;
        }
        Ok(config)
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }
}

/// Google Gemini provider
pub struct GeminiProvider {
    client: Client,
    config: GeminiConfig,
}

impl GeminiProvider {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_config(GeminiConfig::new(api_key))
    }

    pub fn with_config(config: GeminiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    pub fn from_env() -> Result<Self> {
        Self::with_config(GeminiConfig::from_env()?)
    }

    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }

    fn endpoint(&self, model: &str, stream: bool) -> String {
        let base = self.config.api_base.trim_end_matches('/');
        if stream {
            format!("{base}/models/{model}:streamGenerateContent?alt=sse")
        } else {
            format!("{base}/models/{model}:generateContent")
        }
    }

    fn headers(&self) -> Vec<(&'static str, String)> {
        vec![("x-goog-api-key", self.config.api_key.clone())]
    }
}

impl ProviderAdapter for GeminiProvider {
    type Request = GeminiRequest;
    type Response = GeminiResponse;

    fn compile_request(&self, request: &CompletionRequest) -> Result<GeminiRequest> {
        let contents: Vec<GeminiContent> = request
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(convert_message)
            .collect();

        if contents.is_empty() {
            return Err(LLMError::InvalidRequest(
                "Gemini requires at least one non-system message".to_string(),
            ));
        }

        // Native JSON mode covers the format; the schema itself still goes in
        // as an instruction since the API accepts only an OpenAPI subset.
        let mut system = request.system_instructions(false);
        let response_mime_type = request.response_format.as_ref().map(|format| {
            if let ResponseFormat::JsonSchema { .. } = format {
                system.push(format.instruction());
            }
            "application/json"
        });

        let system_instruction = (!system.is_empty()).then(|| GeminiContent {
            role: None,
            parts: vec![GeminiPart::Text(system.join("\n\n"))],
        });

        let tools = request.tools.as_ref().map(|tools| {
            vec![GeminiTools {
                function_declarations: tools.iter().map(convert_tool).collect(),
            }]
        });

        Ok(GeminiRequest {
            contents,
            system_instruction,
            generation_config: GenerationConfig {
                max_output_tokens: request.max_tokens,
                temperature: request.temperature,
                top_p: request.top_p,
                stop_sequences: request.stop_sequences.clone(),
                response_mime_type,
            },
            tools,
        })
    }

    fn parse_response(&self, response: GeminiResponse, raw: Value) -> Result<CompletionResponse> {
        let model = response.model_version.unwrap_or_default();
        let usage = response.usage_metadata.map(TokenUsage::from).unwrap_or_default();
        let candidate = response.candidates.into_iter().next().ok_or_else(|| {
            LLMError::UnexpectedResponse("No candidates in Gemini response".to_string())
        })?;

        debug!(
            finish_reason = ?candidate.finish_reason,
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            "Received Gemini response"
        );

        let blocks: Vec<ContentBlock> = candidate
            .content
            .map(|c| c.parts)
            .unwrap_or_default()
            .into_iter()
            .enumerate()
            .filter_map(|(index, part)| part.into_block(index))
            .collect();

        let has_calls = blocks
            .iter()
            .any(|b| matches!(b, ContentBlock::ToolUse { .. }));
        let stop_reason = if has_calls {
            StopReason::ToolUse
        } else {
            map_finish_reason(candidate.finish_reason.as_deref())
        };

        Ok(CompletionResponse {
            id: response.response_id,
            model,
            message: Message::with_blocks(Role::Assistant, blocks),
            stop_reason,
            usage,
            raw,
        })
    }

    fn parse_stream_event(data: &str) -> Result<Option<ResponseChunk>> {
        let raw: Value = serde_json::from_str(data)?;
        let event: GeminiResponse = serde_json::from_value(raw.clone())?;

        let Some(candidate) = event.candidates.into_iter().next() else {
            return Ok(None);
        };

        let content: String = candidate
            .content
            .map(|c| c.parts)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|part| part.text)
            .collect();

        // Usage is cumulative on every event; only the final one is counted.
        let finish_reason = candidate
            .finish_reason
            .as_deref()
            .map(|reason| map_finish_reason(Some(reason)));
        let usage = finish_reason
            .and(event.usage_metadata)
            .map(TokenUsage::from);

        Ok(Some(ResponseChunk {
            content,
            finish_reason,
            usage,
            raw,
        }))
    }
}

#[async_trait]
impl LLMProvider for GeminiProvider {
    #[instrument(skip(self, request), fields(model = %request.model, api_base = %self.config.api_base))]
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        debug!("Sending request to Gemini API");
        let body = self.compile_request(&request)?;
        let url = self.endpoint(&request.model, false);
        let (response, raw) =
            http::post_json(&self.client, &url, &self.headers(), &body, &request.model).await?;
        self.parse_response(response, raw)
    }

    #[instrument(skip(self, request), fields(model = %request.model, api_base = %self.config.api_base))]
    async fn stream(&self, request: CompletionRequest) -> Result<ChunkStream> {
        debug!("Opening Gemini stream");
        let body = self.compile_request(&request)?;
        let url = self.endpoint(&request.model, true);
        let events =
            http::post_stream(&self.client, &url, &self.headers(), &body, &request.model).await?;
        Ok(events.into_chunks(Self::parse_stream_event))
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}

// Gemini-specific request/response types

#[doc(hidden)]
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<GeminiTools>>,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
enum GeminiPart {
    Text(String),
    InlineData {
        #[serde(rename = "mimeType")]
        mime_type: String,
        data: String,
    },
    FileData {
        #[serde(rename = "mimeType")]
        mime_type: String,
        #[serde(rename = "fileUri")]
        file_uri: String,
    },
    FunctionCall {
        name: String,
        args: Value,
    },
    FunctionResponse {
        name: String,
        response: Value,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_sequences: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiTools {
    function_declarations: Vec<GeminiFunction>,
}

#[derive(Debug, Serialize)]
struct GeminiFunction {
    name: String,
    description: String,
    parameters: Value,
}

#[doc(hidden)]
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    usage_metadata: Option<GeminiUsage>,
    #[serde(default)]
    model_version: Option<String>,
    #[serde(default)]
    response_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiResponseContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponsePart {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    function_call: Option<GeminiFunctionCall>,
}

#[derive(Debug, Deserialize)]
struct GeminiFunctionCall {
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsage {
    #[serde(default)]
    prompt_token_count: usize,
    #[serde(default)]
    candidates_token_count: usize,
}

impl From<GeminiUsage> for TokenUsage {
    fn from(usage: GeminiUsage) -> Self {
        TokenUsage {
            input_tokens: usage.prompt_token_count,
            output_tokens: usage.candidates_token_count,
        }
    }
}

impl GeminiResponsePart {
    /// The API does not id function calls; ids are synthesised from position
    fn into_block(self, index: usize) -> Option<ContentBlock> {
        if let Some(call) = self.function_call {
            return Some(ContentBlock::ToolUse {
                id: format!("call_{index}"),
                name: call.name,
                input: call.args,
            });
        }
        self.text.map(|text| ContentBlock::Text { text })
    }
}

fn convert_message(msg: &Message) -> GeminiContent {
    let role = match msg.role {
        Role::Assistant | Role::Model => "model",
        Role::User | Role::Tool | Role::System => "user",
    };

    let parts = match &msg.content {
        Some(MessageContent::Text(text)) => vec![GeminiPart::Text(text.clone())],
        Some(MessageContent::Blocks(blocks)) => blocks.iter().map(convert_block).collect(),
        None => Vec::new(),
    };

    GeminiContent {
        role: Some(role),
        parts,
    }
}

fn convert_block(block: &ContentBlock) -> GeminiPart {
    match block {
        ContentBlock::Text { text } => GeminiPart::Text(text.clone()),
        ContentBlock::Image {
            source: ImageSource::Base64 { media_type, data },
        } => GeminiPart::InlineData {
            mime_type: media_type.clone(),
            data: data.clone(),
        },
        ContentBlock::Image {
            source: ImageSource::Url { url },
        } => GeminiPart::FileData {
            mime_type: guess_mime_type(url).to_string(),
            file_uri: url.clone(),
        },
        ContentBlock::ToolUse { name, input, .. } => GeminiPart::FunctionCall {
            name: name.clone(),
            args: input.clone(),
        },
        ContentBlock::ToolResult {
            tool_use_id,
            content,
            ..
        } => GeminiPart::FunctionResponse {
            name: tool_use_id.clone(),
            response: serde_json::json!({ "content": content }),
        },
    }
}

fn convert_tool(tool: &ToolDefinition) -> GeminiFunction {
    GeminiFunction {
        name: tool.name.clone(),
        description: tool.description.clone(),
        parameters: tool.input_schema.clone(),
    }
}

fn guess_mime_type(url: &str) -> &'static str {
    let path = url.split(['?', '#']).next().unwrap_or(url).to_ascii_lowercase();
    if path.ends_with(".png") {
        "image/png"
    } else if path.ends_with(".gif") {
        "image/gif"
    } else if path.ends_with(".webp") {
        "image/webp"
    } else {
        "image/jpeg"
    }
}

fn map_finish_reason(reason: Option<&str>) -> StopReason {
    match reason {
        Some("STOP") | None => StopReason::EndTurn,
        Some("MAX_TOKENS") => StopReason::MaxTokens,
        Some(other) => {
            debug!("Unmapped finish reason: {}", other);
            StopReason::EndTurn
        }
    }
}
