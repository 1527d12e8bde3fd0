//! Uniform call response

use crate::{Result, structured};
use promptcall_llm::{CompletionResponse, ContentBlock, Message, StopReason, TokenUsage};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// What a call returns, whichever provider served it
#[derive(Debug, Clone, PartialEq)]
pub struct CallResponse {
    response: CompletionResponse,
    /// The compiled prompt that was sent
    messages: Vec<Message>,
}

impl CallResponse {
    pub fn new(response: CompletionResponse, messages: Vec<Message>) -> Self {
        Self { response, messages }
    }

    /// Text of the generated message
    pub fn content(&self) -> String {
        self.response.content()
    }

    /// The generated message
    pub fn message(&self) -> &Message {
        &self.response.message
    }

    /// The prompt messages the provider received
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn usage(&self) -> TokenUsage {
        self.response.usage
    }

    pub fn stop_reason(&self) -> StopReason {
        self.response.stop_reason
    }

    pub fn model(&self) -> &str {
        &self.response.model
    }

    /// Provider response body, untouched
    pub fn raw(&self) -> &Value {
        &self.response.raw
    }

    /// Tool calls requested by the model
    pub fn tool_uses(&self) -> Vec<&ContentBlock> {
        self.response.tool_uses()
    }

    /// Parse the reply text as JSON into `T`
    ///
    /// Errors name `T` by its JSON schema name, as [`Call::extract`](crate::Call::extract) does.
    pub fn parse<T: JsonSchema + DeserializeOwned>(&self) -> Result<T> {
        structured::parse_json(&self.content(), &T::schema_name())
    }

    /// The underlying completion response
    pub fn into_inner(self) -> CompletionResponse {
        self.response
    }
}

impl std::fmt::Display for CallResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.content())
    }
}
