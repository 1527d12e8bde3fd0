//! Tool definition types for LLM tool use

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Tool definition for LLM provider
///
/// Describes a function the model may ask to call: its name, a description,
/// and the JSON Schema of its arguments. Tool execution is left to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON schema for the tool's input parameters
    pub input_schema: Value,
}

impl ToolDefinition {
    /// Create a new tool definition
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }

    /// Derive the argument schema from a Rust type
    ///
    /// # Example
    ///
    /// ```
    /// use promptcall_llm::ToolDefinition;
    /// use schemars::JsonSchema;
    ///
    /// #[derive(JsonSchema)]
    /// struct Search {
    ///     query: String,
    /// }
    ///
    /// let tool = ToolDefinition::for_args::<Search>("search", "Search the web");
    /// assert_eq!(tool.input_schema["type"], "object");
    /// ```
    pub fn for_args<T: JsonSchema>(name: impl Into<String>, description: impl Into<String>) -> Self {
        let mut schema = schemars::schema_for!(T).to_value();
        if let Some(object) = schema.as_object_mut() {
            object.remove("$schema");
            object.remove("title");
        }
        Self::new(name, description, schema)
    }
}
