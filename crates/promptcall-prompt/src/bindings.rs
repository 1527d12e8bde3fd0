//! Attribute bindings supplied to a template

use crate::{PromptError, Result};
use serde::Serialize;
use serde_json::{Map, Value};

/// Named values a template's placeholders are resolved against
///
/// Built fresh for every call and only read during resolution.
///
/// ```
/// use promptcall_prompt::Bindings;
///
/// let bindings = Bindings::new()
///     .with("genre", "fantasy")
///     .with("tags", vec!["epic", "magic"]);
/// assert!(bindings.contains("genre"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Bindings(Map<String, Value>);

impl Bindings {
    /// Empty bindings
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a binding
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Add (or replace) a binding in place
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(name.into(), value.into());
    }

    /// Build from a JSON object
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(PromptError::InvalidBindings(format!(
                "expected a JSON object, got {}",
                kind(&other)
            ))),
        }
    }

    /// Build from any value that serializes to a JSON object (e.g. a struct)
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        Self::from_value(serde_json::to_value(value)?)
    }

    /// Look up a top-level binding
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The bindings as a JSON object
    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

impl From<Map<String, Value>> for Bindings {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

pub(crate) fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
