//! Prompt templates
//!
//! This module defines [`PromptTemplate`], a template parsed once and rendered
//! into messages for every call.

use crate::parser::{Segment, SegmentRole, parse};
use crate::variables::{Placeholder, Resolved, Token, extract_variables, resolve, tokenize};
use crate::{Bindings, Result, compiler};
use promptcall_llm::Message;
use serde_json::{Value, json};
use std::fmt;
use std::str::FromStr;

/// A parsed, reusable prompt template
///
/// # Examples
///
/// ```
/// use promptcall_prompt::{Bindings, PromptTemplate};
/// use promptcall_llm::Message;
///
/// let template = PromptTemplate::new(
///     "SYSTEM: You are a librarian.\nUSER: Recommend a {genre} book.",
/// )?;
///
/// let messages = template.messages(&Bindings::new().with("genre", "fantasy"))?;
/// assert_eq!(
///     messages,
///     vec![
///         Message::system("You are a librarian."),
///         Message::user("Recommend a fantasy book."),
///     ]
/// );
/// # Ok::<(), promptcall_prompt::PromptError>(())
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct PromptTemplate {
    source: String,
    segments: Vec<Segment>,
    variables: Vec<Placeholder>,
    tags: Vec<String>,
}

impl PromptTemplate {
    /// Parse a template
    pub fn new(source: impl Into<String>) -> Result<Self> {
        let source = source.into();
        let segments = parse(&source)?;
        let mut variables: Vec<Placeholder> = Vec::new();
        for segment in &segments {
            for placeholder in extract_variables(&segment.text)? {
                if !variables.iter().any(|v| v.source == placeholder.source) {
                    variables.push(placeholder);
                }
            }
        }
        Ok(Self {
            source,
            segments,
            variables,
            tags: Vec::new(),
        })
    }

    /// Parse a docstring-style template
    ///
    /// The first line loses its leading whitespace, the remaining lines lose
    /// their common indentation, and leading/trailing blank lines are removed.
    pub fn from_docstring(doc: &str) -> Result<Self> {
        Self::new(clean_docstring(doc))
    }

    /// Attach tags (recorded by [`dump`](Self::dump))
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// The template text as given
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Every placeholder, in order of first appearance
    pub fn variables(&self) -> &[Placeholder] {
        &self.variables
    }

    /// Render every placeholder against `bindings`
    pub fn resolve(&self, bindings: &Bindings) -> Result<Resolved> {
        resolve(&self.variables, bindings)
    }

    /// Compile the template into messages
    pub fn messages(&self, bindings: &Bindings) -> Result<Vec<Message>> {
        compiler::compile(&self.segments, &self.resolve(bindings)?)
    }

    /// Render the whole template as one string
    ///
    /// Explicit role markers are kept as `ROLE: ` prefixes; a template with no
    /// markers renders to its plain text.
    pub fn format(&self, bindings: &Bindings) -> Result<String> {
        let resolved = self.resolve(bindings)?;
        let mut lines = Vec::with_capacity(self.segments.len());

        for segment in &self.segments {
            let mut body = String::new();
            for token in tokenize(&segment.text)? {
                match token {
                    Token::Text(text) => body.push_str(&text),
                    Token::Placeholder(p) => {
                        let rendered = resolved
                            .get(&p.source)
                            .ok_or_else(|| crate::PromptError::missing(&p.path))?;
                        body.push_str(&rendered.to_text());
                    }
                }
            }
            let body = body.trim();

            match (segment.role, segment.marked) {
                (SegmentRole::Messages, _) => {
                    if !body.is_empty() {
                        lines.push(body.to_string());
                    }
                }
                (role, true) => lines.push(format!("{role}: {body}").trim_end().to_string()),
                (_, false) => lines.push(body.to_string()),
            }
        }

        Ok(lines.join("\n"))
    }

    /// Describe this template and its inputs as JSON
    ///
    /// Returns `{"tags", "template", "inputs"}`.
    pub fn dump(&self, bindings: &Bindings) -> Value {
        json!({
            "tags": self.tags,
            "template": self.source,
            "inputs": bindings.to_value(),
        })
    }
}

impl fmt::Display for PromptTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl FromStr for PromptTemplate {
    type Err = crate::PromptError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

fn clean_docstring(doc: &str) -> String {
    let lines: Vec<&str> = doc.lines().collect();
    let Some((first, rest)) = lines.split_first() else {
        return String::new();
    };

    let margin = rest
        .iter()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start().len())
        .min()
        .unwrap_or(0);

    let mut cleaned: Vec<&str> = Vec::with_capacity(lines.len());
    cleaned.push(first.trim_start());
    cleaned.extend(rest.iter().map(|line| {
        if line.trim().is_empty() {
            ""
        } else {
            line.get(margin..).unwrap_or_else(|| line.trim_start())
        }
    }));

    while cleaned.first().is_some_and(|line| line.trim().is_empty()) {
        cleaned.remove(0);
    }
    while cleaned.last().is_some_and(|line| line.trim().is_empty()) {
        cleaned.pop();
    }
    cleaned.join("\n")
}
