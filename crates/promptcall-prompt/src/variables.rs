//! Placeholder extraction and resolution
//!
//! A placeholder is `{path}` or `{path:spec}`. `path` is a dotted sequence of
//! keys and array indices (`book.authors.0`); `spec` picks a rendering.
//! `{{` and `}}` are literal braces.

use crate::bindings::kind;
use crate::{Bindings, PromptError, Result, compiler};
use promptcall_llm::{ContentBlock, Message};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Rendered values keyed by placeholder source text (the part between braces)
pub type Resolved = BTreeMap<String, Rendered>;

/// Largest number of decimal places `.<N>f` accepts
pub const MAX_PRECISION: usize = 64;

/// How a placeholder's value is rendered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatSpec {
    /// One element per line
    List,
    /// List of lists: inner elements per line, groups separated by a blank line
    Lists,
    /// Elements joined with a custom separator (`sep=<text>`)
    Separator(String),
    /// Compact JSON
    Json,
    Upper,
    Lower,
    Trim,
    /// First character upper case, the rest lower case
    Capitalize,
    /// Fixed number of decimal places (`.2f`)
    Precision(usize),
    /// A single image (URL or `data:` URI)
    Image,
    /// A list of images
    Images,
    /// A list of message objects spliced into the conversation
    Messages,
}

impl FormatSpec {
    /// Whether this spec produces image content rather than text
    pub fn is_image(&self) -> bool {
        matches!(self, FormatSpec::Image | FormatSpec::Images)
    }
}

impl FromStr for FormatSpec {
    type Err = PromptError;

    fn from_str(spec: &str) -> Result<Self> {
        let parsed = match spec {
            "list" => FormatSpec::List,
            "lists" => FormatSpec::Lists,
            "json" => FormatSpec::Json,
            "upper" => FormatSpec::Upper,
            "lower" => FormatSpec::Lower,
            "trim" => FormatSpec::Trim,
            "capitalize" => FormatSpec::Capitalize,
            "image" => FormatSpec::Image,
            "images" => FormatSpec::Images,
            "messages" => FormatSpec::Messages,
            other => {
                if let Some(sep) = other.strip_prefix("sep=") {
                    FormatSpec::Separator(sep.to_string())
                } else if let Some(digits) = other
                    .strip_prefix('.')
                    .and_then(|rest| rest.strip_suffix('f'))
                    .filter(|d| !d.is_empty() && d.bytes().all(|b| b.is_ascii_digit()))
                {
                    let digits: usize = digits
                        .parse()
                        .ok()
                        .filter(|n| *n <= MAX_PRECISION)
                        .ok_or_else(|| {
                            PromptError::format(format!(
                                "invalid precision '{other}' (at most {MAX_PRECISION} digits)"
                            ))
                        })?;
                    FormatSpec::Precision(digits)
                } else {
                    return Err(PromptError::format(format!("unknown format spec '{other}'")));
                }
            }
        };
        Ok(parsed)
    }
}

impl fmt::Display for FormatSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatSpec::List => f.write_str("list"),
            FormatSpec::Lists => f.write_str("lists"),
            FormatSpec::Separator(sep) => write!(f, "sep={sep}"),
            FormatSpec::Json => f.write_str("json"),
            FormatSpec::Upper => f.write_str("upper"),
            FormatSpec::Lower => f.write_str("lower"),
            FormatSpec::Trim => f.write_str("trim"),
            FormatSpec::Capitalize => f.write_str("capitalize"),
            FormatSpec::Precision(n) => write!(f, ".{n}f"),
            FormatSpec::Image => f.write_str("image"),
            FormatSpec::Images => f.write_str("images"),
            FormatSpec::Messages => f.write_str("messages"),
        }
    }
}

/// One step of a placeholder path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// A variable reference inside template text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    /// Source text between the braces, e.g. `book.title:upper`
    pub source: String,
    /// Dotted path, e.g. `book.title`
    pub path: String,
    /// Optional rendering hint
    pub spec: Option<FormatSpec>,
    segments: Vec<PathSegment>,
}

impl Placeholder {
    /// Parse the text between a pair of braces
    pub fn parse(source: &str) -> Result<Self> {
        let (path, spec) = match source.split_once(':') {
            Some((path, spec)) => (path, Some(spec.parse::<FormatSpec>()?)),
            None => (source, None),
        };
        let segments = parse_path(path)?;
        Ok(Self {
            source: source.to_string(),
            path: path.to_string(),
            spec,
            segments,
        })
    }

    /// Top-level binding name
    pub fn name(&self) -> &str {
        match self.segments.first() {
            Some(PathSegment::Key(key)) => key,
            _ => &self.path,
        }
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// Walk the path through the bindings
    pub fn lookup<'a>(&self, bindings: &'a Bindings) -> Result<&'a Value> {
        let mut segments = self.segments.iter();
        let mut current = match segments.next() {
            Some(PathSegment::Key(name)) => bindings.get(name),
            _ => None,
        }
        .ok_or_else(|| PromptError::missing(&self.path))?;

        for segment in segments {
            let next = match (segment, current) {
                (PathSegment::Key(key), Value::Object(map)) => map.get(key),
                (PathSegment::Index(index), Value::Array(items)) => items.get(*index),
                (PathSegment::Index(index), Value::Object(map)) => map.get(&index.to_string()),
                _ => None,
            };
            current = next.ok_or_else(|| PromptError::missing(&self.path))?;
        }
        Ok(current)
    }
}

fn parse_path(path: &str) -> Result<Vec<PathSegment>> {
    if path.is_empty() {
        return Err(PromptError::format("empty placeholder '{}'"));
    }

    path.split('.')
        .enumerate()
        .map(|(position, part)| {
            if is_identifier(part) {
                Ok(PathSegment::Key(part.to_string()))
            } else if position > 0 && !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit()) {
                part.parse()
                    .map(PathSegment::Index)
                    .map_err(|_| PromptError::format(format!("invalid index in '{path}'")))
            } else {
                Err(PromptError::format(format!(
                    "invalid placeholder path '{path}'"
                )))
            }
        })
        .collect()
}

fn is_identifier(part: &str) -> bool {
    let mut chars = part.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Template text split into literal runs and placeholders
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Text(String),
    Placeholder(Placeholder),
}

pub(crate) fn tokenize(text: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut literal = String::new();
    let mut chars = text.char_indices().peekable();

    while let Some((start, c)) = chars.next() {
        match c {
            '{' if chars.peek().is_some_and(|(_, next)| *next == '{') => {
                chars.next();
                literal.push('{');
            }
            '}' if chars.peek().is_some_and(|(_, next)| *next == '}') => {
                chars.next();
                literal.push('}');
            }
            '{' => {
                let mut end = None;
                for (pos, inner) in chars.by_ref() {
                    match inner {
                        '}' => {
                            end = Some(pos);
                            break;
                        }
                        '{' => {
                            return Err(PromptError::format(format!(
                                "nested '{{' in placeholder at offset {pos}"
                            )));
                        }
                        _ => {}
                    }
                }
                let end = end.ok_or_else(|| {
                    PromptError::format(format!("unterminated placeholder at offset {start}"))
                })?;
                if !literal.is_empty() {
                    tokens.push(Token::Text(std::mem::take(&mut literal)));
                }
                tokens.push(Token::Placeholder(Placeholder::parse(&text[start + 1..end])?));
            }
            '}' => {
                return Err(PromptError::format(format!(
                    "single '}}' at offset {start} (use '}}}}' for a literal brace)"
                )));
            }
            other => literal.push(other),
        }
    }

    if !literal.is_empty() {
        tokens.push(Token::Text(literal));
    }
    Ok(tokens)
}

/// Find every placeholder in `text`, in order of first appearance
///
/// Repeated placeholders (same source text) are reported once.
pub fn extract_variables(text: &str) -> Result<Vec<Placeholder>> {
    let mut seen = Vec::<Placeholder>::new();
    for token in tokenize(text)? {
        if let Token::Placeholder(placeholder) = token {
            if !seen.iter().any(|p| p.source == placeholder.source) {
                seen.push(placeholder);
            }
        }
    }
    Ok(seen)
}

/// A placeholder's value after rendering
#[derive(Debug, Clone, PartialEq)]
pub enum Rendered {
    Text(String),
    /// Content parts (images)
    Parts(Vec<ContentBlock>),
    /// Messages spliced by a `MESSAGES` segment
    Messages(Vec<Message>),
}

impl Rendered {
    /// Plain-text form, used when a whole template is formatted as one string
    pub fn to_text(&self) -> String {
        match self {
            Rendered::Text(text) => text.clone(),
            Rendered::Parts(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    ContentBlock::Image { source } => Some(source.to_url()),
                    ContentBlock::Text { text } => Some(text.clone()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
            Rendered::Messages(messages) => messages
                .iter()
                .map(|m| format!("{}: {}", m.role.as_str().to_uppercase(), m.text_content()))
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// Render every placeholder against the bindings
pub fn resolve(placeholders: &[Placeholder], bindings: &Bindings) -> Result<Resolved> {
    placeholders
        .iter()
        .map(|placeholder| {
            let value = placeholder.lookup(bindings)?;
            Ok((placeholder.source.clone(), render(placeholder, value)?))
        })
        .collect()
}

fn render(placeholder: &Placeholder, value: &Value) -> Result<Rendered> {
    let Some(spec) = &placeholder.spec else {
        return Ok(Rendered::Text(render_value(value, 0)));
    };

    let text = match spec {
        FormatSpec::List => join_items(placeholder, value, "\n")?,
        FormatSpec::Separator(sep) => join_items(placeholder, value, sep)?,
        FormatSpec::Lists => expect_array(placeholder, value)?
            .iter()
            .map(|group| match group {
                Value::Array(items) => items
                    .iter()
                    .map(|item| render_value(item, 1))
                    .collect::<Vec<_>>()
                    .join("\n"),
                other => render_value(other, 1),
            })
            .collect::<Vec<_>>()
            .join("\n\n"),
        FormatSpec::Json => serde_json::to_string(value)?,
        FormatSpec::Upper => render_value(value, 0).to_uppercase(),
        FormatSpec::Lower => render_value(value, 0).to_lowercase(),
        FormatSpec::Trim => render_value(value, 0).trim().to_string(),
        FormatSpec::Capitalize => capitalize(&render_value(value, 0)),
        FormatSpec::Precision(digits) => {
            let digits = *digits;
            let number = value.as_f64().ok_or_else(|| {
                PromptError::InvalidBindings(format!(
                    "'{}' is {}, expected a number",
                    placeholder.path,
                    kind(value)
                ))
            })?;
            format!("{number:.digits$}")
        }
        FormatSpec::Image => {
            return Ok(Rendered::Parts(vec![image_part(placeholder, value)?]));
        }
        FormatSpec::Images => {
            return expect_array(placeholder, value)?
                .iter()
                .map(|item| image_part(placeholder, item))
                .collect::<Result<Vec<_>>>()
                .map(Rendered::Parts);
        }
        FormatSpec::Messages => {
            return compiler::messages_from_value(value).map(Rendered::Messages);
        }
    };
    Ok(Rendered::Text(text))
}

/// Default rendering: arrays one level deep, deeper structures as JSON
fn render_value(value: &Value, depth: usize) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) if depth < 2 => items
            .iter()
            .map(|item| render_value(item, depth + 1))
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    }
}

fn join_items(placeholder: &Placeholder, value: &Value, sep: &str) -> Result<String> {
    Ok(expect_array(placeholder, value)?
        .iter()
        .map(|item| render_value(item, 1))
        .collect::<Vec<_>>()
        .join(sep))
}

fn expect_array<'a>(placeholder: &Placeholder, value: &'a Value) -> Result<&'a Vec<Value>> {
    value.as_array().ok_or_else(|| {
        PromptError::InvalidBindings(format!(
            "'{}' is {}, expected an array",
            placeholder.path,
            kind(value)
        ))
    })
}

fn image_part(placeholder: &Placeholder, value: &Value) -> Result<ContentBlock> {
    value.as_str().map(ContentBlock::image).ok_or_else(|| {
        PromptError::InvalidBindings(format!(
            "'{}' is {}, expected an image URL or data URI",
            placeholder.path,
            kind(value)
        ))
    })
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn render_one(template: &str, bindings: &Bindings) -> Result<Rendered> {
        let placeholders = extract_variables(template)?;
        let resolved = resolve(&placeholders, bindings)?;
        Ok(resolved[&placeholders[0].source].clone())
    }

    fn text(template: &str, bindings: &Bindings) -> String {
        match render_one(template, bindings).unwrap() {
            Rendered::Text(text) => text,
            other => panic!("expected text, got {other:?}"),
        }
    }

    #[test]
    fn test_extract_in_order_without_duplicates() {
        let vars = extract_variables("{b} and {a.x:upper} then {b} {{literal}}").unwrap();
        let sources: Vec<_> = vars.iter().map(|p| p.source.as_str()).collect();
        assert_eq!(sources, vec!["b", "a.x:upper"]);
        assert_eq!(vars[1].path, "a.x");
        assert_eq!(vars[1].name(), "a");
        assert_eq!(vars[1].spec, Some(FormatSpec::Upper));
    }

    #[test]
    fn test_escaped_braces() {
        let tokens = tokenize("{{\"json\": {value}}}").unwrap();
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[0], Token::Text("{\"json\": ".to_string()));
        assert_eq!(tokens[2], Token::Text("}".to_string()));
    }

    #[test]
    fn test_malformed_placeholders() {
        for bad in ["{unclosed", "stray }", "{}", "{1abc}", "{a..b}", "{a b}", "{a:shout}", "{a{b}}"] {
            assert!(
                matches!(extract_variables(bad), Err(PromptError::TemplateFormat { .. })),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_format_spec_parsing() {
        assert_eq!("sep= | ".parse::<FormatSpec>().unwrap(), FormatSpec::Separator(" | ".into()));
        assert_eq!(".2f".parse::<FormatSpec>().unwrap(), FormatSpec::Precision(2));
        assert!(".xf".parse::<FormatSpec>().is_err());
        assert_eq!(FormatSpec::Precision(3).to_string(), ".3f");
        assert_eq!(".64f".parse::<FormatSpec>().unwrap(), FormatSpec::Precision(64));
    }

    #[test]
    fn test_precision_bounded() {
        for bad in [".65f", ".70000f", ".99999999999999999999999f"] {
            assert!(
                matches!(bad.parse::<FormatSpec>(), Err(PromptError::TemplateFormat { .. })),
                "{bad} should be rejected"
            );
        }
        assert!(extract_variables("Price: {x:.70000f}").is_err());
    }

    #[test]
    fn test_list_joins_with_comma() {
        let bindings = Bindings::new().with("tags", vec!["a", "b", "c"]);
        assert_eq!(text("{tags}", &bindings), "a, b, c");
    }

    #[test]
    fn test_nested_list_rendering() {
        let bindings = Bindings::new().with("grid", json!([[1, 2], [3, [4, 5]]]));
        assert_eq!(text("{grid}", &bindings), "1, 2, 3, [4,5]");
    }

    #[test]
    fn test_scalar_rendering() {
        let bindings = Bindings::new()
            .with("none", Value::Null)
            .with("flag", true)
            .with("count", 7)
            .with("obj", json!({"k": "v"}));
        assert_eq!(text("{none}", &bindings), "");
        assert_eq!(text("{flag}", &bindings), "true");
        assert_eq!(text("{count}", &bindings), "7");
        assert_eq!(text("{obj}", &bindings), r#"{"k":"v"}"#);
    }

    #[test]
    fn test_dotted_and_indexed_lookup() {
        let bindings = Bindings::new().with(
            "book",
            json!({"title": "Dune", "authors": ["Frank Herbert"]}),
        );
        assert_eq!(text("{book.title}", &bindings), "Dune");
        assert_eq!(text("{book.authors.0}", &bindings), "Frank Herbert");
    }

    #[test]
    fn test_missing_paths_name_full_path() {
        let bindings = Bindings::new().with("book", json!({"title": "Dune"}));
        for (template, path) in [
            ("{genre}", "genre"),
            ("{book.author}", "book.author"),
            ("{book.title.first}", "book.title.first"),
        ] {
            let err = render_one(template, &bindings).unwrap_err();
            assert!(
                matches!(&err, PromptError::MissingVariable { path: p } if p == path),
                "{template}: {err}"
            );
        }
    }

    #[test]
    fn test_format_specs() {
        let bindings = Bindings::new()
            .with("items", vec!["x", "y"])
            .with("groups", json!([["a", "b"], ["c"]]))
            .with("name", "  sTEVE  ")
            .with("price", 19.987)
            .with("data", json!({"a": null}));

        assert_eq!(text("{items:list}", &bindings), "x\ny");
        assert_eq!(text("{items:sep= / }", &bindings), "x / y");
        assert_eq!(text("{groups:lists}", &bindings), "a\nb\n\nc");
        assert_eq!(text("{name:trim}", &bindings), "sTEVE");
        assert_eq!(text("{name:upper}", &bindings), "  STEVE  ");
        assert_eq!(text("{price:.2f}", &bindings), "19.99");
        assert_eq!(text("{data:json}", &bindings), r#"{"a":null}"#);
        assert_eq!(capitalize("sTEVE"), "Steve");
    }

    #[test]
    fn test_spec_type_mismatch() {
        let bindings = Bindings::new().with("name", "x");
        assert!(matches!(
            render_one("{name:list}", &bindings),
            Err(PromptError::InvalidBindings(_))
        ));
        assert!(matches!(
            render_one("{name:.1f}", &bindings),
            Err(PromptError::InvalidBindings(_))
        ));
    }

    #[test]
    fn test_image_specs() {
        let bindings = Bindings::new()
            .with("url", "https://example.com/a.png")
            .with("urls", vec!["https://example.com/b.png", "data:image/png;base64,AAAA"]);

        assert_eq!(
            render_one("{url:image}", &bindings).unwrap(),
            Rendered::Parts(vec![ContentBlock::image("https://example.com/a.png")])
        );
        let Rendered::Parts(parts) = render_one("{urls:images}", &bindings).unwrap() else {
            panic!("expected parts");
        };
        assert_eq!(parts.len(), 2);
    }

    #[test]
    fn test_deterministic() {
        let bindings = Bindings::new().with("obj", json!({"b": 1, "a": [1, 2]}));
        let first = text("{obj}", &bindings);
        for _ in 0..10 {
            assert_eq!(text("{obj}", &bindings), first);
        }
    }
}
