//! Message compiler
//!
//! Turns parsed segments plus resolved placeholder values into the ordered
//! message list sent to a provider.

use crate::parser::{Segment, SegmentRole};
use crate::variables::{Rendered, Resolved, Token, tokenize};
use crate::{PromptError, Result};
use promptcall_llm::{ContentBlock, Message, MessageContent, Role};
use serde::Deserialize;
use serde_json::Value;
use tracing::trace;

/// Build messages from segments and their resolved values
///
/// Each segment's content is trimmed; segments that end up empty are dropped.
/// A segment with image placeholders compiles to structured content.
pub fn compile(segments: &[Segment], resolved: &Resolved) -> Result<Vec<Message>> {
    let mut messages = Vec::with_capacity(segments.len());

    for segment in segments {
        match segment.role {
            SegmentRole::Messages => {
                for token in tokenize(&segment.text)? {
                    if let Token::Placeholder(p) = token {
                        match lookup(resolved, &p.source, &p.path)? {
                            Rendered::Messages(spliced) => messages.extend(spliced.iter().cloned()),
                            _ => {
                                return Err(PromptError::format(format!(
                                    "'{}' in a MESSAGES segment must render to messages",
                                    p.path
                                )));
                            }
                        }
                    }
                }
            }
            SegmentRole::Role(role) => {
                if let Some(message) = compile_segment(role, &segment.text, resolved)? {
                    messages.push(message);
                }
            }
        }
    }

    trace!(messages = messages.len(), "Compiled prompt messages");
    Ok(messages)
}

fn compile_segment(role: Role, text: &str, resolved: &Resolved) -> Result<Option<Message>> {
    let mut parts: Vec<ContentBlock> = Vec::new();
    let mut buffer = String::new();

    for token in tokenize(text)? {
        match token {
            Token::Text(literal) => buffer.push_str(&literal),
            Token::Placeholder(p) => match lookup(resolved, &p.source, &p.path)? {
                Rendered::Text(value) => buffer.push_str(value),
                Rendered::Parts(blocks) => {
                    flush_text(&mut parts, &mut buffer);
                    parts.extend(blocks.iter().cloned());
                }
                Rendered::Messages(_) => {
                    return Err(PromptError::format(format!(
                        "'{}' renders to messages and needs its own MESSAGES segment",
                        p.path
                    )));
                }
            },
        }
    }

    if parts.is_empty() {
        let content = buffer.trim();
        return Ok((!content.is_empty()).then(|| Message::new(role, content)));
    }

    flush_text(&mut parts, &mut buffer);
    Ok((!parts.is_empty()).then(|| Message::with_blocks(role, parts)))
}

fn flush_text(parts: &mut Vec<ContentBlock>, buffer: &mut String) {
    let text = buffer.trim();
    if !text.is_empty() {
        parts.push(ContentBlock::text(text));
    }
    buffer.clear();
}

fn lookup<'a>(resolved: &'a Resolved, source: &str, path: &str) -> Result<&'a Rendered> {
    resolved.get(source).ok_or_else(|| PromptError::missing(path))
}

#[derive(Deserialize)]
struct RawMessage {
    role: String,
    #[serde(default)]
    content: Option<MessageContent>,
}

/// Read a JSON array of `{"role", "content"}` objects as messages
///
/// Roles must be in the recognised set. Content may be a string or a list of
/// content blocks; it is otherwise passed through unchanged.
pub fn messages_from_value(value: &Value) -> Result<Vec<Message>> {
    let items = value.as_array().ok_or_else(|| {
        PromptError::InvalidBindings("a message list must be a JSON array".to_string())
    })?;

    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let raw = RawMessage::deserialize(item).map_err(|e| {
                PromptError::InvalidBindings(format!("message {index} is malformed: {e}"))
            })?;
            let role = raw
                .role
                .parse::<Role>()
                .map_err(|e| PromptError::format(format!("message {index}: {e}")))?;
            Ok(Message {
                role,
                content: raw.content,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use crate::{Bindings, extract_variables, resolve};
    use promptcall_llm::ImageSource;
    use serde_json::json;

    fn run(template: &str, bindings: &Bindings) -> Result<Vec<Message>> {
        let segments = parse(template)?;
        let placeholders = segments
            .iter()
            .map(|s| extract_variables(&s.text))
            .collect::<Result<Vec<_>>>()?
            .concat();
        let resolved = resolve(&placeholders, bindings)?;
        compile(&segments, &resolved)
    }

    #[test]
    fn test_single_user_message() {
        let messages = run(
            "Please recommend a list of movies in the {genre} category.",
            &Bindings::new().with("genre", "comedy"),
        )
        .unwrap();
        assert_eq!(
            messages,
            vec![Message::user(
                "Please recommend a list of movies in the comedy category."
            )]
        );
    }

    #[test]
    fn test_system_and_user() {
        let messages = run(
            "SYSTEM: system message\nUSER: user message about {topic}",
            &Bindings::new().with("topic", "testing"),
        )
        .unwrap();
        assert_eq!(
            messages,
            vec![
                Message::system("system message"),
                Message::user("user message about testing"),
            ]
        );
    }

    #[test]
    fn test_no_placeholders_round_trip() {
        let template = "  \n Recommend me a fantasy book.\nMake it a long one.\n\n";
        let resolved = resolve(&extract_variables(template).unwrap(), &Bindings::new()).unwrap();
        let messages = compile(&parse(template).unwrap(), &resolved).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text(), Some(template.trim()));
    }

    #[test]
    fn test_empty_segments_dropped() {
        let messages = run(
            "SYSTEM: {persona}\nUSER: hi",
            &Bindings::new().with("persona", "   "),
        )
        .unwrap();
        assert_eq!(messages, vec![Message::user("hi")]);
    }

    #[test]
    fn test_missing_variable_never_renders_empty() {
        let err = run("USER: {genre}", &Bindings::new()).unwrap_err();
        assert!(matches!(err, PromptError::MissingVariable { path } if path == "genre"));

        let segments = parse("USER: {genre}").unwrap();
        let err = compile(&segments, &Resolved::new()).unwrap_err();
        assert!(matches!(err, PromptError::MissingVariable { .. }));
    }

    #[test]
    fn test_messages_spliced_in_place() {
        let bindings = Bindings::new()
            .with(
                "history",
                json!([
                    {"role": "user", "content": "Recommend a book"},
                    {"role": "assistant", "content": "Dune"}
                ]),
            )
            .with("question", "Something shorter?");
        let messages = run(
            "SYSTEM: You are a librarian\nMESSAGES: {history}\nUSER: {question}",
            &bindings,
        )
        .unwrap();

        assert_eq!(
            messages,
            vec![
                Message::system("You are a librarian"),
                Message::user("Recommend a book"),
                Message::assistant("Dune"),
                Message::user("Something shorter?"),
            ]
        );
    }

    #[test]
    fn test_spliced_roles_validated() {
        let bindings =
            Bindings::new().with("history", json!([{"role": "narrator", "content": "Once"}]));
        let err = run("MESSAGES: {history}", &bindings).unwrap_err();
        assert!(matches!(err, PromptError::TemplateFormat { detail } if detail.contains("narrator")));
    }

    #[test]
    fn test_messages_from_value_passthrough() {
        let value = json!([
            {"role": "system", "content": "be brief"},
            {"role": "user", "content": [{"type": "text", "text": "look"}]},
            {"role": "tool"}
        ]);
        let messages = messages_from_value(&value).unwrap();
        assert_eq!(messages[0], Message::system("be brief"));
        assert_eq!(messages[1].text(), Some("look"));
        assert_eq!(messages[2].role, Role::Tool);
        assert!(messages[2].content.is_none());

        assert!(matches!(
            messages_from_value(&json!({"role": "user"})),
            Err(PromptError::InvalidBindings(_))
        ));
    }

    #[test]
    fn test_image_placeholders_become_parts() {
        let bindings = Bindings::new()
            .with("url", "https://example.com/cover.jpg")
            .with("title", "Dune");
        let messages = run("USER: What book is this? {url:image} Is it {title}?", &bindings).unwrap();

        assert_eq!(
            messages,
            vec![Message::with_blocks(
                Role::User,
                vec![
                    ContentBlock::text("What book is this?"),
                    ContentBlock::Image {
                        source: ImageSource::Url {
                            url: "https://example.com/cover.jpg".to_string()
                        }
                    },
                    ContentBlock::text("Is it Dune?"),
                ]
            )]
        );
    }
}
