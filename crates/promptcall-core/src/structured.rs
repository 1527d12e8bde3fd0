//! Structured output
//!
//! Builds a JSON response format from a type's schema and turns a model's
//! reply back into that type.

use crate::{Error, Result};
use promptcall_llm::ResponseFormat;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// A JSON-schema response format for `T`
pub fn response_format<T: JsonSchema>() -> ResponseFormat {
    let mut schema = schemars::schema_for!(T).to_value();
    if let Some(object) = schema.as_object_mut() {
        object.remove("$schema");
    }
    ResponseFormat::JsonSchema {
        name: T::schema_name().into_owned(),
        schema,
    }
}

/// Locate the JSON document inside a model reply
///
/// Prefers the body of a fenced code block. Otherwise tries each `{` or `[`
/// in order and returns the first span that parses as a complete JSON value,
/// so bracketed prose ahead of the document is skipped.
pub fn extract_json(text: &str) -> Option<&str> {
    if let Some(fenced) = fenced_block(text) {
        return Some(fenced);
    }

    text.match_indices(['{', '[']).find_map(|(start, _)| {
        let rest = &text[start..];
        let mut values = serde_json::Deserializer::from_str(rest).into_iter::<Value>();
        match values.next() {
            Some(Ok(_)) => Some(&rest[..values.byte_offset()]),
            _ => None,
        }
    })
}

fn fenced_block(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after = &text[open + 3..];
    // Skip the info string (```json)
    let body_start = after.find('\n')? + 1;
    let body = &after[body_start..];
    let close = body.find("```")?;
    let inner = body[..close].trim();
    (!inner.is_empty()).then_some(inner)
}

/// Parse a model reply into `T`
///
/// `schema` names the target type in the error. The raw reply is carried by
/// [`Error::SchemaValidation`] so callers can log or display it.
pub fn parse_json<T: DeserializeOwned>(text: &str, schema: &str) -> Result<T> {
    let candidate = extract_json(text).ok_or_else(|| Error::SchemaValidation {
        schema: schema.to_string(),
        detail: "no JSON object found in response".to_string(),
        raw: text.to_string(),
    })?;

    serde_json::from_str(candidate).map_err(|e| Error::SchemaValidation {
        schema: schema.to_string(),
        detail: e.to_string(),
        raw: text.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, JsonSchema, PartialEq)]
    struct Book {
        title: String,
        author: String,
    }

    #[test]
    fn test_response_format_from_schema() {
        let ResponseFormat::JsonSchema { name, schema } = response_format::<Book>() else {
            panic!("expected a JSON schema format");
        };
        assert_eq!(name, "Book");
        assert_eq!(schema["type"], "object");
        assert!(schema.get("$schema").is_none());
        assert!(schema["properties"]["title"].is_object());
    }

    #[test]
    fn test_extract_plain_object() {
        assert_eq!(extract_json(r#"{"a": 1}"#), Some(r#"{"a": 1}"#));
        assert_eq!(
            extract_json("Sure! Here it is: {\"a\": {\"b\": 2}} Enjoy."),
            Some("{\"a\": {\"b\": 2}}")
        );
        assert_eq!(extract_json("[1, 2, 3] done"), Some("[1, 2, 3]"));
        assert_eq!(extract_json("no json here"), None);
        assert_eq!(extract_json("broken {\"a\": 1"), None);
    }

    #[test]
    fn test_extract_skips_bracketed_prose() {
        let reply = "Here is my pick [see notes]: {\"title\": \"Dune\", \"author\": \"Frank Herbert\"} {enjoy}";
        assert_eq!(
            extract_json(reply),
            Some("{\"title\": \"Dune\", \"author\": \"Frank Herbert\"}")
        );

        let book: Book = parse_json(reply, "Book").unwrap();
        assert_eq!(book.title, "Dune");
        assert_eq!(book.author, "Frank Herbert");
    }

    #[test]
    fn test_extract_fenced_block() {
        let reply = "Here you go:\n```json\n{\"title\": \"Dune\"}\n```\nAnything else?";
        assert_eq!(extract_json(reply), Some("{\"title\": \"Dune\"}"));
    }

    #[test]
    fn test_parse_json() {
        let book: Book = parse_json(
            "```\n{\"title\": \"Dune\", \"author\": \"Frank Herbert\"}\n```",
            "Book",
        )
        .unwrap();
        assert_eq!(
            book,
            Book {
                title: "Dune".to_string(),
                author: "Frank Herbert".to_string()
            }
        );
    }

    #[test]
    fn test_parse_json_reports_schema_mismatch() {
        let err = parse_json::<Book>(r#"{"title": "Dune"}"#, "Book").unwrap_err();
        match err {
            Error::SchemaValidation {
                schema,
                detail,
                raw,
            } => {
                assert_eq!(schema, "Book");
                assert!(detail.contains("author"));
                assert_eq!(raw, r#"{"title": "Dune"}"#);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_parse_json_without_json() {
        assert!(matches!(
            parse_json::<Book>("I cannot help with that.", "Book"),
            Err(Error::SchemaValidation { .. })
        ));
    }
}
