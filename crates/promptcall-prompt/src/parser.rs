//! Template parser
//!
//! Splits a template into role-tagged segments. A line starting with a role
//! keyword and a colon (`SYSTEM:`, `user:`) opens a new segment; text before
//! the first marker belongs to an implicit `user` segment.
//!
//! Marker rule, for a line whose first word (letters and underscores) is
//! directly followed by `:`:
//!
//! - a recognised role or `MESSAGES` (any case) starts a segment
//! - any other all-caps word of two or more letters is rejected as an unknown
//!   role marker
//! - anything else (`Note: ...`) is ordinary text
//!
//! A leading backslash (`\USER: ...`) keeps a marker-looking line as text.

use crate::variables::{FormatSpec, Token, tokenize};
use crate::{PromptError, Result};
use promptcall_llm::Role;
use std::fmt;
use tracing::trace;

const MESSAGES_KEYWORD: &str = "MESSAGES";

/// Who a segment speaks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentRole {
    /// A single message with this role
    Role(Role),
    /// A placeholder that expands to a caller-supplied message list
    Messages,
}

impl fmt::Display for SegmentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SegmentRole::Role(role) => f.write_str(&role.as_str().to_uppercase()),
            SegmentRole::Messages => f.write_str(MESSAGES_KEYWORD),
        }
    }
}

/// A (role, raw text) slice of a template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub role: SegmentRole,
    /// Raw text with surrounding blank lines and whitespace trimmed
    pub text: String,
    /// Whether the segment was opened by an explicit marker
    pub marked: bool,
    /// 1-based line the segment starts on
    pub line: usize,
}

enum Line<'a> {
    Marker(SegmentRole, &'a str),
    Text(&'a str),
}

/// Split a template into ordered segments
///
/// Empty (or whitespace-only) templates produce no segments. Placeholders are
/// validated here, so a template that parses can only fail later on its
/// bindings.
pub fn parse(template: &str) -> Result<Vec<Segment>> {
    let mut segments = Vec::new();
    let mut current = Segment {
        role: SegmentRole::Role(Role::User),
        text: String::new(),
        marked: false,
        line: 1,
    };
    let mut lines: Vec<&str> = Vec::new();

    for (index, line) in template.lines().enumerate() {
        let number = index + 1;
        match classify(line, number)? {
            Line::Marker(role, rest) => {
                finish(&mut segments, current, &lines)?;
                current = Segment {
                    role,
                    text: String::new(),
                    marked: true,
                    line: number,
                };
                lines.clear();
                lines.push(rest);
            }
            Line::Text(text) => lines.push(text),
        }
    }
    finish(&mut segments, current, &lines)?;

    trace!(segments = segments.len(), "Parsed template");
    Ok(segments)
}

fn finish(segments: &mut Vec<Segment>, mut segment: Segment, lines: &[&str]) -> Result<()> {
    segment.text = lines.join("\n").trim().to_string();
    if !segment.marked && segment.text.is_empty() {
        return Ok(());
    }

    let tokens = tokenize(&segment.text).map_err(|err| at_line(err, segment.line))?;
    match segment.role {
        SegmentRole::Messages => {
            segment.text = messages_placeholder(&tokens, segment.line)?;
        }
        SegmentRole::Role(_) => {
            let misplaced = tokens.iter().any(|token| {
                matches!(token, Token::Placeholder(p) if p.spec == Some(FormatSpec::Messages))
            });
            if misplaced {
                return Err(PromptError::format(format!(
                    "line {}: the 'messages' format is only valid in a MESSAGES segment",
                    segment.line
                )));
            }
        }
    }

    segments.push(segment);
    Ok(())
}

/// A MESSAGES segment is exactly one placeholder; it is normalised to carry
/// the `messages` spec explicitly.
fn messages_placeholder(tokens: &[Token], line: usize) -> Result<String> {
    match tokens {
        [Token::Placeholder(p)] if p.spec.is_none() || p.spec == Some(FormatSpec::Messages) => {
            Ok(format!("{{{}:{}}}", p.path, FormatSpec::Messages))
        }
        _ => Err(PromptError::format(format!(
            "line {line}: a MESSAGES segment must contain exactly one placeholder, e.g. 'MESSAGES: {{history}}'"
        ))),
    }
}

fn classify(line: &str, number: usize) -> Result<Line<'_>> {
    let trimmed = line.trim_start();

    if let Some(escaped) = trimmed.strip_prefix('\\') {
        return Ok(Line::Text(if marker_word(escaped).is_some() {
            escaped
        } else {
            line
        }));
    }

    let Some((word, rest)) = marker_word(trimmed) else {
        return Ok(Line::Text(line));
    };

    if let Some(role) = Role::from_name(word) {
        return Ok(Line::Marker(SegmentRole::Role(role), rest.trim_start()));
    }
    if word.eq_ignore_ascii_case(MESSAGES_KEYWORD) {
        return Ok(Line::Marker(SegmentRole::Messages, rest.trim_start()));
    }

    let letters = word.chars().filter(char::is_ascii_alphabetic).count();
    if letters >= 2 && !word.chars().any(|c| c.is_ascii_lowercase()) {
        return Err(PromptError::format(format!(
            "line {number}: unknown role marker '{word}:' (expected one of: SYSTEM, USER, ASSISTANT, MODEL, TOOL, MESSAGES; prefix the line with '\\' to keep it as text)"
        )));
    }

    Ok(Line::Text(line))
}

/// Split `WORD:rest` when the line opens with a letters/underscores word and a colon
fn marker_word(text: &str) -> Option<(&str, &str)> {
    let end = text
        .find(|c: char| !(c.is_ascii_alphabetic() || c == '_'))
        .unwrap_or(text.len());
    let (word, rest) = text.split_at(end);
    let rest = rest.strip_prefix(':')?;
    word.chars().any(|c| c.is_ascii_alphabetic()).then_some((word, rest))
}

fn at_line(err: PromptError, line: usize) -> PromptError {
    match err {
        PromptError::TemplateFormat { detail } => PromptError::TemplateFormat {
            detail: format!("segment starting on line {line}: {detail}"),
        },
        other => other,
    }
}
