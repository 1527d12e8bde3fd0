//! Prompt templates for promptcall
//!
//! This crate turns a template string plus a set of bindings into the ordered,
//! role-tagged message list a provider consumes. The pipeline is synchronous
//! and never touches the network:
//!
//! 1. [`parse`] splits the template on role markers (`SYSTEM:`, `USER:`, ...)
//!    into [`Segment`]s
//! 2. [`extract_variables`] and [`resolve`] find `{placeholders}` and render
//!    them from [`Bindings`]
//! 3. [`compile`] assembles the final [`Message`](promptcall_llm::Message) list
//!
//! [`PromptTemplate`] wraps all three steps.
//!
//! # Quick Start
//!
//! ```
//! use promptcall_prompt::{Bindings, PromptTemplate};
//!
//! let template = PromptTemplate::new("Please recommend a list of movies in the {genre} category.")?;
//! let messages = template.messages(&Bindings::new().with("genre", "comedy"))?;
//!
//! assert_eq!(messages.len(), 1);
//! assert_eq!(
//!     messages[0].text(),
//!     Some("Please recommend a list of movies in the comedy category.")
//! );
//! # Ok::<(), promptcall_prompt::PromptError>(())
//! ```
//!
//! # Splicing history
//!
//! ```
//! use promptcall_prompt::{Bindings, PromptTemplate};
//! use serde_json::json;
//!
//! let template = PromptTemplate::new(
//!     "SYSTEM: You are a librarian.\nMESSAGES: {history}\nUSER: {question}",
//! )?;
//! let bindings = Bindings::new()
//!     .with("history", json!([{"role": "user", "content": "Hi"}, {"role": "assistant", "content": "Hello!"}]))
//!     .with("question", "Any sci-fi picks?");
//!
//! assert_eq!(template.messages(&bindings)?.len(), 4);
//! # Ok::<(), promptcall_prompt::PromptError>(())
//! ```

mod bindings;
mod compiler;
mod error;
mod parser;
mod template;
mod variables;

pub use bindings::Bindings;
pub use compiler::{compile, messages_from_value};
pub use error::{PromptError, Result};
pub use parser::{Segment, SegmentRole, parse};
pub use template::PromptTemplate;
pub use variables::{
    FormatSpec, MAX_PRECISION, PathSegment, Placeholder, Rendered, Resolved, extract_variables,
    resolve,
};
