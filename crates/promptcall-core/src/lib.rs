//! Prompt calls for promptcall
//!
//! This crate ties a [`PromptTemplate`] to an [`LLMProvider`](promptcall_llm::LLMProvider).
//! A [`Call`] compiles its template against caller bindings, sends the result
//! to the provider and returns a uniform [`CallResponse`]. It can also stream
//! the reply or parse it into a typed value described by a JSON schema.
//!
//! Compilation happens before any network traffic, so template and binding
//! errors surface without a provider round trip and are never retried.

pub mod call;
pub mod error;
pub mod response;
pub mod retry;
pub mod structured;

pub use call::Call;
pub use error::{Error, Result};
pub use response::CallResponse;
pub use retry::RetryPolicy;
pub use structured::{extract_json, parse_json, response_format};

pub use promptcall_llm as llm;
pub use promptcall_prompt as prompt;
pub use promptcall_prompt::{Bindings, PromptTemplate};
