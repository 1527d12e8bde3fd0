//! Recommend a book, first as free text and then as a typed value
//!
//! # Usage
//!
//! ```bash
//! export OPENAI_API_KEY="sk-..."
//! # optional, for LM Studio / vLLM / Ollama
//! export OPENAI_API_BASE="http://localhost:1234/v1"
//! export PROMPTCALL_MODEL="gpt-4o-mini"
//! cargo run --example recommend_book -p promptcall-core -- fantasy
//! ```

use anyhow::Context;
use promptcall_core::{Bindings, Call, PromptTemplate};
use promptcall_llm::providers::OpenAIProvider;
use promptcall_utils::{Config, init_tracing_with};
use schemars::JsonSchema;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize, JsonSchema)]
struct Book {
    title: String,
    author: String,
    /// Why the book fits the request
    reason: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut config = Config::from_env().context("reading PROMPTCALL_* configuration")?;
    if config.default_model.is_none() {
        config.default_model = Some("gpt-4o-mini".to_string());
    }
    init_tracing_with(&config);

    let genre = std::env::args().nth(1).unwrap_or_else(|| "fantasy".to_string());
    let provider = Arc::new(OpenAIProvider::from_env()?);

    let template = PromptTemplate::new(
        "SYSTEM: You are a librarian who gives short, confident answers.\n\
         USER: Recommend a {genre} book.",
    )?;
    let recommend = Call::from_config(provider, &config)?.template(template);
    let bindings = Bindings::new().with("genre", genre);

    let response = recommend.invoke(&bindings).await?;
    println!("{response}\n");
    println!(
        "Tokens: {} in / {} out",
        response.usage().input_tokens,
        response.usage().output_tokens
    );

    let book: Book = recommend.extract(&bindings).await?;
    println!("\n{} by {}: {}", book.title, book.author, book.reason);
    Ok(())
}
